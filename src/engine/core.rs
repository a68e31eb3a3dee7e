mod error;
mod ffmpeg_cmd;
mod matcher;
mod pipeline;
mod types;

pub use error::{PipelineError, PipelineResult};
pub use ffmpeg_cmd::{
    TARGET_HEIGHT, TARGET_WIDTH, build_concat_cmd, build_image_segment_cmd, build_remux_cmd,
    build_transcode_cmd, format_cmd, keyframe_interval,
};
pub use matcher::{
    MatchPair, SIMILARITY_THRESHOLD, is_image_file, is_video_file, match_pairs, name_similarity,
    output_name, scan_and_match, scan_images, scan_videos,
};
pub use pipeline::{CancelToken, run_job};
pub use types::{JobEvent, JobSpec, JobState, JobStatus, ProgressParser};
