// FFmpeg invocation builders for the wrap pipeline.
//
// Builders return the command without executing it, so every argv can
// be inspected in tests without an ffmpeg install.

use std::path::Path;
use std::process::Command;

use super::types::JobSpec;
use crate::engine::probe::ProbeResult;

/// Fixed resolution for synthesized image segments and re-encodes.
pub const TARGET_WIDTH: u32 = 1920;
pub const TARGET_HEIGHT: u32 = 1080;

/// Keyframe interval of roughly two seconds at the given frame rate.
pub fn keyframe_interval(fps: u32) -> u32 {
    if fps > 0 { (fps * 2).max(2) } else { 60 }
}

fn base_cmd(ffmpeg: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg);
    // Progress goes to stdout as key=value lines; stderr keeps the
    // error log.
    cmd.args(["-hide_banner", "-y", "-progress", "pipe:1", "-nostats"]);
    cmd
}

/// Stream-copy remux of the source video into a transport stream.
/// AVC needs annex-B framing inside mpegts, hence the bitstream
/// filter.
pub fn build_remux_cmd(ffmpeg: &Path, video: &Path, out_ts: &Path) -> Command {
    let mut cmd = base_cmd(ffmpeg);
    cmd.arg("-i")
        .arg(video)
        .args(["-c", "copy", "-bsf:v", "h264_mp4toannexb", "-f", "mpegts"])
        .arg(out_ts);
    cmd
}

/// Synthesize a fixed-duration transport-stream segment from a still
/// image, with a silent audio track matching the source layout when
/// the source has audio.
pub fn build_image_segment_cmd(
    ffmpeg: &Path,
    image: &Path,
    out_ts: &Path,
    duration: f64,
    fps: u32,
    info: &ProbeResult,
) -> Command {
    let gop = keyframe_interval(fps);
    let mut cmd = base_cmd(ffmpeg);

    cmd.args(["-loop", "1", "-framerate", &fps.to_string()])
        .args(["-t", &format!("{duration:.3}")])
        .arg("-i")
        .arg(image);

    if info.has_audio {
        let layout = if info.audio_channels == 1 {
            "mono"
        } else {
            "stereo"
        };
        cmd.args(["-f", "lavfi", "-t", &format!("{duration:.3}"), "-i"])
            .arg(format!(
                "anullsrc=r={}:cl={layout}",
                info.audio_sample_rate
            ));
    }

    cmd.args(["-r", &fps.to_string()])
        .args([
            "-vf",
            &format!("scale={TARGET_WIDTH}:{TARGET_HEIGHT}:flags=lanczos,format=yuv420p"),
        ])
        .args([
            "-colorspace",
            "bt709",
            "-color_primaries",
            "bt709",
            "-color_trc",
            "bt709",
        ])
        .args([
            "-c:v",
            "libx264",
            "-profile:v",
            "high",
            "-level:v",
            "4.1",
            "-g",
            &gop.to_string(),
            "-sc_threshold",
            "0",
        ]);

    if info.has_audio {
        cmd.args([
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-ar",
            &info.audio_sample_rate.to_string(),
            "-ac",
            "2",
        ]);
    }

    cmd.args(["-f", "mpegts"]).arg(out_ts);
    cmd
}

/// Stream-copy concat of transport-stream segments into a fast-start
/// MP4, converting the ADTS audio framing back to the container's
/// native framing. Never re-encodes.
pub fn build_concat_cmd(ffmpeg: &Path, list_file: &Path, output: &Path) -> Command {
    let mut cmd = base_cmd(ffmpeg);
    cmd.args(["-f", "concat", "-safe", "0", "-i"])
        .arg(list_file)
        .args([
            "-c",
            "copy",
            "-bsf:a",
            "aac_adtstoasc",
            "-movflags",
            "+faststart",
        ])
        .arg(output);
    cmd
}

/// Single-pass filter-graph re-encode combining looped bookend images
/// and the main video. `hw_encoder` selects a hardware encoder;
/// `None` falls back to libx264 at a fixed quality.
pub fn build_transcode_cmd(
    ffmpeg: &Path,
    spec: &JobSpec,
    info: &ProbeResult,
    hw_encoder: Option<&str>,
) -> Command {
    let fps = info.target_fps();
    let gop = keyframe_interval(fps);
    let mut cmd = base_cmd(ffmpeg);

    cmd.arg("-i").arg(&spec.video_path);
    if let Some(image) = &spec.start_image {
        cmd.args(["-loop", "1", "-t", &format!("{:.3}", spec.start_duration)])
            .arg("-i")
            .arg(image);
    }
    if let Some(image) = &spec.end_image {
        cmd.args(["-loop", "1", "-t", &format!("{:.3}", spec.end_duration)])
            .arg("-i")
            .arg(image);
    }

    cmd.args(["-filter_complex", &build_filter_graph(spec)]);
    cmd.args(["-map", "[v]", "-map", "0:a?"]);
    cmd.args(["-r", &fps.to_string()]);
    cmd.args([
        "-colorspace",
        "bt709",
        "-color_primaries",
        "bt709",
        "-color_trc",
        "bt709",
    ]);

    match hw_encoder {
        Some(encoder) => {
            cmd.args(["-c:v", encoder, "-profile:v", "high", "-level:v", "4.1"])
                .args(["-g", &gop.to_string(), "-sc_threshold", "0"])
                .args(["-b:v", "8M", "-maxrate", "10M", "-bufsize", "20M"]);
        }
        None => {
            cmd.args(["-c:v", "libx264", "-preset", "medium", "-crf", "19"])
                .args(["-profile:v", "high", "-level:v", "4.1"])
                .args(["-g", &gop.to_string(), "-sc_threshold", "0"]);
        }
    }

    if info.has_audio {
        cmd.args([
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-ar",
            &info.audio_sample_rate.to_string(),
            "-ac",
            "2",
        ]);
    }

    cmd.args(["-movflags", "+faststart"]).arg(&spec.output_path);
    cmd
}

/// One scaling chain per input, concatenated into a single [v] stream.
fn build_filter_graph(spec: &JobSpec) -> String {
    let scale_image =
        format!("scale={TARGET_WIDTH}:{TARGET_HEIGHT}:flags=lanczos,format=yuv420p");
    let scale_main =
        format!("scale={TARGET_WIDTH}:{TARGET_HEIGHT}:flags=bicubic,format=yuv420p");

    let mut chains = Vec::new();
    let mut labels = Vec::new();
    let mut input_idx = 1;

    if spec.start_image.is_some() {
        chains.push(format!("[{input_idx}:v]{scale_image}[intro]"));
        labels.push("[intro]");
        input_idx += 1;
    }
    chains.push(format!("[0:v]{scale_main}[main]"));
    labels.push("[main]");
    if spec.end_image.is_some() {
        chains.push(format!("[{input_idx}:v]{scale_image}[outro]"));
        labels.push("[outro]");
    }

    chains.push(format!(
        "{}concat=n={}:v=1:a=0[v]",
        labels.concat(),
        labels.len()
    ));
    chains.join(";")
}

/// Render a command as a copy-pastable shell string for logs.
pub fn format_cmd(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|arg| {
            let s = arg.to_string_lossy();
            shlex::try_quote(&s)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| s.into_owned())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
