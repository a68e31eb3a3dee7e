use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bookend")]
#[command(about = "Wrap videos with still-image intros/outros via ffmpeg", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Wrap a single video with start/end images
    Process {
        /// Source video file
        video: PathBuf,

        /// Image shown before the video
        #[arg(long)]
        start_image: Option<PathBuf>,

        /// Image shown after the video
        #[arg(long)]
        end_image: Option<PathBuf>,

        /// Seconds the start image is shown
        #[arg(long, default_value_t = 3.0)]
        start_duration: f64,

        /// Seconds the end image is shown
        #[arg(long, default_value_t = 3.0)]
        end_duration: f64,

        /// Output file (defaults to processed_<name>.mp4 next to the source)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Skip the remux fast path and re-encode directly
        #[arg(long)]
        no_remux: bool,

        /// Disable hardware encoders for the fallback re-encode
        #[arg(long)]
        no_hardware: bool,
    },

    /// Pair videos with images across two folders and wrap each match
    Batch {
        /// Folder containing source videos
        video_dir: PathBuf,

        /// Folder containing bookend images
        image_dir: PathBuf,

        /// Folder for the wrapped outputs
        output_dir: PathBuf,

        /// Seconds each bookend image is shown (overrides config)
        #[arg(long)]
        duration: Option<f64>,

        /// Skip the remux fast path and re-encode directly
        #[arg(long)]
        no_remux: bool,

        /// Disable hardware encoders for the fallback re-encode
        #[arg(long)]
        no_hardware: bool,

        /// List matched pairs without processing
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe a video file and print its stream metadata
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Check ffmpeg/ffprobe resolution and hardware encoder support
    CheckFfmpeg,

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
