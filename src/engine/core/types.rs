use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle of a job inside the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    /// Terminal states never transition back to Running.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

/// Everything needed to run one wrap job. Immutable after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: Uuid,
    pub video_path: PathBuf,
    pub start_image: Option<PathBuf>,
    pub start_duration: f64,
    pub end_image: Option<PathBuf>,
    pub end_duration: f64,
    pub output_path: PathBuf,

    /// Try the remux+concat fast path before re-encoding.
    pub prefer_remux: bool,

    /// Allow a hardware encoder for the fallback re-encode.
    pub use_hardware: bool,
}

impl JobSpec {
    /// Create a spec with no images attached yet.
    pub fn new(video_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_path,
            start_image: None,
            start_duration: 0.0,
            end_image: None,
            end_duration: 0.0,
            output_path,
            prefer_remux: true,
            use_hardware: true,
        }
    }

    pub fn has_images(&self) -> bool {
        self.start_image.is_some() || self.end_image.is_some()
    }

    /// Sum of the source duration and any bookend durations, for
    /// progress scaling. `None` when the source duration is unknown.
    pub fn total_duration(&self, source_duration: f64) -> Option<f64> {
        if source_duration <= 0.0 {
            return None;
        }
        let mut total = source_duration;
        if self.start_image.is_some() {
            total += self.start_duration;
        }
        if self.end_image.is_some() {
            total += self.end_duration;
        }
        Some(total)
    }
}

/// Mutable per-job record owned by the engine. Pipelines never touch
/// this directly; they emit events and the engine folds them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    pub progress_pct: f64,
    pub message: String,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl JobState {
    pub fn queued() -> Self {
        Self {
            status: JobStatus::Queued,
            progress_pct: 0.0,
            message: "Queued".to_string(),
            output_path: None,
            error: None,
        }
    }
}

/// Per-job event stream, keyed by job id.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started { job_id: Uuid },
    Progress { job_id: Uuid, pct: f64 },
    Status { job_id: Uuid, message: String },
    Finished { job_id: Uuid, output_path: PathBuf },
    Failed { job_id: Uuid, error: String },
    Cancelled { job_id: Uuid },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::Started { job_id }
            | Self::Progress { job_id, .. }
            | Self::Status { job_id, .. }
            | Self::Finished { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cancelled { job_id } => *job_id,
        }
    }
}

/// Parser for ffmpeg progress output (key=value format)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of ffmpeg progress output
    pub fn parse_line(&mut self, line: &str) {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "out_time_us" => {
                    if let Ok(us) = value.trim().parse::<u64>() {
                        self.out_time_us = us;
                    }
                }
                "progress" => {
                    if value.trim() == "end" {
                        self.is_complete = true;
                    }
                }
                _ => {}
            }
        }
    }

    /// Get output time in seconds
    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Calculate progress percentage given total duration
    pub fn progress_pct(&self, duration_s: Option<f64>) -> f64 {
        if let Some(dur) = duration_s {
            if dur > 0.0 {
                return (self.out_time_s() / dur * 100.0).min(100.0);
            }
        }
        0.0
    }
}
