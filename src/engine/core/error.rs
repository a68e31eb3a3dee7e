//! Error types for the wrap pipeline.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while running a job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{tool} not found: set {env_key} or install {tool} on PATH")]
    BinaryNotFound {
        tool: &'static str,
        env_key: &'static str,
    },

    #[error("source remux failed: {0}")]
    Remux(String),

    #[error("image segment encode failed: {0}")]
    SegmentEncode(String),

    #[error("segment concat failed: {0}")]
    Concat(String),

    #[error("re-encode failed: {0}")]
    Transcode(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Fast-path failures escalate to the re-encode fallback instead of
    /// failing the job.
    pub fn is_escalatable(&self) -> bool {
        matches!(
            self,
            Self::Remux(_) | Self::SegmentEncode(_) | Self::Concat(_)
        )
    }
}
