use std::any::Any;

use thiserror::Error;
use tokio::task::JoinError;

pub type PipeResult<T> = Result<T, PipeError>;

/// Failures a stage can report. A sequence carries at most one of these, as
/// its final item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("stage {stage} panicked: {message}")]
    Panicked { stage: String, message: String },
    #[error("stage {stage} faulted: {message}")]
    Faulted { stage: String, message: String },
    #[error("stage {stage} was cancelled")]
    Cancelled { stage: String },
    #[error("sequence consumer disconnected")]
    Disconnected,
}

impl PipeError {
    pub(crate) fn panicked(stage: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        PipeError::Panicked {
            stage: stage.to_string(),
            message,
        }
    }

    pub(crate) fn faulted(stage: &str, err: impl std::fmt::Display) -> Self {
        PipeError::Faulted {
            stage: stage.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn cancelled(stage: &str) -> Self {
        PipeError::Cancelled {
            stage: stage.to_string(),
        }
    }

    pub(crate) fn from_join(stage: &str, err: JoinError) -> Self {
        if err.is_panic() {
            Self::panicked(stage, err.into_panic())
        } else {
            Self::cancelled(stage)
        }
    }

    /// True for faults raised by user code or runtime failures, as opposed to
    /// caller mistakes and shutdown.
    pub fn is_fault(&self) -> bool {
        matches!(self, PipeError::Panicked { .. } | PipeError::Faulted { .. })
    }
}
