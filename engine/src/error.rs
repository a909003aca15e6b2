use bx_overlay_core::EventError;
use bx_overlay_source::SourceError;
use bx_overlay_system_time_window::WindowError;
use thiserror::Error;

use crate::{config::ConfigError, Lifecycle};

/// Errors surfaced to the host by [`crate::OverlayEngine`].
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The configuration is invalid; the job must abort.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Background supply is exhausted; the host must stop processing and the
    /// current event must not be emitted.
    #[error("stop processing: {0}")]
    StopProcessing(SourceError),
    /// Background supply failed for another reason.
    #[error(transparent)]
    Source(SourceError),
    /// A structural event mutation was rejected.
    #[error(transparent)]
    Event(#[from] EventError),
    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} while the engine is {state:?}")]
    Lifecycle {
        /// Rejected operation.
        operation: &'static str,
        /// State the engine was in.
        state: Lifecycle,
    },
}

impl OverlayError {
    /// Reports whether the host must stop the event loop.
    #[must_use]
    pub fn is_stop_processing(&self) -> bool {
        matches!(self, Self::StopProcessing(_))
    }
}

impl From<SourceError> for OverlayError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::Exhausted { .. } => Self::StopProcessing(error),
            other => Self::Source(other),
        }
    }
}

impl From<WindowError> for OverlayError {
    fn from(error: WindowError) -> Self {
        Self::Config(ConfigError::Window(error))
    }
}
