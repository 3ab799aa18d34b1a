use thiserror::Error;

use crate::analysis::domain::frame_analyzer::AnalysisError;
use crate::realtime::processor_config::ConfigError;

/// Preconditions for starting the loop that were not met.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyError {
    #[error("video source is not active")]
    SourceInactive,
    #[error("video source has no frame dimensions yet")]
    NoFrameDimensions,
    #[error("overlay surface is not ready")]
    SurfaceNotReady,
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    NotReady(#[from] NotReadyError),
    #[error("invalid processor config: {0}")]
    InvalidConfig(#[source] ConfigError),
    #[error("failed to spawn frame loop thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Terminal loop failure: one tick used up its whole retry budget.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("frame analysis failed {attempts} times in a row, last error: {last_error}")]
pub struct ExhaustedRetriesError {
    pub attempts: u32,
    pub last_error: AnalysisError,
}
