use std::collections::TryReserveError;

use thiserror::Error;

/// Fatal startup failures. Nothing is allocated after `Engine::new`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to allocate {what} ({bytes} bytes)")]
    Allocation {
        what: &'static str,
        bytes: usize,
        #[source]
        source: TryReserveError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("noise calibration is already running")]
    AlreadyRunning,
    #[error("no noise calibration is running")]
    NotRunning,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("noise profile has {found} bytes, expected {expected}")]
    Length { expected: usize, found: usize },
    #[error("noise profile bin {bin} is not a finite non-negative value")]
    InvalidBin { bin: usize },
}
