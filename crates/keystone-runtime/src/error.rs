//! Runtime error types.

use keystone_core::{LocatorError, MultiError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while bootstrapping or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A locator operation failed.
    #[error(transparent)]
    Locator(#[from] MultiError),
}

impl From<LocatorError> for RuntimeError {
    fn from(error: LocatorError) -> Self {
        Self::Locator(error.into())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
