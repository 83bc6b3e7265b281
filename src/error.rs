use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Interrupt setup failed: {0}")]
    InterruptSetup(String),
    #[error("Edge worker error: {0}")]
    Worker(String),
}

impl GpioError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GpioError::Io {
            path: path.into(),
            source,
        }
    }
}
