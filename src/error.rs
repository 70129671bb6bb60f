use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the compiler.
///
/// Every variant renders as the single-line diagnostic the CLI prints to
/// stderr; `main` is the only place that does the printing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Argument(String),

    #[error("{0}")]
    Parse(String),

    #[error("file '{path}' is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn argument(msg: impl Into<String>) -> Self {
        Error::Argument(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
