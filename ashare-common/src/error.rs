//! Error type for file output and configuration in the recap tools.
//!
//! Pipeline failures have their own typed errors in `ashare-recap`; this one
//! covers what touches the disk.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing a log line or report payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wraps another error with what was being done, e.g. the file path
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the innermost error is a filesystem error.
    pub fn is_io(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::WithContext { source, .. } => source.is_io(),
            _ => false,
        }
    }
}

/// `.context("...")` for any result whose error converts into [`Error`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
