use std::error::Error as StdError;

use thiserror::Error;

use crate::http::FetchError;

/// ipacorpus' crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// ipacorpus' crate-wide error type.
///
/// Kept separate from `anyhow` so library callers see which failures are
/// per-unit (fetch, decode) and which are fatal (store, config).
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("{tool} failed: {detail}")]
    Tool { tool: &'static str, detail: String },

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Other(Box::new(err.error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_prefixed() {
        let err = Error::config("workers must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid configuration: workers must be at least 1"
        );
    }

    #[test]
    fn tool_errors_name_the_tool() {
        let err = Error::Tool {
            tool: "ffmpeg",
            detail: "exit status 1".to_string(),
        };
        assert_eq!(err.to_string(), "ffmpeg failed: exit status 1");
    }

    #[test]
    fn anyhow_errors_keep_their_context_chain() {
        let err: Error = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.to_string(), "outer: inner");
    }
}
