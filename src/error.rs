//! Error taxonomy shared by every public operation in the engine (spec §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("io error: {0}")]
    IoMsg(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("write conflicts with hack manifest module(s): {0:?}")]
    Conflict(Vec<crate::manifest::Conflict>),

    #[error("no deleted slot available for insertion")]
    SlotsExhausted,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation not supported by this ROM version: {0}")]
    NotSupported(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<glob::PatternError> for Error {
    fn from(e: glob::PatternError) -> Self {
        Error::IoMsg(e.to_string())
    }
}

impl From<glob::GlobError> for Error {
    fn from(e: glob::GlobError) -> Self {
        Error::IoMsg(e.to_string())
    }
}
