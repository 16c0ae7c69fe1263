use std::path::PathBuf;

/// Core error type for the backup tool.
///
/// Adapter crates map their specific errors into this type. Every variant
/// renders to a message a human operator can act on, since the top level only
/// ever forwards the text to the chat.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// The remote answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// Retry bound reached. The last concrete cause is intentionally dropped.
    #[error("maximum attempts reached ({attempts}) sending {path}")]
    MaxAttemptsReached { path: PathBuf, attempts: u32 },

    #[error("external error: {0}")]
    External(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::Archive(other.to_string()),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        let path = e.path().map(|p| p.to_path_buf());
        match (e.into_io_error(), path) {
            (Some(io), _) => Error::Io(io),
            (None, Some(path)) => Error::InvalidPath {
                path,
                reason: "filesystem loop while walking directory".to_string(),
            },
            (None, None) => Error::External("directory walk failed".to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
