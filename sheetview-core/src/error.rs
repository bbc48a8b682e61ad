//! Error taxonomy for import, persistence, and session operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The byte buffer is not a decodable workbook
    #[error("invalid workbook: {0}")]
    Format(String),

    /// No persistence backend accepted the operation
    #[error("no usable storage backend")]
    StorageUnavailable,

    /// Payload too large for the fallback backend
    #[error("payload of {size} bytes exceeds the {quota} byte backend quota")]
    QuotaExceeded { size: usize, quota: usize },

    /// A file index that does not refer to a registered file
    #[error("no registered file at index {0}")]
    NotFound(usize),

    /// An operation that needs an active file ran without one
    #[error("no active file")]
    NoActiveFile,

    #[error("worksheet '{0}' not found in the active workbook")]
    SheetNotFound(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Format(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Format(err.to_string())
    }
}
