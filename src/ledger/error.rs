use rusqlite::ErrorCode;
use thiserror::Error;

/// Failure of a ledger operation. Confirmation refusals are not errors; they
/// come back as `Outcome::Declined`.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bad input, rejected before anything was touched.
    #[error("{0}")]
    Validation(String),

    /// The sheet's zone headers are missing or do not describe a valid layout,
    /// or a referenced column does not exist.
    #[error("{0}")]
    Structural(String),

    #[error("{0}")]
    NotFound(String),

    /// The workspace could not be read or written (locked, busy). Any in-memory
    /// change made by the operation was discarded.
    #[error("could not save: {0}")]
    Resource(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::Structural(_) => "structural_error",
            Self::NotFound(_) => "not_found",
            Self::Resource(_) => "resource_unavailable",
            Self::Database(_) => "db_error",
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::Resource(format!("workspace is locked by another process ({e})"))
            }
            _ => Self::Database(e),
        }
    }
}
