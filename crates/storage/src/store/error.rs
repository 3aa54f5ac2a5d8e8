#![forbid(unsafe_code)]

use mptt_core::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("unknown tree type {0}")]
    UnknownTree(String),
    #[error("table {0} does not exist")]
    MissingTable(String),
    #[error("table {table} has no column {column}")]
    MissingColumn { table: String, column: String },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                "BUSY"
            }
            Self::Sql(_) => "SQLITE",
            Self::Tree(err) => err.code(),
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UnknownTree(_) => "UNKNOWN_TREE",
            Self::MissingTable(_) => "MISSING_TABLE",
            Self::MissingColumn { .. } => "MISSING_COLUMN",
        }
    }

    pub fn tree_error(&self) -> Option<&TreeError> {
        match self {
            Self::Tree(err) => Some(err),
            _ => None,
        }
    }
}
