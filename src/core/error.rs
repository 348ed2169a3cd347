use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Event source error: {0}")]
    EventSource(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("History writer closed")]
    WriterClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

impl<T> From<std::sync::PoisonError<T>> for HistoryError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for HistoryError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
