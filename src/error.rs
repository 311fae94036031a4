//! Error types for habit-assistant

use crate::ChatId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Empty input")]
    EmptyInput,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index {index} out of range (1..={len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("No tasks")]
    NoTasks,

    #[error("No records")]
    NoRecords,

    #[error("Chat {0} is not subscribed")]
    NotSubscribed(ChatId),

    #[error("Transport delivery failed: {0}")]
    Transport(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Validation failures that are answered with a corrective chat message
    /// instead of being reported as a fault.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Error::EmptyInput
                | Error::InvalidFormat(_)
                | Error::InvalidInput(_)
                | Error::IndexOutOfRange { .. }
                | Error::NoTasks
                | Error::NoRecords
                | Error::NotSubscribed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::IndexOutOfRange { index: 5, len: 2 };
        assert!(err.to_string().contains('5'));
        assert!(err.to_string().contains("1..=2"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_user_input());
    }

    #[test]
    fn test_user_input_classification() {
        assert!(Error::EmptyInput.is_user_input());
        assert!(Error::InvalidFormat("meal".into()).is_user_input());
        assert!(Error::NotSubscribed(42).is_user_input());
        assert!(!Error::Transport("blocked".into()).is_user_input());
        assert!(!Error::Config("token".into()).is_user_input());
    }
}
