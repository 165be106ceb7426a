use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },

    #[error("Invalid swipe direction: {0}")]
    InvalidDirection(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}
