//! Error types for the chat client

use thiserror::Error;

/// Everything that can go wrong between capturing input and showing a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Request rejected, timed out or the connection failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend answered with an `error` field or a non-2xx status
    #[error("Backend error: {0}")]
    Backend(String),

    /// Reply body was not the expected JSON shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Input that capture refuses to turn into a payload (e.g. non-image file)
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Speech recognizer failed or could not be started
    #[error("Speech recognition error: {0}")]
    Recognizer(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for ChatError {
    fn from(e: std::io::Error) -> Self {
        ChatError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::MalformedResponse(e.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChatError::MalformedResponse(e.to_string())
        } else {
            ChatError::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
