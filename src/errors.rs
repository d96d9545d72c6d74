// src/errors.rs
use thiserror::Error;

/// Local readiness failures. The Display text is exactly what the user sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please upload an Answer Sheet.")]
    MissingAnswerSheet,

    #[error("Please provide Question Paper (File or Text).")]
    MissingQuestionPaper,

    #[error("Please provide Solution Key (File or Text).")]
    MissingSolutionKey,
}

#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The service answered with a non-success status (or an error payload).
    #[error("{0}")]
    Request(String),

    /// No response was obtained at all.
    #[error("{0}")]
    Transport(String),

    #[error("A submission is already in flight")]
    Busy,

    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// Text for the single "current error message" slot.
    ///
    /// Transport-level errors that did not go through `Transport` still
    /// surface the underlying message rather than the wrapper prefix.
    pub fn user_message(&self) -> String {
        match self {
            EvalError::Http(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
