//! Error types for research-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the research-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid glob pattern used for document discovery
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// LLM collaborator error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Project directory does not exist
    #[error("project directory not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    /// A state file exists but could not be parsed
    #[error("malformed state file {}: {message}", path.display())]
    MalformedState { path: PathBuf, message: String },

    /// Prompt assembly error
    #[error("prompt error: {0}")]
    Prompt(String),
}

impl Error {
    /// Short name of the variant, reported as `error_type` on the live channel
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Glob(_) => "GlobError",
            Error::Config(_) => "ConfigError",
            Error::Llm(_) => "LlmError",
            Error::ProjectNotFound(_) => "ProjectNotFound",
            Error::MalformedState { .. } => "MalformedState",
            Error::Prompt(_) => "PromptError",
        }
    }
}

/// Result type alias for research-core
pub type Result<T> = std::result::Result<T, Error>;
