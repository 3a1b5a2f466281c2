use thiserror::Error;

/// Errors surfaced by the copilot pipeline. Every variant is terminal for the
/// user action that raised it.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Connection error: {0}")]
    Connectivity(String),

    #[error("Model server version {found} is not supported (minimum {minimum})")]
    VersionIncompatible { found: String, minimum: String },

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Request rejected: {0}")]
    RequestRejected(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Could not interpret model response as JSON")]
    ResponseUnparseable { raw: String },

    #[error("Blocked. {0}")]
    GuardrailRejected(String),

    #[error("Execution failed: {0}")]
    QueryExecutionFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
