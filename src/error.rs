//! Error taxonomy shared across the agent loop, provider adapters, and retry policy.

use serde_json::Value;

/// Coarse category used by callers building user-facing error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Client,
    Server,
    Network,
    Validation,
    Unsupported,
    Cancelled,
    PermissionDenied,
    Unknown,
}

/// The single error type threaded through this crate.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("no content generated")]
    NoContentGenerated,

    #[error("api call failed ({status:?}): {message}")]
    ApiError {
        status: Option<u16>,
        message: String,
        retryable: bool,
        details: Option<Value>,
        /// Server-provided retry hint, already resolved to a duration in seconds.
        retry_after_secs: Option<u64>,
    },

    #[error("empty response body")]
    EmptyResponseBody,

    #[error("failed to parse JSON: {0}")]
    JsonParse(String),

    #[error("type validation failed: {0}")]
    TypeValidation(String),

    #[error("failed to load API key: {0}")]
    LoadApiKey(String),

    #[error("failed to load setting: {0}")]
    LoadSetting(String),

    #[error("no such model: {model:?} ({model_type:?})")]
    NoSuchModel {
        model: Option<String>,
        model_type: Option<String>,
    },

    #[error("unsupported functionality: {0}")]
    UnsupportedFunctionality(String),

    #[error("too many embedding values: provided {provided}, max {max}")]
    TooManyEmbeddingValues { provided: usize, max: usize },

    #[error("invalid response data: {0}")]
    InvalidResponseData(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("operation cancelled")]
    Cancelled,

    /// A tool declined to perform its side effect (SPEC_FULL §6/§7's permission
    /// collaborator flow). Surfaces as `FinishReason::PermissionDenied` on the step.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl LlmError {
    /// Whether the retry policy (see [`crate::retry`]) should retry this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::ApiError { retryable, .. } => *retryable,
            LlmError::Http(e) => e.is_timeout() || e.is_connect(),
            LlmError::Cancelled => false,
            _ => false,
        }
    }

    /// Coarse category for building user-facing messages.
    pub fn category(&self) -> ErrorCategory {
        match self {
            LlmError::ApiError { status: Some(401), .. } | LlmError::LoadApiKey(_) => {
                ErrorCategory::Authentication
            }
            LlmError::ApiError { status: Some(429), .. } => ErrorCategory::RateLimit,
            LlmError::ApiError { status: Some(s), .. } if (400..500).contains(s) => {
                ErrorCategory::Client
            }
            LlmError::ApiError { status: Some(s), .. } if (500..600).contains(s) => {
                ErrorCategory::Server
            }
            LlmError::Http(_) => ErrorCategory::Network,
            LlmError::TypeValidation(_) | LlmError::InvalidArgument(_) | LlmError::InvalidPrompt(_) => {
                ErrorCategory::Validation
            }
            LlmError::UnsupportedFunctionality(_) => ErrorCategory::Unsupported,
            LlmError::Cancelled => ErrorCategory::Cancelled,
            LlmError::PermissionDenied(_) => ErrorCategory::PermissionDenied,
            _ => ErrorCategory::Unknown,
        }
    }

    /// HTTP status code, if this error originated from an API call.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LlmError::ApiError { status, .. } => *status,
            _ => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            LlmError::ApiError { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Status-class retry policy used both by provider adapters (to tag `ApiError::retryable`)
/// and as a fallback when a non-`LlmError` failure needs classifying.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 429) || (500..600).contains(&status)
}
