use stripe::{ErrorCode, StripeError};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Precondition unmet: {0}")]
    PreconditionUnmet(String),

    #[error("Transient API error: {0}")]
    TransientApiError(String),

    #[error("Validation error on `{param}`: {message}")]
    ValidationError { param: String, message: String },

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    /// Only rate limiting and network-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientApiError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

impl From<StripeError> for AppError {
    fn from(err: StripeError) -> Self {
        let request = match err {
            StripeError::Stripe(request) => request,
            StripeError::Timeout => {
                return AppError::TransientApiError("timeout communicating with Stripe".to_string());
            }
            StripeError::ClientError(message) => return AppError::TransientApiError(message),
            other => return AppError::ExternalApiError(other.to_string()),
        };

        let status = request.http_status;
        let mut message = request
            .message
            .unwrap_or_else(|| "unknown error".to_string());
        if let Some(code) = &request.code {
            message = format!("{message} ({code:?})");
        }
        match status {
            404 => AppError::NotFound(message),
            429 => AppError::TransientApiError(message),
            500..=599 => AppError::TransientApiError(format!("{status}: {message}")),
            400 | 402 if matches!(request.code, Some(ErrorCode::ResourceAlreadyExists)) => {
                AppError::AlreadyExists(message)
            }
            // `RequestError` carries no `param`, only the code and message.
            400 | 402 => AppError::ValidationError {
                param: "-".to_string(),
                message,
            },
            _ => AppError::ExternalApiError(format!("{status}: {message}")),
        }
    }
}
