use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Validation errors raised while checking an inbound export request
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required {
        field: String,
    },

    #[error("Field '{field}' contains invalid format: {reason}")]
    Format {
        field: String,
        reason: String,
    },

    #[error("Field '{field}' contains an invalid value: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required {
            field: field.to_string(),
        }
    }

    pub fn format(field: &str, reason: &str) -> Self {
        Self::Format {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Service-level errors for the export pipeline
#[derive(Debug, Error, Clone, Serialize)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Export job timed out after {0} ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

impl ServiceError {
    /// HTTP status reported to the caller for this error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServiceError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Upstream(_) | ServiceError::Timeout(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Caller-facing message. Upstream and internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Validation(e) => e.to_string(),
            ServiceError::Authentication(_) => "Unauthorized".to_string(),
            ServiceError::RateLimitExceeded => "Too many requests, please try again later".to_string(),
            ServiceError::Upstream(_) | ServiceError::Timeout(_) | ServiceError::Internal(_) => {
                "An error occurred while exporting transcripts".to_string()
            }
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(error: std::io::Error) -> Self {
        ServiceError::Internal(format!("I/O error: {}", error))
    }
}

impl From<zip::result::ZipError> for ServiceError {
    fn from(error: zip::result::ZipError) -> Self {
        ServiceError::Internal(format!("Archive error: {}", error))
    }
}
