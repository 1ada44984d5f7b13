use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Service-level error shared by every backend component
///
/// Components keep their own detailed error enums and convert into this
/// type at their boundary, so callers see one stable vocabulary.
///
/// ```ignore
/// match repo.get(id).await {
///     Ok(Some(msg)) => Ok(msg),
///     Ok(None) => Err(ServiceError::NotFound(format!("message {id}"))),
///     Err(e) => Err(ServiceError::Database(e.to_string())),
/// }
/// ```
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Timeout")]
    Timeout,
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::ValidationError(_) | ServiceError::BadRequest(_) => 400,
            ServiceError::AlreadyExists(_) | ServiceError::Conflict(_) => 409,
            ServiceError::ServiceUnavailable => 503,
            ServiceError::Timeout => 408,
            ServiceError::Database(_) | ServiceError::InternalError(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_codes::NOT_FOUND,
            ServiceError::ValidationError(_) => error_codes::VALIDATION_ERROR,
            ServiceError::BadRequest(_) => error_codes::BAD_REQUEST,
            ServiceError::AlreadyExists(_) => error_codes::ALREADY_EXISTS,
            ServiceError::Conflict(_) => error_codes::CONFLICT,
            ServiceError::ServiceUnavailable => error_codes::SERVICE_UNAVAILABLE,
            ServiceError::Timeout => error_codes::TIMEOUT,
            ServiceError::Database(_) => error_codes::DATABASE_ERROR,
            ServiceError::InternalError(_) => error_codes::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::ValidationError(_) | ServiceError::BadRequest(_) => {
                error_types::VALIDATION_ERROR
            }
            ServiceError::NotFound(_) => error_types::NOT_FOUND_ERROR,
            ServiceError::AlreadyExists(_) | ServiceError::Conflict(_) => {
                error_types::CONFLICT_ERROR
            }
            ServiceError::ServiceUnavailable | ServiceError::Timeout => {
                error_types::SERVICE_UNAVAILABLE_ERROR
            }
            ServiceError::Database(_) | ServiceError::InternalError(_) => {
                error_types::SERVER_ERROR
            }
        }
    }

    /// Whether the same call may succeed if retried unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::ServiceUnavailable | ServiceError::Timeout
        )
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(
            self.error_type(),
            &self.to_string(),
            self.status_code(),
            self.error_type(),
            self.error_code(),
        )
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServiceError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut => ServiceError::Timeout,
            sqlx::Error::PoolClosed => ServiceError::ServiceUnavailable,
            other => ServiceError::Database(other.to_string()),
        }
    }
}

/// Error body handed to callers and written to logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,

    /// Human readable message
    pub message: String,

    pub status: u16,

    /// One of the [`error_types`] constants
    pub error_type: String,

    /// One of the [`error_codes`] constants, e.g. `MESSAGE_NOT_FOUND`
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// RFC 3339
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", self.code))
    }
}

pub mod error_codes {
    // Generic
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const CONFLICT: &str = "CONFLICT";
    pub const TIMEOUT: &str = "TIMEOUT";

    // Message store
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const MESSAGE_ALREADY_EXISTS: &str = "MESSAGE_ALREADY_EXISTS";
    pub const MESSAGE_REJECTED: &str = "MESSAGE_REJECTED";
    pub const NOT_MESSAGE_SENDER: &str = "NOT_MESSAGE_SENDER";
    pub const COLLECTION_INCOMPATIBLE: &str = "COLLECTION_INCOMPATIBLE";
    pub const INDEX_CONFLICT: &str = "INDEX_CONFLICT";
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
}

pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}
