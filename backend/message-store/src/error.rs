use error_types::{error_codes, ErrorResponse, ServiceError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("malformed document: {0}")]
    Malformed(String),

    /// The store itself refused the write (constraint violation)
    #[error("write rejected by store: {0}")]
    Rejected(String),

    #[error("message {0} not found")]
    NotFound(String),

    #[error("message {0} already exists")]
    DuplicateId(String),

    #[error("user {user_id} is not the sender of message {message_id}")]
    NotSender { message_id: String, user_id: String },

    #[error("collection {namespace} exists with an incompatible layout: {reason}")]
    IncompatibleCollection { namespace: String, reason: String },

    #[error("index {name} conflicts with an existing index: {reason}")]
    IndexConflict { name: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Returns whether this error is retryable (e.g., database connection timeout)
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// True for errors the caller fixes by correcting the document
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::Validation(_) | StoreError::Malformed(_) | StoreError::Rejected(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Config(_) => error_codes::CONFIG_INVALID,
            StoreError::Validation(_) | StoreError::Malformed(_) => error_codes::VALIDATION_ERROR,
            StoreError::Rejected(_) => error_codes::MESSAGE_REJECTED,
            StoreError::NotFound(_) => error_codes::MESSAGE_NOT_FOUND,
            StoreError::DuplicateId(_) => error_codes::MESSAGE_ALREADY_EXISTS,
            StoreError::NotSender { .. } => error_codes::NOT_MESSAGE_SENDER,
            StoreError::IncompatibleCollection { .. } => error_codes::COLLECTION_INCOMPATIBLE,
            StoreError::IndexConflict { .. } => error_codes::INDEX_CONFLICT,
            StoreError::Database(_) => error_codes::DATABASE_ERROR,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let response = self
            .to_service_error()
            .to_response()
            .with_code(self.error_code());

        match self {
            StoreError::Validation(errors) => match serde_json::to_string(errors) {
                Ok(fields) => response.with_details(fields),
                Err(_) => response,
            },
            StoreError::IncompatibleCollection { reason, .. }
            | StoreError::IndexConflict { reason, .. } => response.with_details(reason.clone()),
            _ => response,
        }
    }

    /// Shared-vocabulary view of this error
    pub fn to_service_error(&self) -> ServiceError {
        match self {
            StoreError::Config(m) => ServiceError::InternalError(format!("configuration: {m}")),
            StoreError::Validation(e) => ServiceError::ValidationError(e.to_string()),
            StoreError::Malformed(m) | StoreError::Rejected(m) => {
                ServiceError::ValidationError(m.clone())
            }
            StoreError::NotFound(id) => ServiceError::NotFound(format!("message {id}")),
            StoreError::DuplicateId(id) => ServiceError::AlreadyExists(format!("message {id}")),
            StoreError::NotSender { message_id, .. } => {
                ServiceError::BadRequest(format!("only the sender may edit message {message_id}"))
            }
            StoreError::IncompatibleCollection { .. } | StoreError::IndexConflict { .. } => {
                ServiceError::Conflict(self.to_string())
            }
            StoreError::Database(sqlx::Error::RowNotFound) => {
                ServiceError::NotFound("row not found".to_string())
            }
            StoreError::Database(sqlx::Error::PoolTimedOut) => ServiceError::Timeout,
            StoreError::Database(sqlx::Error::PoolClosed) => ServiceError::ServiceUnavailable,
            StoreError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        err.to_service_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_are_retryable() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!StoreError::NotFound("m1".into()).is_retryable());
        assert!(!StoreError::Rejected("check".into()).is_retryable());
    }

    #[test]
    fn maps_into_service_errors() {
        let not_found = ServiceError::from(StoreError::NotFound("m1".into()));
        assert_eq!(not_found.status_code(), 404);

        let conflict = ServiceError::from(StoreError::IndexConflict {
            name: "idx_messages_timestamp_asc".into(),
            reason: "expire_after differs".into(),
        });
        assert_eq!(conflict.status_code(), 409);

        let dup = ServiceError::from(StoreError::DuplicateId("m1".into()));
        assert_eq!(dup.error_code(), error_codes::ALREADY_EXISTS);
    }

    #[test]
    fn response_carries_store_specific_code() {
        let response = StoreError::NotFound("m1".into()).to_response();
        assert_eq!(response.status, 404);
        assert_eq!(response.code, error_codes::MESSAGE_NOT_FOUND);
        assert!(response.message.contains("m1"));
    }

    #[test]
    fn response_details_name_the_failing_fields() {
        let mut errors = validator::ValidationErrors::new();
        errors.add("content_type", validator::ValidationError::new("enum"));
        let response = StoreError::Validation(errors).to_response();
        let details = response.details.unwrap();
        assert!(details.contains("content_type"));
        assert!(details.contains("enum"));

        let response = StoreError::IndexConflict {
            name: "idx_messages_timestamp_asc".into(),
            reason: "expire_after differs".into(),
        }
        .to_response();
        assert_eq!(response.details.as_deref(), Some("expire_after differs"));
        assert!(StoreError::NotFound("m1".into()).to_response().details.is_none());
    }

    #[test]
    fn validation_classification() {
        assert!(StoreError::Malformed("timestamp".into()).is_validation());
        assert!(!StoreError::DuplicateId("m1".into()).is_validation());
    }
}
