use thiserror::Error;

use crate::domain::request::{RequestId, RequestStatus};
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("request {request_id} has already been processed (status: {status})")]
    Conflict { request_id: RequestId, status: RequestStatus },
}

impl DomainError {
    pub fn request_not_found(id: RequestId) -> Self {
        Self::NotFound { entity: "request", id: id.to_string() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// The store could not be reached. Retrying may succeed.
    #[error("persistence failure: {0}")]
    Persistence(String),
    /// Stored data broke an invariant, such as an undecodable row. Retrying will not help.
    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(_) => Self::Persistence(value.to_string()),
            StoreError::Constraint(_) | StoreError::Decode(_) => Self::Internal(value.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested resource was not found.",
            Self::Conflict { .. } => "The request has already been processed.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

// Persistence and internal details stay on the ApplicationError for logging; the interface
// error only carries a generic message.
impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                let message = error.to_string();
                match error {
                    DomainError::Validation(_) => Self::BadRequest { message, correlation_id },
                    DomainError::Forbidden(_) => Self::Forbidden { message, correlation_id },
                    DomainError::NotFound { .. } => Self::NotFound { message, correlation_id },
                    DomainError::Conflict { .. } => Self::Conflict { message, correlation_id },
                }
            }
            ApplicationError::Persistence(_) => Self::ServiceUnavailable {
                message: "persistence layer unavailable".to_owned(),
                correlation_id,
            },
            ApplicationError::Internal(_) => {
                Self::Internal { message: "internal data error".to_owned(), correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::{RequestId, RequestStatus};
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::store::StoreError;

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::Validation("quantity must be at least 1".into()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ref message,
            } if correlation_id == "req-1" && message.contains("quantity")
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn business_rule_errors_keep_distinct_interface_kinds() {
        let forbidden = ApplicationError::from(DomainError::Forbidden("approvers only".into()))
            .into_interface("req-2");
        assert!(matches!(forbidden, InterfaceError::Forbidden { .. }));

        let missing = ApplicationError::from(DomainError::request_not_found(RequestId(9)))
            .into_interface("req-3");
        assert!(matches!(missing, InterfaceError::NotFound { .. }));
        assert_eq!(missing.message(), "request 9 not found");

        let conflict = ApplicationError::from(DomainError::Conflict {
            request_id: RequestId(9),
            status: RequestStatus::Approved,
        })
        .into_interface("req-4");
        assert!(matches!(conflict, InterfaceError::Conflict { .. }));
        assert!(conflict.message().contains("already been processed"));
    }

    #[test]
    fn persistence_error_hides_storage_details() {
        let error = ApplicationError::Persistence("database is locked: wal".to_owned());
        assert!(error.to_string().contains("database is locked"));

        let interface = error.into_interface("req-5");
        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(!interface.message().contains("locked"));
        assert_eq!(interface.correlation_id(), "req-5");
    }

    #[test]
    fn store_errors_split_into_retryable_and_internal() {
        let unavailable = ApplicationError::from(StoreError::Unavailable("pool timed out".into()));
        assert!(matches!(unavailable, ApplicationError::Persistence(_)));

        let corrupt = ApplicationError::from(StoreError::Decode("bad decimal `x`".into()));
        assert!(matches!(corrupt, ApplicationError::Internal(_)));
        let constraint = ApplicationError::from(StoreError::Constraint("CHECK failed".into()));
        assert!(matches!(constraint, ApplicationError::Internal(_)));

        let interface = corrupt.into_interface("req-6");
        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(!interface.message().contains("decimal"));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
