use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Broad outcome category reported alongside every failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidState,
    IllegalTransition,
    Conflict,
    NotFound,
    AccessDenied,
    DependencyFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::IllegalTransition => "illegal_transition",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::DependencyFailure => "dependency_failure",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("illegal transition: cannot {action} a parcel in status {status} ({reason})")]
    IllegalTransition {
        action: String,
        status: String,
        reason: String,
    },

    #[error("pickup request has no items")]
    EmptyRequest,

    #[error("pickup location is incomplete")]
    IncompleteLocation,

    #[error("pickup request {0} is not pending")]
    NotPending(String),

    #[error("vehicle {0} is assigned to another courier")]
    VehicleConflict(String),

    #[error("parcel {0} already has an active route assignment")]
    AlreadyAssigned(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("dependency failure: {0}")]
    DependencyFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn illegal(action: impl ToString, status: impl ToString) -> Self {
        Self::illegal_because(action, status, "not allowed from this status")
    }

    pub fn illegal_because(
        action: impl ToString,
        status: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        AppError::IllegalTransition {
            action: action.to_string(),
            status: status.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::EmptyRequest | AppError::IncompleteLocation => {
                ErrorKind::Validation
            }
            AppError::InvalidState(_) | AppError::NotPending(_) => ErrorKind::InvalidState,
            AppError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            AppError::VehicleConflict(_) | AppError::AlreadyAssigned(_) | AppError::Conflict(_) => {
                ErrorKind::Conflict
            }
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::AccessDenied(_) => ErrorKind::AccessDenied,
            AppError::DependencyFailure(_) | AppError::Internal(_) => ErrorKind::DependencyFailure,
        }
    }

    /// Stable machine-readable code, finer grained than [`ErrorKind`].
    pub fn code(&self) -> &'static str {
        match self {
            AppError::EmptyRequest => "empty_request",
            AppError::IncompleteLocation => "incomplete_location",
            AppError::NotPending(_) => "not_pending",
            AppError::VehicleConflict(_) => "vehicle_conflict",
            AppError::AlreadyAssigned(_) => "already_assigned",
            AppError::Internal(_) => "internal",
            other => other.kind().as_str(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidState | ErrorKind::IllegalTransition => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
            ErrorKind::DependencyFailure => match self {
                AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "kind": self.kind().as_str(),
            "code": self.code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, ErrorKind};

    #[test]
    fn specific_outcomes_map_onto_taxonomy() {
        assert_eq!(AppError::EmptyRequest.kind(), ErrorKind::Validation);
        assert_eq!(AppError::NotPending("r".into()).kind(), ErrorKind::InvalidState);
        assert_eq!(AppError::VehicleConflict("v".into()).kind(), ErrorKind::Conflict);
        assert_eq!(AppError::AlreadyAssigned("p".into()).code(), "already_assigned");
        assert_eq!(
            AppError::illegal("deliver", "returned_to_sender").code(),
            "illegal_transition"
        );
    }
}
