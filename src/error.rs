use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("expected version {expected}, current version {current}; re-read the delivery before retrying")]
    VersionConflict { expected: u64, current: u64 },

    #[error("proof of delivery must be attached before the delivered status is reachable")]
    MissingArtifact,

    #[error("{0}")]
    InvalidState(String),

    #[error("a proof of delivery is already attached and cannot be replaced")]
    AlreadyAttached,

    #[error("this delivery has already been rated")]
    AlreadyRated,

    #[error("no driver satisfies the assignment constraints{0}")]
    NoDriverAvailable(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::VersionConflict { .. } => "version_conflict",
            Self::MissingArtifact => "missing_artifact",
            Self::InvalidState(_) => "invalid_state",
            Self::AlreadyAttached => "already_attached",
            Self::AlreadyRated => "already_rated",
            Self::NoDriverAvailable(_) => "no_driver_available",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) | Self::MissingArtifact | Self::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::VersionConflict { .. } | Self::AlreadyAttached | Self::AlreadyRated => {
                StatusCode::CONFLICT
            }
            Self::NoDriverAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "detail": self.to_string(),
            }
        }));

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::DispatchError;

    #[test]
    fn kinds_are_stable_wire_tokens() {
        let conflict = DispatchError::VersionConflict {
            expected: 2,
            current: 3,
        };
        assert_eq!(conflict.kind(), "version_conflict");
        assert_eq!(DispatchError::MissingArtifact.kind(), "missing_artifact");
        assert_eq!(
            DispatchError::NoDriverAvailable(String::new()).kind(),
            "no_driver_available"
        );
    }

    #[test]
    fn version_conflict_detail_names_both_versions() {
        let conflict = DispatchError::VersionConflict {
            expected: 2,
            current: 5,
        };
        let detail = conflict.to_string();
        assert!(detail.contains("expected version 2"));
        assert!(detail.contains("current version 5"));
    }
}
