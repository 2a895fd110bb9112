// 🚨 API Errors - one taxonomy, rendered as `{"detail": "..."}`

use crate::flags::FlagError;
use crate::geometry::GeometryError;
use crate::identity::IdentityError;
use crate::mapper::MappingError;
use crate::query::InputError;
use crate::security::SecurityLabelError;
use crate::sparql::UpstreamError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<InputError> for ApiError {
    fn from(err: InputError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<GeometryError> for ApiError {
    fn from(err: GeometryError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<SecurityLabelError> for ApiError {
    fn from(err: SecurityLabelError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<FlagError> for ApiError {
    fn from(err: FlagError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(UpstreamError::Status(code)) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Identity(IdentityError::Status { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client; internals stay in the logs
    pub fn detail(&self) -> String {
        match self {
            ApiError::Upstream(UpstreamError::Status(code)) => {
                format!("Graph store request failed with HTTP {}", code)
            }
            ApiError::Upstream(_) => "Error communicating with the graph store".to_string(),
            ApiError::Database(_) | ApiError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        }

        (status, Json(ErrorBody { detail: self.detail() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Validation("bad".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::NotFound("gone".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(UpstreamError::Status(503)).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(UpstreamError::Decode("eof".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(IdentityError::Status { status: 401, reason: "Unauthorized".into() }).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(MappingError::from(GeometryError::InvalidFormat)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_details() {
        assert_eq!(
            ApiError::from(IdentityError::Unavailable("refused".into())).detail(),
            "Error calling Access, Internal Server Error"
        );
        assert_eq!(ApiError::from(FlagError::MissingTarget).detail(), "URI of flagged entity must be provided");
        assert_eq!(
            ApiError::from(UpstreamError::Connection { target: "jena".into(), message: "refused".into() }).detail(),
            "Error communicating with the graph store"
        );
        assert_eq!(ApiError::from(GeometryError::InvalidFormat).detail(), "Invalid format");
        assert_eq!(
            ApiError::from(SecurityLabelError::InvalidValue {
                attribute: "permitted_organisations",
                value: "A&&B".into(),
            })
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
