use crate::dto::ErrorRes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use medrec_core::{ClientError, RemoteError};

/// An error response: status code plus a JSON `{ "error": ... }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        let status = match &err {
            ClientError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClientError::NotConnected => StatusCode::UNAUTHORIZED,
            ClientError::Remote {
                source: RemoteError::Rejected(_),
                ..
            } => StatusCode::UNPROCESSABLE_ENTITY,
            ClientError::Remote {
                source: RemoteError::Unavailable(_),
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            ClientError::Fetch { .. } | ClientError::Resolution { .. } => StatusCode::BAD_GATEWAY,
            ClientError::Config(_) | ClientError::LedgerState(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorRes { error: self.message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
