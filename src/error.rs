use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Store(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Transient infrastructure failure while talking to a ride or driver store.
/// Callers must not retry a failed conditional assign: the first attempt may
/// already be committed on the store side.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why an incoming realtime connection was refused. Fatal to the connection
/// attempt; the socket is closed before any dispatch state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("driver not found")]
    DriverNotFound,

    #[error("driver not approved")]
    DriverNotApproved,
}

impl AuthError {
    /// WebSocket close code sent when the handshake is refused.
    pub fn close_code(self) -> u16 {
        match self {
            AuthError::MissingToken => 4001,
            AuthError::InvalidToken => 4002,
            AuthError::DriverNotFound => 4003,
            AuthError::DriverNotApproved => 4004,
        }
    }
}
