//! Closed error model (spec.md §7). Every fallible operation in this crate
//! returns `GateError` so the HTTP boundary maps status codes in exactly
//! one place instead of scattering `StatusCode::...` through handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    // --- Structural ---
    #[error("malformed token")]
    MalformedToken,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("invalid coordinates")]
    InvalidCoordinates,
    #[error("invalid request: {0}")]
    BadRequest(String),

    // --- Authorization ---
    #[error("missing or invalid credentials")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("too many requests")]
    RateLimited,

    // --- State ---
    #[error("pass not found")]
    NotFound,
    #[error("principal not found")]
    PrincipalNotFound,
    #[error("wrong pass state")]
    WrongState,
    #[error("pass already used")]
    Replay,

    // --- Expired ---
    #[error("token expired")]
    Expired,

    // --- Policy ---
    #[error("location verification failed")]
    GeofenceDenied,

    // --- Infrastructure ---
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        use GateError::*;
        match self {
            MalformedToken | SignatureMismatch | InvalidCoordinates | BadRequest(_) | Expired
            | WrongState | Replay => StatusCode::BAD_REQUEST,
            Unauthorized => StatusCode::UNAUTHORIZED,
            Forbidden | GeofenceDenied => StatusCode::FORBIDDEN,
            RateLimited => StatusCode::TOO_MANY_REQUESTS,
            NotFound | PrincipalNotFound => StatusCode::NOT_FOUND,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The closed detail string used in logs and in the scan-result taxonomy
    /// (spec.md §4.E / Open Questions: the logged result set is closed).
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}
