//! A small error-kind taxonomy realized as a typed enum at the crate's
//! public boundary. Internal components return `anyhow::Result`; only the
//! RPC façade (and anything that needs to report a stable kind to a caller)
//! deals with `RegistryError` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error (correlation_id={correlation_id}): {message}")]
    Internal { message: String, correlation_id: Uuid },

    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl RegistryError {
    /// Wraps an arbitrary internal failure, attaching a fresh correlation id
    /// so it can be cross-referenced against the logs.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4();
        tracing::error!(%correlation_id, error = %err, "internal error");
        Self::Internal { message: err.to_string(), correlation_id }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable(what.into())
    }

    pub fn unimplemented(what: impl Into<String>) -> Self {
        Self::Unimplemented(what.into())
    }
}

/// Internal components surface plain `anyhow::Error`s; this is the one seam
/// where those get mapped onto a stable kind when no more specific
/// conversion applies upstream.
impl From<anyhow::Error> for RegistryError {
    fn from(err: anyhow::Error) -> Self {
        RegistryError::internal(format!("{err:#}"))
    }
}

impl RegistryError {
    /// The stable wire-level kind string, used both in the JSON error body
    /// and for the HTTP status mapping below.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::NotFound(_) => "not-found",
            RegistryError::Unauthenticated => "unauthenticated",
            RegistryError::InvalidArgument(_) => "invalid-argument",
            RegistryError::Unavailable(_) => "unavailable",
            RegistryError::Internal { .. } => "internal",
            RegistryError::Unimplemented(_) => "unimplemented",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Unauthenticated => StatusCode::UNAUTHORIZED,
            RegistryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            RegistryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

/// The JSON body every failed RPC response carries, mirroring Connect's
/// `{code, message}` error envelope closely enough for the CLI's client to
/// read a stable `kind`/`message` pair off of it.
#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody { kind: self.kind(), message: self.to_string() };
        (status, axum::Json(body)).into_response()
    }
}
