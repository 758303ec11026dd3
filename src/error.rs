use hyper::{Body, Response, StatusCode};
use serde_json::json;
use thiserror::Error;

/// Request-scoped error taxonomy. Every variant terminates only its own
/// request; nothing here is process-fatal.
///
/// Error messages must never contain management credentials or SMS access
/// keys.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Management-protocol or SMS collaborator failure. The detail string is
    /// for logs and diagnosis; callers see it attached to a 500.
    #[error("{0}")]
    Backend(String),

    /// Management requested where it is not configured, or a control action
    /// outside the closed action set.
    #[error("{0}")]
    Unsupported(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) | GatewayError::Unsupported(_) => StatusCode::BAD_REQUEST,
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let body = json!({ "error": self.to_string() }).to_string();
        Response::builder()
            .status(self.status())
            .header("Content-Type", "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| Response::new(Body::empty()))
    }
}
