//! Error types for Sigma.

use axum::http::{Method, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigmaError {
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(Method),

    #[error("No route for {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("Update callback failed: {0}")]
    Callback(#[from] CallbackFault),

    #[error("Streaming not supported by response writer")]
    StreamingUnsupported,

    #[error("State key '{0}' is reserved")]
    ReservedKey(String),

    #[error("Invalid component name: {0:?}")]
    InvalidComponentName(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SigmaError {
    /// HTTP status conventionally reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SigmaError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            SigmaError::NotFound { .. } => StatusCode::NOT_FOUND,
            SigmaError::ReservedKey(_) | SigmaError::InvalidComponentName(_) => {
                StatusCode::BAD_REQUEST
            }
            SigmaError::Render(_)
            | SigmaError::Callback(_)
            | SigmaError::StreamingUnsupported
            | SigmaError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Template could not be parsed or evaluated against the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("template {template}: {message}")]
    Parse { template: String, message: String },

    #[error("template {template}: cannot print {kind} value at {path}")]
    Unprintable {
        template: String,
        path: String,
        kind: &'static str,
    },

    #[error("template {template}: can't evaluate field {field} in {kind} value")]
    NotAMap {
        template: String,
        field: String,
        kind: &'static str,
    },

    #[error("template {template}: range can't iterate over {kind} value at {path}")]
    NotIterable {
        template: String,
        path: String,
        kind: &'static str,
    },
}

/// An update hook failed in a way the caller cannot recover from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CallbackFault(pub String);

impl CallbackFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
