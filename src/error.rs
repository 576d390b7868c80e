//! Error types for the GraphQL relay

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the relay
///
/// Every relay failure is terminal for the invocation that raised it. Nothing
/// is retried and no partial upstream payload is ever returned alongside one.
#[derive(Error, Debug)]
pub enum Error {
    /// Inbound method is neither POST nor OPTIONS
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(Method),

    /// Inbound body could not be used as a query payload
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The outbound call itself failed
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream answered with something other than a GraphQL JSON envelope
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// HTTP status a caller sees for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::UpstreamUnreachable(_) => "UPSTREAM_UNREACHABLE",
            Error::MalformedUpstreamResponse(_) => "MALFORMED_UPSTREAM_RESPONSE",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Other(_) => "UNKNOWN_ERROR",
        }
    }

    /// Convert error to the JSON body returned to callers
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            details: Some(serde_json::json!({ "code": self.code() })),
        }
    }
}

/// Error response format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<serde_json::Value>,
}

impl From<Error> for ErrorBody {
    fn from(err: Error) -> Self {
        err.to_error_body()
    }
}
