//! INDI error types
//!
//! Provides structured error types for framing, parsing, routing and
//! command encoding.

use std::time::Duration;

use thiserror::Error;

use crate::IndiPropertyType;

/// INDI client errors
#[derive(Debug, Clone, Error)]
pub enum IndiError {
    /// Tag is not one of the accepted INDI elements
    #[error("Unknown INDI element: <{tag}>")]
    UnknownElement { tag: String },

    /// Malformed XML inside an extracted element
    #[error("XML parse error{}: {message}", location(.device, .name))]
    ParseError {
        device: Option<String>,
        name: Option<String>,
        message: String,
    },

    /// BLOB element whose base64 payload could not be decoded
    #[error("BLOB decode error for {element}: {message}")]
    BlobDecode { element: String, message: String },

    /// A Set arrived with a different vector type than its Definition
    #[error("Kind mismatch for {device}.{property}: defined as {defined}, received {received}")]
    KindMismatch {
        device: String,
        property: String,
        defined: IndiPropertyType,
        received: IndiPropertyType,
    },

    /// Malformed command request (caller misuse)
    #[error("Malformed command: {0}")]
    InvalidCommand(String),

    /// Subscription pattern is not `device.name`
    #[error("Invalid property pattern '{0}', expected \"device.name\"")]
    InvalidPattern(String),

    /// Command refused because the session is read-only
    #[error("All commands are disabled in Read-Only mode")]
    ReadOnly,

    /// Not connected to server
    #[error("Not connected to INDI server")]
    NotConnected,

    /// Connection to INDI server failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout with context
    #[error("Connection timeout: failed to connect to {host}:{port} after {duration:?}")]
    ConnectionTimeout {
        host: String,
        port: u16,
        duration: Duration,
    },

    /// Send channel closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

fn location(device: &Option<String>, name: &Option<String>) -> String {
    match (device, name) {
        (Some(d), Some(n)) => format!(" in {}.{}", d, n),
        (Some(d), None) => format!(" in device {}", d),
        _ => String::new(),
    }
}

impl IndiError {
    /// Errors that belong to a single element and never halt the stream
    pub fn is_element_error(&self) -> bool {
        matches!(
            self,
            IndiError::UnknownElement { .. }
                | IndiError::ParseError { .. }
                | IndiError::BlobDecode { .. }
                | IndiError::KindMismatch { .. }
        )
    }

    /// Errors surfaced to the operator as an alert
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            IndiError::InvalidCommand(_)
                | IndiError::ReadOnly
                | IndiError::NotConnected
                | IndiError::ConnectionFailed(_)
                | IndiError::ConnectionTimeout { .. }
        )
    }
}

impl From<IndiError> for String {
    fn from(err: IndiError) -> String {
        err.to_string()
    }
}

/// Result type for INDI operations
pub type IndiResult<T> = Result<T, IndiError>;
