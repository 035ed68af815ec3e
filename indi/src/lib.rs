//! INDI Web Client Core
//!
//! Streaming INDI XML parser and property state synchronization for a
//! browser-facing INDI control panel. A transport (WebSocket proxy or a
//! direct TCP link) delivers arbitrarily chunked text; this crate frames it
//! into complete INDI elements, turns each one into a typed property
//! record, and routes it to the subscriber interested in it.
//!
//! ## Pipeline
//!
//! - [`FrameExtractor`] - incremental framing across chunk boundaries
//! - [`classify`] - operation and vector kind from the tag name
//! - [`flatten`] - typed [`PropertyVector`] records
//! - [`PropertyStore`] - definition / set-merge / tombstone lifecycle
//! - [`Router`] - pattern subscriptions and the availability table
//! - [`CommandEncoder`] - outgoing `new*Vector`, `getProperties`, `enableBLOB`
//! - [`Session`] - the single owner tying it together, plus [`run_session`]
//!   for driving it over a real connection

mod classify;
mod command;
mod config;
mod connection;
mod error;
mod flatten;
mod framing;
mod property;
mod protocol;
mod router;
mod session;
mod store;

use serde::{Deserialize, Serialize};

pub use classify::{classify, classify_element, Classification};
pub use command::{Command, CommandEncoder};
pub use config::{AvailabilityPolicy, SessionConfig};
pub use connection::{run_session, BoxedReader, BoxedWriter, Connector, TcpConnector};
pub use error::{IndiError, IndiResult};
pub use flatten::{flatten, parse_frame};
pub use framing::{FrameExtractor, Frames};
pub use property::{
    BlobElement, BlobPayload, DeleteNotice, ElementView, IndiEvent, LightElement, MessageNotice,
    NumberElement, PropertyVector, SwitchElement, SwitchState, TextElement, VectorBody,
};
pub use protocol::{standard_properties, INDI_PROTOCOL_VERSION};
pub use router::{Availability, Delivery, PropertyCallback, PropertyPattern, Router};
pub use session::{Session, SessionEvent, SessionState};
pub use store::{PropertyStore, StoreOutcome};

/// Default INDI server port
pub const INDI_DEFAULT_PORT: u16 = 7624;

/// INDI property (vector) types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndiPropertyType {
    Number,
    Text,
    Switch,
    Light,
    #[serde(rename = "BLOB")]
    Blob,
}

impl IndiPropertyType {
    /// All vector kinds in wire order
    pub const ALL: [IndiPropertyType; 5] = [
        IndiPropertyType::Number,
        IndiPropertyType::Text,
        IndiPropertyType::Switch,
        IndiPropertyType::Light,
        IndiPropertyType::Blob,
    ];

    /// Name fragment used in tag names (`defNumberVector`, `oneBLOB`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            IndiPropertyType::Number => "Number",
            IndiPropertyType::Text => "Text",
            IndiPropertyType::Switch => "Switch",
            IndiPropertyType::Light => "Light",
            IndiPropertyType::Blob => "BLOB",
        }
    }

    /// Parse a kind name. Accepts `Blob` as well as the wire spelling `BLOB`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Number" => Some(IndiPropertyType::Number),
            "Text" => Some(IndiPropertyType::Text),
            "Switch" => Some(IndiPropertyType::Switch),
            "Light" => Some(IndiPropertyType::Light),
            "BLOB" | "Blob" => Some(IndiPropertyType::Blob),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndiPropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// INDI property state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndiPropertyState {
    Idle,
    Ok,
    Busy,
    Alert,
}

impl IndiPropertyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndiPropertyState::Idle => "Idle",
            IndiPropertyState::Ok => "Ok",
            IndiPropertyState::Busy => "Busy",
            IndiPropertyState::Alert => "Alert",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Idle" => Some(IndiPropertyState::Idle),
            "Ok" => Some(IndiPropertyState::Ok),
            "Busy" => Some(IndiPropertyState::Busy),
            "Alert" => Some(IndiPropertyState::Alert),
            _ => None,
        }
    }
}

/// INDI property permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndiPermission {
    #[serde(rename = "ro")]
    ReadOnly,
    #[serde(rename = "wo")]
    WriteOnly,
    #[serde(rename = "rw")]
    ReadWrite,
}

impl IndiPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndiPermission::ReadOnly => "ro",
            IndiPermission::WriteOnly => "wo",
            IndiPermission::ReadWrite => "rw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ro" => Some(IndiPermission::ReadOnly),
            "wo" => Some(IndiPermission::WriteOnly),
            "rw" => Some(IndiPermission::ReadWrite),
            _ => None,
        }
    }

    /// Whether a client may send new values
    pub fn is_writable(&self) -> bool {
        !matches!(self, IndiPermission::ReadOnly)
    }
}

/// Switch vector exclusivity rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndiSwitchRule {
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

impl IndiSwitchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndiSwitchRule::OneOfMany => "OneOfMany",
            IndiSwitchRule::AtMostOne => "AtMostOne",
            IndiSwitchRule::AnyOfMany => "AnyOfMany",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OneOfMany" => Some(IndiSwitchRule::OneOfMany),
            "AtMostOne" => Some(IndiSwitchRule::AtMostOne),
            "AnyOfMany" => Some(IndiSwitchRule::AnyOfMany),
            _ => None,
        }
    }

    /// Radio-button semantics (at most one switch On at a time)
    pub fn is_exclusive(&self) -> bool {
        !matches!(self, IndiSwitchRule::AnyOfMany)
    }
}

/// Protocol action that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndiOperation {
    Definition,
    Set,
    New,
    Get,
    Delete,
    Message,
}

impl IndiOperation {
    /// Three letter tag prefix for vector operations
    pub fn prefix(&self) -> &'static str {
        match self {
            IndiOperation::Definition => "def",
            IndiOperation::Set => "set",
            IndiOperation::New => "new",
            IndiOperation::Get => "get",
            IndiOperation::Delete => "del",
            IndiOperation::Message => "mes",
        }
    }

    /// Whether this operation carries a property vector body
    pub fn is_vector(&self) -> bool {
        !matches!(self, IndiOperation::Delete | IndiOperation::Message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_names() {
        for kind in IndiPropertyType::ALL {
            assert_eq!(IndiPropertyType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(IndiPropertyType::parse("Blob"), Some(IndiPropertyType::Blob));
        assert_eq!(IndiPropertyType::parse("Vector"), None);
        assert_eq!(IndiPropertyType::Blob.to_string(), "BLOB");
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!(IndiPermission::parse("RO"), Some(IndiPermission::ReadOnly));
        assert_eq!(IndiPermission::parse("rw"), Some(IndiPermission::ReadWrite));
        assert_eq!(IndiPermission::parse("x"), None);
        assert!(!IndiPermission::ReadOnly.is_writable());
        assert!(IndiPermission::WriteOnly.is_writable());
    }

    #[test]
    fn test_switch_rule_exclusivity() {
        assert!(IndiSwitchRule::OneOfMany.is_exclusive());
        assert!(IndiSwitchRule::AtMostOne.is_exclusive());
        assert!(!IndiSwitchRule::AnyOfMany.is_exclusive());
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(IndiPropertyState::parse("Busy"), Some(IndiPropertyState::Busy));
        assert_eq!(IndiPropertyState::parse("busy"), None);
    }
}
