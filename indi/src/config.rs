//! Session configuration

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::INDI_PROTOCOL_VERSION;

/// How vectors become eligible for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityPolicy {
    /// Every Definition marks its vector available (default GUI)
    #[default]
    Automatic,
    /// Only explicit `set_available` calls count (custom GUI layouts)
    Explicit,
}

/// Configuration for a stream session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wait before retrying a send while the link is not open (default: 30ms)
    pub send_retry_ms: u64,
    /// Fixed delay before reconnecting after a close (default: 1000ms)
    pub reconnect_delay_ms: u64,
    /// Connection timeout for the transport (default: 3 seconds)
    pub connection_timeout_secs: u64,
    /// Mute every value-change command (default: false)
    pub read_only: bool,
    /// Protocol version announced in `getProperties` (default: "1.7")
    pub protocol_version: String,
    /// Send `enableBLOB` alongside each property request (default: true)
    pub request_blobs: bool,
    /// Availability bookkeeping mode (default: automatic)
    pub availability: AvailabilityPolicy,
    /// Transport read size in bytes (default: 4096)
    pub read_chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_retry_ms: 30,
            reconnect_delay_ms: 1000,
            connection_timeout_secs: 3,
            read_only: false,
            protocol_version: INDI_PROTOCOL_VERSION.to_string(),
            request_blobs: true,
            availability: AvailabilityPolicy::Automatic,
            read_chunk_size: 4096,
        }
    }
}

impl SessionConfig {
    /// Get the send retry wait as a Duration
    pub fn send_retry(&self) -> Duration {
        Duration::from_millis(self.send_retry_ms)
    }

    /// Get the reconnect delay as a Duration
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Get the connection timeout as a Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}
