//! INDI XML Protocol definitions

/// INDI protocol version
pub const INDI_PROTOCOL_VERSION: &str = "1.7";

/// Device or name meaning "all" in subscriptions and `getProperties`
pub const WILDCARD: &str = "*";

/// Tag suffix shared by every vector element
pub const VECTOR_SUFFIX: &str = "Vector";

/// Deletion notice tag
pub const DEL_PROPERTY: &str = "delProperty";

/// Log notice tag
pub const MESSAGE: &str = "message";

/// Outbound property request tag
pub const GET_PROPERTIES: &str = "getProperties";

/// Outbound BLOB opt-in tag
pub const ENABLE_BLOB: &str = "enableBLOB";

/// BLOB delivery mode sent with `enableBLOB`
pub const BLOB_ALSO: &str = "Also";

/// Standard INDI properties
pub mod standard_properties {
    /// Connection control switch
    pub const CONNECTION: &str = "CONNECTION";
    pub const CONNECT: &str = "CONNECT";
    pub const DISCONNECT: &str = "DISCONNECT";
}
