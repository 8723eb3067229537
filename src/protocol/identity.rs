//! Identities describing applications and sources on the wire.

use serde::{Deserialize, Serialize};

use super::DataGroups;

/// Protocol version declared by an application or source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// The protocol version this broker implements.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 2, minor: 5 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Applications below major version 2 receive the documented
    /// backward-compatibility leniencies (see the dispatcher's reentrancy
    /// guard).
    pub fn is_legacy(self) -> bool {
        self.major < 2
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Structured record describing an application or source.
///
/// Drivers only ever receive private copies of these; nothing in the
/// registry is exposed by reference across the entry boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    /// Broker-assigned id: the connection handle for applications, or
    /// 1 + the slot index for sources within their owning application.
    /// 0 means "not yet assigned".
    #[serde(default)]
    pub id: u32,

    /// Unique key among concurrently registered applications.
    pub product_name: String,

    pub manufacturer: String,

    #[serde(default)]
    pub version: ProtocolVersion,

    /// Capability groups requested (application) or advertised (source).
    #[serde(default)]
    pub supported_groups: DataGroups,
}

impl Identity {
    pub fn new(
        product_name: impl Into<String>,
        manufacturer: impl Into<String>,
        version: ProtocolVersion,
        supported_groups: DataGroups,
    ) -> Self {
        Self {
            id: 0,
            product_name: product_name.into(),
            manufacturer: manufacturer.into(),
            version,
            supported_groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_version() {
        assert!(ProtocolVersion::new(1, 9).is_legacy());
        assert!(!ProtocolVersion::new(2, 0).is_legacy());
        assert!(!ProtocolVersion::CURRENT.is_legacy());
    }

    #[test]
    fn test_identity_starts_unassigned() {
        let id = Identity::new(
            "App",
            "Vendor",
            ProtocolVersion::CURRENT,
            DataGroups::IMAGE,
        );
        assert_eq!(id.id, 0);
        assert_eq!(id.product_name, "App");
    }
}
