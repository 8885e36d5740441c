use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::protocol::compliance::{self, ComplianceIssue};
use crate::protocol::version::{ProtocolVersion, VersionRegistry};

/// Version negotiation and structural checks against a fixed registry.
///
/// Cheap to clone; the registry is shared and never mutated once the
/// negotiator is built.
#[derive(Debug, Clone)]
pub struct ProtocolNegotiator {
    registry: Arc<VersionRegistry>,
}

impl Default for ProtocolNegotiator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ProtocolNegotiator {
    #[must_use]
    pub fn new(registry: VersionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Negotiator over [`VersionRegistry::standard`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(VersionRegistry::standard())
    }

    #[must_use]
    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    /// Agree on a version with a client that asked for `requested`.
    ///
    /// Never fails while the registry holds a negotiable version; asking
    /// again with the result returns the same version.
    #[must_use]
    pub fn negotiate_version(&self, requested: &str) -> Option<&ProtocolVersion> {
        let accepted = self.registry.negotiate(requested);
        debug!(
            requested = %requested,
            accepted = accepted.map_or("<none>", |v| v.id.as_str()),
            "Protocol version negotiated"
        );
        accepted
    }

    #[must_use]
    pub fn validate_handshake(&self, message: &Value) -> Vec<ComplianceIssue> {
        compliance::validate_handshake(message, &self.registry)
    }

    #[must_use]
    pub fn validate_invocation(&self, message: &Value) -> Vec<ComplianceIssue> {
        compliance::validate_invocation(message)
    }

    #[must_use]
    pub fn validate_invocation_result(&self, result: &Value) -> Vec<ComplianceIssue> {
        compliance::validate_invocation_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::compliance::has_errors;
    use serde_json::json;

    #[test]
    fn negotiation_is_idempotent() {
        let negotiator = ProtocolNegotiator::with_defaults();
        for requested in ["2024-10-07", "2025-01-15", "2031-01-01", "garbage"] {
            let first = negotiator.negotiate_version(requested).unwrap().id.clone();
            let second = negotiator.negotiate_version(&first).unwrap().id.clone();
            assert_eq!(first, second, "requested {requested}");
        }
    }

    #[test]
    fn unknown_handshake_version_is_informational() {
        let negotiator = ProtocolNegotiator::with_defaults();
        let issues = negotiator.validate_handshake(&json!({
            "protocol_version": "2025-01-15",
            "capabilities": {},
            "client_info": {"name": "desk", "version": "1"}
        }));
        assert!(!has_errors(&issues));
        assert_eq!(issues[0].code, "UNKNOWN_VERSION");
        assert_eq!(negotiator.negotiate_version("2025-01-15").unwrap().id, "2024-11-05");
    }
}
