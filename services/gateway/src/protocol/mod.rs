//! Protocol version negotiation, message compliance and result envelopes.

pub mod compliance;
pub mod envelope;
pub mod negotiator;
pub mod version;

pub use compliance::{ComplianceIssue, Severity, has_errors};
pub use envelope::{ContentItem, ErrorPayload, Payload, SuccessPayload, ToolResult};
pub use negotiator::ProtocolNegotiator;
pub use version::{ProtocolVersion, VersionRegistry, VersionStatus, compare_versions};
