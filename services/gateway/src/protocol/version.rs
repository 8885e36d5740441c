//! Protocol version registry and negotiation.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

/// Lifecycle of a protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Supported,
    Deprecated,
    Unsupported,
}

impl VersionStatus {
    /// Supported and deprecated versions can still be agreed on.
    #[must_use]
    pub const fn is_negotiable(self) -> bool {
        matches!(self, Self::Supported | Self::Deprecated)
    }
}

/// A date-coded protocol revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolVersion {
    pub id: String,
    pub status: VersionStatus,
    pub features: BTreeSet<String>,
}

impl ProtocolVersion {
    #[must_use]
    pub fn new<I, S>(id: impl Into<String>, status: VersionStatus, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            status,
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn supports(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

/// Order version ids by date, or lexically when either is not a date.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_date(a), parse_date(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn parse_date(id: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(id.trim(), "%Y-%m-%d").ok()
}

/// Known protocol versions, kept sorted oldest first.
///
/// Populated before the registry is shared; negotiation only reads it.
#[derive(Debug, Clone, Default)]
pub struct VersionRegistry {
    versions: Vec<ProtocolVersion>,
}

impl VersionRegistry {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            versions: Vec::new(),
        }
    }

    /// The revisions this gateway ships with.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(ProtocolVersion::new(
            "2023-01-01",
            VersionStatus::Unsupported,
            ["tools"],
        ));
        registry.register(ProtocolVersion::new(
            "2024-10-07",
            VersionStatus::Deprecated,
            ["tools"],
        ));
        registry.register(ProtocolVersion::new(
            "2024-11-05",
            VersionStatus::Supported,
            ["tools", "logging"],
        ));
        registry.register(ProtocolVersion::new(
            "2025-03-26",
            VersionStatus::Supported,
            ["tools", "logging", "cancellation"],
        ));
        registry.register(ProtocolVersion::new(
            "2025-06-18",
            VersionStatus::Supported,
            ["tools", "logging", "cancellation", "structured_content"],
        ));
        registry
    }

    /// Add or replace a version.
    pub fn register(&mut self, version: ProtocolVersion) {
        self.versions.retain(|v| v.id != version.id);
        let at = self
            .versions
            .partition_point(|v| compare_versions(&v.id, &version.id) == Ordering::Less);
        self.versions.insert(at, version);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ProtocolVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtocolVersion> {
        self.versions.iter()
    }

    fn negotiable(&self) -> impl DoubleEndedIterator<Item = &ProtocolVersion> {
        self.versions.iter().filter(|v| v.status.is_negotiable())
    }

    /// Newest negotiable version.
    #[must_use]
    pub fn latest(&self) -> Option<&ProtocolVersion> {
        self.negotiable().next_back()
    }

    /// Pick the version to speak with a client that asked for `requested`.
    ///
    /// An exact negotiable match wins; otherwise the newest negotiable
    /// version not newer than `requested`; otherwise [`latest`](Self::latest).
    /// `None` only when nothing is negotiable.
    #[must_use]
    pub fn negotiate(&self, requested: &str) -> Option<&ProtocolVersion> {
        let requested = requested.trim();
        if let Some(exact) = self.negotiable().find(|v| v.id == requested) {
            return Some(exact);
        }
        self.negotiable()
            .rev()
            .find(|v| compare_versions(&v.id, requested) != Ordering::Greater)
            .or_else(|| self.latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_supported_version_is_echoed() {
        let registry = VersionRegistry::standard();
        assert_eq!(registry.negotiate("2024-11-05").unwrap().id, "2024-11-05");
        assert_eq!(registry.negotiate("2025-03-26").unwrap().id, "2025-03-26");
    }

    #[test]
    fn deprecated_version_is_still_accepted() {
        let registry = VersionRegistry::standard();
        assert_eq!(registry.negotiate("2024-10-07").unwrap().id, "2024-10-07");
    }

    #[test]
    fn future_version_falls_back_to_latest() {
        let registry = VersionRegistry::standard();
        assert_eq!(registry.negotiate("2030-01-01").unwrap().id, "2025-06-18");
    }

    #[test]
    fn in_between_version_picks_highest_lower() {
        let registry = VersionRegistry::standard();
        assert_eq!(registry.negotiate("2025-01-01").unwrap().id, "2024-11-05");
    }

    #[test]
    fn unsupported_or_ancient_version_falls_back_to_latest() {
        let registry = VersionRegistry::standard();
        assert_eq!(registry.negotiate("2023-01-01").unwrap().id, "2025-06-18");
        assert_eq!(registry.negotiate("1999-12-31").unwrap().id, "2025-06-18");
    }

    #[test]
    fn non_date_ids_use_lexical_order() {
        assert_eq!(compare_versions("v2", "v10"), Ordering::Greater);
        assert_eq!(compare_versions("2024-11-05", "2024-1-5x"), "2024-11-05".cmp("2024-1-5x"));
    }

    #[test]
    fn register_keeps_order_and_replaces() {
        let mut registry = VersionRegistry::standard();
        registry.register(ProtocolVersion::new(
            "2024-12-01",
            VersionStatus::Supported,
            ["tools"],
        ));
        registry.register(ProtocolVersion::new(
            "2024-11-05",
            VersionStatus::Unsupported,
            Vec::<String>::new(),
        ));

        let ids: Vec<_> = registry.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["2023-01-01", "2024-10-07", "2024-11-05", "2024-12-01", "2025-03-26", "2025-06-18"]
        );
        assert_eq!(registry.negotiate("2024-11-20").unwrap().id, "2024-10-07");
    }

    #[test]
    fn empty_registry_negotiates_nothing() {
        assert!(VersionRegistry::empty().negotiate("2025-06-18").is_none());
    }
}
