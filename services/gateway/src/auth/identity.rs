//! Caller identity resolved from a validated token.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::auth::claims::Claims;

/// Roles the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    InternalService,
    Manager,
    Teller,
    Auditor,
    Customer,
    User,
}

impl Role {
    /// Every role, in declaration order
    pub const ALL: [Self; 7] = [
        Self::Admin,
        Self::InternalService,
        Self::Manager,
        Self::Teller,
        Self::Auditor,
        Self::Customer,
        Self::User,
    ];

    /// Normalise and parse a role claim.
    ///
    /// Matching ignores case, a leading `role_` and the choice between `-`,
    /// space and `_` as separator, so `ROLE_Internal-Service` is
    /// [`Role::InternalService`].
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        if let Some(rest) = normalized.strip_prefix("role_") {
            normalized = rest.to_string();
        }
        match normalized.as_str() {
            "admin" => Some(Self::Admin),
            "internal_service" => Some(Self::InternalService),
            "manager" => Some(Self::Manager),
            "teller" => Some(Self::Teller),
            "auditor" => Some(Self::Auditor),
            "customer" => Some(Self::Customer),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::InternalService => "internal_service",
            Self::Manager => "manager",
            Self::Teller => "teller",
            Self::Auditor => "auditor",
            Self::Customer => "customer",
            Self::User => "user",
        }
    }

    /// Customers and plain users may only act on their own resources.
    #[must_use]
    pub const fn is_self_service(self) -> bool {
        matches!(self, Self::Customer | Self::User)
    }

    /// Satisfies every capability without consulting the role map.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Admin | Self::InternalService)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A namespaced permission such as `account:create`.
///
/// Comparison is exact-string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    pub const ACCOUNT_CREATE: Self = Self::from_static("account:create");
    pub const ACCOUNT_READ: Self = Self::from_static("account:read");
    pub const ACCOUNT_LIST: Self = Self::from_static("account:list");
    pub const ACCOUNT_UPDATE: Self = Self::from_static("account:update");
    pub const ACCOUNT_CLOSE: Self = Self::from_static("account:close");
    pub const TRANSACTION_CREATE: Self = Self::from_static("transaction:create");
    pub const TRANSACTION_READ: Self = Self::from_static("transaction:read");
    pub const TRANSACTION_LIST: Self = Self::from_static("transaction:list");
    pub const TRANSACTION_REVERSE: Self = Self::from_static("transaction:reverse");

    /// Capabilities required by the built-in tools
    pub const KNOWN: [Self; 9] = [
        Self::ACCOUNT_CREATE,
        Self::ACCOUNT_READ,
        Self::ACCOUNT_LIST,
        Self::ACCOUNT_UPDATE,
        Self::ACCOUNT_CLOSE,
        Self::TRANSACTION_CREATE,
        Self::TRANSACTION_READ,
        Self::TRANSACTION_LIST,
        Self::TRANSACTION_REVERSE,
    ];

    #[must_use]
    pub const fn from_static(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(Cow::Owned(value.into()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authenticated caller. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    user_id: String,
    display_name: String,
    roles: BTreeSet<Role>,
    capabilities: BTreeSet<Capability>,
}

impl Identity {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            roles: roles.into_iter().collect(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// Build an identity from validated claims.
    ///
    /// Unrecognised role strings are logged and dropped.
    #[must_use]
    pub fn from_claims(claims: &Claims) -> Self {
        let user_id = claims.sub.clone().unwrap_or_default();
        let display_name = claims.display_name().unwrap_or(&user_id).to_string();

        let roles = claims
            .roles
            .iter()
            .filter_map(|raw| {
                let role = Role::parse(raw);
                if role.is_none() {
                    warn!(user_id = %user_id, role = %raw, "Dropping unrecognised role");
                }
                role
            })
            .collect::<BTreeSet<_>>();

        let capabilities = claims
            .permissions
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(Capability::new)
            .collect();

        Self {
            user_id,
            display_name,
            roles,
            capabilities,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub const fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    #[must_use]
    pub const fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// True when every held role is self-service (vacuously true with no roles).
    #[must_use]
    pub fn is_self_service(&self) -> bool {
        self.roles.iter().all(|role| role.is_self_service())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_normalisation() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("ROLE_admin"), Some(Role::Admin));
        assert_eq!(Role::parse("role_Internal-Service"), Some(Role::InternalService));
        assert_eq!(Role::parse(" internal service "), Some(Role::InternalService));
        assert_eq!(Role::parse("Customer"), Some(Role::Customer));
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn role_round_trips_through_as_str() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn identity_from_claims_drops_unknown_roles() {
        let claims = Claims::new("u-1", 60)
            .with_roles(["teller", "wizard", "ROLE_AUDITOR"])
            .with_permissions(["account:read", "  "]);
        let identity = Identity::from_claims(&claims);

        assert_eq!(identity.user_id(), "u-1");
        assert_eq!(identity.display_name(), "u-1");
        assert_eq!(
            identity.roles().iter().copied().collect::<Vec<_>>(),
            vec![Role::Teller, Role::Auditor]
        );
        assert_eq!(identity.capabilities().len(), 1);
        assert!(identity.capabilities().contains(&Capability::ACCOUNT_READ));
    }

    #[test]
    fn self_service_detection() {
        let customer = Identity::new("c", "c", [Role::Customer, Role::User], []);
        assert!(customer.is_self_service());

        let nobody = Identity::new("n", "n", [], []);
        assert!(nobody.is_self_service());

        let mixed = Identity::new("m", "m", [Role::Customer, Role::Teller], []);
        assert!(!mixed.is_self_service());
    }

    #[test]
    fn capability_equality_is_exact() {
        assert_eq!(Capability::new("account:read"), Capability::ACCOUNT_READ);
        assert_ne!(Capability::new("Account:Read"), Capability::ACCOUNT_READ);
    }
}
