use std::collections::{BTreeSet, HashMap};

use crate::auth::{Capability, Role};

/// Static role to capability table.
///
/// Consulted only when an identity's explicit capabilities do not already
/// cover a requirement. Privileged roles never reach the table.
#[derive(Debug, Clone, Default)]
pub struct RoleCapabilityMap {
    grants: HashMap<Role, BTreeSet<Capability>>,
}

impl RoleCapabilityMap {
    /// An empty table: only explicit capabilities and privileged roles pass.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The platform's standard grants.
    #[must_use]
    pub fn standard() -> Self {
        use Capability as C;

        Self::empty()
            .grant(Role::Admin, Capability::KNOWN)
            .grant(Role::InternalService, Capability::KNOWN)
            .grant(Role::Manager, Capability::KNOWN)
            .grant(
                Role::Teller,
                [
                    C::ACCOUNT_CREATE,
                    C::ACCOUNT_READ,
                    C::ACCOUNT_LIST,
                    C::ACCOUNT_UPDATE,
                    C::TRANSACTION_CREATE,
                    C::TRANSACTION_READ,
                    C::TRANSACTION_LIST,
                ],
            )
            .grant(
                Role::Auditor,
                [
                    C::ACCOUNT_READ,
                    C::ACCOUNT_LIST,
                    C::TRANSACTION_READ,
                    C::TRANSACTION_LIST,
                ],
            )
            .grant(
                Role::Customer,
                [
                    C::ACCOUNT_CREATE,
                    C::ACCOUNT_READ,
                    C::ACCOUNT_LIST,
                    C::TRANSACTION_CREATE,
                    C::TRANSACTION_READ,
                    C::TRANSACTION_LIST,
                ],
            )
            .grant(
                Role::User,
                [
                    C::ACCOUNT_READ,
                    C::ACCOUNT_LIST,
                    C::TRANSACTION_READ,
                    C::TRANSACTION_LIST,
                ],
            )
    }

    /// Add grants for `role`. Used while building; the map is shared
    /// read-only afterwards.
    #[must_use]
    pub fn grant(mut self, role: Role, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.grants.entry(role).or_default().extend(capabilities);
        self
    }

    #[must_use]
    pub fn grants(&self, role: Role, capability: &Capability) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|caps| caps.contains(capability))
    }

    #[must_use]
    pub fn capabilities_of(&self, role: Role) -> Option<&BTreeSet<Capability>> {
        self.grants.get(&role)
    }
}
