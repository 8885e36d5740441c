//! Role, capability and ownership checks.
//!
//! Every function here is a pure decision over an [`Identity`]; nothing
//! returns an error. Callers branch on the boolean or [`AuthDecision`].

mod roles;

use std::sync::Arc;

use serde::Serialize;

use crate::auth::{Capability, Identity};

pub use roles::RoleCapabilityMap;

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AuthDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Decides whether an identity may use a capability on a resource.
#[derive(Debug, Clone)]
pub struct PermissionEngine {
    roles: Arc<RoleCapabilityMap>,
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::new(RoleCapabilityMap::standard())
    }
}

impl PermissionEngine {
    #[must_use]
    pub fn new(roles: RoleCapabilityMap) -> Self {
        Self {
            roles: Arc::new(roles),
        }
    }

    /// Explicit grant, privileged role, or role-map grant, in that order.
    #[must_use]
    pub fn has_capability(&self, identity: &Identity, capability: &Capability) -> bool {
        identity.capabilities().contains(capability)
            || identity.roles().iter().any(|role| role.is_privileged())
            || identity
                .roles()
                .iter()
                .any(|role| self.roles.grants(*role, capability))
    }

    /// Capability check plus ownership for self-service callers.
    ///
    /// A missing `owner_id` leaves the decision to the capability alone.
    #[must_use]
    pub fn can_act_on_resource(
        &self,
        identity: &Identity,
        capability: &Capability,
        owner_id: Option<&str>,
    ) -> bool {
        self.authorize(identity, capability, owner_id).allowed
    }

    /// Same decision as [`PermissionEngine::can_act_on_resource`], with the
    /// reason spelled out.
    #[must_use]
    pub fn authorize(
        &self,
        identity: &Identity,
        capability: &Capability,
        owner_id: Option<&str>,
    ) -> AuthDecision {
        if !self.has_capability(identity, capability) {
            return AuthDecision::deny(format!("missing capability {capability}"));
        }

        match owner_id {
            Some(owner) if identity.is_self_service() && owner != identity.user_id() => {
                AuthDecision::deny(format!(
                    "{capability} is limited to resources owned by the caller"
                ))
            }
            Some(_) if identity.is_self_service() => {
                AuthDecision::allow(format!("{capability} granted on own resource"))
            }
            _ => AuthDecision::allow(format!("{capability} granted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn engine() -> PermissionEngine {
        PermissionEngine::default()
    }

    #[test]
    fn explicit_capability_grants_without_roles() {
        let identity = Identity::new("u", "u", [], [Capability::TRANSACTION_REVERSE]);
        assert!(engine().has_capability(&identity, &Capability::TRANSACTION_REVERSE));
        assert!(!engine().has_capability(&identity, &Capability::ACCOUNT_CLOSE));
    }

    #[test]
    fn privileged_roles_bypass_the_map() {
        let engine = PermissionEngine::new(RoleCapabilityMap::empty());
        for role in [Role::Admin, Role::InternalService] {
            let identity = Identity::new("svc", "svc", [role], []);
            assert!(engine.has_capability(&identity, &Capability::new("anything:at_all")));
            assert!(engine.can_act_on_resource(
                &identity,
                &Capability::ACCOUNT_CLOSE,
                Some("someone-else")
            ));
        }
    }

    #[test]
    fn customer_restricted_to_own_resources() {
        let identity = Identity::new("self", "self", [Role::Customer], []);
        let engine = engine();

        assert!(!engine.can_act_on_resource(&identity, &Capability::ACCOUNT_READ, Some("other_user")));
        assert!(engine.can_act_on_resource(&identity, &Capability::ACCOUNT_READ, Some("self")));
        assert!(engine.can_act_on_resource(&identity, &Capability::ACCOUNT_READ, None));
    }

    #[test]
    fn staff_may_act_on_any_owner() {
        let identity = Identity::new("t-1", "t-1", [Role::Teller, Role::Customer], []);
        assert!(engine().can_act_on_resource(
            &identity,
            &Capability::ACCOUNT_UPDATE,
            Some("cust-42")
        ));
    }

    #[test]
    fn ownership_never_rescues_missing_capability() {
        let identity = Identity::new("self", "self", [Role::User], []);
        let decision = engine().authorize(&identity, &Capability::ACCOUNT_CLOSE, Some("self"));
        assert!(!decision.allowed);
        assert!(decision.reason.contains("account:close"));
    }
}
