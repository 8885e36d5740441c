//! Permission engine tests: the full role x capability matrix and ownership.

use finance_gateway::auth::{Capability, Identity, Role};
use finance_gateway::authz::{PermissionEngine, RoleCapabilityMap};
use proptest::prelude::*;

fn identity(user_id: &str, roles: &[Role]) -> Identity {
    Identity::new(user_id, user_id, roles.iter().copied(), Vec::<Capability>::new())
}

/// Expected grants of the standard role map.
fn expected(role: Role, capability: &Capability) -> bool {
    let read_only = [
        Capability::ACCOUNT_READ,
        Capability::ACCOUNT_LIST,
        Capability::TRANSACTION_READ,
        Capability::TRANSACTION_LIST,
    ];
    match role {
        Role::Admin | Role::InternalService | Role::Manager => true,
        Role::Teller => [
            Capability::ACCOUNT_CREATE,
            Capability::ACCOUNT_READ,
            Capability::ACCOUNT_LIST,
            Capability::ACCOUNT_UPDATE,
            Capability::TRANSACTION_CREATE,
            Capability::TRANSACTION_READ,
            Capability::TRANSACTION_LIST,
        ]
        .contains(capability),
        Role::Customer => [
            Capability::ACCOUNT_CREATE,
            Capability::ACCOUNT_READ,
            Capability::ACCOUNT_LIST,
            Capability::TRANSACTION_CREATE,
            Capability::TRANSACTION_READ,
            Capability::TRANSACTION_LIST,
        ]
        .contains(capability),
        Role::Auditor | Role::User => read_only.contains(capability),
    }
}

#[test]
fn standard_matrix_is_exhaustive() {
    let engine = PermissionEngine::default();
    for role in Role::ALL {
        let caller = identity("u-1", &[role]);
        for capability in &Capability::KNOWN {
            assert_eq!(
                engine.has_capability(&caller, capability),
                expected(role, capability),
                "{role} / {capability}"
            );
        }
    }
}

#[test]
fn privileged_roles_satisfy_unknown_capabilities() {
    let engine = PermissionEngine::default();
    let custom = Capability::new("report:export");
    assert!(engine.has_capability(&identity("a", &[Role::Admin]), &custom));
    assert!(engine.has_capability(&identity("s", &[Role::InternalService]), &custom));
    assert!(!engine.has_capability(&identity("m", &[Role::Manager]), &custom));
}

#[test]
fn explicit_capability_needs_no_role() {
    let engine = PermissionEngine::new(RoleCapabilityMap::empty());
    let caller = Identity::new("u-2", "u-2", Vec::<Role>::new(), vec![Capability::ACCOUNT_CLOSE]);
    assert!(engine.has_capability(&caller, &Capability::ACCOUNT_CLOSE));
    assert!(!engine.has_capability(&caller, &Capability::ACCOUNT_READ));
}

#[test]
fn teller_may_act_on_anyones_account() {
    let engine = PermissionEngine::default();
    let teller = identity("teller-1", &[Role::Teller]);
    assert!(engine.can_act_on_resource(&teller, &Capability::ACCOUNT_UPDATE, Some("cust-7")));
}

#[test]
fn mixed_roles_are_not_self_service() {
    let engine = PermissionEngine::default();
    let caller = identity("u-3", &[Role::Customer, Role::Auditor]);
    assert!(engine.can_act_on_resource(&caller, &Capability::ACCOUNT_READ, Some("someone-else")));
}

#[test]
fn denial_reason_names_the_capability() {
    let engine = PermissionEngine::default();
    let decision = engine.authorize(
        &identity("u-4", &[Role::User]),
        &Capability::TRANSACTION_REVERSE,
        None,
    );
    assert!(!decision.allowed);
    assert!(decision.reason.contains("transaction:reverse"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Self-service callers only ever reach their own resources.
    #[test]
    fn prop_self_service_ownership(
        user_id in "[a-z0-9]{1,12}",
        owner_id in "[a-z0-9]{1,12}",
        role in prop::sample::select(vec![Role::Customer, Role::User]),
    ) {
        let engine = PermissionEngine::default();
        let caller = identity(&user_id, &[role]);
        let capability = Capability::ACCOUNT_READ;

        prop_assert!(engine.can_act_on_resource(&caller, &capability, None));
        prop_assert_eq!(
            engine.can_act_on_resource(&caller, &capability, Some(owner_id.as_str())),
            owner_id == user_id
        );
    }

    /// Ownership never grants a missing capability.
    #[test]
    fn prop_ownership_does_not_grant(user_id in "[a-z0-9]{1,12}") {
        let engine = PermissionEngine::default();
        let caller = identity(&user_id, &[Role::User]);
        prop_assert!(!engine.can_act_on_resource(&caller, &Capability::ACCOUNT_CLOSE, Some(user_id.as_str())));
    }
}
