//! Property-based tests for version negotiation and result envelopes.

use std::time::Duration;

use finance_gateway::error::GatewayError;
use finance_gateway::protocol::{
    Payload, ProtocolNegotiator, ToolResult, VersionStatus, compare_versions, has_errors,
};
use proptest::prelude::*;
use serde_json::json;

fn arb_date_version() -> impl Strategy<Value = String> {
    (2015u32..2035, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| format!("{y:04}-{m:02}-{d:02}"))
}

fn arb_any_version() -> impl Strategy<Value = String> {
    prop_oneof![arb_date_version(), "[ -~]{0,16}"]
}

fn arb_error() -> impl Strategy<Value = GatewayError> {
    prop_oneof![
        "[a-z ]{1,24}".prop_map(GatewayError::validation),
        "[a-z ]{1,24}".prop_map(GatewayError::authorization),
        "[a-z0-9-]{1,12}".prop_map(|resource| GatewayError::NotFound { resource }),
        (0u64..120_000).prop_map(|ms| GatewayError::CircuitOpen {
            service: "account-service".to_string(),
            retry_after: Duration::from_millis(ms),
        }),
        Just(()).prop_map(|()| GatewayError::Cancelled),
        Just(()).prop_map(|()| GatewayError::Internal(anyhow::anyhow!("secret=abc"))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Negotiating the negotiated version returns it unchanged.
    #[test]
    fn prop_negotiation_is_idempotent(requested in arb_any_version()) {
        let negotiator = ProtocolNegotiator::with_defaults();
        let first = negotiator.negotiate_version(&requested).unwrap().id.clone();
        let second = negotiator.negotiate_version(&first).unwrap().id.clone();
        prop_assert_eq!(first, second);
    }

    /// The result is always negotiable and never newer than the request,
    /// unless nothing older is available.
    #[test]
    fn prop_negotiated_version_is_bounded(requested in arb_date_version()) {
        let negotiator = ProtocolNegotiator::with_defaults();
        let accepted = negotiator.negotiate_version(&requested).unwrap();
        prop_assert!(accepted.status.is_negotiable());

        let any_older = negotiator
            .registry()
            .iter()
            .any(|v| v.status.is_negotiable() && compare_versions(&v.id, &requested).is_le());
        if any_older {
            prop_assert!(compare_versions(&accepted.id, &requested).is_le());
        } else {
            prop_assert_eq!(accepted.id.as_str(), "2025-06-18");
        }
    }

    /// Success envelopes carry their data and request id back out.
    #[test]
    fn prop_success_envelope_round_trips(
        message in "[A-Za-z ]{1,32}",
        balance in -1_000_000i64..1_000_000,
        request_id in "[a-f0-9-]{8,36}",
    ) {
        let data = json!({"account_id": "acc-1", "balance": balance});
        let result = ToolResult::success(message.clone(), data.clone(), &request_id);
        prop_assert!(!has_errors(&finance_gateway::protocol::compliance::validate_invocation_result(&result.to_value())));

        match result.parse_payload() {
            Some(Payload::Success(payload)) => {
                prop_assert!(payload.success);
                prop_assert_eq!(payload.message, message);
                prop_assert_eq!(payload.data, data);
                prop_assert_eq!(payload.request_id, request_id);
            }
            other => prop_assert!(false, "unexpected payload {:?}", other),
        }
    }

    /// Error envelopes always parse back into `{success: false, error_code}`.
    #[test]
    fn prop_error_envelope_is_structured(error in arb_error(), request_id in "[a-f0-9]{8}") {
        let result = ToolResult::error(&error, &request_id);
        prop_assert!(result.is_error);
        prop_assert!(finance_gateway::protocol::compliance::validate_invocation_result(&result.to_value()).is_empty());

        match result.parse_payload() {
            Some(Payload::Error(payload)) => {
                prop_assert!(!payload.success);
                prop_assert_eq!(payload.error_code.as_str(), error.code().as_str());
                prop_assert!(!payload.error_message.contains("secret"));
                prop_assert_eq!(payload.request_id, request_id);
            }
            other => prop_assert!(false, "unexpected payload {:?}", other),
        }
    }
}

#[test]
fn deprecated_handshake_warns_but_negotiates() {
    let negotiator = ProtocolNegotiator::with_defaults();
    let handshake = json!({
        "protocol_version": "2024-10-07",
        "capabilities": {},
        "client_info": {"name": "desk", "version": "2.0"}
    });
    let issues = negotiator.validate_handshake(&handshake);
    assert!(!has_errors(&issues));
    assert_eq!(issues[0].code, "DEPRECATED_VERSION");

    let accepted = negotiator.negotiate_version("2024-10-07").unwrap();
    assert_eq!(accepted.status, VersionStatus::Deprecated);
}

#[test]
fn null_content_is_rejected() {
    let negotiator = ProtocolNegotiator::with_defaults();
    let issues = negotiator.validate_invocation_result(&json!({"content": null, "is_error": false}));
    assert!(has_errors(&issues));
}
