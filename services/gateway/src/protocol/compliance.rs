//! Structural checks for inbound and outbound protocol messages.
//!
//! Checks never fail; they return a list of [`ComplianceIssue`]s. Only an
//! issue of [`Severity::Error`] should stop a call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::version::{VersionRegistry, VersionStatus};

/// How serious a compliance issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One finding from a structural check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

impl ComplianceIssue {
    fn new(severity: Severity, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    #[must_use]
    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    #[must_use]
    pub fn info(code: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Whether any issue must abort the call.
#[must_use]
pub fn has_errors(issues: &[ComplianceIssue]) -> bool {
    issues.iter().any(ComplianceIssue::is_error)
}

/// Look up a field under either its snake_case or camelCase name.
fn field<'a>(object: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    object.get(snake).or_else(|| object.get(camel))
}

/// The protocol version a handshake asks for, if it names one.
#[must_use]
pub fn requested_version(message: &Value) -> Option<&str> {
    message
        .as_object()
        .and_then(|object| field(object, "protocol_version", "protocolVersion"))
        .and_then(Value::as_str)
}

/// Check a handshake message.
///
/// Version, capabilities and client info are required; a missing client
/// version and a deprecated or unknown requested version are reported but
/// do not block the handshake.
#[must_use]
pub fn validate_handshake(message: &Value, registry: &VersionRegistry) -> Vec<ComplianceIssue> {
    let mut issues = Vec::new();
    let Some(object) = message.as_object() else {
        issues.push(ComplianceIssue::error(
            "INVALID_MESSAGE",
            "Handshake must be a JSON object",
        ));
        return issues;
    };

    match field(object, "protocol_version", "protocolVersion") {
        None | Some(Value::Null) => issues.push(ComplianceIssue::error(
            "MISSING_PROTOCOL_VERSION",
            "Handshake does not name a protocol version",
        )),
        Some(Value::String(requested)) if requested.trim().is_empty() => {
            issues.push(ComplianceIssue::error(
                "INVALID_PROTOCOL_VERSION",
                "Protocol version is empty",
            ));
        }
        Some(Value::String(requested)) => match registry.get(requested.trim()) {
            Some(version) if version.status == VersionStatus::Deprecated => {
                issues.push(ComplianceIssue::warning(
                    "DEPRECATED_VERSION",
                    format!("Protocol version {requested} is deprecated"),
                ));
            }
            Some(version) if version.status == VersionStatus::Unsupported => {
                issues.push(ComplianceIssue::warning(
                    "UNSUPPORTED_VERSION",
                    format!("Protocol version {requested} is no longer supported; a newer one will be negotiated"),
                ));
            }
            Some(_) => {}
            None => issues.push(ComplianceIssue::info(
                "UNKNOWN_VERSION",
                format!("Protocol version {requested} is unknown; the closest supported one will be negotiated"),
            )),
        },
        Some(_) => issues.push(ComplianceIssue::error(
            "INVALID_PROTOCOL_VERSION",
            "Protocol version must be a string",
        )),
    }

    match object.get("capabilities") {
        None | Some(Value::Null) => issues.push(ComplianceIssue::error(
            "MISSING_CAPABILITIES",
            "Handshake does not declare capabilities",
        )),
        Some(Value::Object(_)) => {}
        Some(_) => issues.push(ComplianceIssue::error(
            "INVALID_CAPABILITIES",
            "Capabilities must be an object",
        )),
    }

    match field(object, "client_info", "clientInfo") {
        None | Some(Value::Null) => issues.push(ComplianceIssue::error(
            "MISSING_CLIENT_INFO",
            "Handshake does not identify the client",
        )),
        Some(Value::Object(info)) => {
            match info.get("name") {
                Some(Value::String(name)) if !name.trim().is_empty() => {}
                _ => issues.push(ComplianceIssue::error(
                    "MISSING_CLIENT_NAME",
                    "Client info must carry a non-empty string name",
                )),
            }
            match info.get("version") {
                Some(Value::String(version)) if !version.trim().is_empty() => {}
                _ => issues.push(ComplianceIssue::warning(
                    "MISSING_CLIENT_VERSION",
                    "Client info does not carry a version string",
                )),
            }
        }
        Some(_) => issues.push(ComplianceIssue::error(
            "INVALID_CLIENT_INFO",
            "Client info must be an object",
        )),
    }

    issues
}

/// Check a tool invocation: a non-empty string `name` and, when present,
/// object `arguments`.
#[must_use]
pub fn validate_invocation(message: &Value) -> Vec<ComplianceIssue> {
    let mut issues = Vec::new();
    let Some(object) = message.as_object() else {
        issues.push(ComplianceIssue::error(
            "INVALID_MESSAGE",
            "Tool invocation must be a JSON object",
        ));
        return issues;
    };

    match object.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => {}
        Some(Value::String(_)) | None | Some(Value::Null) => issues.push(ComplianceIssue::error(
            "MISSING_TOOL_NAME",
            "Tool invocation does not name a tool",
        )),
        Some(_) => issues.push(ComplianceIssue::error(
            "INVALID_TOOL_NAME",
            "Tool name must be a string",
        )),
    }

    match object.get("arguments") {
        None | Some(Value::Null | Value::Object(_)) => {}
        Some(_) => issues.push(ComplianceIssue::error(
            "INVALID_ARGUMENTS",
            "Tool arguments must be an object",
        )),
    }

    issues
}

const CONTENT_TYPES: &[&str] = &["text", "image", "resource"];

/// Check an outbound tool result before it leaves the gateway.
#[must_use]
pub fn validate_invocation_result(result: &Value) -> Vec<ComplianceIssue> {
    let mut issues = Vec::new();
    let Some(object) = result.as_object() else {
        issues.push(ComplianceIssue::error(
            "INVALID_RESULT",
            "Tool result must be a JSON object",
        ));
        return issues;
    };

    let items = match object.get("content") {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => {
            issues.push(ComplianceIssue::error(
                "MISSING_CONTENT",
                "Tool result has no content list",
            ));
            return issues;
        }
        Some(_) => {
            issues.push(ComplianceIssue::error(
                "INVALID_CONTENT",
                "Tool result content must be a list",
            ));
            return issues;
        }
    };

    if items.is_empty() {
        issues.push(ComplianceIssue::info("EMPTY_CONTENT", "Tool result content is empty"));
    }

    for (index, item) in items.iter().enumerate() {
        check_content_item(index, item, &mut issues);
    }

    let flagged_error = field(object, "is_error", "isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if flagged_error && !has_structured_error(items) {
        issues.push(ComplianceIssue::warning(
            "UNSTRUCTURED_ERROR",
            "Error result should carry a JSON payload with an error_code",
        ));
    }

    issues
}

fn check_content_item(index: usize, item: &Value, issues: &mut Vec<ComplianceIssue>) {
    let Some(item) = item.as_object() else {
        issues.push(ComplianceIssue::error(
            "INVALID_CONTENT_ITEM",
            format!("Content item {index} must be an object"),
        ));
        return;
    };

    let kind = item.get("type").and_then(Value::as_str);
    match kind {
        Some("text") => {
            if !item.get("text").is_some_and(Value::is_string) {
                issues.push(ComplianceIssue::error(
                    "INVALID_TEXT_CONTENT",
                    format!("Text item {index} must carry a string text field"),
                ));
            }
        }
        Some("image") => {
            let has_data = item.get("data").is_some_and(Value::is_string);
            let has_mime = field(item, "mime_type", "mimeType").is_some_and(Value::is_string);
            if !has_data || !has_mime {
                issues.push(ComplianceIssue::warning(
                    "INCOMPLETE_IMAGE_CONTENT",
                    format!("Image item {index} should carry data and a mime type"),
                ));
            }
        }
        Some("resource") => {
            if item.get("resource").is_none_or(Value::is_null) {
                issues.push(ComplianceIssue::warning(
                    "INCOMPLETE_RESOURCE_CONTENT",
                    format!("Resource item {index} should carry a resource"),
                ));
            }
        }
        other => issues.push(ComplianceIssue::error(
            "UNKNOWN_CONTENT_TYPE",
            format!(
                "Content item {index} has type {:?}; expected one of {}",
                other.unwrap_or("<missing>"),
                CONTENT_TYPES.join(", ")
            ),
        )),
    }
}

/// First text item parses as JSON with a string `error_code`.
fn has_structured_error(items: &[Value]) -> bool {
    items
        .iter()
        .find(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .and_then(|item| item.get("text").and_then(Value::as_str))
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .is_some_and(|payload| payload.get("error_code").is_some_and(Value::is_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codes(issues: &[ComplianceIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn complete_handshake_is_clean() {
        let message = json!({
            "protocol_version": "2025-06-18",
            "capabilities": {},
            "client_info": {"name": "desk", "version": "1.2.0"}
        });
        assert!(validate_handshake(&message, &VersionRegistry::standard()).is_empty());
    }

    #[test]
    fn camel_case_handshake_is_accepted() {
        let message = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "clientInfo": {"name": "desk", "version": "0.1"}
        });
        assert!(validate_handshake(&message, &VersionRegistry::standard()).is_empty());
    }

    #[test]
    fn missing_required_fields_are_errors() {
        let issues = validate_handshake(&json!({}), &VersionRegistry::standard());
        assert!(has_errors(&issues));
        assert_eq!(
            codes(&issues),
            vec!["MISSING_PROTOCOL_VERSION", "MISSING_CAPABILITIES", "MISSING_CLIENT_INFO"]
        );
    }

    #[test]
    fn missing_client_version_is_warning() {
        let message = json!({
            "protocol_version": "2024-10-07",
            "capabilities": {},
            "client_info": {"name": "desk"}
        });
        let issues = validate_handshake(&message, &VersionRegistry::standard());
        assert!(!has_errors(&issues));
        assert_eq!(codes(&issues), vec!["DEPRECATED_VERSION", "MISSING_CLIENT_VERSION"]);
    }

    #[test]
    fn malformed_types_are_errors() {
        let message = json!({
            "protocol_version": 20250618,
            "capabilities": [],
            "client_info": "desk"
        });
        let issues = validate_handshake(&message, &VersionRegistry::standard());
        assert_eq!(
            codes(&issues),
            vec!["INVALID_PROTOCOL_VERSION", "INVALID_CAPABILITIES", "INVALID_CLIENT_INFO"]
        );
    }

    #[test]
    fn invocation_checks() {
        assert!(validate_invocation(&json!({"name": "get_account", "arguments": {}})).is_empty());
        assert!(validate_invocation(&json!({"name": "get_account"})).is_empty());
        assert_eq!(codes(&validate_invocation(&json!({"name": ""}))), vec!["MISSING_TOOL_NAME"]);
        assert_eq!(
            codes(&validate_invocation(&json!({"name": "x", "arguments": [1]}))),
            vec!["INVALID_ARGUMENTS"]
        );
        assert_eq!(codes(&validate_invocation(&json!("x"))), vec!["INVALID_MESSAGE"]);
    }

    #[test]
    fn result_with_null_content_is_error() {
        let issues = validate_invocation_result(&json!({"content": null}));
        assert_eq!(codes(&issues), vec!["MISSING_CONTENT"]);
    }

    #[test]
    fn result_item_checks() {
        let result = json!({
            "content": [
                {"type": "text", "text": "ok"},
                {"type": "text", "text": 5},
                {"type": "image", "data": "AAAA"},
                {"type": "resource"},
                {"type": "video"},
                "bare"
            ]
        });
        let issues = validate_invocation_result(&result);
        assert_eq!(
            codes(&issues),
            vec![
                "INVALID_TEXT_CONTENT",
                "INCOMPLETE_IMAGE_CONTENT",
                "INCOMPLETE_RESOURCE_CONTENT",
                "UNKNOWN_CONTENT_TYPE",
                "INVALID_CONTENT_ITEM"
            ]
        );
    }

    #[test]
    fn unstructured_error_result_is_only_a_warning() {
        let result = json!({"content": [{"type": "text", "text": "boom"}], "isError": true});
        let issues = validate_invocation_result(&result);
        assert!(!has_errors(&issues));
        assert_eq!(codes(&issues), vec!["UNSTRUCTURED_ERROR"]);

        let structured = json!({
            "content": [{"type": "text", "text": "{\"success\":false,\"error_code\":\"NOT_FOUND\"}"}],
            "is_error": true
        });
        assert!(validate_invocation_result(&structured).is_empty());
    }

    #[test]
    fn empty_content_is_info() {
        let issues = validate_invocation_result(&json!({"content": []}));
        assert_eq!(issues, vec![ComplianceIssue::info("EMPTY_CONTENT", "Tool result content is empty")]);
    }
}
