//! Gateway session: the pipeline every tool call goes through.
//!
//! Stages run in a fixed order and any of them may short-circuit to an error
//! envelope:
//!
//! 1. structural validation of the invocation and tool lookup
//! 2. identity extraction from `arguments.auth_token`
//! 3. permission check
//! 4. tool execution, bounded by the call deadline and the caller's token
//! 5. structural validation of the outbound result
//! 6. envelope with a fresh request id

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use rust_common::PlatformError;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, field, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{TokenAuthority, strip_bearer};
use crate::authz::PermissionEngine;
use crate::backend::Backends;
use crate::config::Config;
use crate::error::{AuthError, ErrorCode, GatewayError};
use crate::observability::Telemetry;
use crate::protocol::compliance::{self, ComplianceIssue, Severity};
use crate::protocol::{ProtocolNegotiator, ToolResult, has_errors};
use crate::tools::{AUTH_TOKEN_ARG, ToolContext, ToolDescriptor, ToolOutput, ToolRegistry};

/// Default bound on a whole tool call, retries included.
pub const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(30);

/// Label used for calls that never resolved to a registered tool.
const UNKNOWN_TOOL: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Answer to a successful handshake.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeResponse {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    pub capabilities: Value,
    /// Warnings and notes raised while checking the handshake
    pub issues: Vec<ComplianceIssue>,
}

/// Composition root wiring authentication, authorization, backends and
/// protocol checks together.
pub struct GatewaySession {
    authority: Arc<TokenAuthority>,
    permissions: PermissionEngine,
    negotiator: ProtocolNegotiator,
    backends: Backends,
    tools: ToolRegistry,
    telemetry: Telemetry,
    call_deadline: Duration,
    server_info: ServerInfo,
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("tools", &self.tools)
            .field("backends", &self.backends)
            .field("call_deadline", &self.call_deadline)
            .finish_non_exhaustive()
    }
}

/// Builder for [`GatewaySession`].
#[derive(Debug)]
pub struct GatewaySessionBuilder {
    authority: TokenAuthority,
    backends: Backends,
    permissions: PermissionEngine,
    negotiator: ProtocolNegotiator,
    tools: ToolRegistry,
    telemetry: Telemetry,
    call_deadline: Duration,
}

impl GatewaySessionBuilder {
    #[must_use]
    pub fn permissions(mut self, permissions: PermissionEngine) -> Self {
        self.permissions = permissions;
        self
    }

    #[must_use]
    pub fn negotiator(mut self, negotiator: ProtocolNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    #[must_use]
    pub const fn call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = deadline;
        self
    }

    #[must_use]
    pub fn build(self) -> GatewaySession {
        GatewaySession {
            authority: Arc::new(self.authority),
            permissions: self.permissions,
            negotiator: self.negotiator,
            backends: self.backends,
            tools: self.tools,
            telemetry: self.telemetry,
            call_deadline: self.call_deadline,
            server_info: ServerInfo::default(),
        }
    }
}

impl GatewaySession {
    /// Start a session with the standard permissions, protocol registry and
    /// built-in tools.
    #[must_use]
    pub fn builder(authority: TokenAuthority, backends: Backends) -> GatewaySessionBuilder {
        GatewaySessionBuilder {
            authority,
            backends,
            permissions: PermissionEngine::default(),
            negotiator: ProtocolNegotiator::with_defaults(),
            tools: ToolRegistry::with_builtin_tools(),
            telemetry: Telemetry::noop(),
            call_deadline: DEFAULT_CALL_DEADLINE,
        }
    }

    /// Wire a session from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend HTTP client cannot be built.
    pub fn from_config(config: &Config, telemetry: Telemetry) -> Result<Self, PlatformError> {
        let backends = Backends::from_config(config, &telemetry)?;
        Ok(Self::builder(TokenAuthority::from_config(config), backends)
            .telemetry(telemetry)
            .call_deadline(config.call_deadline)
            .build())
    }

    #[must_use]
    pub const fn backends(&self) -> &Backends {
        &self.backends
    }

    #[must_use]
    pub const fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.descriptors()
    }

    /// Breaker state of every backend.
    #[must_use]
    pub fn health(&self) -> Value {
        json!({
            "status": "ok",
            "backends": self.backends.health(),
        })
    }

    /// Check a client handshake and agree on a protocol version.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] carrying the error-level issues when the
    /// handshake is not compliant, or when no version can be agreed on.
    #[instrument(skip_all)]
    pub fn handshake(&self, message: &Value) -> Result<HandshakeResponse, GatewayError> {
        let issues = self.negotiator.validate_handshake(message);
        if has_errors(&issues) {
            warn!(issues = issues.len(), "Handshake rejected");
            return Err(GatewayError::Validation {
                message: "Handshake is not compliant".to_string(),
                details: Some(json!({ "issues": issues })),
            });
        }
        for issue in &issues {
            match issue.severity {
                Severity::Warning => warn!(code = %issue.code, "{}", issue.message),
                _ => debug!(code = %issue.code, "{}", issue.message),
            }
        }

        let requested = compliance::requested_version(message).unwrap_or_default();
        let version = self
            .negotiator
            .negotiate_version(requested)
            .ok_or_else(|| GatewayError::validation("No protocol version can be negotiated"))?;

        info!(requested = %requested, negotiated = %version.id, "Handshake complete");
        Ok(HandshakeResponse {
            protocol_version: version.id.clone(),
            server_info: self.server_info.clone(),
            capabilities: json!({
                "tools": { "list_changed": false },
                "cancellation": version.supports("cancellation"),
                "logging": version.supports("logging"),
            }),
            issues,
        })
    }

    /// Run one tool call through the whole pipeline.
    ///
    /// Never fails: every error becomes an error envelope.
    #[instrument(skip_all, fields(tool = field::Empty, request_id = field::Empty))]
    pub async fn invoke(&self, call: &Value, cancel: &CancellationToken) -> ToolResult {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let tool = call
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| self.tools.get(name).is_some())
            .unwrap_or(UNKNOWN_TOOL);
        let span = Span::current();
        span.record("tool", tool);
        span.record("request_id", request_id.as_str());

        let outcome = self.run(call, cancel).await;
        let (result, mut code) = match outcome {
            Ok(output) => (
                ToolResult::success(output.message, output.data, &request_id),
                None,
            ),
            Err(err) => {
                log_failure(&err);
                (ToolResult::error(&err, &request_id), Some(err.code()))
            }
        };

        let issues = self.negotiator.validate_invocation_result(&result.to_value());
        let result = if has_errors(&issues) {
            error!(?issues, "Tool produced a non-compliant result");
            let err = GatewayError::Internal(anyhow!("non-compliant result from {tool}"));
            code = Some(err.code());
            ToolResult::error(&err, &request_id)
        } else {
            result
        };

        let label = code.map_or("success", ErrorCode::as_str);
        self.telemetry.record_call(tool, label, started.elapsed());
        debug!(outcome = label, elapsed_ms = started.elapsed().as_millis(), "Tool call finished");
        result
    }

    async fn run(&self, call: &Value, cancel: &CancellationToken) -> Result<ToolOutput, GatewayError> {
        // 1. Structure and lookup
        let issues = self.negotiator.validate_invocation(call);
        if has_errors(&issues) {
            return Err(GatewayError::Validation {
                message: "Tool invocation is malformed".to_string(),
                details: Some(json!({ "issues": issues })),
            });
        }
        let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| GatewayError::validation(format!("Unknown tool: {name}")))?;
        let empty = Map::new();
        let arguments = call
            .get("arguments")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        // 2. Identity
        let token = arguments
            .get(AUTH_TOKEN_ARG)
            .and_then(Value::as_str)
            .map(|raw| strip_bearer(raw).trim())
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::TokenMissing)?;
        let identity = self.authority.extract_identity(token)?;

        // 3. Permission
        let capability = tool.required_capability();
        let owner = tool.resource_owner(arguments);
        let decision = self
            .permissions
            .authorize(&identity, &capability, owner.as_deref());
        if !decision.allowed {
            warn!(user_id = %identity.user_id(), capability = %capability, reason = %decision.reason, "Call denied");
            return Err(GatewayError::authorization(decision.reason));
        }

        // 4. Execution
        let ctx = ToolContext {
            identity: &identity,
            arguments,
            token,
            backends: &self.backends,
            permissions: &self.permissions,
            cancel,
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(GatewayError::Cancelled),
            result = tokio::time::timeout(self.call_deadline, tool.execute(&ctx)) => {
                result.unwrap_or_else(|_| Err(GatewayError::Timeout {
                    service: tool.name().to_string(),
                    duration: self.call_deadline,
                }))
            }
        }
    }
}

fn log_failure(err: &GatewayError) {
    match err {
        GatewayError::Internal(_) | GatewayError::Service { .. } => {
            error!(code = %err.code(), error = %err, "Tool call failed");
        }
        GatewayError::Cancelled => debug!("Tool call cancelled"),
        _ => warn!(code = %err.code(), error = %err, "Tool call failed"),
    }
}
