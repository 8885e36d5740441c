//! Tool handlers: request marshaling from tool arguments to backend calls.
//!
//! Handlers never authenticate or check capabilities themselves; the session
//! does that before `execute` runs. A handler only adds ownership checks that
//! need backend data.

pub mod accounts;
pub mod transactions;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::{Capability, Identity};
use crate::authz::PermissionEngine;
use crate::backend::Backends;
use crate::error::GatewayError;

/// Argument carrying the caller's bearer token. Never forwarded in bodies.
pub const AUTH_TOKEN_ARG: &str = "auth_token";

/// What a handler hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub message: String,
    pub data: Value,
}

impl ToolOutput {
    #[must_use]
    pub fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// Everything a handler may use while executing one call.
pub struct ToolContext<'a> {
    pub identity: &'a Identity,
    pub arguments: &'a Map<String, Value>,
    /// Bearer token with any `Bearer ` prefix removed
    pub token: &'a str,
    pub backends: &'a Backends,
    pub permissions: &'a PermissionEngine,
    pub cancel: &'a CancellationToken,
}

impl fmt::Debug for ToolContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("user_id", &self.identity.user_id())
            .field("arguments", &self.arguments.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ToolContext<'_> {
    /// A non-empty string argument.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] when the argument is missing, blank or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str, GatewayError> {
        match self.arguments.get(key) {
            Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.trim()),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                Err(GatewayError::validation(format!("{key} is required")))
            }
            Some(_) => Err(GatewayError::validation(format!("{key} must be a string"))),
        }
    }

    /// A string argument that may be absent.
    #[must_use]
    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Ownership check against data fetched from a backend.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Authorization`] when the caller may not act on a
    /// resource owned by `owner_id`.
    pub fn ensure_owner(
        &self,
        capability: &Capability,
        owner_id: Option<&str>,
    ) -> Result<(), GatewayError> {
        let decision = self.permissions.authorize(self.identity, capability, owner_id);
        if decision.allowed {
            Ok(())
        } else {
            debug!(
                user_id = %self.identity.user_id(),
                capability = %capability,
                reason = %decision.reason,
                "Ownership check failed"
            );
            Err(GatewayError::authorization(decision.reason))
        }
    }

    /// Arguments as a JSON body, without the token and the named keys.
    #[must_use]
    pub fn body_without(&self, excluded: &[&str]) -> Value {
        let body = self
            .arguments
            .iter()
            .filter(|(key, _)| key.as_str() != AUTH_TOKEN_ARG && !excluded.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<Map<_, _>>();
        Value::Object(body)
    }
}

/// One tool exposed to clients.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Capability checked before [`execute`](Self::execute) runs.
    fn required_capability(&self) -> Capability;

    /// Owner of the addressed resource when it is known from the arguments.
    fn resource_owner(&self, _arguments: &Map<String, Value>) -> Option<String> {
        None
    }

    /// JSON schema of the tool's arguments.
    fn input_schema(&self) -> Value;

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError>;
}

/// Public description of a tool, as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub required_capability: String,
    pub input_schema: Value,
}

/// Tools keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn ToolHandler>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tools.keys()).finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The account and transaction tools.
    #[must_use]
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::empty();
        for tool in accounts::tools().into_iter().chain(transactions::tools()) {
            registry.register(tool);
        }
        registry
    }

    /// Add a tool, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name(), tool);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tools.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                required_capability: tool.required_capability().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }
}

/// Object schema with `auth_token` added to the properties and required list.
pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    let mut properties = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    properties.insert(
        AUTH_TOKEN_ARG.to_string(),
        json!({"type": "string", "description": "Bearer token of the caller"}),
    );
    let mut required: Vec<&str> = required.to_vec();
    required.push(AUTH_TOKEN_ARG);
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// String argument pulled straight from a raw argument map.
pub(crate) fn string_arg(arguments: &Map<String, Value>, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
