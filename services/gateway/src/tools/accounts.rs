//! Account service tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::auth::Capability;
use crate::error::GatewayError;
use crate::tools::{ToolContext, ToolHandler, ToolOutput, object_schema, string_arg};

const ACCOUNTS: &str = "accounts";

pub(crate) fn tools() -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(CreateAccount),
        Arc::new(GetAccount),
        Arc::new(ListAccounts),
        Arc::new(UpdateAccount),
        Arc::new(CloseAccount),
    ]
}

/// Owner recorded on an account document.
pub(crate) fn owner_of(account: &Value) -> Option<&str> {
    account.get("owner_id").and_then(Value::as_str)
}

pub(crate) async fn fetch_account(
    ctx: &ToolContext<'_>,
    account_id: &str,
) -> Result<Value, GatewayError> {
    ctx.backends
        .accounts
        .get(&[ACCOUNTS, account_id], &[], Some(ctx.token), ctx.cancel)
        .await
}

/// Self-service callers may only touch accounts they own.
///
/// Privileged callers skip the lookup entirely.
pub(crate) async fn ensure_account_access(
    ctx: &ToolContext<'_>,
    capability: &Capability,
    account_id: &str,
) -> Result<(), GatewayError> {
    if !ctx.identity.is_self_service() {
        return Ok(());
    }
    let account = fetch_account(ctx, account_id).await?;
    ctx.ensure_owner(capability, owner_of(&account))
}

pub struct CreateAccount;

#[async_trait]
impl ToolHandler for CreateAccount {
    fn name(&self) -> &'static str {
        "create_account"
    }

    fn description(&self) -> &'static str {
        "Open a new account"
    }

    fn required_capability(&self) -> Capability {
        Capability::ACCOUNT_CREATE
    }

    fn resource_owner(&self, arguments: &Map<String, Value>) -> Option<String> {
        string_arg(arguments, "owner_id")
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "owner_id": {"type": "string", "description": "Defaults to the caller"},
                "account_type": {"type": "string", "enum": ["checking", "savings", "credit"]},
                "currency": {"type": "string", "default": "USD"},
                "initial_balance": {"type": "number", "minimum": 0},
            }),
            &["account_type"],
        )
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        ctx.require_str("account_type")?;
        if let Some(balance) = ctx.arguments.get("initial_balance") {
            if !balance.as_f64().is_some_and(|b| b >= 0.0) {
                return Err(GatewayError::validation(
                    "initial_balance must be a non-negative number",
                ));
            }
        }

        let mut body = ctx.body_without(&[]);
        if ctx.optional_str("owner_id").is_none() {
            body["owner_id"] = Value::String(ctx.identity.user_id().to_string());
        }

        let account = ctx
            .backends
            .accounts
            .post(&[ACCOUNTS], &body, Some(ctx.token), ctx.cancel)
            .await?;
        Ok(ToolOutput::new("Account created successfully", account))
    }
}

pub struct GetAccount;

#[async_trait]
impl ToolHandler for GetAccount {
    fn name(&self) -> &'static str {
        "get_account"
    }

    fn description(&self) -> &'static str {
        "Fetch one account by id"
    }

    fn required_capability(&self) -> Capability {
        Capability::ACCOUNT_READ
    }

    fn input_schema(&self) -> Value {
        object_schema(json!({"account_id": {"type": "string"}}), &["account_id"])
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        let account_id = ctx.require_str("account_id")?;
        let account = fetch_account(ctx, account_id).await?;
        // Owner is only known once the account is loaded
        ctx.ensure_owner(&Capability::ACCOUNT_READ, owner_of(&account))?;
        Ok(ToolOutput::new("Account retrieved successfully", account))
    }
}

pub struct ListAccounts;

#[async_trait]
impl ToolHandler for ListAccounts {
    fn name(&self) -> &'static str {
        "list_accounts"
    }

    fn description(&self) -> &'static str {
        "List accounts, optionally filtered by owner and status"
    }

    fn required_capability(&self) -> Capability {
        Capability::ACCOUNT_LIST
    }

    fn resource_owner(&self, arguments: &Map<String, Value>) -> Option<String> {
        string_arg(arguments, "owner_id")
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "owner_id": {"type": "string", "description": "Self-service callers always list their own"},
                "status": {"type": "string", "enum": ["active", "frozen", "closed"]},
            }),
            &[],
        )
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        let owner_id = ctx.optional_str("owner_id").or_else(|| {
            ctx.identity
                .is_self_service()
                .then(|| ctx.identity.user_id())
        });

        let mut query = Vec::new();
        if let Some(owner_id) = owner_id {
            query.push(("owner_id", owner_id));
        }
        if let Some(status) = ctx.optional_str("status") {
            query.push(("status", status));
        }

        let accounts = ctx
            .backends
            .accounts
            .get(&[ACCOUNTS], &query, Some(ctx.token), ctx.cancel)
            .await?;
        Ok(ToolOutput::new("Accounts retrieved successfully", accounts))
    }
}

pub struct UpdateAccount;

#[async_trait]
impl ToolHandler for UpdateAccount {
    fn name(&self) -> &'static str {
        "update_account"
    }

    fn description(&self) -> &'static str {
        "Change mutable fields of an account"
    }

    fn required_capability(&self) -> Capability {
        Capability::ACCOUNT_UPDATE
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "account_id": {"type": "string"},
                "status": {"type": "string", "enum": ["active", "frozen"]},
                "nickname": {"type": "string"},
            }),
            &["account_id"],
        )
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        let account_id = ctx.require_str("account_id")?;
        let body = ctx.body_without(&["account_id"]);
        if body.as_object().is_none_or(Map::is_empty) {
            return Err(GatewayError::validation("no fields to update"));
        }

        ensure_account_access(ctx, &Capability::ACCOUNT_UPDATE, account_id).await?;
        let account = ctx
            .backends
            .accounts
            .put(&[ACCOUNTS, account_id], &body, Some(ctx.token), ctx.cancel)
            .await?;
        Ok(ToolOutput::new("Account updated successfully", account))
    }
}

pub struct CloseAccount;

#[async_trait]
impl ToolHandler for CloseAccount {
    fn name(&self) -> &'static str {
        "close_account"
    }

    fn description(&self) -> &'static str {
        "Close an account"
    }

    fn required_capability(&self) -> Capability {
        Capability::ACCOUNT_CLOSE
    }

    fn input_schema(&self) -> Value {
        object_schema(json!({"account_id": {"type": "string"}}), &["account_id"])
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        let account_id = ctx.require_str("account_id")?;
        ensure_account_access(ctx, &Capability::ACCOUNT_CLOSE, account_id).await?;

        let closed = ctx
            .backends
            .accounts
            .delete(&[ACCOUNTS, account_id], Some(ctx.token), ctx.cancel)
            .await?;
        let data = if closed.is_null() {
            json!({"account_id": account_id, "status": "closed"})
        } else {
            closed
        };
        Ok(ToolOutput::new("Account closed successfully", data))
    }
}
