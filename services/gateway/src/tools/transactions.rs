//! Transaction service tools.
//!
//! Transactions carry an `account_id`, not an owner, so self-service callers
//! are checked against the owning account.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::auth::Capability;
use crate::error::GatewayError;
use crate::tools::accounts::ensure_account_access;
use crate::tools::{ToolContext, ToolHandler, ToolOutput, object_schema};

const TRANSACTIONS: &str = "transactions";

const TRANSACTION_TYPES: &[&str] = &["deposit", "withdrawal", "transfer", "payment", "fee"];

pub(crate) fn tools() -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(CreateTransaction),
        Arc::new(GetTransaction),
        Arc::new(ListTransactions),
        Arc::new(ReverseTransaction),
    ]
}

async fn fetch_transaction(
    ctx: &ToolContext<'_>,
    transaction_id: &str,
) -> Result<Value, GatewayError> {
    ctx.backends
        .transactions
        .get(&[TRANSACTIONS, transaction_id], &[], Some(ctx.token), ctx.cancel)
        .await
}

/// Self-service callers may only touch transactions on accounts they own.
///
/// A transaction without an `account_id` cannot be traced to an owner and is
/// refused.
async fn ensure_transaction_access(
    ctx: &ToolContext<'_>,
    capability: &Capability,
    transaction: &Value,
) -> Result<(), GatewayError> {
    if !ctx.identity.is_self_service() {
        return Ok(());
    }
    let account_id = transaction
        .get("account_id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::authorization("Transaction has no owning account"))?;
    ensure_account_access(ctx, capability, account_id).await
}

pub struct CreateTransaction;

#[async_trait]
impl ToolHandler for CreateTransaction {
    fn name(&self) -> &'static str {
        "create_transaction"
    }

    fn description(&self) -> &'static str {
        "Post a transaction against an account"
    }

    fn required_capability(&self) -> Capability {
        Capability::TRANSACTION_CREATE
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "account_id": {"type": "string"},
                "amount": {"type": "number", "exclusiveMinimum": 0},
                "transaction_type": {"type": "string", "enum": TRANSACTION_TYPES},
                "target_account_id": {"type": "string", "description": "Required for transfers"},
                "description": {"type": "string"},
            }),
            &["account_id", "amount", "transaction_type"],
        )
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        let account_id = ctx.require_str("account_id")?;
        let kind = ctx.require_str("transaction_type")?;
        if !TRANSACTION_TYPES.contains(&kind) {
            return Err(GatewayError::validation(format!(
                "transaction_type must be one of {}",
                TRANSACTION_TYPES.join(", ")
            )));
        }
        if !ctx
            .arguments
            .get("amount")
            .and_then(Value::as_f64)
            .is_some_and(|amount| amount > 0.0)
        {
            return Err(GatewayError::validation("amount must be a positive number"));
        }
        if kind == "transfer" {
            ctx.require_str("target_account_id")?;
        }

        ensure_account_access(ctx, &Capability::TRANSACTION_CREATE, account_id).await?;
        let body = ctx.body_without(&[]);
        let transaction = ctx
            .backends
            .transactions
            .post(&[TRANSACTIONS], &body, Some(ctx.token), ctx.cancel)
            .await?;
        Ok(ToolOutput::new("Transaction created successfully", transaction))
    }
}

pub struct GetTransaction;

#[async_trait]
impl ToolHandler for GetTransaction {
    fn name(&self) -> &'static str {
        "get_transaction"
    }

    fn description(&self) -> &'static str {
        "Fetch one transaction by id"
    }

    fn required_capability(&self) -> Capability {
        Capability::TRANSACTION_READ
    }

    fn input_schema(&self) -> Value {
        object_schema(json!({"transaction_id": {"type": "string"}}), &["transaction_id"])
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        let transaction_id = ctx.require_str("transaction_id")?;
        let transaction = fetch_transaction(ctx, transaction_id).await?;
        ensure_transaction_access(ctx, &Capability::TRANSACTION_READ, &transaction).await?;
        Ok(ToolOutput::new("Transaction retrieved successfully", transaction))
    }
}

pub struct ListTransactions;

#[async_trait]
impl ToolHandler for ListTransactions {
    fn name(&self) -> &'static str {
        "list_transactions"
    }

    fn description(&self) -> &'static str {
        "List the transactions of an account"
    }

    fn required_capability(&self) -> Capability {
        Capability::TRANSACTION_LIST
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "account_id": {"type": "string"},
                "transaction_type": {"type": "string", "enum": TRANSACTION_TYPES},
            }),
            &["account_id"],
        )
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        let account_id = ctx.require_str("account_id")?;
        ensure_account_access(ctx, &Capability::TRANSACTION_LIST, account_id).await?;

        let mut query = vec![("account_id", account_id)];
        if let Some(kind) = ctx.optional_str("transaction_type") {
            query.push(("transaction_type", kind));
        }
        let transactions = ctx
            .backends
            .transactions
            .get(&[TRANSACTIONS], &query, Some(ctx.token), ctx.cancel)
            .await?;
        Ok(ToolOutput::new("Transactions retrieved successfully", transactions))
    }
}

pub struct ReverseTransaction;

#[async_trait]
impl ToolHandler for ReverseTransaction {
    fn name(&self) -> &'static str {
        "reverse_transaction"
    }

    fn description(&self) -> &'static str {
        "Reverse a posted transaction"
    }

    fn required_capability(&self) -> Capability {
        Capability::TRANSACTION_REVERSE
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "transaction_id": {"type": "string"},
                "reason": {"type": "string"},
            }),
            &["transaction_id", "reason"],
        )
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutput, GatewayError> {
        let transaction_id = ctx.require_str("transaction_id")?;
        let reason = ctx.require_str("reason")?;
        if ctx.identity.is_self_service() {
            let transaction = fetch_transaction(ctx, transaction_id).await?;
            ensure_transaction_access(ctx, &Capability::TRANSACTION_REVERSE, &transaction)
                .await?;
        }

        let reversal = ctx
            .backends
            .transactions
            .post(
                &[TRANSACTIONS, transaction_id, "reverse"],
                &json!({"reason": reason, "requested_by": ctx.identity.user_id()}),
                Some(ctx.token),
                ctx.cancel,
            )
            .await?;
        Ok(ToolOutput::new("Transaction reversed successfully", reversal))
    }
}
