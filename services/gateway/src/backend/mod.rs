//! Outbound calls to the account and transaction services.

pub mod client;

use std::sync::Arc;

use rust_common::PlatformError;
use serde_json::{Map, Value, json};

use crate::config::Config;
use crate::observability::Telemetry;

pub use client::{ClientSettings, ResilientClient};

pub const ACCOUNT_SERVICE: &str = "account-service";
pub const TRANSACTION_SERVICE: &str = "transaction-service";

/// The two backends every tool routes to, each with its own breaker.
#[derive(Debug, Clone)]
pub struct Backends {
    pub accounts: Arc<ResilientClient>,
    pub transactions: Arc<ResilientClient>,
}

impl Backends {
    #[must_use]
    pub const fn new(accounts: Arc<ResilientClient>, transactions: Arc<ResilientClient>) -> Self {
        Self {
            accounts,
            transactions,
        }
    }

    /// Build both clients from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP client cannot be built.
    pub fn from_config(config: &Config, telemetry: &Telemetry) -> Result<Self, PlatformError> {
        let settings = ClientSettings::from_config(config);
        let accounts = ResilientClient::new(
            ACCOUNT_SERVICE,
            config.account_service_url.clone(),
            settings.clone(),
            telemetry.clone(),
        )?;
        let transactions = ResilientClient::new(
            TRANSACTION_SERVICE,
            config.transaction_service_url.clone(),
            settings,
            telemetry.clone(),
        )?;
        Ok(Self::new(Arc::new(accounts), Arc::new(transactions)))
    }

    /// Breaker state of every backend, for health responses.
    #[must_use]
    pub fn health(&self) -> Value {
        let describe = |client: &ResilientClient| {
            let snapshot = client.circuit_snapshot();
            json!({
                "circuit_state": snapshot.state.as_str(),
                "failure_count": snapshot.failure_count,
                "consecutive_successes": snapshot.consecutive_successes,
                "half_open_call_count": snapshot.half_open_call_count,
            })
        };
        let mut health = Map::new();
        for client in [&self.accounts, &self.transactions] {
            health.insert(client.name().to_string(), describe(client.as_ref()));
        }
        Value::Object(health)
    }
}
