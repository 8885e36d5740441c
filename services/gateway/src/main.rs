//! Finance Gateway - Main Entry Point
//!
//! `finance-gateway [serve]` serves tool calls on stdio.
//! `finance-gateway issue-token <sub> <roles> [ttl_secs]` prints a signed
//! token for local testing.

use std::sync::Arc;

use anyhow::{Context, bail};
use finance_gateway::auth::{Claims, TokenIssuer};
use finance_gateway::config::Config;
use finance_gateway::observability::{LogAlertSink, PrometheusObserver, Telemetry};
use finance_gateway::server::StdioServer;
use finance_gateway::session::GatewaySession;
use finance_gateway::shutdown::wait_for_signal;
use rust_common::init_tracing;
use tokio::io::BufReader;
use tracing::info;

const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

const USAGE: &str = "usage: finance-gateway [serve] | issue-token <sub> <roles> [ttl_secs]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.tracing_config()).context("Failed to initialise tracing")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve(&config).await,
        Some("issue-token") => issue_token(&config, &args[1..]),
        Some(other) => bail!("unknown command `{other}`\n{USAGE}"),
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let observer = PrometheusObserver::new().context("Failed to register metrics")?;
    let telemetry = Telemetry::new(Arc::new(observer), Arc::new(LogAlertSink::new()));
    telemetry.open();

    let session = GatewaySession::from_config(config, telemetry.clone())
        .context("Failed to build backend clients")?;
    info!(
        account_service = %config.account_service_url,
        transaction_service = %config.transaction_service_url,
        tools = session.list_tools().len(),
        "Starting Finance Gateway"
    );

    let server = StdioServer::new(Arc::new(session), config.shutdown_timeout);
    let result = server
        .run(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            wait_for_signal(),
        )
        .await;

    telemetry.close();
    info!("Finance Gateway stopped");
    result
}

fn issue_token(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let [subject, roles, rest @ ..] = args else {
        bail!(USAGE);
    };
    let ttl = match rest.first() {
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("ttl_secs must be an integer, got `{raw}`"))?,
        None => DEFAULT_TOKEN_TTL_SECS,
    };

    let claims = Claims::new(subject.as_str(), ttl).with_roles(
        roles
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty()),
    );
    let token = TokenIssuer::from_config(config)
        .issue(&claims)
        .context("Failed to sign token")?;
    println!("{token}");
    Ok(())
}
