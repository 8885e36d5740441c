//! Circuit-protected HTTP client for one backend service.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, Method};
use rust_common::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState, HttpConfig,
    PlatformError, RetryConfig, RetryPolicy, Transition, build_http_client, read_json_body,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::GatewayError;
use crate::observability::Telemetry;

/// Transport, breaker and retry settings for a [`ResilientClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub http: HttpConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

impl ClientSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: config.http_config(),
            circuit_breaker: config.circuit_breaker_config(),
            retry: config.retry_config(),
        }
    }
}

/// One outbound call, rebuilt for every attempt.
struct Outbound<'a> {
    method: Method,
    url: Url,
    query: &'a [(&'a str, &'a str)],
    body: Option<&'a Value>,
    bearer: Option<&'a str>,
}

/// HTTP client guarded by a circuit breaker and a bounded retry policy.
///
/// Retries wrap the breaker: every attempt asks the breaker for a permit, so
/// an open circuit stops a retry loop immediately. Only transient failures
/// (connection errors, 5xx, timeouts) are retried or counted against the
/// breaker; a backend answering 4xx is alive.
pub struct ResilientClient {
    name: String,
    base_url: Url,
    http: Client,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    telemetry: Telemetry,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("breaker", &self.breaker)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    /// Creates a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Internal`] if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        base_url: Url,
        settings: ClientSettings,
        telemetry: Telemetry,
    ) -> Result<Self, PlatformError> {
        let name = name.into();
        let http = build_http_client(&settings.http)
            .map_err(|err| PlatformError::Internal(format!("HTTP client for {name}: {err}")))?;

        Ok(Self {
            breaker: CircuitBreaker::new(name.clone(), settings.circuit_breaker),
            retry: RetryPolicy::new(settings.retry),
            attempt_timeout: settings.http.timeout,
            base_url: with_trailing_slash(base_url),
            http,
            telemetry,
            name,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    #[must_use]
    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    /// GET `segments` with optional query parameters.
    ///
    /// # Errors
    ///
    /// The classified [`GatewayError`] of the last attempt.
    pub async fn get(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        bearer: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, GatewayError> {
        self.send(Method::GET, segments, query, None, bearer, cancel).await
    }

    /// POST a JSON body to `segments`.
    ///
    /// # Errors
    ///
    /// The classified [`GatewayError`] of the last attempt.
    pub async fn post(
        &self,
        segments: &[&str],
        body: &Value,
        bearer: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, GatewayError> {
        self.send(Method::POST, segments, &[], Some(body), bearer, cancel).await
    }

    /// PUT a JSON body to `segments`.
    ///
    /// # Errors
    ///
    /// The classified [`GatewayError`] of the last attempt.
    pub async fn put(
        &self,
        segments: &[&str],
        body: &Value,
        bearer: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, GatewayError> {
        self.send(Method::PUT, segments, &[], Some(body), bearer, cancel).await
    }

    /// DELETE `segments`.
    ///
    /// # Errors
    ///
    /// The classified [`GatewayError`] of the last attempt.
    pub async fn delete(
        &self,
        segments: &[&str],
        bearer: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, GatewayError> {
        self.send(Method::DELETE, segments, &[], None, bearer, cancel).await
    }

    #[instrument(skip_all, fields(backend = %self.name, method = %method))]
    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<&Value>,
        bearer: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, GatewayError> {
        let outbound = Outbound {
            method,
            url: self.endpoint(segments)?,
            query,
            body,
            bearer,
        };

        self.retry
            .execute(cancel, |attempt| self.attempt(&outbound, attempt))
            .await
            .map_err(|err| {
                warn!(backend = %self.name, url = %outbound.url.path(), error = %err, "Backend call failed");
                GatewayError::from_backend(&self.name, err, self.attempt_timeout)
            })
    }

    /// Resolve path segments against the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                GatewayError::Internal(anyhow::anyhow!(
                    "backend {} has a base URL that cannot take a path",
                    self.name
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn attempt(&self, outbound: &Outbound<'_>, attempt: u32) -> Result<Value, PlatformError> {
        let permit = self
            .breaker
            .try_acquire()
            .map_err(|open| PlatformError::circuit_open(&self.name, open.retry_after))?;
        if let Some(transition) = permit.transition() {
            self.report(transition);
        }
        debug!(
            backend = %self.name,
            attempt,
            trial = permit.is_trial(),
            url = %outbound.url.path(),
            "Calling backend"
        );

        let outcome = match tokio::time::timeout(self.attempt_timeout, self.call(outbound)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::timeout(format!(
                "{} did not answer within {}ms",
                self.name,
                self.attempt_timeout.as_millis()
            ))),
        };

        let transition = match &outcome {
            Ok(_) => permit.record_success(),
            Err(err) if err.is_transient() => permit.record_failure(),
            Err(_) => {
                permit.discard();
                None
            }
        };
        if let Some(transition) = transition {
            self.report(transition);
        }
        outcome
    }

    async fn call(&self, outbound: &Outbound<'_>) -> Result<Value, PlatformError> {
        let mut request = self
            .http
            .request(outbound.method.clone(), outbound.url.clone());
        if !outbound.query.is_empty() {
            request = request.query(outbound.query);
        }
        if let Some(body) = outbound.body {
            request = request.json(body);
        }
        if let Some(token) = outbound.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        read_json_body(response).await
    }

    fn report(&self, transition: Transition) {
        match transition.to {
            CircuitState::Open => warn!(
                backend = %self.name,
                from = %transition.from,
                "Circuit opened"
            ),
            _ => info!(
                backend = %self.name,
                from = %transition.from,
                to = %transition.to,
                "Circuit state changed"
            ),
        }
        self.telemetry.circuit_transition(
            &self.name,
            transition,
            self.breaker.config().recovery_timeout,
        );
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
