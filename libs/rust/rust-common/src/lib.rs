//! Shared library for cross-cutting concerns in finance-platform Rust services.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration, building, and status classification
//! - Retry policies with exponential backoff and cancellation
//! - Circuit breaker pattern for resilience
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod error;
pub mod http;
pub mod retry;
pub mod tracing_config;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitSnapshot,
    CircuitState, Transition,
};
pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client, classify_status, read_json_body};
pub use retry::{RetryConfig, RetryPolicy};
pub use tracing_config::{TracingConfig, init_tracing};
