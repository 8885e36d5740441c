//! Finance Gateway - authenticated, circuit-protected tool access to the
//! account and transaction services.
//!
//! Every tool call is authenticated from a bearer token, authorized against
//! roles, capabilities and resource ownership, forwarded to a backend through
//! a circuit breaker with bounded retry, and checked for protocol compliance
//! on the way back out.

#![forbid(unsafe_code)]

pub mod auth;
pub mod authz;
pub mod backend;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod tools;

pub use auth::{Capability, Claims, Identity, Role, TokenAuthority, TokenIssuer};
pub use authz::{AuthDecision, PermissionEngine, RoleCapabilityMap};
pub use backend::{Backends, ClientSettings, ResilientClient};
pub use config::{Config, ConfigError};
pub use error::{AuthError, ErrorCode, GatewayError};
pub use observability::Telemetry;
pub use protocol::{ProtocolNegotiator, ToolResult};
pub use server::StdioServer;
pub use session::{GatewaySession, HandshakeResponse};
pub use tools::{ToolHandler, ToolRegistry};
