//! Bearer token authentication.

pub mod authority;
pub mod claims;
pub mod identity;
pub mod token;

pub use authority::{TokenAuthority, TokenIssuer};
pub use claims::Claims;
pub use identity::{Capability, Identity, Role};
pub use token::{SignatureValidated, Token, TokenState, Unvalidated, Validated, strip_bearer};
