//! Authentication of inbound requests: bearer tokens and application ids

pub mod auth;
pub mod introspect;

pub use auth::{AllowList, AuthGate, Principal, TokenCache, extract_token};
pub use introspect::{DEFAULT_TOKENINFO_URL, HttpIntrospector, TokenInfo, TokenIntrospector};
