//! Reference authentication schemes built on the handler core.
//!
//! - **api_key**: static API keys, stored as SHA-256 hashes
//! - **bearer**: HS256-signed JWTs
//! - **policy**: forwards every operation to a scheme chosen per request

pub mod api_key;
pub mod bearer;
pub mod policy;

pub use api_key::{ApiKeyEntry, ApiKeyEvents, ApiKeyOptions, ApiKeyScheme, generate_api_key, hash_api_key};
pub use bearer::{BearerClaims, BearerEvents, BearerOptions, BearerScheme, encode_token};
pub use policy::{PolicyOptions, PolicyScheme, authorization_header_policy};
