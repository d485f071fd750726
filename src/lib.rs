// Core modules
pub mod auth;
pub mod config;
pub mod schemes;
pub mod types;
pub mod api;

// Re-export key types and functions
pub use auth::{
    AuthError, AuthenticateResult, AuthenticationHandler, AuthenticationProperties,
    AuthenticationScheme, AuthenticationSchemeOptions, AuthenticationService,
    AuthenticationTicket, Claim, HttpContext, Identity, OptionsMonitor, Principal,
    RequestAuthentication, SchemeDescriptor, SchemeRegistry,
};
pub use config::{ConfiguredSchemes, SchemesConfig, load_schemes};
pub use schemes::{
    ApiKeyEntry, ApiKeyOptions, ApiKeyScheme, BearerClaims, BearerOptions, BearerScheme,
    PolicyOptions, PolicyScheme, encode_token, generate_api_key, hash_api_key,
};
pub use types::{ApiKeyHash, ApiKeyPrefix, SchemeName};
