//! Static API key scheme.
//!
//! Reads a key from a request header, hashes it with SHA-256 and looks the
//! hash up in the configured key list. Plain-text keys are never stored.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::auth::{
    AuthError, AuthenticateResult, AuthenticationHandler, AuthenticationProperties,
    AuthenticationScheme, AuthenticationSchemeOptions, AuthenticationTicket, Claim,
    HandlerContext, HttpContext, Identity, Principal, SchemeOptions, claim_types,
};
use crate::types::{ApiKeyHash, ApiKeyPrefix};

pub const DEFAULT_HEADER_NAME: &str = "X-API-Key";

/// Called after a key matched, before the ticket is issued. May add claims or
/// reject the request by returning an error.
pub type ValidatedHook =
    Arc<dyn Fn(&HttpContext, &mut Principal) -> Result<(), AuthError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ApiKeyEvents {
    pub on_validated: Option<ValidatedHook>,
}

impl fmt::Debug for ApiKeyEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyEvents")
            .field("on_validated", &self.on_validated.is_some())
            .finish()
    }
}

/// A key accepted by the scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyEntry {
    /// Name reported as the principal's name claim.
    pub name: String,
    pub key_hash: ApiKeyHash,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiKeyEntry {
    /// Entry for a plain-text key; only its hash is kept.
    pub fn from_key(name: impl Into<String>, key: &str) -> Self {
        Self {
            name: name.into(),
            key_hash: hash_api_key(key),
            roles: Vec::new(),
            expires_at: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiKeyOptions {
    pub common: AuthenticationSchemeOptions<ApiKeyEvents>,
    pub header_name: String,
    pub keys: Vec<ApiKeyEntry>,
}

impl Default for ApiKeyOptions {
    fn default() -> Self {
        Self {
            common: AuthenticationSchemeOptions::default(),
            header_name: DEFAULT_HEADER_NAME.to_string(),
            keys: Vec::new(),
        }
    }
}

impl ApiKeyOptions {
    pub fn with_key(mut self, entry: ApiKeyEntry) -> Self {
        self.keys.push(entry);
        self
    }
}

impl SchemeOptions for ApiKeyOptions {
    type Events = ApiKeyEvents;

    fn scheme_options(&self) -> &AuthenticationSchemeOptions<ApiKeyEvents> {
        &self.common
    }

    fn validate(&self, scheme: &str) -> Result<(), AuthError> {
        self.common.validate(scheme)?;
        HeaderName::from_bytes(self.header_name.as_bytes()).map_err(|_| {
            AuthError::invalid_options(
                scheme,
                format!("'{}' is not a valid header name", self.header_name),
            )
        })?;
        if self.keys.iter().any(|k| k.key_hash.as_str().is_empty()) {
            return Err(AuthError::invalid_options(scheme, "key hash must not be empty"));
        }
        Ok(())
    }
}

/// Authenticates requests carrying a configured API key.
#[derive(Debug, Default)]
pub struct ApiKeyScheme;

impl ApiKeyScheme {
    pub fn new() -> Self {
        Self
    }

    fn authenticate(bound: &HandlerContext<Self>) -> Result<AuthenticateResult, AuthError> {
        let options = bound.options();
        let Some(presented) = bound.context().header(options.header_name.as_str()) else {
            return Ok(AuthenticateResult::no_result());
        };
        let presented = presented.trim();
        if presented.is_empty() {
            return Ok(AuthenticateResult::fail(AuthError::MissingCredentials));
        }

        let key_hash = hash_api_key(presented);
        let Some(entry) = options.keys.iter().find(|k| k.key_hash == key_hash) else {
            return Ok(AuthenticateResult::fail(AuthError::InvalidCredentials));
        };

        let now = bound.now();
        if entry.expires_at.is_some_and(|expires| expires <= now) {
            return Ok(AuthenticateResult::fail(AuthError::Expired));
        }

        debug!("API key '{}' accepted by scheme {}", entry.name, bound.scheme_name());

        let issuer = bound.claims_issuer();
        let mut identity = Identity::new(bound.scheme_name())
            .with_claim(Claim::new(claim_types::NAME, entry.name.clone(), issuer))
            .with_claim(Claim::new(
                claim_types::NAME_IDENTIFIER,
                key_hash.as_str(),
                issuer,
            ));
        for role in &entry.roles {
            identity.add_claim(Claim::new(claim_types::ROLE, role.clone(), issuer));
        }
        let mut principal = Principal::new(identity);

        if let Some(hook) = &bound.events().on_validated
            && let Err(err) = hook(bound.context(), &mut principal)
        {
            return Ok(AuthenticateResult::fail(err));
        }

        let mut properties = AuthenticationProperties::new();
        properties.set_issued_utc(Some(now));
        properties.set_expires_utc(entry.expires_at);

        Ok(AuthenticateResult::success(AuthenticationTicket::new(
            principal,
            properties,
            bound.scheme_name(),
        )))
    }
}

impl AuthenticationScheme for ApiKeyScheme {
    type Options = ApiKeyOptions;

    fn handle_authenticate<'a>(
        &'a self,
        bound: &'a HandlerContext<Self>,
    ) -> BoxFuture<'a, Result<AuthenticateResult, AuthError>> {
        Box::pin(async move { Self::authenticate(bound) })
    }

    fn handle_challenge<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            let bound = handler.bound()?;
            let challenge = format!("ApiKey header=\"{}\"", bound.options().header_name);
            let value = HeaderValue::from_str(&challenge)
                .map_err(|e| AuthError::Scheme(e.to_string()))?;
            bound.context().set_status(StatusCode::UNAUTHORIZED);
            bound.context().set_response_header(WWW_AUTHENTICATE, value);
            Ok(())
        })
    }
}

/// Hash an API key for storage and lookup.
pub fn hash_api_key(key: &str) -> ApiKeyHash {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let result = hasher.finalize();
    ApiKeyHash::new(format!("{:x}", result))
}

/// Generate a new API key with the format: prefix_randompart
/// Returns (full_key, prefix, hash)
pub fn generate_api_key() -> (String, ApiKeyPrefix, ApiKeyHash) {
    use uuid::Uuid;

    let prefix = ApiKeyPrefix::new(format!("sa_{}", &Uuid::new_v4().simple().to_string()[..8]));
    let secret = Uuid::new_v4().simple().to_string();
    let full_key = format!("{}_{}", prefix, secret);
    let key_hash = hash_api_key(&full_key);

    (full_key, prefix, key_hash)
}
