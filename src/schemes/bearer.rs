//! Bearer token scheme for HS256-signed JWTs.
//!
//! The signature, issuer and audience are checked by `jsonwebtoken`. Expiry is
//! checked against the options clock so tests and long-running servers see
//! the same notion of "now".

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{
    AuthError, AuthenticateResult, AuthenticationHandler, AuthenticationProperties,
    AuthenticationScheme, AuthenticationSchemeOptions, AuthenticationTicket, Claim,
    HandlerContext, HttpContext, Identity, Principal, SchemeOptions, claim_types,
};

/// Extracts the token from somewhere other than the Authorization header.
/// Returning `None` falls back to the header.
pub type MessageReceivedHook = Arc<dyn Fn(&HttpContext) -> Option<String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct BearerEvents {
    pub on_message_received: Option<MessageReceivedHook>,
}

impl fmt::Debug for BearerEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerEvents")
            .field("on_message_received", &self.on_message_received.is_some())
            .finish()
    }
}

/// JWT claims understood by the scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

#[derive(Clone)]
pub struct BearerOptions {
    pub common: AuthenticationSchemeOptions<BearerEvents>,
    /// Shared HS256 secret.
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Allowed clock skew when checking `exp`.
    pub leeway_seconds: i64,
}

impl Default for BearerOptions {
    fn default() -> Self {
        Self {
            common: AuthenticationSchemeOptions::default(),
            secret: String::new(),
            issuer: None,
            audience: None,
            leeway_seconds: 60,
        }
    }
}

impl fmt::Debug for BearerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerOptions")
            .field("common", &self.common)
            .field("secret", &"***")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl SchemeOptions for BearerOptions {
    type Events = BearerEvents;

    fn scheme_options(&self) -> &AuthenticationSchemeOptions<BearerEvents> {
        &self.common
    }

    fn validate(&self, scheme: &str) -> Result<(), AuthError> {
        self.common.validate(scheme)?;
        if self.secret.is_empty() {
            return Err(AuthError::invalid_options(scheme, "secret must not be empty"));
        }
        if self.leeway_seconds < 0 {
            return Err(AuthError::invalid_options(scheme, "leeway_seconds must not be negative"));
        }
        Ok(())
    }
}

/// Authenticates requests carrying `Authorization: Bearer <jwt>`.
#[derive(Debug, Default)]
pub struct BearerScheme;

impl BearerScheme {
    pub fn new() -> Self {
        Self
    }

    fn token(bound: &HandlerContext<Self>) -> Option<String> {
        if let Some(hook) = &bound.events().on_message_received
            && let Some(token) = hook(bound.context())
        {
            return Some(token);
        }

        bound
            .context()
            .header(AUTHORIZATION)
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
    }

    fn authenticate(bound: &HandlerContext<Self>) -> Result<AuthenticateResult, AuthError> {
        let options = bound.options();
        if options.secret.is_empty() {
            return Err(AuthError::invalid_options(
                bound.scheme_name(),
                "secret must not be empty",
            ));
        }

        let Some(token) = Self::token(bound) else {
            return Ok(AuthenticateResult::no_result());
        };
        if token.is_empty() {
            return Ok(AuthenticateResult::fail(AuthError::MissingCredentials));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        if let Some(issuer) = &options.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &options.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let key = DecodingKey::from_secret(options.secret.as_bytes());
        let claims = match decode::<BearerClaims>(&token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => return Ok(AuthenticateResult::fail(AuthError::InvalidToken(e.to_string()))),
        };

        let now = bound.now();
        let expires = claims.exp.and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0));
        if let Some(exp) = claims.exp
            && exp.saturating_add(options.leeway_seconds) <= now.timestamp()
        {
            return Ok(AuthenticateResult::fail(AuthError::Expired));
        }

        debug!("JWT verified successfully for subject: {}", claims.sub);

        let issuer = claims
            .iss
            .clone()
            .unwrap_or_else(|| bound.claims_issuer().to_string());
        let mut identity = Identity::new(bound.scheme_name()).with_claim(Claim::new(
            claim_types::NAME_IDENTIFIER,
            claims.sub.clone(),
            issuer.clone(),
        ));
        if let Some(name) = &claims.name {
            identity.add_claim(Claim::new(claim_types::NAME, name.clone(), issuer.clone()));
        }
        if let Some(email) = &claims.email {
            identity.add_claim(Claim::new(claim_types::EMAIL, email.clone(), issuer.clone()));
        }
        for role in &claims.roles {
            identity.add_claim(Claim::new(claim_types::ROLE, role.clone(), issuer.clone()));
        }

        let mut properties = AuthenticationProperties::new();
        properties.set_issued_utc(claims.iat.and_then(|iat| DateTime::<Utc>::from_timestamp(iat, 0)));
        properties.set_expires_utc(expires);

        Ok(AuthenticateResult::success(AuthenticationTicket::new(
            Principal::new(identity),
            properties,
            bound.scheme_name(),
        )))
    }
}

impl AuthenticationScheme for BearerScheme {
    type Options = BearerOptions;

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
            let result = handler.authenticate_once_safe().await;

            let challenge = match result.failure() {
                Some(AuthError::Expired) => {
                    "Bearer error=\"invalid_token\", error_description=\"The token expired\""
                        .to_string()
                }
                Some(AuthError::InvalidToken(_)) | Some(AuthError::InvalidCredentials) => {
                    "Bearer error=\"invalid_token\"".to_string()
                }
                _ => "Bearer".to_string(),
            };
            let value = HeaderValue::from_str(&challenge)
                .map_err(|e| AuthError::Scheme(e.to_string()))?;

            bound.context().set_status(StatusCode::UNAUTHORIZED);
            bound.context().append_response_header(WWW_AUTHENTICATE, value);
            Ok(())
        })
    }
}

/// Sign `claims` with the HS256 `secret`.
pub fn encode_token(secret: &str, claims: &BearerClaims) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Scheme(format!("Failed to sign token: {}", e)))
}
