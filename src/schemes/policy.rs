//! Forward-only policy scheme.
//!
//! A policy scheme has no credentials of its own. It picks another scheme per
//! request through `forward_default_selector` and `forward_default`, and
//! every operation is forwarded there.

use std::sync::Arc;

use futures::future::BoxFuture;
use http::header::AUTHORIZATION;

use crate::auth::{
    AuthError, AuthenticateResult, AuthenticationHandler, AuthenticationProperties,
    AuthenticationScheme, AuthenticationSchemeOptions, HandlerContext, HttpContext, Principal,
};

pub type PolicyOptions = AuthenticationSchemeOptions<()>;

/// Options forwarding requests with an `Authorization: <prefix> ...` header to
/// `scheme`, and everything else to `fallback`.
pub fn authorization_header_policy(
    prefix: impl Into<String>,
    scheme: impl Into<String>,
    fallback: Option<String>,
) -> PolicyOptions {
    let prefix = format!("{} ", prefix.into());
    let scheme = scheme.into();
    PolicyOptions {
        forward_default_selector: Some(Arc::new(move |context: &HttpContext| {
            context
                .header(AUTHORIZATION)
                .filter(|value| value.starts_with(prefix.as_str()))
                .map(|_| scheme.clone())
        })),
        forward_default: fallback,
        ..Default::default()
    }
}

#[derive(Debug, Default)]
pub struct PolicyScheme;

impl PolicyScheme {
    pub fn new() -> Self {
        Self
    }
}

fn no_target(scheme: &str) -> AuthError {
    AuthError::invalid_options(
        scheme,
        "policy scheme needs forward_default or a forward_default_selector that picks a scheme",
    )
}

impl AuthenticationScheme for PolicyScheme {
    type Options = PolicyOptions;

    fn handle_authenticate<'a>(
        &'a self,
        bound: &'a HandlerContext<Self>,
    ) -> BoxFuture<'a, Result<AuthenticateResult, AuthError>> {
        Box::pin(async move { Err(no_target(bound.scheme_name())) })
    }

    fn handle_challenge<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move { Err(no_target(handler.bound()?.scheme_name())) })
    }

    fn handle_forbid<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move { Err(no_target(handler.bound()?.scheme_name())) })
    }

    fn handle_sign_in<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _principal: Principal,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move { Err(no_target(handler.bound()?.scheme_name())) })
    }

    fn handle_sign_out<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move { Err(no_target(handler.bound()?.scheme_name())) })
    }
}
