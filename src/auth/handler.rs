//! Shared authentication handler core.
//!
//! [`AuthenticationHandler`] owns the control flow every scheme shares:
//! one-time initialization, single-flight authentication, forwarding to other
//! schemes, and the default challenge/forbid responses. Concrete schemes plug
//! in through [`AuthenticationScheme`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use http::StatusCode;
use tracing::debug;

use crate::auth::context::HttpContext;
use crate::auth::diagnostics;
use crate::auth::error::AuthError;
use crate::auth::forward::resolve_target;
use crate::auth::options::{AuthenticationSchemeOptions, OptionsProvider, SchemeOptions};
use crate::auth::principal::Principal;
use crate::auth::properties::AuthenticationProperties;
use crate::auth::registry::{SchemeDescriptor, SchemeHandler};
use crate::auth::result::AuthenticateResult;

/// Events type of a scheme.
pub type SchemeEvents<S> = <<S as AuthenticationScheme>::Options as SchemeOptions>::Events;

type SharedAuthenticate = Shared<BoxFuture<'static, Result<AuthenticateResult, AuthError>>>;

/// Scheme-specific behavior plugged into [`AuthenticationHandler`].
///
/// Only `handle_authenticate` is required. It receives the bound
/// [`HandlerContext`] because it runs inside the shared single-flight
/// computation; the other hooks receive the handler itself so they can consult
/// the cached authenticate result.
pub trait AuthenticationScheme: Send + Sync + Sized + 'static {
    type Options: SchemeOptions;

    /// Authenticate the current request.
    ///
    /// Return `Ok(Failure)` for bad or missing credentials. `Err` is for
    /// unexpected conditions; it is cached like any other outcome.
    fn handle_authenticate<'a>(
        &'a self,
        bound: &'a HandlerContext<Self>,
    ) -> BoxFuture<'a, Result<AuthenticateResult, AuthError>>;

    /// Runs last during initialization, after options and events are bound.
    fn on_initialize<'a>(
        &'a self,
        _handler: &'a AuthenticationHandler<Self>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async { Ok(()) })
    }

    /// Events used when the options configure neither an instance nor a factory.
    fn create_default_events<'a>(
        &'a self,
        _context: &'a HttpContext,
    ) -> BoxFuture<'a, Result<Arc<SchemeEvents<Self>>, AuthError>> {
        Box::pin(async { Ok(Arc::default()) })
    }

    fn handle_challenge<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            handler.bound()?.context().set_status(StatusCode::UNAUTHORIZED);
            Ok(())
        })
    }

    fn handle_forbid<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            handler.bound()?.context().set_status(StatusCode::FORBIDDEN);
            Ok(())
        })
    }

    fn handle_sign_in<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _principal: Principal,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            let scheme = handler.bound()?.scheme_name().to_string();
            Err(AuthError::SignInNotSupported(scheme))
        })
    }

    fn handle_sign_out<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        _properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            let scheme = handler.bound()?.scheme_name().to_string();
            Err(AuthError::SignOutNotSupported(scheme))
        })
    }
}

/// State bound to a handler by `initialize`: the scheme descriptor, the
/// request, the options snapshot and the events object.
pub struct HandlerContext<S: AuthenticationScheme> {
    scheme: Arc<SchemeDescriptor>,
    context: Arc<HttpContext>,
    options: Arc<S::Options>,
    events: Arc<SchemeEvents<S>>,
}

impl<S: AuthenticationScheme> HandlerContext<S> {
    pub fn scheme(&self) -> &SchemeDescriptor {
        &self.scheme
    }

    pub fn scheme_name(&self) -> &str {
        self.scheme.name().as_str()
    }

    pub fn context(&self) -> &Arc<HttpContext> {
        &self.context
    }

    /// Scheme-specific options.
    pub fn options(&self) -> &S::Options {
        &self.options
    }

    /// Options shared by all schemes.
    pub fn scheme_options(&self) -> &AuthenticationSchemeOptions<SchemeEvents<S>> {
        self.options.scheme_options()
    }

    pub fn events(&self) -> &Arc<SchemeEvents<S>> {
        &self.events
    }

    /// Current time from the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.scheme_options().clock.now()
    }

    /// Issuer for claims created by this scheme.
    pub fn claims_issuer(&self) -> &str {
        self.scheme_options()
            .claims_issuer
            .as_deref()
            .unwrap_or_else(|| self.scheme_name())
    }

    /// Absolute URI of the current request.
    pub fn current_uri(&self) -> String {
        let query = self
            .context
            .query()
            .map(|q| format!("?{}", q))
            .unwrap_or_default();
        format!(
            "{}://{}{}{}{}",
            self.context.request_scheme(),
            self.context.host().unwrap_or_default(),
            self.context.original_path_base(),
            self.context.path(),
            query
        )
    }

    /// Absolute URI for `target_path` under the application's path base.
    pub fn build_redirect_uri(&self, target_path: &str) -> String {
        format!(
            "{}://{}{}{}",
            self.context.request_scheme(),
            self.context.host().unwrap_or_default(),
            self.context.original_path_base(),
            target_path
        )
    }

    /// Forward target for an operation whose own forward setting is `explicit`.
    pub fn resolve_target(&self, explicit: Option<&str>) -> Option<String> {
        resolve_target(
            self.scheme_name(),
            explicit,
            self.scheme_options(),
            &self.context,
        )
    }
}

/// Per-request handler for one scheme.
///
/// Create one per request, call [`initialize`](Self::initialize) exactly
/// once, then any of the operations in any order.
pub struct AuthenticationHandler<S: AuthenticationScheme> {
    scheme: Arc<S>,
    options_provider: Arc<dyn OptionsProvider<S::Options>>,
    bound: OnceLock<Arc<HandlerContext<S>>>,
    /// Single-assignment slot for the authenticate computation.
    authenticate_task: OnceLock<SharedAuthenticate>,
    outcome_logged: AtomicBool,
}

impl<S: AuthenticationScheme> AuthenticationHandler<S> {
    pub fn new(scheme: S, options_provider: Arc<dyn OptionsProvider<S::Options>>) -> Self {
        Self {
            scheme: Arc::new(scheme),
            options_provider,
            bound: OnceLock::new(),
            authenticate_task: OnceLock::new(),
            outcome_logged: AtomicBool::new(false),
        }
    }

    /// The scheme-specific implementation.
    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    pub fn is_initialized(&self) -> bool {
        self.bound.get().is_some()
    }

    /// State bound by `initialize`.
    pub fn bound(&self) -> Result<&HandlerContext<S>, AuthError> {
        self.bound
            .get()
            .map(|b| b.as_ref())
            .ok_or(AuthError::NotInitialized)
    }

    /// Bind the handler to a scheme and a request.
    ///
    /// Resolves options by scheme name, then the events object (options
    /// instance, else options factory, else the scheme default), then runs
    /// the scheme's `on_initialize` hook. Must be called exactly once; a
    /// second call fails with `AlreadyInitialized`.
    pub async fn initialize(
        &self,
        scheme: Arc<SchemeDescriptor>,
        context: Arc<HttpContext>,
    ) -> Result<(), AuthError> {
        if scheme.name().as_str().is_empty() {
            return Err(AuthError::InvalidArgument("scheme".to_string()));
        }
        if self.is_initialized() {
            return Err(AuthError::AlreadyInitialized(scheme.name().to_string()));
        }

        let options = self.options_provider.get(scheme.name().as_str());
        let events = self.resolve_events(&options, &context).await?;

        let name = scheme.name().to_string();
        let bound = Arc::new(HandlerContext {
            scheme,
            context,
            options,
            events,
        });
        self.bound
            .set(bound)
            .map_err(|_| AuthError::AlreadyInitialized(name.clone()))?;
        debug!("Initialized authentication handler for scheme {}", name);

        self.scheme.on_initialize(self).await
    }

    async fn resolve_events(
        &self,
        options: &S::Options,
        context: &HttpContext,
    ) -> Result<Arc<SchemeEvents<S>>, AuthError> {
        let common = options.scheme_options();
        if let Some(events) = &common.events {
            return Ok(Arc::clone(events));
        }
        if let Some(factory) = &common.events_factory {
            return Ok(factory(context));
        }
        self.scheme.create_default_events(context).await
    }

    /// Run the scheme's authenticate logic at most once and replay its outcome.
    ///
    /// Concurrent callers await the same computation. An `Err` from the
    /// scheme is cached and returned to every later caller.
    pub async fn authenticate_once(&self) -> Result<AuthenticateResult, AuthError> {
        let bound = Arc::clone(self.bound.get().ok_or(AuthError::NotInitialized)?);
        let task = self
            .authenticate_task
            .get_or_init(|| {
                let scheme = Arc::clone(&self.scheme);
                async move { scheme.handle_authenticate(&bound).await }
                    .boxed()
                    .shared()
            })
            .clone();
        task.await
    }

    /// Like [`authenticate_once`](Self::authenticate_once), but an `Err` is
    /// turned into a `Failure` result.
    pub async fn authenticate_once_safe(&self) -> AuthenticateResult {
        match self.authenticate_once().await {
            Ok(result) => result,
            Err(err) => AuthenticateResult::fail(err),
        }
    }

    /// Authenticate the request, forwarding if configured.
    pub async fn authenticate(&self) -> Result<AuthenticateResult, AuthError> {
        let bound = self.bound()?;
        let forward = bound.scheme_options().forward_authenticate.as_deref();
        if let Some(target) = bound.resolve_target(forward) {
            return bound
                .context()
                .authentication()?
                .authenticate(&target)
                .await;
        }

        let result = self.authenticate_once().await?;
        if !self.outcome_logged.swap(true, Ordering::AcqRel) {
            log_outcome(bound.scheme_name(), &result);
        }
        Ok(result)
    }

    /// Ask the client to authenticate, forwarding if configured.
    pub async fn challenge(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> Result<(), AuthError> {
        let bound = self.bound()?;
        let forward = bound.scheme_options().forward_challenge.as_deref();
        if let Some(target) = bound.resolve_target(forward) {
            return bound
                .context()
                .authentication()?
                .challenge(&target, properties)
                .await;
        }

        self.scheme
            .handle_challenge(self, properties.unwrap_or_default())
            .await?;
        diagnostics::challenged(bound.scheme_name());
        Ok(())
    }

    /// Reject an authenticated client, forwarding if configured.
    pub async fn forbid(&self, properties: Option<AuthenticationProperties>) -> Result<(), AuthError> {
        let bound = self.bound()?;
        let forward = bound.scheme_options().forward_forbid.as_deref();
        if let Some(target) = bound.resolve_target(forward) {
            return bound
                .context()
                .authentication()?
                .forbid(&target, properties)
                .await;
        }

        self.scheme
            .handle_forbid(self, properties.unwrap_or_default())
            .await?;
        diagnostics::forbidden(bound.scheme_name());
        Ok(())
    }

    /// Persist `principal` for later requests, forwarding if configured.
    pub async fn sign_in(
        &self,
        principal: Principal,
        properties: Option<AuthenticationProperties>,
    ) -> Result<(), AuthError> {
        let bound = self.bound()?;
        let forward = bound.scheme_options().forward_sign_in.as_deref();
        if let Some(target) = bound.resolve_target(forward) {
            return bound
                .context()
                .authentication()?
                .sign_in(&target, principal, properties)
                .await;
        }

        self.scheme
            .handle_sign_in(self, principal, properties.unwrap_or_default())
            .await?;
        diagnostics::signed_in(bound.scheme_name());
        Ok(())
    }

    /// Clear any persisted identity, forwarding if configured.
    pub async fn sign_out(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> Result<(), AuthError> {
        let bound = self.bound()?;
        let forward = bound.scheme_options().forward_sign_out.as_deref();
        if let Some(target) = bound.resolve_target(forward) {
            return bound
                .context()
                .authentication()?
                .sign_out(&target, properties)
                .await;
        }

        self.scheme
            .handle_sign_out(self, properties.unwrap_or_default())
            .await?;
        diagnostics::signed_out(bound.scheme_name());
        Ok(())
    }
}

fn log_outcome(scheme: &str, result: &AuthenticateResult) {
    match result {
        AuthenticateResult::Failure { error, .. } => {
            diagnostics::authentication_failed(scheme, &error.to_string())
        }
        AuthenticateResult::Success(_) => diagnostics::authenticated(scheme),
        AuthenticateResult::NoResult => diagnostics::not_authenticated(scheme),
    }
}

impl<S: AuthenticationScheme> SchemeHandler for AuthenticationHandler<S> {
    fn initialize(
        &self,
        scheme: Arc<SchemeDescriptor>,
        context: Arc<HttpContext>,
    ) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(AuthenticationHandler::initialize(self, scheme, context))
    }

    fn authenticate(&self) -> BoxFuture<'_, Result<AuthenticateResult, AuthError>> {
        Box::pin(AuthenticationHandler::authenticate(self))
    }

    fn challenge(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(AuthenticationHandler::challenge(self, properties))
    }

    fn forbid(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(AuthenticationHandler::forbid(self, properties))
    }

    fn sign_in(
        &self,
        principal: Principal,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(AuthenticationHandler::sign_in(self, principal, properties))
    }

    fn sign_out(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(AuthenticationHandler::sign_out(self, properties))
    }
}
