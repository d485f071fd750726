//! Scheme registry and per-request dispatch by scheme name.
//!
//! Provides a `SchemeHandler` trait for type-erased handlers, a
//! `SchemeRegistry` mapping names to handler factories, and
//! `RequestAuthentication`, which creates and caches one handler per scheme
//! for the lifetime of a request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::auth::context::HttpContext;
use crate::auth::error::AuthError;
use crate::auth::handler::{AuthenticationHandler, AuthenticationScheme};
use crate::auth::options::OptionsProvider;
use crate::auth::principal::Principal;
use crate::auth::properties::AuthenticationProperties;
use crate::auth::result::AuthenticateResult;
use crate::types::SchemeName;

/// Immutable description of a registered scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeDescriptor {
    name: SchemeName,
    display_name: Option<String>,
}

impl SchemeDescriptor {
    pub fn new(name: impl Into<SchemeName>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn name(&self) -> &SchemeName {
        &self.name
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

/// Type-erased per-request handler, as stored by the registry.
pub trait SchemeHandler: Send + Sync {
    fn initialize(
        &self,
        scheme: Arc<SchemeDescriptor>,
        context: Arc<HttpContext>,
    ) -> BoxFuture<'_, Result<(), AuthError>>;

    fn authenticate(&self) -> BoxFuture<'_, Result<AuthenticateResult, AuthError>>;

    fn challenge(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'_, Result<(), AuthError>>;

    fn forbid(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'_, Result<(), AuthError>>;

    fn sign_in(
        &self,
        principal: Principal,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'_, Result<(), AuthError>>;

    fn sign_out(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'_, Result<(), AuthError>>;
}

/// Dispatch of authentication operations by scheme name for one request.
///
/// Handlers forward through this surface.
pub trait AuthenticationService: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        scheme: &'a str,
    ) -> BoxFuture<'a, Result<AuthenticateResult, AuthError>>;

    fn challenge<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>>;

    fn forbid<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>>;

    fn sign_in<'a>(
        &'a self,
        scheme: &'a str,
        principal: Principal,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>>;

    fn sign_out<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>>;
}

/// Creates a fresh, uninitialized handler.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn SchemeHandler> + Send + Sync>;

#[derive(Clone)]
struct RegisteredScheme {
    descriptor: Arc<SchemeDescriptor>,
    factory: HandlerFactory,
}

/// Registry of authentication schemes and the default scheme per operation.
#[derive(Clone, Default)]
pub struct SchemeRegistry {
    schemes: HashMap<SchemeName, RegisteredScheme>,
    default_scheme: Option<String>,
    default_challenge_scheme: Option<String>,
    default_forbid_scheme: Option<String>,
}

impl SchemeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scheme whose handler is built from `make` and `options`.
    pub fn add_scheme<S, F>(
        self,
        descriptor: SchemeDescriptor,
        options: Arc<dyn OptionsProvider<S::Options>>,
        make: F,
    ) -> Self
    where
        S: AuthenticationScheme,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let factory: HandlerFactory = Arc::new(move || {
            Arc::new(AuthenticationHandler::new(make(), Arc::clone(&options))) as Arc<dyn SchemeHandler>
        });
        self.register(descriptor, factory)
    }

    /// Register a scheme with a type-erased handler factory.
    pub fn register(mut self, descriptor: SchemeDescriptor, factory: HandlerFactory) -> Self {
        let name = descriptor.name().clone();
        if self.schemes.contains_key(&name) {
            warn!("Replacing already registered authentication scheme {}", name);
        }
        self.schemes.insert(
            name,
            RegisteredScheme {
                descriptor: Arc::new(descriptor),
                factory,
            },
        );
        self
    }

    /// Scheme used for every operation without a more specific default.
    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = Some(scheme.into());
        self
    }

    pub fn with_default_challenge_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_challenge_scheme = Some(scheme.into());
        self
    }

    pub fn with_default_forbid_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_forbid_scheme = Some(scheme.into());
        self
    }

    pub fn descriptor(&self, scheme: &str) -> Option<Arc<SchemeDescriptor>> {
        self.schemes.get(scheme).map(|s| Arc::clone(&s.descriptor))
    }

    /// List all registered scheme names.
    pub fn scheme_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemes.keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.schemes.contains_key(scheme)
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    pub fn default_authenticate_scheme(&self) -> Option<&str> {
        self.default_scheme.as_deref()
    }

    /// Default challenge scheme, falling back to the default scheme.
    pub fn default_challenge_scheme(&self) -> Option<&str> {
        self.default_challenge_scheme
            .as_deref()
            .or_else(|| self.default_authenticate_scheme())
    }

    /// Default forbid scheme, falling back to the default challenge scheme.
    pub fn default_forbid_scheme(&self) -> Option<&str> {
        self.default_forbid_scheme
            .as_deref()
            .or_else(|| self.default_challenge_scheme())
    }

    /// Create a fresh handler for `scheme` without initializing it.
    fn create_handler(
        &self,
        scheme: &str,
    ) -> Result<(Arc<SchemeDescriptor>, Arc<dyn SchemeHandler>), AuthError> {
        let registered = self
            .schemes
            .get(scheme)
            .ok_or_else(|| AuthError::UnknownScheme(scheme.to_string()))?;
        Ok((
            Arc::clone(&registered.descriptor),
            (registered.factory)(),
        ))
    }
}

/// Authentication dispatcher for one request.
///
/// Each scheme gets at most one handler per request, created and initialized
/// on first use, so repeated and forwarded calls share its cached
/// authenticate result.
pub struct RequestAuthentication {
    registry: Arc<SchemeRegistry>,
    context: Arc<HttpContext>,
    handlers: Mutex<HashMap<String, Arc<HandlerSlot>>>,
}

type HandlerSlot = OnceCell<Arc<dyn SchemeHandler>>;

impl RequestAuthentication {
    /// Create the dispatcher and bind it to `context` for forwarding.
    pub fn new(
        registry: Arc<SchemeRegistry>,
        context: Arc<HttpContext>,
    ) -> Result<Arc<Self>, AuthError> {
        let this = Arc::new(Self {
            registry,
            context: Arc::clone(&context),
            handlers: Mutex::new(HashMap::new()),
        });
        let weak: Weak<dyn AuthenticationService> = Arc::downgrade(&this) as Weak<Self>;
        context.bind_authentication(weak)?;
        Ok(this)
    }

    pub fn context(&self) -> &Arc<HttpContext> {
        &self.context
    }

    pub fn registry(&self) -> &Arc<SchemeRegistry> {
        &self.registry
    }

    /// Handler for `scheme`, created and initialized on first use.
    ///
    /// Concurrent first callers wait for one initialization. The map lock is
    /// only held for the slot lookup, so an `on_initialize` hook may dispatch
    /// to other schemes of the same request. A hook dispatching to its own
    /// scheme waits on itself.
    pub async fn handler(&self, scheme: &str) -> Result<Arc<dyn SchemeHandler>, AuthError> {
        if !self.registry.contains(scheme) {
            return Err(AuthError::UnknownScheme(scheme.to_string()));
        }

        let slot = {
            let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(handlers.entry(scheme.to_string()).or_default())
        };

        let handler = slot
            .get_or_try_init(|| async move {
                let (descriptor, handler) = self.registry.create_handler(scheme)?;
                handler
                    .initialize(descriptor, Arc::clone(&self.context))
                    .await?;
                debug!("Created authentication handler for scheme {}", scheme);
                Ok::<_, AuthError>(handler)
            })
            .await?;
        Ok(Arc::clone(handler))
    }

    /// Authenticate with the registry's default scheme.
    pub async fn authenticate_default(&self) -> Result<AuthenticateResult, AuthError> {
        let scheme = self
            .registry
            .default_authenticate_scheme()
            .ok_or_else(|| AuthError::NoDefaultScheme("authenticate".to_string()))?;
        self.handler(scheme).await?.authenticate().await
    }

    /// Challenge with the registry's default challenge scheme.
    pub async fn challenge_default(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> Result<(), AuthError> {
        let scheme = self
            .registry
            .default_challenge_scheme()
            .ok_or_else(|| AuthError::NoDefaultScheme("challenge".to_string()))?;
        self.handler(scheme).await?.challenge(properties).await
    }

    /// Forbid with the registry's default forbid scheme.
    pub async fn forbid_default(
        &self,
        properties: Option<AuthenticationProperties>,
    ) -> Result<(), AuthError> {
        let scheme = self
            .registry
            .default_forbid_scheme()
            .ok_or_else(|| AuthError::NoDefaultScheme("forbid".to_string()))?;
        self.handler(scheme).await?.forbid(properties).await
    }
}

impl AuthenticationService for RequestAuthentication {
    fn authenticate<'a>(
        &'a self,
        scheme: &'a str,
    ) -> BoxFuture<'a, Result<AuthenticateResult, AuthError>> {
        Box::pin(async move { self.handler(scheme).await?.authenticate().await })
    }

    fn challenge<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move { self.handler(scheme).await?.challenge(properties).await })
    }

    fn forbid<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move { self.handler(scheme).await?.forbid(properties).await })
    }

    fn sign_in<'a>(
        &'a self,
        scheme: &'a str,
        principal: Principal,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            self.handler(scheme)
                .await?
                .sign_in(principal, properties)
                .await
        })
    }

    fn sign_out<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move { self.handler(scheme).await?.sign_out(properties).await })
    }
}
