//! Per-request authentication handler core.
//!
//! A request is authenticated by one or more named schemes. Each scheme is a
//! type implementing [`AuthenticationScheme`], wrapped in an
//! [`AuthenticationHandler`] that supplies the behavior every scheme shares:
//!
//! - **Initialization**: binds the scheme descriptor, request context, options
//!   snapshot and events object once per request
//! - **Single-flight authenticate**: the scheme logic runs at most once per
//!   request; every caller sees the same cached outcome
//! - **Forwarding**: any operation can be delegated to another scheme by name,
//!   never to the scheme itself
//! - **Challenge/forbid**: default 401/403 responses with diagnostics
//!
//! ## Usage
//!
//! ```ignore
//! let registry = Arc::new(
//!     SchemeRegistry::new()
//!         .add_scheme(SchemeDescriptor::new("api-key"), api_key_options, ApiKeyScheme::new)
//!         .with_default_scheme("api-key"),
//! );
//!
//! // Per request
//! let context = Arc::new(HttpContext::new(parts));
//! let auth = RequestAuthentication::new(registry.clone(), context)?;
//! let result = auth.authenticate_default().await?;
//! ```

mod context;
mod diagnostics;
mod error;
mod forward;
mod handler;
mod options;
mod principal;
mod properties;
mod registry;
mod result;

#[cfg(test)]
mod test_support;

pub use context::{HttpContext, OriginalPath, ResponseState};
pub use error::AuthError;
pub use forward::resolve_target;
pub use handler::{AuthenticationHandler, AuthenticationScheme, HandlerContext, SchemeEvents};
pub use options::{
    AuthenticationSchemeOptions, Clock, EventsFactory, ForwardSelector, OptionsMonitor,
    OptionsProvider, SchemeOptions, SystemClock,
};
pub use principal::{Claim, Identity, Principal, claim_types};
pub use properties::AuthenticationProperties;
pub use registry::{
    AuthenticationService, HandlerFactory, RequestAuthentication, SchemeDescriptor,
    SchemeHandler, SchemeRegistry,
};
pub use result::{AuthenticateResult, AuthenticationTicket};
