//! Per-scheme options and the monitor that serves them by scheme name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use crate::auth::context::HttpContext;
use crate::auth::error::AuthError;

/// Computes a forward target from the request.
pub type ForwardSelector = Arc<dyn Fn(&HttpContext) -> Option<String> + Send + Sync>;

/// Builds the events object for a request when no instance is configured.
pub type EventsFactory<E> = Arc<dyn Fn(&HttpContext) -> Arc<E> + Send + Sync>;

/// Time source for schemes that check expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Options shared by every authentication scheme.
///
/// `E` is the scheme's events type.
pub struct AuthenticationSchemeOptions<E> {
    /// Issuer for claims created by the scheme. Defaults to the scheme name.
    pub claims_issuer: Option<String>,
    /// Fallback forward target for every operation.
    pub forward_default: Option<String>,
    pub forward_authenticate: Option<String>,
    pub forward_challenge: Option<String>,
    pub forward_forbid: Option<String>,
    pub forward_sign_in: Option<String>,
    pub forward_sign_out: Option<String>,
    /// Dynamic forward target, consulted before `forward_default`.
    pub forward_default_selector: Option<ForwardSelector>,
    /// Events instance; wins over `events_factory`.
    pub events: Option<Arc<E>>,
    pub events_factory: Option<EventsFactory<E>>,
    pub clock: Arc<dyn Clock>,
}

impl<E> AuthenticationSchemeOptions<E> {
    /// Check forward settings for empty scheme names.
    pub fn validate(&self, scheme: &str) -> Result<(), AuthError> {
        let targets = [
            ("forward_default", &self.forward_default),
            ("forward_authenticate", &self.forward_authenticate),
            ("forward_challenge", &self.forward_challenge),
            ("forward_forbid", &self.forward_forbid),
            ("forward_sign_in", &self.forward_sign_in),
            ("forward_sign_out", &self.forward_sign_out),
        ];

        for (field, target) in targets {
            if target.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(AuthError::invalid_options(
                    scheme,
                    format!("{} must name a scheme", field),
                ));
            }
        }

        Ok(())
    }
}

impl<E> Default for AuthenticationSchemeOptions<E> {
    fn default() -> Self {
        Self {
            claims_issuer: None,
            forward_default: None,
            forward_authenticate: None,
            forward_challenge: None,
            forward_forbid: None,
            forward_sign_in: None,
            forward_sign_out: None,
            forward_default_selector: None,
            events: None,
            events_factory: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl<E> Clone for AuthenticationSchemeOptions<E> {
    fn clone(&self) -> Self {
        Self {
            claims_issuer: self.claims_issuer.clone(),
            forward_default: self.forward_default.clone(),
            forward_authenticate: self.forward_authenticate.clone(),
            forward_challenge: self.forward_challenge.clone(),
            forward_forbid: self.forward_forbid.clone(),
            forward_sign_in: self.forward_sign_in.clone(),
            forward_sign_out: self.forward_sign_out.clone(),
            forward_default_selector: self.forward_default_selector.clone(),
            events: self.events.clone(),
            events_factory: self.events_factory.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<E> fmt::Debug for AuthenticationSchemeOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationSchemeOptions")
            .field("claims_issuer", &self.claims_issuer)
            .field("forward_default", &self.forward_default)
            .field("forward_authenticate", &self.forward_authenticate)
            .field("forward_challenge", &self.forward_challenge)
            .field("forward_forbid", &self.forward_forbid)
            .field("forward_sign_in", &self.forward_sign_in)
            .field("forward_sign_out", &self.forward_sign_out)
            .field("forward_default_selector", &self.forward_default_selector.is_some())
            .field("events", &self.events.is_some())
            .field("events_factory", &self.events_factory.is_some())
            .finish()
    }
}

/// Options type of a scheme. Scheme-specific options embed
/// [`AuthenticationSchemeOptions`] and expose it through `scheme_options`.
pub trait SchemeOptions: Clone + Default + Send + Sync + 'static {
    /// Events object handed to the scheme's hooks.
    type Events: Default + Send + Sync + 'static;

    fn scheme_options(&self) -> &AuthenticationSchemeOptions<Self::Events>;

    /// Validate the options registered for `scheme`.
    fn validate(&self, scheme: &str) -> Result<(), AuthError> {
        self.scheme_options().validate(scheme)
    }
}

impl<E: Default + Send + Sync + 'static> SchemeOptions for AuthenticationSchemeOptions<E> {
    type Events = E;

    fn scheme_options(&self) -> &AuthenticationSchemeOptions<E> {
        self
    }
}

/// Source of options snapshots, keyed by scheme name.
pub trait OptionsProvider<O>: Send + Sync {
    /// Current options for `scheme`; unknown names yield defaults.
    fn get(&self, scheme: &str) -> Arc<O>;
}

/// Reloadable options store.
///
/// Every `get` returns the snapshot current at that moment, so a handler that
/// resolved its options keeps them for the rest of its request even if the
/// store is reloaded concurrently.
pub struct OptionsMonitor<O> {
    entries: watch::Sender<HashMap<String, Arc<O>>>,
}

impl<O: SchemeOptions> OptionsMonitor<O> {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self {
            entries: watch::Sender::new(HashMap::new()),
        }
    }

    /// Validate and store options for a scheme, replacing any previous value.
    pub fn configure(&self, scheme: &str, options: O) -> Result<(), AuthError> {
        options.validate(scheme)?;
        debug!("Configured options for scheme {}", scheme);
        self.entries.send_modify(|entries| {
            entries.insert(scheme.to_string(), Arc::new(options));
        });
        Ok(())
    }

    /// Apply `update` to a copy of the current options and store the result.
    pub fn update(&self, scheme: &str, update: impl FnOnce(&mut O)) -> Result<(), AuthError> {
        let mut options = (*self.get(scheme)).clone();
        update(&mut options);
        self.configure(scheme, options)
    }

    /// Drop options for a scheme so it falls back to defaults.
    pub fn remove(&self, scheme: &str) {
        self.entries.send_modify(|entries| {
            entries.remove(scheme);
        });
    }

    /// Subscribe to reload notifications.
    pub fn subscribe(&self) -> watch::Receiver<HashMap<String, Arc<O>>> {
        self.entries.subscribe()
    }
}

impl<O: SchemeOptions> Default for OptionsMonitor<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: SchemeOptions> OptionsProvider<O> for OptionsMonitor<O> {
    fn get(&self, scheme: &str) -> Arc<O> {
        self.entries
            .borrow()
            .get(scheme)
            .cloned()
            .unwrap_or_else(|| Arc::new(O::default()))
    }
}
