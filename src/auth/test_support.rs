//! Shared fixtures for the authentication tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use http::{HeaderValue, StatusCode};

use crate::auth::context::HttpContext;
use crate::auth::error::AuthError;
use crate::auth::handler::{AuthenticationHandler, AuthenticationScheme, HandlerContext, SchemeEvents};
use crate::auth::options::{AuthenticationSchemeOptions, OptionsMonitor};
use crate::auth::principal::{Claim, Identity, Principal};
use crate::auth::properties::AuthenticationProperties;
use crate::auth::registry::{AuthenticationService, SchemeDescriptor};
use crate::auth::result::{AuthenticateResult, AuthenticationTicket};

pub const TEST_SCHEME: &str = "test";

#[derive(Debug, Default)]
pub struct TestEvents {
    pub source: &'static str,
}

impl TestEvents {
    pub fn named(source: &'static str) -> Self {
        Self { source }
    }
}

pub type TestOptions = AuthenticationSchemeOptions<TestEvents>;

/// What the test scheme's authenticate hook does on each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Succeed with a "call" claim holding the run number.
    Counting,
    /// Yield once before succeeding like `Counting`.
    Yielding,
    /// Return `Err(Scheme("boom #n"))`.
    Erroring,
    /// Return a `Failure` with invalid credentials.
    Failing,
    NoResult,
    /// Succeed with a principal that has no identities.
    Anonymous,
}

/// Counters and recordings observed by tests.
#[derive(Debug, Default)]
pub struct Probe {
    pub authenticate_calls: AtomicUsize,
    pub initialized: AtomicUsize,
    pub default_events_created: AtomicUsize,
    pub fail_initialize: AtomicBool,
    pub challenges: Mutex<Vec<AuthenticationProperties>>,
    pub forbids: Mutex<Vec<AuthenticationProperties>>,
}

pub struct TestScheme {
    behavior: Behavior,
    probe: Probe,
    initialize_dispatch: Option<&'static str>,
}

impl TestScheme {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            probe: Probe::default(),
            initialize_dispatch: None,
        }
    }

    /// Authenticate `target` through the request's dispatcher from `on_initialize`.
    pub fn authenticating_on_initialize(mut self, target: &'static str) -> Self {
        self.initialize_dispatch = Some(target);
        self
    }
}

fn counted_success(bound: &HandlerContext<TestScheme>, call: usize) -> AuthenticateResult {
    let identity = Identity::new(bound.scheme_name()).with_claim(Claim::new(
        "call",
        call.to_string(),
        bound.claims_issuer(),
    ));
    AuthenticateResult::success(AuthenticationTicket::new(
        Principal::new(identity),
        AuthenticationProperties::new(),
        bound.scheme_name(),
    ))
}

impl AuthenticationScheme for TestScheme {
    type Options = TestOptions;

    fn handle_authenticate<'a>(
        &'a self,
        bound: &'a HandlerContext<Self>,
    ) -> BoxFuture<'a, Result<AuthenticateResult, AuthError>> {
        Box::pin(async move {
            let call = self.probe.authenticate_calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.behavior {
                Behavior::Counting => Ok(counted_success(bound, call)),
                Behavior::Yielding => {
                    tokio::task::yield_now().await;
                    Ok(counted_success(bound, call))
                }
                Behavior::Erroring => Err(AuthError::Scheme(format!("boom #{}", call))),
                Behavior::Failing => Ok(AuthenticateResult::fail(AuthError::InvalidCredentials)),
                Behavior::NoResult => Ok(AuthenticateResult::no_result()),
                Behavior::Anonymous => Ok(AuthenticateResult::success(AuthenticationTicket::new(
                    Principal::default(),
                    AuthenticationProperties::new(),
                    bound.scheme_name(),
                ))),
            }
        })
    }

    fn on_initialize<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            self.probe.initialized.fetch_add(1, Ordering::SeqCst);
            if self.probe.fail_initialize.load(Ordering::SeqCst) {
                let scheme = handler.bound()?.scheme_name().to_string();
                return Err(AuthError::invalid_options(scheme, "rejected by test"));
            }
            if let Some(target) = self.initialize_dispatch {
                let service = handler.bound()?.context().authentication()?;
                service.authenticate(target).await?;
            }
            Ok(())
        })
    }

    fn create_default_events<'a>(
        &'a self,
        _context: &'a HttpContext,
    ) -> BoxFuture<'a, Result<Arc<SchemeEvents<Self>>, AuthError>> {
        Box::pin(async move {
            self.probe.default_events_created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(TestEvents::named("scheme-default")))
        })
    }

    fn handle_challenge<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            let bound = handler.bound()?;
            self.probe.challenges.lock().unwrap().push(properties);
            bound.context().set_status(StatusCode::UNAUTHORIZED);
            bound.context().set_response_header(
                http::HeaderName::from_static("x-challenged-by"),
                HeaderValue::from_str(bound.scheme_name()).unwrap(),
            );
            Ok(())
        })
    }

    fn handle_forbid<'a>(
        &'a self,
        handler: &'a AuthenticationHandler<Self>,
        properties: AuthenticationProperties,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            let bound = handler.bound()?;
            self.probe.forbids.lock().unwrap().push(properties);
            bound.context().set_status(StatusCode::FORBIDDEN);
            Ok(())
        })
    }
}

impl AuthenticationHandler<TestScheme> {
    pub fn probe(&self) -> &Probe {
        &self.scheme().probe
    }
}

/// Scheme that relies on every default hook.
pub struct PlainScheme;

impl AuthenticationScheme for PlainScheme {
    type Options = TestOptions;

    fn handle_authenticate<'a>(
        &'a self,
        _bound: &'a HandlerContext<Self>,
    ) -> BoxFuture<'a, Result<AuthenticateResult, AuthError>> {
        Box::pin(async { Ok(AuthenticateResult::no_result()) })
    }
}

pub fn descriptor(name: &str) -> Arc<SchemeDescriptor> {
    Arc::new(SchemeDescriptor::new(name))
}

pub fn test_context(uri: &str) -> Arc<HttpContext> {
    let request = http::Request::get(uri)
        .header("Host", "localhost")
        .body(())
        .unwrap();
    Arc::new(HttpContext::from_request(request))
}

/// Uninitialized handler whose options are registered under [`TEST_SCHEME`].
pub fn test_handler(options: TestOptions, behavior: Behavior) -> AuthenticationHandler<TestScheme> {
    let monitor = Arc::new(OptionsMonitor::<TestOptions>::new());
    monitor.configure(TEST_SCHEME, options).unwrap();
    AuthenticationHandler::new(TestScheme::new(behavior), monitor)
}

pub async fn initialized_handler(
    options: TestOptions,
    behavior: Behavior,
) -> AuthenticationHandler<TestScheme> {
    let handler = test_handler(options, behavior);
    handler
        .initialize(descriptor(TEST_SCHEME), test_context("/"))
        .await
        .unwrap();
    handler
}

/// Initialized handler whose context forwards into a [`RecordingService`].
pub async fn forwarding_handler(
    options: TestOptions,
    behavior: Behavior,
) -> (AuthenticationHandler<TestScheme>, Arc<RecordingService>) {
    let context = test_context("/");
    let service = Arc::new(RecordingService::default());
    let weak = Arc::downgrade(&service);
    context.bind_authentication(weak).unwrap();

    let handler = test_handler(options, behavior);
    handler
        .initialize(descriptor(TEST_SCHEME), context)
        .await
        .unwrap();
    (handler, service)
}

/// Records forwarded operations as "op:target".
#[derive(Default)]
pub struct RecordingService {
    calls: Mutex<Vec<String>>,
    last_properties: Mutex<Option<Option<AuthenticationProperties>>>,
}

impl RecordingService {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_properties(&self) -> Option<Option<AuthenticationProperties>> {
        self.last_properties.lock().unwrap().clone()
    }

    fn record(&self, op: &str, scheme: &str, properties: Option<AuthenticationProperties>) {
        self.calls.lock().unwrap().push(format!("{}:{}", op, scheme));
        *self.last_properties.lock().unwrap() = Some(properties);
    }
}

impl AuthenticationService for RecordingService {
    fn authenticate<'a>(
        &'a self,
        scheme: &'a str,
    ) -> BoxFuture<'a, Result<AuthenticateResult, AuthError>> {
        self.record("authenticate", scheme, None);
        Box::pin(async { Ok(AuthenticateResult::no_result()) })
    }

    fn challenge<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.record("challenge", scheme, properties);
        Box::pin(async { Ok(()) })
    }

    fn forbid<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.record("forbid", scheme, properties);
        Box::pin(async { Ok(()) })
    }

    fn sign_in<'a>(
        &'a self,
        scheme: &'a str,
        _principal: Principal,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.record("sign_in", scheme, properties);
        Box::pin(async { Ok(()) })
    }

    fn sign_out<'a>(
        &'a self,
        scheme: &'a str,
        properties: Option<AuthenticationProperties>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.record("sign_out", scheme, properties);
        Box::pin(async { Ok(()) })
    }
}

/// Value of the "call" claim on a successful result.
pub fn call_claim(result: &AuthenticateResult) -> Option<String> {
    result
        .principal()
        .and_then(|p| p.find_first("call"))
        .map(|c| c.value.clone())
}

/// Captures formatted tracing output on the current thread.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    /// Route this thread's tracing output into the buffer until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let buffer = Arc::clone(&self.buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || CapturedWriter(Arc::clone(&buffer)))
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Number of log lines carrying `event="<name>"`.
    pub fn count_events(&self, name: &str) -> usize {
        self.contents()
            .matches(&format!("event=\"{}\"", name))
            .count()
    }
}
