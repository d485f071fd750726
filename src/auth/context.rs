//! Request-scoped HTTP context handed to authentication handlers.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use http::header::{AsHeaderName, HOST};
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};

use crate::auth::error::AuthError;
use crate::auth::registry::AuthenticationService;

/// Path of the request as it was before any path rewriting, inserted as a
/// request extension by the middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalPath {
    pub path: String,
    pub path_base: String,
}

/// Response values written by challenge, forbid and sign-in hooks.
#[derive(Debug, Clone, Default)]
pub struct ResponseState {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// HTTP context for one request.
///
/// The request half is read-only. The response half is a small mutable slot
/// that hooks write status codes and headers into; the hosting layer turns it
/// into a real response.
pub struct HttpContext {
    request: Parts,
    response: Mutex<ResponseState>,
    /// Dispatcher used for forwarding. Weak so handlers cached by the
    /// dispatcher do not keep it alive through the context.
    authentication: OnceLock<Weak<dyn AuthenticationService>>,
}

impl HttpContext {
    /// Create a context from request parts.
    pub fn new(request: Parts) -> Self {
        Self {
            request,
            response: Mutex::new(ResponseState::default()),
            authentication: OnceLock::new(),
        }
    }

    /// Create a context from a body-less request.
    pub fn from_request(request: http::Request<()>) -> Self {
        let (parts, ()) = request.into_parts();
        Self::new(parts)
    }

    pub fn request(&self) -> &Parts {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    pub fn extensions(&self) -> &http::Extensions {
        &self.request.extensions
    }

    /// Get a request header as a string, ignoring values that are not visible ASCII.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Request scheme ("http" or "https").
    pub fn request_scheme(&self) -> &str {
        self.request.uri.scheme_str().unwrap_or("http")
    }

    /// Request host, from the URI authority or the Host header.
    pub fn host(&self) -> Option<&str> {
        self.request
            .uri
            .authority()
            .map(|a| a.as_str())
            .or_else(|| self.header(HOST))
    }

    pub fn path(&self) -> &str {
        self.request.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.request.uri.query()
    }

    /// Path before any rewriting, falling back to the current path.
    pub fn original_path(&self) -> &str {
        self.request
            .extensions
            .get::<OriginalPath>()
            .map(|p| p.path.as_str())
            .unwrap_or_else(|| self.path())
    }

    /// Path base before any rewriting; empty when the app is mounted at the root.
    pub fn original_path_base(&self) -> &str {
        self.request
            .extensions
            .get::<OriginalPath>()
            .map(|p| p.path_base.as_str())
            .unwrap_or("")
    }

    fn response_mut(&self) -> MutexGuard<'_, ResponseState> {
        self.response.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> StatusCode {
        self.response_mut().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.response_mut().status = status;
    }

    /// Replace a response header.
    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response_mut().headers.insert(name, value);
    }

    /// Add a response header, keeping existing values.
    pub fn append_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response_mut().headers.append(name, value);
    }

    /// Snapshot of the response written so far.
    pub fn response(&self) -> ResponseState {
        self.response_mut().clone()
    }

    /// Bind the dispatcher used to forward operations to other schemes.
    pub fn bind_authentication(
        &self,
        authentication: Weak<dyn AuthenticationService>,
    ) -> Result<(), AuthError> {
        self.authentication
            .set(authentication)
            .map_err(|_| AuthError::AlreadyInitialized("authentication dispatcher".to_string()))
    }

    /// Dispatcher bound to this request.
    pub fn authentication(&self) -> Result<Arc<dyn AuthenticationService>, AuthError> {
        self.authentication
            .get()
            .and_then(Weak::upgrade)
            .ok_or(AuthError::NoDispatcher)
    }
}

impl fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpContext")
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("status", &self.status())
            .field("has_dispatcher", &self.authentication.get().is_some())
            .finish()
    }
}
