// HTTP integration: authentication middleware, extractor and demo routes

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;
use tower::{Layer, Service, ServiceBuilder};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::auth::{
    AuthError, AuthenticateResult, HttpContext, OriginalPath, Principal, RequestAuthentication,
    SchemeRegistry,
};

/// Layer that authenticates every request with the registry's default scheme.
///
/// The request's [`RequestAuthentication`] is inserted as an extension so
/// handlers can challenge, forbid or authenticate with other schemes. A
/// successfully authenticated [`Principal`] is inserted as well.
///
/// # Example
/// ```ignore
/// router = router.layer(AuthenticationLayer::new(registry));
/// ```
#[derive(Clone)]
pub struct AuthenticationLayer {
    registry: Arc<SchemeRegistry>,
}

impl AuthenticationLayer {
    pub fn new(registry: Arc<SchemeRegistry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for AuthenticationLayer {
    type Service = AuthenticationMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticationMiddleware {
            inner,
            registry: self.registry.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthenticationMiddleware<S> {
    inner: S,
    registry: Arc<SchemeRegistry>,
}

impl<S> Service<Request<Body>> for AuthenticationMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let registry = self.registry.clone();
        let not_ready_inner = self.inner.clone();
        let mut ready_inner = std::mem::replace(&mut self.inner, not_ready_inner);

        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            if parts.extensions.get::<OriginalPath>().is_none() {
                let path = parts.uri.path().to_string();
                parts.extensions.insert(OriginalPath {
                    path,
                    path_base: String::new(),
                });
            }

            let context = Arc::new(HttpContext::new(parts.clone()));
            let auth = match RequestAuthentication::new(registry, context) {
                Ok(auth) => auth,
                Err(err) => return Ok(error_response(&err)),
            };

            match auth.authenticate_default().await {
                Ok(AuthenticateResult::Success(ticket)) => {
                    parts.extensions.insert(ticket.principal().clone());
                }
                Ok(_) | Err(AuthError::NoDefaultScheme(_)) => {}
                Err(err) => {
                    warn!("Authentication failed unexpectedly: {}", err);
                    return Ok(error_response(&err));
                }
            }

            parts.extensions.insert(auth);
            ready_inner.call(Request::from_parts(parts, body)).await
        })
    }
}

/// Extractor for the authenticated principal.
///
/// Rejects unauthenticated requests with the default challenge scheme's
/// response.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(AuthenticatedUser(principal.clone()));
        }

        let auth = parts
            .extensions
            .get::<Arc<RequestAuthentication>>()
            .cloned()
            .ok_or_else(|| error_response(&AuthError::NoDispatcher))?;

        Err(challenge(&auth).await)
    }
}

/// Run the default challenge and turn it into a response.
pub async fn challenge(auth: &RequestAuthentication) -> Response {
    match auth.challenge_default(None).await {
        Ok(()) => context_response(auth.context()),
        Err(err) => error_response(&err),
    }
}

/// Run the default forbid and turn it into a response.
pub async fn forbid(auth: &RequestAuthentication) -> Response {
    match auth.forbid_default(None).await {
        Ok(()) => context_response(auth.context()),
        Err(err) => error_response(&err),
    }
}

fn context_response(context: &HttpContext) -> Response {
    let state = context.response();
    debug!("Authentication response status {}", state.status);
    let body = Json(serde_json::json!({
        "error": state.status.canonical_reason().unwrap_or("error"),
    }));
    (state.status, state.headers, body).into_response()
}

fn error_response(err: &AuthError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

pub fn create_router(registry: Arc<SchemeRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/me", get(me))
        .route("/admin", get(admin))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(AuthenticationLayer::new(registry)),
        )
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn me(AuthenticatedUser(principal): AuthenticatedUser) -> Json<Value> {
    let claims: Vec<_> = principal.claims().cloned().collect();
    Json(serde_json::json!({
        "name": principal.display(),
        "authenticationType": principal.identity().and_then(|i| i.authentication_type()),
        "claims": claims,
    }))
}

async fn admin(
    AuthenticatedUser(principal): AuthenticatedUser,
    Extension(auth): Extension<Arc<RequestAuthentication>>,
) -> Response {
    if !principal.is_in_role("admin") {
        return forbid(&auth).await;
    }

    Json(serde_json::json!({
        "status": "ok",
        "user": principal.display(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{OptionsMonitor, OptionsProvider, SchemeDescriptor};
    use crate::schemes::{ApiKeyEntry, ApiKeyOptions, ApiKeyScheme};
    use axum::http::header::WWW_AUTHENTICATE;
    use tower::ServiceExt;

    fn router() -> Router {
        let monitor = Arc::new(OptionsMonitor::<ApiKeyOptions>::new());
        monitor
            .configure(
                "api-key",
                ApiKeyOptions::default()
                    .with_key(ApiKeyEntry::from_key("alice", "alice-key").with_role("admin"))
                    .with_key(ApiKeyEntry::from_key("bob", "bob-key")),
            )
            .unwrap();
        let provider: Arc<dyn OptionsProvider<ApiKeyOptions>> = monitor;
        let registry = SchemeRegistry::new()
            .add_scheme(SchemeDescriptor::new("api-key"), provider, ApiKeyScheme::new)
            .with_default_scheme("api-key");
        create_router(Arc::new(registry))
    }

    fn request(path: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = axum::http::Request::get(path);
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_credentials() {
        let response = router().oneshot(request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unauthenticated_request_is_challenged() {
        let response = router().oneshot(request("/me", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some("ApiKey header=\"X-API-Key\"")
        );
    }

    #[tokio::test]
    async fn test_invalid_key_is_challenged() {
        let response = router().oneshot(request("/me", Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authenticated_request_reaches_handler() {
        let response = router().oneshot(request("/me", Some("bob-key"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["name"], "bob");
        assert_eq!(body["authenticationType"], "api-key");
    }

    #[tokio::test]
    async fn test_missing_role_is_forbidden() {
        let response = router().oneshot(request("/admin", Some("bob-key"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = router().oneshot(request("/admin", Some("alice-key"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user"], "alice");
    }

    #[tokio::test]
    async fn test_no_default_scheme_leaves_request_anonymous() {
        let app = create_router(Arc::new(SchemeRegistry::new()));
        let response = app.oneshot(request("/me", None)).await.unwrap();

        // Nothing to challenge with
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "No default scheme is configured for challenge");
    }
}
