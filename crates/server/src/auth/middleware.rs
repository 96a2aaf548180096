use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use netwatch_store::DurableStore;
use tower::{Layer, Service};

use super::AuthProvider;

/// Tower layer requiring either a Bearer JWT or an `X-API-Key` header.
/// Every route this wraps requires authentication (§6.3): there is no
/// "auth disabled" bypass, unlike the reference stack's middleware.
pub struct AuthLayer<St: DurableStore> {
    provider: Arc<AuthProvider<St>>,
}

impl<St: DurableStore> Clone for AuthLayer<St> {
    fn clone(&self) -> Self {
        Self { provider: self.provider.clone() }
    }
}

impl<St: DurableStore> AuthLayer<St> {
    #[must_use]
    pub const fn new(provider: Arc<AuthProvider<St>>) -> Self {
        Self { provider }
    }
}

impl<S, St: DurableStore> Layer<S> for AuthLayer<St> {
    type Service = AuthMiddleware<S, St>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware { inner, provider: self.provider.clone() }
    }
}

pub struct AuthMiddleware<S, St: DurableStore> {
    inner: S,
    provider: Arc<AuthProvider<St>>,
}

impl<S: Clone, St: DurableStore> Clone for AuthMiddleware<S, St> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), provider: self.provider.clone() }
    }
}

impl<S, St: DurableStore + 'static> Service<Request<Body>> for AuthMiddleware<S, St>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let provider = self.provider.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Some(header) = req.headers().get("authorization")
                && let Ok(header_str) = header.to_str()
                && let Some(token) = header_str.strip_prefix("Bearer ")
            {
                return match provider.validate_jwt(token) {
                    Ok(identity) => {
                        req.extensions_mut().insert(identity);
                        inner.call(req).await
                    }
                    Err(e) => Ok(unauthorized(&e)),
                };
            }

            if let Some(header) = req.headers().get("x-api-key")
                && let Ok(key_str) = header.to_str()
            {
                return match provider.authenticate_api_key(key_str).await {
                    Some(identity) => {
                        req.extensions_mut().insert(identity);
                        inner.call(req).await
                    }
                    None => Ok(unauthorized("invalid API key")),
                };
            }

            Ok(unauthorized("missing authentication credentials"))
        })
    }
}

fn unauthorized(message: &str) -> Response {
    let body = serde_json::json!({ "detail": message });
    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}
