use crate::reject;
use axum::http::{header::HeaderName, HeaderMap, Request, StatusCode};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

pub const SECRET_HEADER: &str = "x-internal-secret";
pub const CALLER_HEADER: &str = "x-internal-service-id";

/// Shared-secret gate for service-to-service routes such as payment
/// confirmation callbacks.
#[derive(Clone, Debug)]
struct InternalAuthPolicy {
    required: bool,
    secret: Option<String>,
    allowed_callers: Vec<String>,
}

impl InternalAuthPolicy {
    fn check(&self, headers: &HeaderMap) -> Result<(), (StatusCode, &'static str)> {
        if !self.required {
            return Ok(());
        }
        let Some(secret) = self.secret.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Err((StatusCode::SERVICE_UNAVAILABLE, "internal auth not configured"));
        };

        let provided = header_str(headers, &HeaderName::from_static(SECRET_HEADER));
        if provided.is_empty() || provided.as_bytes().ct_eq(secret.as_bytes()).unwrap_u8() != 1 {
            return Err((StatusCode::UNAUTHORIZED, "internal auth required"));
        }

        if !self.allowed_callers.is_empty() {
            let caller =
                header_str(headers, &HeaderName::from_static(CALLER_HEADER)).to_ascii_lowercase();
            if caller.is_empty() || !self.allowed_callers.iter().any(|c| c == &caller) {
                return Err((StatusCode::UNAUTHORIZED, "internal caller not allowed"));
            }
        }
        Ok(())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

#[derive(Clone)]
pub struct InternalAuthLayer {
    policy: Arc<InternalAuthPolicy>,
}

impl InternalAuthLayer {
    pub fn new(required: bool, secret: Option<String>) -> Self {
        Self {
            policy: Arc::new(InternalAuthPolicy {
                required,
                secret,
                allowed_callers: Vec::new(),
            }),
        }
    }

    /// Restricts access to the listed caller ids (case-insensitive).
    pub fn with_allowed_callers(self, callers: Vec<String>) -> Self {
        let mut policy = (*self.policy).clone();
        policy.allowed_callers.clear();
        for raw in callers {
            let caller = raw.trim().to_ascii_lowercase();
            if !caller.is_empty() && !policy.allowed_callers.contains(&caller) {
                policy.allowed_callers.push(caller);
            }
        }
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for InternalAuthLayer {
    type Service = InternalAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InternalAuthService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InternalAuthService<S> {
    inner: S,
    policy: Arc<InternalAuthPolicy>,
}

impl<S, B> Service<Request<B>> for InternalAuthService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let verdict = self.policy.check(req.headers());
        let mut inner = self.inner.clone();
        Box::pin(async move {
            match verdict {
                Ok(()) => inner.call(req).await,
                Err((status, detail)) => {
                    tracing::warn!(%status, detail, "internal auth rejected request");
                    Ok(reject(status, detail))
                }
            }
        })
    }
}
