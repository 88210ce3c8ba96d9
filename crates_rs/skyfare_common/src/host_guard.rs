use crate::reject;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Host header allow-list. Rules are exact hostnames, `*`, or a leading-dot
/// suffix (`.example.com` matches the apex and every subdomain). An empty
/// list disables the check.
#[derive(Clone)]
pub struct AllowedHostsLayer {
    rules: Arc<[String]>,
}

impl AllowedHostsLayer {
    pub fn new(hosts: Vec<String>) -> Self {
        let rules: Vec<String> = hosts
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self {
            rules: rules.into(),
        }
    }

    fn permits(&self, host: &str) -> bool {
        self.rules.iter().any(|rule| match rule.as_str() {
            "*" => true,
            r if r.starts_with('.') => host == &r[1..] || host.ends_with(r),
            r => host == r,
        })
    }
}

/// Lowercased host without port; handles bracketed IPv6 literals.
fn host_without_port(raw: &str) -> String {
    let raw = raw.trim();
    let host = if let Some(rest) = raw.strip_prefix('[') {
        rest.split(']').next().unwrap_or("")
    } else {
        raw.split(':').next().unwrap_or("")
    };
    host.trim().to_ascii_lowercase()
}

impl<S> Layer<S> for AllowedHostsLayer {
    type Service = AllowedHostsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AllowedHostsService {
            inner,
            guard: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AllowedHostsService<S> {
    inner: S,
    guard: AllowedHostsLayer,
}

impl<S, B> Service<Request<B>> for AllowedHostsService<S>
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
        let allowed = if self.guard.rules.is_empty() {
            true
        } else {
            let host = req
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(host_without_port)
                .unwrap_or_default();
            !host.is_empty() && self.guard.permits(&host)
        };

        let mut inner = self.inner.clone();
        Box::pin(async move {
            if !allowed {
                tracing::warn!("request rejected by host allow-list");
                return Ok(reject(StatusCode::BAD_REQUEST, "invalid host"));
            }
            inner.call(req).await
        })
    }
}
