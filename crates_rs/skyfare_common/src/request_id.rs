use axum::http::{header::HeaderName, HeaderValue, Request};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

const MAX_INBOUND_LEN: usize = 128;

/// Request correlation id, available to handlers as a request extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reuses a caller-supplied id when it is short printable ASCII,
    /// otherwise mints a fresh one.
    fn from_inbound(raw: Option<&str>) -> Self {
        let candidate = raw.map(str::trim).filter(|s| {
            !s.is_empty()
                && s.len() <= MAX_INBOUND_LEN
                && s.bytes().all(|b| b.is_ascii_graphic())
        });
        match candidate {
            Some(s) => Self(s.to_string()),
            None => Self(Uuid::new_v4().simple().to_string()),
        }
    }
}

#[derive(Clone)]
pub struct RequestIdLayer {
    header: HeaderName,
}

impl RequestIdLayer {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService {
            inner,
            header: self.header.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
    header: HeaderName,
}

impl<S, B> Service<Request<B>> for RequestIdService<S>
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

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let header = self.header.clone();
        let rid = RequestId::from_inbound(req.headers().get(&header).and_then(|v| v.to_str().ok()));
        req.extensions_mut().insert(rid.clone());

        let span = tracing::info_span!("request", request_id = %rid.as_str());
        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let mut resp = inner.call(req).await?;
                if let Ok(v) = HeaderValue::from_str(rid.as_str()) {
                    resp.headers_mut().insert(header, v);
                }
                Ok(resp)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_id_is_kept_when_printable() {
        assert_eq!(RequestId::from_inbound(Some(" abc-123 ")).as_str(), "abc-123");
    }

    #[test]
    fn unusable_inbound_id_is_replaced() {
        let long = "a".repeat(MAX_INBOUND_LEN + 1);
        for raw in [None, Some(""), Some("has space"), Some(long.as_str())] {
            let rid = RequestId::from_inbound(raw);
            assert_eq!(rid.as_str().len(), 32);
            assert!(rid.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
