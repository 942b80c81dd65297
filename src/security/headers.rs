use super::config::SecurityConfig;
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Build the security headers layer, None when disabled
pub fn build_security_headers_layer(config: &SecurityConfig) -> Option<SecurityHeadersLayer> {
    config.enabled.then(|| SecurityHeadersLayer::new(config))
}

/// Precomputed header set, invalid configured values are dropped with a warning
#[derive(Clone)]
pub struct SecurityHeadersLayer {
    headers: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl SecurityHeadersLayer {
    pub fn new(config: &SecurityConfig) -> Self {
        let mut headers = Vec::new();

        if let Some(hsts) = config.hsts_value() {
            push_header(&mut headers, header::STRICT_TRANSPORT_SECURITY, &hsts);
        }
        if config.nosniff {
            push_header(&mut headers, header::X_CONTENT_TYPE_OPTIONS, "nosniff");
        }
        if let Some(frame) = config.frame_options {
            push_header(&mut headers, header::X_FRAME_OPTIONS, frame.as_str());
        }
        if let Some(referrer) = config.referrer_policy {
            push_header(&mut headers, header::REFERRER_POLICY, referrer.as_str());
        }
        if let Some(ref csp) = config.content_security_policy {
            push_header(&mut headers, header::CONTENT_SECURITY_POLICY, csp);
        }

        Self {
            headers: Arc::new(headers),
        }
    }
}

fn push_header(headers: &mut Vec<(HeaderName, HeaderValue)>, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => headers.push((name, value)),
        Err(_) => tracing::warn!(header = %name, "Ignoring invalid security header value"),
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    headers: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl<S> Service<Request> for SecurityHeadersService<S>
where
    S: Service<Request> + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let headers = self.headers.clone();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.await?.into_response();
            apply_headers(response.headers_mut(), &headers);
            Ok(response)
        })
    }
}

/// Handlers that set one of these headers themselves keep their value
fn apply_headers(target: &mut HeaderMap, headers: &[(HeaderName, HeaderValue)]) {
    for (name, value) in headers {
        if !target.contains_key(name) {
            target.insert(name.clone(), value.clone());
        }
    }
}
