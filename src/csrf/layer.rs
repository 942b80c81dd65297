use super::config::CsrfConfig;
use super::token::{SESSION_TOKEN_KEY, mask_token, verify_token};
use crate::error::AlmonerError;
use crate::session::Session;
use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderName, HeaderValue, Method, header},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use http_body_util::LengthLimitError;
use std::convert::Infallible;
use std::sync::Arc;
use tower::{Layer, Service};

/// Methods that never change state and are never checked
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Build the CSRF layer, or `None` when the guard is disabled
pub fn build_csrf_layer(config: &CsrfConfig) -> Option<CsrfLayer> {
    if !config.enabled {
        tracing::warn!("CSRF protection is disabled");
        return None;
    }
    Some(CsrfLayer::new(config.clone()))
}

/// Tower layer rejecting state-changing requests without a valid token
///
/// Must sit inside [`SessionLayer`](crate::session::SessionLayer): the guard
/// reads the session the session layer attaches to the request.
#[derive(Clone)]
pub struct CsrfLayer {
    config: Arc<CsrfConfig>,
}

impl CsrfLayer {
    pub fn new(config: CsrfConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            inner,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CsrfService<S> {
    inner: S,
    config: Arc<CsrfConfig>,
}

impl<S> Service<Request> for CsrfService<S>
where
    S: Service<Request> + Clone + Send + Sync + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let mut svc = self.inner.clone();
        let config = self.config.clone();

        // Lets the CsrfToken extractor use the same field name
        req.extensions_mut().insert(config.clone());

        Box::pin(async move {
            if config.is_exempt(req.uri().path()) {
                return Ok(svc.call(req).await?.into_response());
            }

            if is_safe_method(req.method()) {
                let session = req.extensions().get::<Session>().cloned();
                let mut response = svc.call(req).await?.into_response();
                if config.expose_header {
                    if let Some(session) = session {
                        expose_token(&session, &config, &mut response).await;
                    }
                }
                return Ok(response);
            }

            match check_request(req, &config).await {
                Ok(req) => Ok(svc.call(req).await?.into_response()),
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}

/// Put a masked copy of an existing session token on the response
async fn expose_token(session: &Session, config: &CsrfConfig, response: &mut Response) {
    let Some(secret) = session.get(SESSION_TOKEN_KEY).await else {
        return;
    };

    let name = HeaderName::from_bytes(config.header_name.as_bytes());
    let value = HeaderValue::from_str(&mask_token(&secret));
    if let (Ok(name), Ok(value)) = (name, value) {
        response.headers_mut().insert(name, value);
    }
}

/// Validate a state-changing request, handing it back with its body intact
async fn check_request(req: Request, config: &CsrfConfig) -> crate::error::Result<Request> {
    let Some(session) = req.extensions().get::<Session>().cloned() else {
        tracing::error!("CSRF guard reached without a session; install SessionLayer outside CsrfLayer");
        return Err(AlmonerError::TokenMissingOrMismatch);
    };

    let header_token = req
        .headers()
        .get(config.header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let (req, submitted) = match header_token {
        Some(token) => (req, Some(token)),
        None => match form_encoding(&req) {
            Some(encoding) => read_form_token(req, encoding, config).await?,
            None => (req, None),
        },
    };

    let Some(submitted) = submitted else {
        tracing::debug!(method = %req.method(), path = %req.uri().path(), "CSRF token missing");
        return Err(AlmonerError::TokenMissingOrMismatch);
    };

    let Some(expected) = session.get(SESSION_TOKEN_KEY).await else {
        tracing::debug!(method = %req.method(), path = %req.uri().path(), "No CSRF token bound to session");
        return Err(AlmonerError::TokenMissingOrMismatch);
    };

    if !verify_token(&expected, &submitted) {
        tracing::debug!(method = %req.method(), path = %req.uri().path(), "CSRF token mismatch");
        return Err(AlmonerError::TokenMissingOrMismatch);
    }

    Ok(req)
}

/// Body encodings the token field is looked up in
#[derive(Debug, PartialEq)]
enum FormEncoding {
    UrlEncoded,
    Multipart { boundary: String },
}

fn form_encoding(req: &Request) -> Option<FormEncoding> {
    let content_type = req.headers().get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type.trim_start().to_ascii_lowercase();

    if mime.starts_with("application/x-www-form-urlencoded") {
        Some(FormEncoding::UrlEncoded)
    } else if mime.starts_with("multipart/form-data") {
        multer::parse_boundary(content_type)
            .ok()
            .map(|boundary| FormEncoding::Multipart { boundary })
    } else {
        None
    }
}

/// Buffer a form body, pull the token field out, and rebuild the request
/// around the same bytes
async fn read_form_token(
    req: Request,
    encoding: FormEncoding,
    config: &CsrfConfig,
) -> crate::error::Result<(Request, Option<String>)> {
    let (parts, body) = req.into_parts();

    let bytes = axum::body::to_bytes(body, config.max_form_bytes)
        .await
        .map_err(body_error)?;

    let token = match encoding {
        FormEncoding::UrlEncoded => url::form_urlencoded::parse(&bytes)
            .find(|(key, _)| key == config.field_name.as_str())
            .map(|(_, value)| value.into_owned()),
        FormEncoding::Multipart { boundary } => {
            multipart_field(bytes.clone(), boundary, &config.field_name).await
        }
    }
    .filter(|value| !value.is_empty());

    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}

/// First text part named `name`; a malformed body yields nothing
async fn multipart_field(bytes: Bytes, boundary: String, name: &str) -> Option<String> {
    let stream = futures::stream::once(async move { Ok::<_, Infallible>(bytes) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(name) => return field.text().await.ok(),
            Ok(Some(_)) => continue,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(error = %err, "Malformed multipart body in CSRF check");
                return None;
            }
        }
    }
}

/// Only the length limit is a 413; anything else went wrong on the wire
fn body_error(err: axum::Error) -> AlmonerError {
    let err = err.into_inner();
    let root: &(dyn std::error::Error + 'static) = &*err;
    let mut source = Some(root);
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return AlmonerError::PayloadTooLarge;
        }
        source = cause.source();
    }

    tracing::debug!(error = %err, "Failed to buffer form body for CSRF check");
    AlmonerError::bad_request("Failed to read request body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_methods() {
        assert!(is_safe_method(&Method::GET));
        assert!(is_safe_method(&Method::HEAD));
        assert!(is_safe_method(&Method::OPTIONS));
        assert!(is_safe_method(&Method::TRACE));
        assert!(!is_safe_method(&Method::POST));
        assert!(!is_safe_method(&Method::PUT));
        assert!(!is_safe_method(&Method::PATCH));
        assert!(!is_safe_method(&Method::DELETE));
    }

    #[test]
    fn test_build_layer_disabled() {
        let config = CsrfConfig::builder().enabled(false).build();
        assert!(build_csrf_layer(&config).is_none());
        assert!(build_csrf_layer(&CsrfConfig::default()).is_some());
    }

    fn with_content_type(content_type: &str, body: impl Into<Body>) -> Request {
        Request::builder()
            .method(Method::POST)
            .header(header::CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    #[test]
    fn test_form_encoding() {
        let form = with_content_type("application/x-www-form-urlencoded; charset=UTF-8", "");
        assert_eq!(form_encoding(&form), Some(FormEncoding::UrlEncoded));

        let upload = with_content_type("multipart/form-data; boundary=B", "");
        assert_eq!(
            form_encoding(&upload),
            Some(FormEncoding::Multipart {
                boundary: "B".to_string()
            })
        );

        let no_boundary = with_content_type("multipart/form-data", "");
        assert_eq!(form_encoding(&no_boundary), None);

        let json = with_content_type("application/json", "");
        assert_eq!(form_encoding(&json), None);

        let none = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(form_encoding(&none), None);
    }

    #[tokio::test]
    async fn test_read_form_token_preserves_body() {
        let body = "amount=25&authenticity_token=abc123&note=thanks";
        let req = with_content_type("application/x-www-form-urlencoded", body);

        let (req, token) = read_form_token(req, FormEncoding::UrlEncoded, &CsrfConfig::default())
            .await
            .unwrap();
        assert_eq!(token, Some("abc123".to_string()));

        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], body.as_bytes());
    }

    #[tokio::test]
    async fn test_read_multipart_token_preserves_body() {
        let body = "--B\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            Spring appeal\r\n\
            --B\r\n\
            Content-Disposition: form-data; name=\"authenticity_token\"\r\n\r\n\
            abc123\r\n\
            --B--\r\n";
        let req = with_content_type("multipart/form-data; boundary=B", body);
        let encoding = form_encoding(&req).unwrap();

        let (req, token) = read_form_token(req, encoding, &CsrfConfig::default())
            .await
            .unwrap();
        assert_eq!(token, Some("abc123".to_string()));

        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], body.as_bytes());
    }

    #[tokio::test]
    async fn test_read_multipart_token_malformed_body() {
        let req = with_content_type("multipart/form-data; boundary=B", "authenticity_token=abc123");
        let encoding = form_encoding(&req).unwrap();

        let (_, token) = read_form_token(req, encoding, &CsrfConfig::default())
            .await
            .unwrap();
        assert_eq!(token, None);
    }

    #[tokio::test]
    async fn test_read_form_token_rejects_oversized_body() {
        let config = CsrfConfig::builder().max_form_bytes(8).build();
        let req = with_content_type("application/x-www-form-urlencoded", "authenticity_token=abc123");

        let err = read_form_token(req, FormEncoding::UrlEncoded, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, AlmonerError::PayloadTooLarge));
    }

    #[tokio::test]
    async fn test_read_form_token_aborted_body_is_bad_request() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"authenticity_")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "client went away",
            )),
        ];
        let body = Body::from_stream(futures::stream::iter(chunks));
        let req = with_content_type("application/x-www-form-urlencoded", body);

        let err = read_form_token(req, FormEncoding::UrlEncoded, &CsrfConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AlmonerError::BadRequest(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_check_request_without_session_fails_closed() {
        let req = Request::builder()
            .method(Method::POST)
            .header("x-csrf-token", "abc123")
            .body(Body::empty())
            .unwrap();

        let err = check_request(req, &CsrfConfig::default()).await.unwrap_err();
        assert!(matches!(err, AlmonerError::TokenMissingOrMismatch));
    }

    #[tokio::test]
    async fn test_check_request_header_token() {
        let session = Session::detached();
        session.insert(SESSION_TOKEN_KEY, "abc123").await;

        let mut req = Request::builder()
            .method(Method::DELETE)
            .header("X-CSRF-Token", mask_token("abc123"))
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(session.clone());
        assert!(check_request(req, &CsrfConfig::default()).await.is_ok());

        let mut req = Request::builder()
            .method(Method::DELETE)
            .header("X-CSRF-Token", "abc124")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(session);
        assert!(check_request(req, &CsrfConfig::default()).await.is_err());
    }
}
