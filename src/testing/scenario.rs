//! Request scenarios driven through a router without a running server
//!
//! ```rust,ignore
//! use almoner::{App, testing};
//!
//! #[tokio::test]
//! async fn test_post_without_token_is_rejected() {
//!     let app = App::new().into_router();
//!
//!     testing::post(app, "/donate")
//!         .form_body(&[("amount", "25")])
//!         .execute()
//!         .await
//!         .assert_forbidden();
//! }
//! ```

use crate::webhooks::signature_header_value;
use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    response::Response,
};
use cookie::Cookie;
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceExt;

/// Request builder for a single oneshot call
pub struct Scenario {
    app: Router,
    request: Request<Body>,
    cookies: Vec<String>,
}

impl Scenario {
    pub fn new(app: Router) -> Self {
        Self {
            app,
            request: Request::new(Body::empty()),
            cookies: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        *self.request.method_mut() = method;
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        *self.request.uri_mut() = uri.parse().expect("invalid test URI");
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.request.headers_mut().insert(
            HeaderName::from_bytes(key.as_bytes()).expect("invalid header name"),
            HeaderValue::from_str(value).expect("invalid header value"),
        );
        self
    }

    /// Send a cookie; repeated calls accumulate into one `Cookie` header
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(format!("{}={}", name, value));
        self
    }

    /// Send the token in the `X-CSRF-Token` header
    pub fn csrf_header(self, token: &str) -> Self {
        self.header("x-csrf-token", token)
    }

    /// `application/x-www-form-urlencoded` body from key/value pairs
    pub fn form_body(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        *self.request.body_mut() = Body::from(encoded);
        self.request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self
    }

    pub fn json_body<T: Serialize>(mut self, body: &T) -> Self {
        let json = serde_json::to_vec(body).expect("failed to serialize test body");
        *self.request.body_mut() = Body::from(json);
        self.request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    /// Body sent byte-for-byte, no content type
    pub fn raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        *self.request.body_mut() = Body::from(body.into());
        self
    }

    /// Body signed the way the payment gateway signs deliveries
    pub fn signed_webhook(self, secret: &str, body: &[u8]) -> Self {
        let signature = signature_header_value(secret.as_bytes(), body)
            .expect("failed to sign test webhook");
        self.header("x-gateway-signature", &signature)
            .header("content-type", "application/json")
            .raw_body(body.to_vec())
    }

    pub async fn execute(mut self) -> ScenarioAssert {
        if !self.cookies.is_empty() {
            let value = self.cookies.join("; ");
            self.request.headers_mut().insert(
                header::COOKIE,
                HeaderValue::from_str(&value).expect("invalid cookie header"),
            );
        }
        let response = self.app.oneshot(self.request).await.expect("router is infallible");
        ScenarioAssert { response }
    }
}

/// Assertions over the response of a [`Scenario`]
pub struct ScenarioAssert {
    response: Response,
}

impl ScenarioAssert {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "Expected status {}, got {}",
            expected,
            self.response.status()
        );
        self
    }

    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_bad_request(self) -> Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    pub fn assert_forbidden(self) -> Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    pub fn assert_payload_too_large(self) -> Self {
        self.assert_status(StatusCode::PAYLOAD_TOO_LARGE)
    }

    pub fn assert_server_error(self) -> Self {
        self.assert_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .header(key)
            .unwrap_or_else(|| panic!("Header '{}' not found", key));
        assert_eq!(value, expected, "Header '{}' value mismatch", key);
        self
    }

    pub fn header(&self, key: &str) -> Option<String> {
        self.response
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// The `Set-Cookie` entry for `name`, parsed
    pub fn set_cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| Cookie::parse(v.to_string()).ok())
            .find(|c| c.name() == name)
    }

    pub async fn body_string(self) -> String {
        let bytes = axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        String::from_utf8(bytes.to_vec()).expect("response body is not UTF-8")
    }

    pub async fn json<T: DeserializeOwned>(self) -> T {
        let body = self.body_string().await;
        serde_json::from_str(&body).expect("Failed to parse JSON response")
    }

    /// Assert a dotted path (`checks.0.name`) in the JSON body
    pub async fn assert_json_path(self, path: &str, expected: serde_json::Value) -> Self {
        let (parts, body) = self.response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .expect("failed to read response body");
        let json: serde_json::Value =
            serde_json::from_slice(&bytes).expect("Failed to parse JSON response");

        let actual = json_path_get(&json, path)
            .unwrap_or_else(|| panic!("Path '{}' not found in JSON", path));
        assert_eq!(actual, &expected, "JSON path '{}' value mismatch", path);

        Self {
            response: Response::from_parts(parts, Body::from(bytes)),
        }
    }

    pub async fn assert_contains(self, text: &str) -> Self {
        let (parts, body) = self.response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .expect("failed to read response body");
        let body = String::from_utf8_lossy(&bytes);
        assert!(
            body.contains(text),
            "Response body does not contain '{}'. Body: {}",
            text,
            body
        );
        Self {
            response: Response::from_parts(parts, Body::from(bytes)),
        }
    }

    pub fn response(self) -> Response {
        self.response
    }
}

fn json_path_get<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(json, |current, part| match part.parse::<usize>() {
        Ok(index) => current.get(index),
        Err(_) => current.get(part),
    })
}

pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::GET).uri(uri)
}

pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::POST).uri(uri)
}

pub fn put(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::PUT).uri(uri)
}

pub fn patch(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::PATCH).uri(uri)
}

pub fn delete(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::DELETE).uri(uri)
}
