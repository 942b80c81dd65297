use super::config::CsrfConfig;
use super::token::{mask_token, session_token};
use crate::error::AlmonerError;
use crate::session::Session;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

/// A freshly masked authenticity token for the current session
///
/// Extract it in any handler that renders a form and hand it to the
/// template; the session token is created on first use.
///
/// ```rust,ignore
/// async fn donate_form(csrf: CsrfToken) -> Html<String> {
///     Html(format!(
///         r#"<form method="post" action="/donate">{}<button>Give</button></form>"#,
///         csrf.hidden_field()
///     ))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    value: String,
    field_name: String,
}

impl CsrfToken {
    /// Issue a token bound to `session`
    pub async fn issue(session: &Session, config: &CsrfConfig) -> Self {
        let secret = session_token(session).await;
        Self {
            value: mask_token(&secret),
            field_name: config.field_name.clone(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// `<input type="hidden">` carrying the token
    pub fn hidden_field(&self) -> String {
        format!(
            r#"<input type="hidden" name="{}" value="{}">"#,
            escape_attr(&self.field_name),
            escape_attr(&self.value)
        )
    }

    /// `<meta>` tags for scripts that submit with the token header
    pub fn meta_tags(&self) -> String {
        format!(
            r#"<meta name="csrf-param" content="{}"><meta name="csrf-token" content="{}">"#,
            escape_attr(&self.field_name),
            escape_attr(&self.value)
        )
    }
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = AlmonerError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let session = parts.extensions.get::<Session>().cloned();
        let config = parts.extensions.get::<Arc<CsrfConfig>>().cloned();

        Box::pin(async move {
            let session = session.ok_or_else(|| {
                AlmonerError::internal("Session not found in request extensions; is SessionLayer installed?")
            })?;
            let config = config.unwrap_or_default();
            Ok(CsrfToken::issue(&session, &config).await)
        })
    }
}
