//! Session middleware and the per-request [`Session`] handle.
//!
//! The layer resolves the session id cookie, loads the session from the
//! configured [`SessionStore`] and attaches a [`Session`] to the request
//! extensions. Once the inner service has produced a response, modified
//! sessions are persisted and a `Set-Cookie` header is emitted for sessions
//! that received a new id. A request that never touches its session leaves
//! nothing behind in the store.

use super::config::SessionConfig;
use crate::csrf::{SESSION_TOKEN_KEY, generate_session_token};
use crate::error::AlmonerError;
use crate::traits::session::{SessionData, SessionStore};
use crate::utils::random_token;
use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Response},
};
use cookie::Cookie;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower::{Layer, Service};

/// Random bytes in a session id
const SESSION_ID_BYTES: usize = 32;

/// Ids longer than this are ignored without a store lookup
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug)]
struct SessionState {
    id: Option<String>,
    data: SessionData,
    modified: bool,
    destroyed: bool,
    /// Previous id after a `regenerate`, deleted on persist
    superseded: Option<String>,
}

/// What the middleware has to do with a session once the response is ready
#[derive(Debug)]
enum Outcome {
    Unchanged,
    Save {
        id: String,
        data: SessionData,
        is_new: bool,
        superseded: Option<String>,
    },
    Destroy {
        id: Option<String>,
    },
}

/// Handle to the current request's session
///
/// Cloning is cheap; all clones share the same state. Use it as an axum
/// extractor in handlers that need the session:
///
/// ```rust,ignore
/// async fn logout(session: Session) -> Redirect {
///     session.destroy().await;
///     Redirect::to("/")
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    fn existing(id: String, data: SessionData) -> Self {
        Self::from_state(SessionState {
            id: Some(id),
            data,
            modified: false,
            destroyed: false,
            superseded: None,
        })
    }

    fn fresh(ttl: Duration) -> Self {
        Self::from_state(SessionState {
            id: None,
            data: SessionData::new(ttl),
            modified: false,
            destroyed: false,
            superseded: None,
        })
    }

    fn from_state(state: SessionState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A detached session, not backed by any store.
    ///
    /// Handy for unit-testing code that takes a `Session`.
    pub fn detached() -> Self {
        Self::fresh(Duration::from_secs(3600))
    }

    /// The session id, or `None` until the session is first persisted
    pub async fn id(&self) -> Option<String> {
        self.state.lock().await.id.clone()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.state.lock().await.data.get(key).cloned()
    }

    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.data.set(key.into(), value.into());
        state.modified = true;
    }

    /// The value under `key`, storing `make()` first if there is none.
    ///
    /// Lookup and insert happen under one lock, so concurrent callers on the
    /// same session all see the same value.
    pub async fn get_or_insert_with(
        &self,
        key: &str,
        make: impl FnOnce() -> String,
    ) -> String {
        let mut state = self.state.lock().await;
        if let Some(value) = state.data.get(key) {
            return value.clone();
        }
        let value = make();
        state.data.set(key.to_string(), value.clone());
        state.modified = true;
        value
    }

    pub async fn remove(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let removed = state.data.remove(key);
        if removed.is_some() {
            state.modified = true;
        }
        removed
    }

    /// Move the session to a fresh id with a fresh CSRF token.
    ///
    /// Call on privilege changes such as login, so an id or token planted
    /// before authentication is worthless afterwards.
    pub async fn regenerate(&self) {
        let mut state = self.state.lock().await;
        if let Some(old) = state.id.take() {
            state.superseded = Some(old);
        }
        state
            .data
            .set(SESSION_TOKEN_KEY.to_string(), generate_session_token());
        state.modified = true;
    }

    /// Invalidate the session (logout). The stored session is deleted and
    /// the cookie expired once the response is sent.
    pub async fn destroy(&self) {
        let mut state = self.state.lock().await;
        state.data.data.clear();
        state.destroyed = true;
    }

    pub async fn is_destroyed(&self) -> bool {
        self.state.lock().await.destroyed
    }

    async fn take_outcome(&self, ttl: Duration) -> Outcome {
        let mut state = self.state.lock().await;

        if state.destroyed {
            let id = state.id.take().or_else(|| state.superseded.take());
            return Outcome::Destroy { id };
        }

        if !state.modified {
            return Outcome::Unchanged;
        }
        state.modified = false;

        let (id, is_new) = match state.id.clone() {
            Some(id) => (id, false),
            None => {
                let id = random_token(SESSION_ID_BYTES);
                state.id = Some(id.clone());
                // Every stored session carries its token from the start
                if state.data.get(SESSION_TOKEN_KEY).is_none() {
                    state
                        .data
                        .set(SESSION_TOKEN_KEY.to_string(), generate_session_token());
                }
                (id, true)
            }
        };

        state.data.extend(ttl);

        Outcome::Save {
            id,
            data: state.data.clone(),
            is_new,
            superseded: state.superseded.take(),
        }
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AlmonerError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let session = parts.extensions.get::<Session>().cloned();
        async move {
            session.ok_or_else(|| {
                AlmonerError::internal("Session not found in request extensions; is SessionLayer installed?")
            })
        }
    }
}

/// Tower layer that provides sessions to the wrapped service
#[derive(Clone)]
pub struct SessionLayer {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl SessionLayer {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

/// Tower service that loads and persists sessions around the inner service
#[derive(Clone)]
pub struct SessionService<S> {
    inner: S,
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl<S> Service<Request> for SessionService<S>
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
        let store = self.store.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let session = match load_session(store.as_ref(), &config, req.headers()).await {
                Ok(session) => session,
                Err(err) => return Ok(err.into_response()),
            };
            req.extensions_mut().insert(session.clone());

            let mut response = svc.call(req).await?.into_response();

            let outcome = session.take_outcome(config.ttl()).await;
            if let Err(err) = persist(store.as_ref(), &config, outcome, response.headers_mut()).await {
                return Ok(err.into_response());
            }

            Ok(response)
        })
    }
}

/// Find the session id among the request's cookies
pub fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(|cookie| cookie.ok())
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| !id.is_empty() && id.len() <= MAX_SESSION_ID_LEN)
}

async fn load_session(
    store: &dyn SessionStore,
    config: &SessionConfig,
    headers: &HeaderMap,
) -> crate::error::Result<Session> {
    let Some(id) = session_id_from_headers(headers, &config.cookie_name) else {
        return Ok(Session::fresh(config.ttl()));
    };

    match store.load(&id).await? {
        Some(data) => Ok(Session::existing(id, data)),
        None => {
            tracing::debug!("Unknown or expired session id, starting a fresh session");
            Ok(Session::fresh(config.ttl()))
        }
    }
}

async fn persist(
    store: &dyn SessionStore,
    config: &SessionConfig,
    outcome: Outcome,
    headers: &mut HeaderMap,
) -> crate::error::Result<()> {
    match outcome {
        Outcome::Unchanged => Ok(()),
        Outcome::Save {
            id,
            data,
            is_new,
            superseded,
        } => {
            if let Some(old) = superseded {
                store.delete(&old).await?;
            }
            store.save(&id, data).await?;
            if is_new {
                append_cookie(headers, session_cookie(config, id))?;
            }
            Ok(())
        }
        Outcome::Destroy { id } => {
            if let Some(id) = id {
                store.delete(&id).await?;
            }
            append_cookie(headers, removal_cookie(config))
        }
    }
}

fn session_cookie(config: &SessionConfig, id: String) -> Cookie<'static> {
    let mut builder = Cookie::build((config.cookie_name.clone(), id))
        .path(config.cookie_path.clone())
        .http_only(config.cookie_http_only)
        .secure(config.cookie_secure)
        .same_site(config.same_site.into())
        .max_age(cookie::time::Duration::seconds(config.ttl_seconds as i64));

    if let Some(ref domain) = config.cookie_domain {
        builder = builder.domain(domain.clone());
    }

    builder.build()
}

fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = session_cookie(config, String::new());
    cookie.make_removal();
    cookie
}

fn append_cookie(headers: &mut HeaderMap, cookie: Cookie<'static>) -> crate::error::Result<()> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AlmonerError::internal(format!("Invalid session cookie: {}", e)))?;
    headers.append(header::SET_COOKIE, value);
    Ok(())
}
