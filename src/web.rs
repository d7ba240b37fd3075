//! axum host for the authentication filter
//!
//! The filter itself knows nothing about HTTP frameworks.  This module binds
//! it to axum:
//!
//! - a session cookie (`oauthgate_session`, a random UUID) keys an
//!   in-memory [`SessionRegistry`], issued once the session holds a value;
//! - [`authenticate`] runs the filter on every request and maps
//!   [`FilterOutcome::Passthrough`] to the next handler,
//!   [`FilterOutcome::Deny`] to `401` and [`FilterOutcome::Redirect`] to
//!   `302`;
//! - `/login` starts an authorization and redirects to the hosted UI;
//! - `/` is a sample protected resource reporting the session state.
//!
//! Request URLs are rebuilt against the origin of the redirect URI, so the
//! application is expected to be served from that origin.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use url::Url;

use crate::config::Config;
use crate::error::{OAuthGateError, Result};
use crate::filter::{AuthFilter, FilterOutcome, RequestInfo};
use crate::session::{CookieJar, MemoryCookies, MemorySession, Session, ACCESS_TOKEN_KEY};

/// Name of the cookie carrying the session identifier.
pub const SESSION_COOKIE_NAME: &str = "oauthgate_session";

/// How long an untouched session stays in the registry.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// In-memory session store keyed by session id.
///
/// Sessions are checked out by value for the duration of a request and
/// stored back afterwards.  Two concurrent requests on the same session
/// race; the last one to finish wins.
///
/// Only sessions holding at least one value are kept.  Entries not touched
/// for the idle timeout are swept on the next checkout.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, (MemorySession, Instant)>>,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_idle_timeout(SESSION_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Returns the session named by `id`, or a fresh one.
    ///
    /// The flag is `true` when a new session was created and the caller
    /// needs to be told its id.
    pub fn checkout(&self, id: Option<&str>) -> (MemorySession, bool) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, (_, touched)| touched.elapsed() < self.idle_timeout);
        if sessions.len() < before {
            tracing::debug!(evicted = before - sessions.len(), "Evicted idle sessions");
        }

        if let Some((session, touched)) = id.and_then(|id| sessions.get_mut(id)) {
            *touched = Instant::now();
            return (session.clone(), false);
        }
        (MemorySession::new(uuid::Uuid::new_v4().to_string()), true)
    }

    /// Stores `session` under its id, replacing any previous version.
    ///
    /// An empty session is removed instead.
    pub fn store(&self, session: MemorySession) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_empty() {
            sessions.remove(session.id());
        } else {
            sessions.insert(session.id().to_string(), (session, Instant::now()));
        }
    }

    pub fn get(&self, id: &str) -> Option<MemorySession> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).map(|(session, _)| session.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Session id of the current request, set by [`authenticate`].
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Shared state of the web host.
#[derive(Debug, Clone)]
pub struct AppState {
    filter: Arc<AuthFilter>,
    sessions: Arc<SessionRegistry>,
    origin: Url,
}

impl AppState {
    /// Wraps `filter`, deriving the public origin from its redirect URI.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::Config`] when the redirect URI cannot serve
    /// as a base URL.
    pub fn new(filter: AuthFilter) -> Result<Self> {
        let mut origin = Url::parse(filter.settings().redirect_uri())
            .map_err(|e| OAuthGateError::Config(format!("redirect_uri: {e}")))?;
        if origin.cannot_be_a_base() {
            return Err(OAuthGateError::Config(
                "redirect_uri cannot be used as a base URL".to_string(),
            )
            .into());
        }
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);

        Ok(Self {
            filter: Arc::new(filter),
            sessions: Arc::new(SessionRegistry::new()),
            origin,
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    fn request_info(&self, uri: &Uri) -> Option<RequestInfo> {
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        self.origin.join(path).ok().map(|url| RequestInfo::from_url(&url))
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the application router with the filter installed on every route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(protected))
        .route("/login", get(login))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
}

/// Builds the filter from `config` and serves the sample application on
/// `bind` until Ctrl-C.
///
/// # Errors
///
/// Returns filter construction errors, an unparsable bind address, or I/O
/// errors from the listener.
pub async fn serve(config: &Config, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| OAuthGateError::Config(format!("invalid bind address {bind}: {e}")))?;

    let filter = AuthFilter::from_config(config).await?;
    let app = router(AppState::new(filter)?);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Middleware and handlers
// ---------------------------------------------------------------------------

/// Runs the filter and translates its outcome into a response.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let cookie_header = request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    let mut cookies = MemoryCookies::from_header(&cookie_header);

    let Some(info) = state.request_info(request.uri()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let (mut session, fresh) = state
        .sessions
        .checkout(cookies.cookie(SESSION_COOKIE_NAME).as_deref());
    let outcome = state.filter.handle(&info, &mut session, &mut cookies).await;
    let session_id = session.id().to_string();
    state.sessions.store(session);

    tracing::debug!(session_id = %session_id, path = %request.uri().path(), outcome = ?outcome, "Request classified");

    let mut response = match outcome {
        FilterOutcome::Passthrough => {
            request.extensions_mut().insert(SessionId(session_id.clone()));
            next.run(request).await
        }
        FilterOutcome::Deny => StatusCode::UNAUTHORIZED.into_response(),
        FilterOutcome::Redirect(location) => redirect(&location),
    };

    // A fresh session only gets a cookie if something was kept in it.
    let headers = response.headers_mut();
    if fresh && state.sessions.get(&session_id).is_some() {
        if let Ok(value) = HeaderValue::from_str(&session_cookie(&session_id)) {
            headers.append(SET_COOKIE, value);
        }
    }
    for cookie in cookies.outbound() {
        match HeaderValue::from_str(&cookie.to_header_value()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(cookie = %cookie.name, error = %e, "Dropping unencodable cookie"),
        }
    }

    response
}

async fn login(State(state): State<AppState>, Extension(SessionId(id)): Extension<SessionId>) -> Response {
    let mut session = state
        .sessions
        .get(&id)
        .unwrap_or_else(|| MemorySession::new(id.clone()));
    let url = match state.filter.begin_authorization(&mut session) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(session_id = %id, error = %e, "Could not start authorization");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    state.sessions.store(session);
    redirect(url.as_str())
}

async fn protected(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
) -> Json<serde_json::Value> {
    let authenticated = state
        .sessions
        .get(&id)
        .is_some_and(|s| s.get(ACCESS_TOKEN_KEY).is_some());
    Json(serde_json::json!({
        "session": id,
        "authenticated": authenticated,
    }))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn session_cookie(id: &str) -> String {
    format!("{SESSION_COOKIE_NAME}={id}; Path=/; HttpOnly; Secure; SameSite=Lax")
}
