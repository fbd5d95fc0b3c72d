//! Session lifecycle: login, refresh, proactive renewal, logout
//!
//! Refreshes are single-flight: concurrent callers share one in-flight
//! exchange, and `force` starts a fresh one that supersedes whatever was
//! pending. A renewal timer keeps the access token alive by refreshing
//! shortly before its expiry.

use backoffice_api::{
    ApiRequest, ApiTransport, AuthPayload, RefreshRequest, LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH,
};
use backoffice_core::{
    AuthConfig, BackofficeError, BackofficeResult, Credentials, ErrorContext, SessionTokens,
    UserRecord,
};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::authz::AuthzManager;
use crate::events::{ConsoleEvent, EventBus};
use crate::token::{claims, FileStorage, KeyValueStorage, MemoryStorage, TokenStore};

/// Where the session currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticating,
    Authenticated,
    Refreshing,
}

/// An established session: the token pair plus the account it belongs to
#[derive(Debug, Clone)]
pub struct Session {
    pub tokens: SessionTokens,
    pub user: UserRecord,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Session, Arc<BackofficeError>>>>;

struct SessionInner {
    config: AuthConfig,
    transport: Arc<dyn ApiTransport>,
    tokens: Arc<TokenStore>,
    authz: AuthzManager,
    events: EventBus,
    state: RwLock<SessionState>,
    inflight: Mutex<Option<SharedRefresh>>,
    refresh_gen: AtomicU64,
    renewal: StdMutex<Option<JoinHandle<()>>>,
}

/// Handle to the session core; cheap to clone, all clones share state
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Wire up a manager from configuration. Tokens persist to
    /// `storage_path` when set, otherwise they live in memory only.
    pub fn new(config: AuthConfig, transport: Arc<dyn ApiTransport>) -> BackofficeResult<Self> {
        config.validate()?;
        let backend: Arc<dyn KeyValueStorage> = match &config.storage_path {
            Some(path) => Arc::new(FileStorage::open(path)?),
            None => Arc::new(MemoryStorage::new()),
        };
        let tokens = Arc::new(TokenStore::new(backend));
        let authz = AuthzManager::new(transport.clone(), tokens.clone());
        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                transport,
                tokens,
                authz,
                events: EventBus::new(),
                state: RwLock::new(SessionState::LoggedOut),
                inflight: Mutex::new(None),
                refresh_gen: AtomicU64::new(0),
                renewal: StdMutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn authz(&self) -> &AuthzManager {
        &self.inner.authz
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn state(&self) -> SessionState {
        match self.inner.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.inner.tokens.stored_user()
    }

    /// True when an access token is present and not expired `offset_ms` from
    /// now. A token whose expiry cannot be determined counts as valid.
    pub fn has_valid_access_token(&self, offset_ms: i64) -> bool {
        let Some(token) = self.inner.tokens.access_token() else {
            return false;
        };
        match claims::access_expiry(&token) {
            None => true,
            Some(expiry) => Utc::now() + chrono::Duration::milliseconds(offset_ms) < expiry,
        }
    }

    /// Exchange credentials for a session and load the authorization context
    pub async fn login(&self, credentials: &Credentials) -> BackofficeResult<Session> {
        set_state(&self.inner, SessionState::Authenticating);
        info!(email = %credentials.email, "Logging in");

        let request = ApiRequest::post(LOGIN_PATH, serde_json::to_value(credentials)?);
        let response = match self.inner.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                set_state(&self.inner, SessionState::LoggedOut);
                return Err(e);
            }
        };

        if response.is_unauthorized() {
            set_state(&self.inner, SessionState::LoggedOut);
            return Err(BackofficeError::InvalidCredentials {
                context: ErrorContext::new("session")
                    .with_operation("login")
                    .with_suggestion("Check the email and password"),
            });
        }
        if !response.is_success() {
            set_state(&self.inner, SessionState::LoggedOut);
            return Err(BackofficeError::UnexpectedResponse {
                message: "Login returned an unexpected status".to_string(),
                status: Some(response.status),
                context: ErrorContext::new("session").with_operation("login"),
            });
        }

        let payload: AuthPayload = match response.json() {
            Ok(payload) => payload,
            Err(e) => {
                set_state(&self.inner, SessionState::LoggedOut);
                return Err(e);
            }
        };

        let session = install_session(&self.inner, payload);
        self.inner.authz.load(true).await?;
        info!(user_id = %session.user.id, "Login succeeded");
        Ok(session)
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// Returns `Ok(None)` when there is no refresh token to spend. With
    /// `force` false an in-flight refresh is joined instead of starting a
    /// second one; with `force` true a fresh exchange always starts. On
    /// failure the session is cleared entirely.
    pub async fn refresh(&self, force: bool) -> BackofficeResult<Option<Session>> {
        if self.inner.tokens.refresh_token().is_none() {
            debug!("No refresh token; nothing to refresh");
            return Ok(None);
        }

        let shared = {
            let mut cell = self.inner.inflight.lock().await;
            match (cell.as_ref(), force) {
                (Some(existing), false) => existing.clone(),
                _ => {
                    let fresh = start_refresh(self.inner.clone());
                    *cell = Some(fresh.clone());
                    fresh
                }
            }
        };

        shared.await.map(Some).map_err(BackofficeError::Shared)
    }

    /// Restore a persisted session after a restart.
    ///
    /// A still-valid access token resumes directly; an expired one is traded
    /// in via refresh. Returns whether a session is now active.
    pub async fn resume(&self) -> BackofficeResult<bool> {
        if self.has_valid_access_token(0) {
            set_state(&self.inner, SessionState::Authenticated);
            schedule_renewal(&self.inner);
            if let Err(e) = self.inner.authz.load(true).await {
                warn!(error = %e, "Authorization context load failed on resume");
            }
            return Ok(true);
        }
        Ok(self.refresh(true).await?.is_some())
    }

    /// End the session: best-effort server-side revocation, then local teardown
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.inner.tokens.refresh_token() {
            let body = serde_json::to_value(RefreshRequest { refresh_token })
                .unwrap_or(serde_json::Value::Null);
            if let Err(e) = self
                .inner
                .transport
                .execute(ApiRequest::post(LOGOUT_PATH, body))
                .await
            {
                debug!(error = %e, "Logout revocation failed; clearing local session anyway");
            }
        }
        self.discard_inflight().await;
        clear_session(&self.inner).await;
        info!("Logged out");
    }

    /// Terminate the session because it can no longer be trusted, and tell
    /// the shell to send the user back to the login screen.
    pub async fn force_logout(&self, reason: &str) {
        warn!(reason = reason, "Forcing logout");
        self.logout().await;
        self.inner.events.emit(ConsoleEvent::SessionExpired);
        self.inner.events.emit(ConsoleEvent::RedirectTo {
            path: self.inner.config.login_route.clone(),
            query: Vec::new(),
        });
    }

    async fn discard_inflight(&self) {
        self.inner.refresh_gen.fetch_add(1, Ordering::SeqCst);
        *self.inner.inflight.lock().await = None;
    }
}

fn set_state(inner: &Arc<SessionInner>, next: SessionState) {
    let mut slot = match inner.state.write() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *slot != next {
        debug!(from = ?*slot, to = ?next, "Session state transition");
        *slot = next;
    }
}

fn install_session(inner: &Arc<SessionInner>, payload: AuthPayload) -> Session {
    let tokens = SessionTokens {
        access_token: payload.access_token,
        refresh_token: payload.refresh_token,
    };
    inner.tokens.persist_session(&tokens, &payload.user);
    set_state(inner, SessionState::Authenticated);
    schedule_renewal(inner);
    Session {
        tokens,
        user: payload.user,
    }
}

async fn clear_session(inner: &Arc<SessionInner>) {
    cancel_renewal(inner);
    inner.tokens.clear();
    inner.authz.reset().await;
    set_state(inner, SessionState::LoggedOut);
}

fn start_refresh(inner: Arc<SessionInner>) -> SharedRefresh {
    let generation = inner.refresh_gen.fetch_add(1, Ordering::SeqCst) + 1;
    async move {
        let result = perform_refresh(&inner, generation).await.map_err(Arc::new);
        // Only the newest refresh owns the cell; a superseded one leaves it be.
        let mut cell = inner.inflight.lock().await;
        if inner.refresh_gen.load(Ordering::SeqCst) == generation {
            *cell = None;
        }
        result
    }
    .boxed()
    .shared()
}

/// The exchange only counts while `generation` is still current; a logout or
/// forced refresh that lands mid-flight bumps the counter, and this result
/// is then discarded instead of overwriting the session they left behind.
async fn perform_refresh(inner: &Arc<SessionInner>, generation: u64) -> BackofficeResult<Session> {
    let context = || ErrorContext::new("session").with_operation("refresh");

    if inner.refresh_gen.load(Ordering::SeqCst) != generation {
        return Err(stale_refresh(context()));
    }
    let Some(refresh_token) = inner.tokens.refresh_token() else {
        return Err(BackofficeError::Unauthorized {
            message: "Session has no refresh token".to_string(),
            context: context(),
        });
    };

    set_state(inner, SessionState::Refreshing);
    debug!("Refreshing session tokens");

    let body = serde_json::to_value(RefreshRequest { refresh_token })?;
    let outcome = inner
        .transport
        .execute(ApiRequest::post(REFRESH_PATH, body))
        .await;

    if inner.refresh_gen.load(Ordering::SeqCst) != generation {
        debug!("Discarding refresh result; the session changed while it was in flight");
        return Err(stale_refresh(context()));
    }

    match outcome {
        Ok(response) if response.is_success() => match response.json::<AuthPayload>() {
            Ok(payload) => {
                let session = install_session(inner, payload);
                // Background refreshes reload the context quietly; a failure
                // here must not invalidate the fresh tokens.
                if let Err(e) = inner.authz.load(true).await {
                    warn!(error = %e, "Authorization context reload failed after refresh");
                }
                debug!(user_id = %session.user.id, "Session refreshed");
                Ok(session)
            }
            Err(e) => {
                clear_session(inner).await;
                Err(BackofficeError::RefreshExhausted {
                    message: "Refresh response was malformed".to_string(),
                    source: Some(Box::new(e)),
                    context: context(),
                })
            }
        },
        Ok(response) => {
            clear_session(inner).await;
            Err(BackofficeError::RefreshExhausted {
                message: format!("Refresh rejected with status {}", response.status),
                source: None,
                context: context(),
            })
        }
        Err(e) => {
            clear_session(inner).await;
            Err(BackofficeError::RefreshExhausted {
                message: "Refresh request failed".to_string(),
                source: Some(Box::new(e)),
                context: context(),
            })
        }
    }
}

/// (Re)arm the renewal timer from the stored access token's expiry.
///
/// An expiry already inside the lead window refreshes immediately; otherwise
/// the timer fires `refresh_lead_ms` before expiry, never sooner than
/// `min_refresh_delay_ms` from now. A token with no known expiry is left to
/// the reactive 401 path.
fn schedule_renewal(inner: &Arc<SessionInner>) {
    cancel_renewal(inner);

    let Some(expiry) = inner.tokens.access_expiry() else {
        debug!("Access token has no known expiry; renewal timer not armed");
        return;
    };

    let until_expiry = (expiry - Utc::now()).num_milliseconds();
    let lead = inner.config.refresh_lead_ms as i64;
    let delay_ms = if until_expiry <= lead {
        0
    } else {
        (until_expiry - lead).max(inner.config.min_refresh_delay_ms as i64)
    };
    debug!(delay_ms = delay_ms, "Arming token renewal timer");

    let manager = SessionManager {
        inner: inner.clone(),
    };
    let handle = tokio::spawn(async move {
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms as u64)).await;
        }
        if let Err(e) = manager.refresh(true).await {
            warn!(error = %e, "Scheduled token renewal failed");
        }
    });

    if let Ok(mut slot) = inner.renewal.lock() {
        *slot = Some(handle);
    }
}

fn stale_refresh(context: ErrorContext) -> BackofficeError {
    BackofficeError::Unauthorized {
        message: "Session ended while the refresh was in flight".to_string(),
        context,
    }
}

fn cancel_renewal(inner: &Arc<SessionInner>) {
    if let Ok(mut slot) = inner.renewal.lock() {
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}
