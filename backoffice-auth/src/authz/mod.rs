//! Authorization context: identity, roles, and the permission tree
//!
//! [`AuthzManager`] owns the state container and the permission tree, and
//! knows how to (re)load both from the API. Loads are single-flight: however
//! many callers ask at once, one network round trip serves them all.

pub mod resolver;
pub mod store;

pub use resolver::{can, flatten, normalize, PermissionNode, PermissionTree};
pub use store::{AuthorizationPatch, AuthorizationState, AuthorizationStore};

use backoffice_api::{
    ApiRequest, ApiTransport, MePayload, PermissionsEnvelope, PermissionsPayload, ME_PATH,
    PERMISSIONS_PATH,
};
use backoffice_core::{BackofficeError, BackofficeResult, ErrorContext};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::token::TokenStore;

type SharedLoad = Shared<BoxFuture<'static, Result<(), Arc<BackofficeError>>>>;

struct AuthzInner {
    transport: Arc<dyn ApiTransport>,
    tokens: Arc<TokenStore>,
    store: AuthorizationStore,
    tree: RwLock<PermissionTree>,
    inflight: Mutex<Option<SharedLoad>>,
    load_gen: AtomicU64,
}

/// Handle to the shared authorization context
#[derive(Clone)]
pub struct AuthzManager {
    inner: Arc<AuthzInner>,
}

impl AuthzManager {
    pub fn new(transport: Arc<dyn ApiTransport>, tokens: Arc<TokenStore>) -> Self {
        Self {
            inner: Arc::new(AuthzInner {
                transport,
                tokens,
                store: AuthorizationStore::new(),
                tree: RwLock::new(PermissionTree::new()),
                inflight: Mutex::new(None),
                load_gen: AtomicU64::new(0),
            }),
        }
    }

    /// Fetch the caller's identity and grants.
    ///
    /// With `force` false an already loaded context is returned as-is and an
    /// in-flight load is joined; with `force` true a fresh load always starts
    /// and replaces any in-flight one.
    pub async fn load(&self, force: bool) -> BackofficeResult<()> {
        if !force && self.inner.store.snapshot().loaded {
            return Ok(());
        }

        let shared = {
            let mut cell = self.inner.inflight.lock().await;
            match (cell.as_ref(), force) {
                (Some(existing), false) => existing.clone(),
                _ => {
                    let fresh = start_load(self.inner.clone());
                    *cell = Some(fresh.clone());
                    fresh
                }
            }
        };

        shared.await.map_err(BackofficeError::Shared)
    }

    /// Resolve a permission path; the `admin` role short-circuits to true
    pub fn can(&self, path: &str) -> bool {
        self.can_with(path, false)
    }

    pub fn can_with(&self, path: &str, fallback: bool) -> bool {
        if self.inner.store.snapshot().is_admin() {
            return true;
        }
        match self.inner.tree.read() {
            Ok(tree) => resolver::can(&tree, path, fallback),
            Err(_) => fallback,
        }
    }

    pub fn snapshot(&self) -> AuthorizationState {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthorizationState> {
        self.inner.store.subscribe()
    }

    /// Drop everything: state, tree, and any in-flight load
    pub async fn reset(&self) {
        self.inner.load_gen.fetch_add(1, Ordering::SeqCst);
        *self.inner.inflight.lock().await = None;
        if let Ok(mut tree) = self.inner.tree.write() {
            tree.clear();
        }
        self.inner.store.reset();
    }
}

fn start_load(inner: Arc<AuthzInner>) -> SharedLoad {
    let generation = inner.load_gen.fetch_add(1, Ordering::SeqCst) + 1;
    async move {
        let result = perform_load(&inner, generation).await.map_err(Arc::new);
        // Only the newest load owns the cell; a superseded one leaves it be.
        let mut cell = inner.inflight.lock().await;
        if inner.load_gen.load(Ordering::SeqCst) == generation {
            *cell = None;
        }
        result
    }
    .boxed()
    .shared()
}

/// The fetch only counts while `generation` is still current; a reset or a
/// forced reload that lands mid-flight bumps the counter, and this result is
/// then discarded instead of re-populating state that was just torn down.
async fn perform_load(inner: &Arc<AuthzInner>, generation: u64) -> BackofficeResult<()> {
    if inner.load_gen.load(Ordering::SeqCst) != generation {
        return Err(stale_load());
    }

    inner.store.patch(AuthorizationPatch {
        loading: Some(true),
        ..Default::default()
    });

    let result = fetch_context(inner).await;

    if inner.load_gen.load(Ordering::SeqCst) != generation {
        debug!("Discarding context load; the state was reset while it was in flight");
        return Err(stale_load());
    }

    match result {
        Ok((user, roles, permissions, tree)) => {
            if let Ok(mut slot) = inner.tree.write() {
                *slot = tree;
            }
            let state = inner.store.patch(AuthorizationPatch {
                user: Some(Some(user)),
                roles: Some(roles),
                permissions: Some(permissions),
                loaded: Some(true),
                loading: Some(false),
                last_synced_at: Some(Some(Utc::now())),
            });
            info!(
                roles = ?state.roles,
                permissions = state.permissions.len(),
                "Authorization context loaded"
            );
            Ok(())
        }
        Err(e) => {
            inner.store.patch(AuthorizationPatch {
                loading: Some(false),
                ..Default::default()
            });
            warn!(error = %e, "Authorization context load failed");
            Err(e)
        }
    }
}

async fn fetch_context(
    inner: &Arc<AuthzInner>,
) -> BackofficeResult<(
    backoffice_core::UserRecord,
    Vec<String>,
    Vec<String>,
    PermissionTree,
)> {
    let bearer = inner.tokens.access_token();

    let me = inner
        .transport
        .execute(ApiRequest::get(ME_PATH).with_bearer(bearer.clone()))
        .await?;
    let me = require_success(me, ME_PATH)?;
    let MePayload { user } = me.json()?;

    let perms = inner
        .transport
        .execute(ApiRequest::get(PERMISSIONS_PATH).with_bearer(bearer))
        .await?;
    let perms = require_success(perms, PERMISSIONS_PATH)?;
    let payload = decode_permissions(&perms)?;

    let tree = normalize(&payload);
    let permissions = match &payload {
        PermissionsPayload::List(paths) => paths.clone(),
        PermissionsPayload::Tree(_) => flatten(&tree),
    };
    let roles = user.roles.clone();
    debug!(user_id = %user.id, "Fetched authorization context");
    Ok((user, roles, permissions, tree))
}

/// Accept both the `{"permissions": ...}` envelope and a bare payload
fn decode_permissions(
    response: &backoffice_api::ApiResponse,
) -> BackofficeResult<PermissionsPayload> {
    if let Ok(PermissionsEnvelope { permissions }) = response.json() {
        return Ok(permissions);
    }
    response.json()
}

fn stale_load() -> BackofficeError {
    BackofficeError::Unauthorized {
        message: "Authorization context was reset while the load was in flight".to_string(),
        context: ErrorContext::new("authz").with_operation("load"),
    }
}

fn require_success(
    response: backoffice_api::ApiResponse,
    path: &str,
) -> BackofficeResult<backoffice_api::ApiResponse> {
    if response.is_unauthorized() {
        return Err(BackofficeError::Unauthorized {
            message: format!("{} rejected the session token", path),
            context: ErrorContext::new("authz").with_operation("load"),
        });
    }
    if response.is_forbidden() {
        return Err(BackofficeError::Forbidden {
            message: format!("{} is not permitted", path),
            context: ErrorContext::new("authz").with_operation("load"),
        });
    }
    if !response.is_success() {
        return Err(BackofficeError::UnexpectedResponse {
            message: format!("{} returned an unexpected status", path),
            status: Some(response.status),
            context: ErrorContext::new("authz").with_operation("load"),
        });
    }
    Ok(response)
}
