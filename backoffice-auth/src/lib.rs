//! Backoffice Auth - Session and authorization core for the admin console
//!
//! Bearer-token sessions with proactive renewal, single-flight refresh
//! coordination, hierarchical permission grants, an authenticated HTTP
//! client, and route guards. The hosting shell wires everything up once
//! through [`ConsoleAuth`] and reacts to [`ConsoleEvent`]s.

pub mod authz;
pub mod events;
pub mod guards;
pub mod http;
pub mod session;
pub mod token;

pub use authz::{
    AuthorizationPatch, AuthorizationState, AuthorizationStore, AuthzManager, PermissionNode,
    PermissionTree,
};
pub use events::{ConsoleEvent, EventBus, Severity};
pub use guards::{AuthGuard, GuardDecision, PermissionGuard, RoleGuard, RouteSpec};
pub use http::AuthHttpClient;
pub use session::{Session, SessionManager, SessionState};
pub use token::{FileStorage, KeyValueStorage, MemoryStorage, TokenStore};

use backoffice_api::{ApiTransport, HttpTransport, TransportConfig};
use backoffice_core::{AuthConfig, BackofficeResult};
use std::sync::Arc;

/// Everything a console shell needs, wired from one configuration
pub struct ConsoleAuth {
    pub session: SessionManager,
    pub http: AuthHttpClient,
    pub auth_guard: AuthGuard,
    pub role_guard: RoleGuard,
    pub permission_guard: PermissionGuard,
}

impl ConsoleAuth {
    /// Wire the core against any transport (tests pass a mock here)
    pub fn new(config: AuthConfig, transport: Arc<dyn ApiTransport>) -> BackofficeResult<Self> {
        let session = SessionManager::new(config, transport.clone())?;
        Ok(Self {
            http: AuthHttpClient::new(transport, session.clone()),
            auth_guard: AuthGuard::new(session.clone()),
            role_guard: RoleGuard::new(session.clone()),
            permission_guard: PermissionGuard::new(session.clone()),
            session,
        })
    }

    /// Wire the core against the real HTTP transport
    pub fn with_http_transport(config: AuthConfig) -> BackofficeResult<Self> {
        let transport = HttpTransport::new(
            TransportConfig::new(&config.api_base_url).with_timeout(config.timeout_seconds),
        )?;
        Self::new(config, Arc::new(transport))
    }
}
