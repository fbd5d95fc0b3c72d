//! Route guards
//!
//! Each guard takes the route being entered and answers with an explicit
//! decision: allow, or redirect somewhere with an optional query. The shell
//! runs them before activating a route.

use tracing::{debug, warn};

use crate::events::{ConsoleEvent, Severity};
use crate::session::SessionManager;

/// What a route demands of the caller
#[derive(Debug, Clone, Default)]
pub struct RouteSpec {
    /// Path being navigated to, used as the return target after login
    pub path: String,
    /// Allow when the caller holds at least one of these (empty demands nothing)
    pub required_roles: Vec<String>,
    /// Allow only when every one of these resolves to granted
    pub required_permissions: Vec<String>,
}

impl RouteSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.required_roles = roles;
        self
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.required_permissions = permissions;
        self
    }
}

/// Outcome of a guard check
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    Allow,
    Redirect {
        path: String,
        query: Vec<(String, String)>,
    },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Requires a live session; tries a refresh before giving up
pub struct AuthGuard {
    session: SessionManager,
}

impl AuthGuard {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub async fn check(&self, route: &RouteSpec) -> GuardDecision {
        if self.session.has_valid_access_token(0) {
            return GuardDecision::Allow;
        }

        if self.session.tokens().refresh_token().is_some() {
            match self.session.refresh(true).await {
                Ok(Some(_)) => {
                    debug!(path = %route.path, "Session refreshed by route guard");
                    return GuardDecision::Allow;
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(path = %route.path, error = %e, "Guard refresh failed");
                }
            }
        }

        GuardDecision::Redirect {
            path: self.session.config().login_route.clone(),
            query: vec![("return_url".to_string(), route.path.clone())],
        }
    }
}

/// Requires at least one of the route's roles (none required passes)
pub struct RoleGuard {
    session: SessionManager,
}

impl RoleGuard {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub async fn check(&self, route: &RouteSpec) -> GuardDecision {
        if route.required_roles.is_empty() {
            return GuardDecision::Allow;
        }

        let state = self.session.authz().snapshot();
        if state.has_any_role(&route.required_roles) {
            return GuardDecision::Allow;
        }

        warn!(path = %route.path, required = ?route.required_roles, "Route denied by role guard");
        GuardDecision::Redirect {
            path: self.session.config().denied_route.clone(),
            query: Vec::new(),
        }
    }
}

/// Requires every one of the route's permissions; loads the authorization
/// context first if it has not been fetched yet
pub struct PermissionGuard {
    session: SessionManager,
}

impl PermissionGuard {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub async fn check(&self, route: &RouteSpec) -> GuardDecision {
        if route.required_permissions.is_empty() {
            return GuardDecision::Allow;
        }

        let authz = self.session.authz();
        if !authz.snapshot().loaded {
            // Joins an in-flight load; concurrent guarded routes share one fetch.
            if let Err(e) = authz.load(false).await {
                warn!(path = %route.path, error = %e, "Context load failed in permission guard");
                return self.deny(route);
            }
        }

        if route
            .required_permissions
            .iter()
            .all(|permission| authz.can(permission))
        {
            return GuardDecision::Allow;
        }

        self.deny(route)
    }

    fn deny(&self, route: &RouteSpec) -> GuardDecision {
        warn!(
            path = %route.path,
            required = ?route.required_permissions,
            "Route denied by permission guard"
        );
        self.session.events().emit(ConsoleEvent::Notify {
            severity: Severity::Warning,
            message: "You do not have access to this area".to_string(),
        });
        GuardDecision::Redirect {
            path: self.session.config().denied_route.clone(),
            query: Vec::new(),
        }
    }
}
