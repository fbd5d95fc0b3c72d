//! Authorization state container
//!
//! One synchronously readable snapshot of who the caller is and what they may
//! do, with a broadcast feed of state changes for anything that wants to
//! react (menus, route tables, header widgets).

use backoffice_core::UserRecord;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Snapshot of the caller's authorization context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorizationState {
    pub user: Option<UserRecord>,
    /// Role names, first occurrence wins on duplicates
    pub roles: Vec<String>,
    /// Raw granted permission paths from the most recent fetch
    pub permissions: Vec<String>,
    /// True once a context fetch has completed
    pub loaded: bool,
    /// True while a context fetch is in flight
    pub loading: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl AuthorizationState {
    /// The `admin` role grants every permission
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == "admin")
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }
}

/// Partial update; None leaves the field untouched
#[derive(Debug, Default)]
pub struct AuthorizationPatch {
    pub user: Option<Option<UserRecord>>,
    pub roles: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
    pub loaded: Option<bool>,
    pub loading: Option<bool>,
    pub last_synced_at: Option<Option<DateTime<Utc>>>,
}

/// Shared container for [`AuthorizationState`]
#[derive(Debug)]
pub struct AuthorizationStore {
    state: RwLock<AuthorizationState>,
    changes: broadcast::Sender<AuthorizationState>,
}

impl AuthorizationStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(100);
        Self {
            state: RwLock::new(AuthorizationState::default()),
            changes,
        }
    }

    pub fn snapshot(&self) -> AuthorizationState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply a partial update and broadcast the resulting state.
    ///
    /// Role and permission lists are replaced wholesale and deduplicated
    /// keeping first occurrence order.
    pub fn patch(&self, patch: AuthorizationPatch) -> AuthorizationState {
        let next = {
            let mut state = match self.state.write() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(user) = patch.user {
                state.user = user;
            }
            if let Some(roles) = patch.roles {
                state.roles = dedup_preserving_order(roles);
            }
            if let Some(permissions) = patch.permissions {
                state.permissions = dedup_preserving_order(permissions);
            }
            if let Some(loaded) = patch.loaded {
                state.loaded = loaded;
            }
            if let Some(loading) = patch.loading {
                state.loading = loading;
            }
            if let Some(synced) = patch.last_synced_at {
                state.last_synced_at = synced;
            }
            state.clone()
        };
        debug!(
            loaded = next.loaded,
            roles = next.roles.len(),
            permissions = next.permissions.len(),
            "Authorization state updated"
        );
        let _ = self.changes.send(next.clone());
        next
    }

    /// Return to the pristine logged-out state
    pub fn reset(&self) {
        self.patch(AuthorizationPatch {
            user: Some(None),
            roles: Some(Vec::new()),
            permissions: Some(Vec::new()),
            loaded: Some(false),
            loading: Some(false),
            last_synced_at: Some(None),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthorizationState> {
        self.changes.subscribe()
    }
}

impl Default for AuthorizationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_replaces_only_named_fields() {
        let store = AuthorizationStore::new();
        store.patch(AuthorizationPatch {
            roles: Some(vec!["editor".to_string()]),
            loaded: Some(true),
            ..Default::default()
        });

        let state = store.snapshot();
        assert_eq!(state.roles, vec!["editor"]);
        assert!(state.loaded);
        assert!(state.user.is_none());
        assert!(!state.loading);
    }

    #[test]
    fn duplicate_roles_keep_first_occurrence() {
        let store = AuthorizationStore::new();
        store.patch(AuthorizationPatch {
            roles: Some(vec![
                "editor".to_string(),
                "admin".to_string(),
                "editor".to_string(),
            ]),
            ..Default::default()
        });
        assert_eq!(store.snapshot().roles, vec!["editor", "admin"]);
    }

    #[test]
    fn reset_returns_to_default() {
        let store = AuthorizationStore::new();
        store.patch(AuthorizationPatch {
            roles: Some(vec!["admin".to_string()]),
            permissions: Some(vec!["product.create".to_string()]),
            loaded: Some(true),
            last_synced_at: Some(Some(Utc::now())),
            ..Default::default()
        });
        store.reset();
        assert_eq!(store.snapshot(), AuthorizationState::default());
    }

    #[tokio::test]
    async fn subscribers_observe_patches() {
        let store = AuthorizationStore::new();
        let mut rx = store.subscribe();
        store.patch(AuthorizationPatch {
            loaded: Some(true),
            ..Default::default()
        });
        let observed = rx.recv().await.unwrap();
        assert!(observed.loaded);
    }

    #[test]
    fn admin_detection() {
        let mut state = AuthorizationState::default();
        assert!(!state.is_admin());
        state.roles = vec!["support".to_string(), "admin".to_string()];
        assert!(state.is_admin());
        assert!(state.has_any_role(&["admin".to_string()]));
        assert!(!state.has_any_role(&["owner".to_string()]));
    }
}
