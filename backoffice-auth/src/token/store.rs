//! Credential persistence
//!
//! An in-memory map is authoritative for the lifetime of the process; every
//! write is mirrored to a pluggable [`KeyValueStorage`] backend so a restarted
//! console can resume its session. Backend write failures are logged and
//! swallowed: losing persistence degrades to an in-memory session, it never
//! fails the operation that triggered the write.

use backoffice_core::{storage_error, BackofficeResult, SessionTokens, UserRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::token::claims;

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const AUTH_USER_KEY: &str = "auth_user";

/// Minimal string key/value backend the token store persists through
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> BackofficeResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> BackofficeResult<()>;
    fn remove(&self, key: &str) -> BackofficeResult<()>;
}

/// Volatile backend; sessions do not survive a restart
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> BackofficeResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| storage_error!("Storage lock poisoned", "memory_storage"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BackofficeResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| storage_error!("Storage lock poisoned", "memory_storage"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> BackofficeResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| storage_error!("Storage lock poisoned", "memory_storage"))?;
        entries.remove(key);
        Ok(())
    }
}

/// File-backed backend; the whole map lives as one JSON document
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open or create the backing file. A missing file starts empty; an
    /// unreadable or corrupt one is an error so callers can decide whether to
    /// fall back to memory-only storage.
    pub fn open(path: impl AsRef<Path>) -> BackofficeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| storage_error!(format!("Failed to read {}", path.display()), "file_storage", e))?;
            serde_json::from_str(&raw)
                .map_err(|e| storage_error!(format!("Corrupt storage file {}", path.display()), "file_storage", e))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, String>) -> BackofficeResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    storage_error!(
                        format!("Failed to create {}", parent.display()),
                        "file_storage",
                        e
                    )
                })?;
            }
        }
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw).map_err(|e| {
            storage_error!(
                format!("Failed to write {}", self.path.display()),
                "file_storage",
                e
            )
        })
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> BackofficeResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| storage_error!("Storage lock poisoned", "file_storage"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BackofficeResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| storage_error!("Storage lock poisoned", "file_storage"))?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> BackofficeResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| storage_error!("Storage lock poisoned", "file_storage"))?;
        entries.remove(key);
        self.flush(&entries)
    }
}

/// The session's view of its credentials.
///
/// Reads are always served from the in-memory cache, hydrated once from the
/// backend at construction.
pub struct TokenStore {
    backend: Arc<dyn KeyValueStorage>,
    cache: RwLock<HashMap<String, String>>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStorage>) -> Self {
        let mut cache = HashMap::new();
        for key in [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, AUTH_USER_KEY] {
            match backend.get(key) {
                Ok(Some(value)) => {
                    cache.insert(key.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = key, error = %e, "Failed to hydrate credential from storage");
                }
            }
        }
        Self {
            backend,
            cache: RwLock::new(cache),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.cache.read() {
            Ok(cache) => cache.get(key).cloned(),
            Err(_) => None,
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), value.to_string());
        }
        if let Err(e) = self.backend.set(key, value) {
            warn!(key = key, error = %e, "Credential write not persisted; continuing in memory");
        }
    }

    fn erase(&self, key: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(key);
        }
        if let Err(e) = self.backend.remove(key) {
            warn!(key = key, error = %e, "Credential removal not persisted; continuing in memory");
        }
    }

    /// Store a fresh token pair and the user it belongs to
    pub fn persist_session(&self, tokens: &SessionTokens, user: &UserRecord) {
        self.write(AUTH_TOKEN_KEY, &tokens.access_token);
        self.write(REFRESH_TOKEN_KEY, &tokens.refresh_token);
        match serde_json::to_string(user) {
            Ok(raw) => self.write(AUTH_USER_KEY, &raw),
            Err(e) => warn!(error = %e, "User record not serializable; not persisted"),
        }
        debug!(user_id = %user.id, "Session credentials persisted");
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(AUTH_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn stored_user(&self) -> Option<UserRecord> {
        let raw = self.read(AUTH_USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Stored user record is corrupt; ignoring it");
                None
            }
        }
    }

    /// Expiry of the stored access token, when it can be determined
    pub fn access_expiry(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        claims::access_expiry(&self.access_token()?)
    }

    /// Remove every credential, both cached and persisted
    pub fn clear(&self) {
        self.erase(AUTH_TOKEN_KEY);
        self.erase(REFRESH_TOKEN_KEY);
        self.erase(AUTH_USER_KEY);
        debug!("Session credentials cleared");
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_access_token", &self.access_token().is_some())
            .field("has_refresh_token", &self.refresh_token().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> UserRecord {
        serde_json::from_value(serde_json::json!({
            "id": "u1",
            "email": "a@b.com",
            "roles": ["admin"],
        }))
        .unwrap()
    }

    fn sample_tokens() -> SessionTokens {
        SessionTokens {
            access_token: "abc".to_string(),
            refresh_token: "rtk".to_string(),
        }
    }

    #[test]
    fn persist_and_read_back() {
        let store = TokenStore::new(Arc::new(MemoryStorage::new()));
        store.persist_session(&sample_tokens(), &sample_user());

        assert_eq!(store.access_token().as_deref(), Some("abc"));
        assert_eq!(store.refresh_token().as_deref(), Some("rtk"));
        assert_eq!(store.stored_user().unwrap().email, "a@b.com");
    }

    #[test]
    fn clear_removes_all_three_keys() {
        let backend = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(backend.clone());
        store.persist_session(&sample_tokens(), &sample_user());
        store.clear();

        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
        assert!(store.stored_user().is_none());
        assert!(backend.get(AUTH_TOKEN_KEY).unwrap().is_none());
        assert!(backend.get(REFRESH_TOKEN_KEY).unwrap().is_none());
        assert!(backend.get(AUTH_USER_KEY).unwrap().is_none());
    }

    #[test]
    fn hydrates_from_backend_at_construction() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set(AUTH_TOKEN_KEY, "persisted").unwrap();
        let store = TokenStore::new(backend);
        assert_eq!(store.access_token().as_deref(), Some("persisted"));
    }

    #[test]
    fn backend_write_failure_keeps_in_memory_value() {
        struct FailingStorage;
        impl KeyValueStorage for FailingStorage {
            fn get(&self, _key: &str) -> BackofficeResult<Option<String>> {
                Ok(None)
            }
            fn set(&self, _key: &str, _value: &str) -> BackofficeResult<()> {
                Err(storage_error!("disk full", "test"))
            }
            fn remove(&self, _key: &str) -> BackofficeResult<()> {
                Err(storage_error!("disk full", "test"))
            }
        }

        let store = TokenStore::new(Arc::new(FailingStorage));
        store.persist_session(&sample_tokens(), &sample_user());
        assert_eq!(store.access_token().as_deref(), Some("abc"));
        store.clear();
        assert!(store.access_token().is_none());
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let backend = FileStorage::open(&path).unwrap();
            backend.set(AUTH_TOKEN_KEY, "abc").unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(AUTH_TOKEN_KEY).unwrap().as_deref(), Some("abc"));
        reopened.remove(AUTH_TOKEN_KEY).unwrap();
        assert!(reopened.get(AUTH_TOKEN_KEY).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileStorage::open(&path).is_err());
    }
}
