//! Storage for the bearer token attached to outgoing requests.
//!
//! The client never reads the token from a global; a [`CredentialStore`] is
//! handed to it at construction so tests can inject an in-memory store.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Mutex, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("credential storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("no credential storage location available")]
    Unavailable,
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<SecretString>, CredentialStoreError>;

    fn store(&self, token: SecretString) -> Result<(), CredentialStoreError>;

    fn clear(&self) -> Result<(), CredentialStoreError>;
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

/// Process-local token storage
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<SecretString>>,
}

impl MemoryCredentialStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(SecretString::from(token.into()))),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<SecretString>, CredentialStoreError> {
        let guard = self.token.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.as_ref().map(copy_secret))
    }

    fn store(&self, token: SecretString) -> Result<(), CredentialStoreError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Persistent token storage: a JSON object of `key -> token` in a single
/// file, shared by every profile that uses a different storage key.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    key: String,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store under the platform config directory (`credentials.json`)
    pub fn in_config_dir(key: impl Into<String>) -> Result<Self, CredentialStoreError> {
        let path = utils::assets::credentials_path().ok_or(CredentialStoreError::Unavailable)?;
        Ok(Self::new(path, key))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, CredentialStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Entries to rewrite on `store`/`clear`. A corrupt file is moved aside
    /// so a fresh login can still be persisted.
    fn read_entries_for_update(&self) -> Result<BTreeMap<String, String>, CredentialStoreError> {
        match self.read_entries() {
            Err(CredentialStoreError::Corrupt(e)) => {
                let aside = self.path.with_extension("json.corrupt");
                fs::rename(&self.path, &aside)?;
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "credential file was corrupt, starting a new one"
                );
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn write_entries(
        &self,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<SecretString>, CredentialStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries()?;
        Ok(entries.remove(&self.key).map(SecretString::from))
    }

    fn store(&self, token: SecretString) -> Result<(), CredentialStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries_for_update()?;
        entries.insert(self.key.clone(), token.expose_secret().to_owned());
        self.write_entries(&entries)?;
        debug!(path = %self.path.display(), key = %self.key, "stored bearer token");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries_for_update()?;
        if entries.remove(&self.key).is_some() {
            self.write_entries(&entries)?;
            debug!(path = %self.path.display(), key = %self.key, "cleared bearer token");
        }
        Ok(())
    }
}

/// Wraps a persistent store with an in-memory fallback.
///
/// When the primary store fails the failure is logged and reads are served
/// from the fallback; callers never see an error. Every `store` still tries
/// the primary first, and a successful write ends the degraded state.
#[derive(Debug)]
pub struct FallbackCredentialStore<S> {
    primary: S,
    fallback: MemoryCredentialStore,
    degraded: AtomicBool,
}

impl<S: CredentialStore> FallbackCredentialStore<S> {
    pub fn new(primary: S) -> Self {
        Self {
            primary,
            fallback: MemoryCredentialStore::default(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the primary store has failed and the fallback is in use
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn degrade(&self, operation: &str, error: &CredentialStoreError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(
                operation,
                error = %error,
                "credential storage unavailable, keeping the token in memory for this session"
            );
        }
    }
}

impl<S: CredentialStore> CredentialStore for FallbackCredentialStore<S> {
    fn load(&self) -> Result<Option<SecretString>, CredentialStoreError> {
        if self.is_degraded() {
            return self.fallback.load();
        }
        match self.primary.load() {
            Ok(token) => Ok(token),
            Err(e) => {
                self.degrade("load", &e);
                self.fallback.load()
            }
        }
    }

    fn store(&self, token: SecretString) -> Result<(), CredentialStoreError> {
        let copy = copy_secret(&token);
        match self.primary.store(token) {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::AcqRel) {
                    info!("credential storage recovered");
                }
            }
            Err(e) => self.degrade("store", &e),
        }
        self.fallback.store(copy)
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        if let Err(e) = self.primary.clear() {
            self.degrade("clear", &e);
        }
        self.fallback.clear()
    }
}
