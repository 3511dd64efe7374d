//! Key-value persistence for the remembered credential.
//!
//! The store is injected, never reached as ambient global state. A
//! `CredentialSlot` scopes it to one fixed key and tracks the in-memory
//! credential plus the "remember on this device" flag.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cityboard_core::error::{CityboardError, Result};

/// String key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Store backed by a single flat TOML table on disk.
///
/// A missing file reads as empty. Every write rewrites the whole file.
#[derive(Debug)]
pub struct TomlFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_table(&self, table: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string(table).map_err(|e| CityboardError::Store(e.to_string()))?;
        write_private(&self.path, content.as_bytes())?;
        Ok(())
    }
}

/// Write `content` readable by the owner only where the platform allows it.
#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; tighten files written before.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}

impl KeyValueStore for TomlFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_table()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut table = self.read_table()?;
        table.insert(key.to_string(), value.to_string());
        self.write_table(&table)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut table = self.read_table()?;
        if table.remove(key).is_some() {
            self.write_table(&table)?;
        }
        Ok(())
    }
}

/// The single remembered credential.
pub struct CredentialSlot<S: KeyValueStore> {
    store: S,
    key: String,
    remember: bool,
    current: Option<String>,
}

impl<S: KeyValueStore> CredentialSlot<S> {
    /// Create a slot over `store` under `key`. Nothing is read until `load`.
    pub fn new(store: S, key: impl Into<String>, remember: bool) -> Self {
        Self {
            store,
            key: key.into(),
            remember,
            current: None,
        }
    }

    /// Read the persisted credential into memory.
    pub fn load(&mut self) -> Result<Option<String>> {
        self.current = self.store.get(&self.key)?.filter(|v| !v.is_empty());
        tracing::debug!(
            key = %self.key,
            has_credential = self.current.is_some(),
            "Credential loaded"
        );
        Ok(self.current.clone())
    }

    /// The credential to send, if any. Empty strings count as absent.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn remember(&self) -> bool {
        self.remember
    }

    /// Replace the in-memory credential, persisting it when remembering.
    pub fn set(&mut self, value: &str) -> Result<()> {
        self.current = Some(value.to_string()).filter(|v| !v.is_empty());
        if self.remember {
            self.store.set(&self.key, value)?;
        }
        Ok(())
    }

    /// Toggle persistence. Turning it off erases the stored value at once;
    /// turning it on writes the current credential if there is one.
    pub fn set_remember(&mut self, remember: bool) -> Result<()> {
        self.remember = remember;
        if !remember {
            self.store.remove(&self.key)?;
        } else if let Some(value) = &self.current {
            self.store.set(&self.key, value)?;
        }
        Ok(())
    }

    /// Drop the credential from memory and from the store.
    pub fn forget(&mut self) -> Result<()> {
        self.current = None;
        self.store.remove(&self.key)
    }
}
