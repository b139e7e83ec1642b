//!
//! nutrack durable token storage
//! -----------------------------
//! A small synchronous key-value store holding the credential pair across
//! process restarts. The session writes through to it on every credential
//! mutation and reads it once when a manager is constructed.
//!
//! Two backends:
//! - `MemoryTokenStore`: process-local map, used by tests and embedders that
//!   persist elsewhere.
//! - `FileTokenStore`: a pretty-printed JSON object on disk. A missing file is
//!   an empty store. Writes go to a sibling temp file and are renamed into place.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token file {path} is not a JSON object of strings: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl TokenStoreError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenStoreError::Io { .. } => "store_io",
            TokenStoreError::Format { .. } => "store_format",
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), TokenStoreError>;
    fn remove(&self, key: &str) -> Result<(), TokenStoreError>;
}

pub type SharedTokenStore = Arc<dyn TokenStore>;

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self { Self::default() }

    /// Pre-populated store, as if a previous process had logged in.
    pub fn with_tokens(access: &str, refresh: Option<&str>) -> Self {
        let store = Self::new();
        {
            let mut m = store.entries.lock();
            m.insert(ACCESS_TOKEN_KEY.to_string(), access.to_string());
            if let Some(r) = refresh { m.insert(REFRESH_TOKEN_KEY.to_string(), r.to_string()); }
        }
        store
    }

    pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TokenStoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

pub struct FileTokenStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn read_map(&self) -> Result<BTreeMap<String, String>, TokenStoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(TokenStoreError::Io { path: self.path.clone(), source: e }),
        };
        if text.trim().is_empty() { return Ok(BTreeMap::new()); }
        serde_json::from_str(&text).map_err(|e| TokenStoreError::Format { path: self.path.clone(), source: e })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), TokenStoreError> {
        let io_err = |e: std::io::Error| TokenStoreError::Io { path: self.path.clone(), source: e };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() { std::fs::create_dir_all(parent).map_err(io_err)?; }
        }
        let text = serde_json::to_string_pretty(map)
            .map_err(|e| TokenStoreError::Format { path: self.path.clone(), source: e })?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text).map_err(io_err)?;
        restrict_permissions(&tmp).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(target: "nutrack::store", "token file written: path={:?} keys={}", self.path, map.len());
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> { Ok(()) }

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError> {
        let _g = self.lock.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TokenStoreError> {
        let _g = self.lock.lock();
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
        let _g = self.lock.lock();
        let mut map = self.read_map()?;
        if map.remove(key).is_none() { return Ok(()); }
        self.write_map(&map)
    }
}
