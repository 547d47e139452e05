//! Local key/value storage shared by every open "tab" of the application.
//!
//! DESIGN
//! ======
//! A `StorageArea` is the persistent backing (in memory, or one JSON file per
//! key in a directory). Each `LocalStorage` handle opened on it is one tab.
//! Writes from a tab are broadcast to every *other* tab of the same area as
//! a `StorageEvent`, mirroring browser `storage` event semantics: a tab never
//! hears about its own writes.
//!
//! TRADE-OFFS
//! ==========
//! Change events only travel within one process. Another process sharing the
//! same directory sees new content on its next read.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;
const FILE_SUFFIX: &str = ".json";

/// Identifies one handle opened on a storage area.
pub type TabId = u64;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("storage io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io { path: path.to_path_buf(), source }
}

// =============================================================================
// EVENTS
// =============================================================================

/// A change made by another tab. `key == None` means the area was cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
    source: TabId,
}

impl StorageEvent {
    /// `true` if this event may have changed the value stored under `key`.
    #[must_use]
    pub fn affects(&self, key: &str) -> bool {
        self.key.as_deref().is_none_or(|k| k == key)
    }
}

/// Change notifications for one tab, with its own writes filtered out.
pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    tab: TabId,
}

impl StorageEvents {
    /// Wait for the next change made by another tab.
    ///
    /// Returns `None` once the area is gone. If this receiver fell behind,
    /// a whole-area event is returned so the caller re-reads everything.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.tab => {}
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(tab = self.tab, skipped, "storage events lagged; forcing resync");
                    return Some(StorageEvent { key: None, source: self.tab });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// =============================================================================
// STORAGE AREA
// =============================================================================

enum Backend {
    Memory(Mutex<HashMap<String, String>>),
    Directory(PathBuf),
}

/// Shared backing for a set of tabs.
pub struct StorageArea {
    backend: Backend,
    events: broadcast::Sender<StorageEvent>,
    next_tab: AtomicU64,
}

impl StorageArea {
    /// A volatile area, lost when the last handle is dropped.
    #[must_use]
    pub fn memory() -> Arc<Self> {
        Self::with_backend(Backend::Memory(Mutex::new(HashMap::new())))
    }

    /// An area persisted as `<dir>/<key>.json` files. The directory is created
    /// on first write.
    #[must_use]
    pub fn directory(dir: impl Into<PathBuf>) -> Arc<Self> {
        Self::with_backend(Backend::Directory(dir.into()))
    }

    fn with_backend(backend: Backend) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self { backend, events, next_tab: AtomicU64::new(1) })
    }

    /// Open a new tab on this area.
    #[must_use]
    pub fn open_tab(self: &Arc<Self>) -> LocalStorage {
        let tab = self.next_tab.fetch_add(1, Ordering::Relaxed);
        LocalStorage { area: Arc::clone(self), tab }
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        match &self.backend {
            Backend::Memory(map) => Ok(map.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()),
            Backend::Directory(dir) => {
                let path = key_path(dir, key);
                match std::fs::read_to_string(&path) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(io_error(&path, e)),
                }
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match &self.backend {
            Backend::Memory(map) => {
                map.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.to_owned(), value.to_owned());
                Ok(())
            }
            Backend::Directory(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
                let path = key_path(dir, key);
                // Whole-file replace so readers never observe a partial record.
                let tmp = dir.join(format!(".{key}.{}.tmp", Uuid::new_v4().simple()));
                std::fs::write(&tmp, value).map_err(|e| io_error(&tmp, e))?;
                std::fs::rename(&tmp, &path).map_err(|e| {
                    let _ = std::fs::remove_file(&tmp);
                    io_error(&path, e)
                })
            }
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match &self.backend {
            Backend::Memory(map) => {
                map.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
                Ok(())
            }
            Backend::Directory(dir) => {
                let path = key_path(dir, key);
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(io_error(&path, e)),
                }
            }
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Memory(map) => {
                map.lock().unwrap_or_else(PoisonError::into_inner).clear();
                Ok(())
            }
            Backend::Directory(dir) => {
                let entries = match std::fs::read_dir(dir) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                    Err(e) => return Err(io_error(dir, e)),
                };
                for entry in entries {
                    let path = entry.map_err(|e| io_error(dir, e))?.path();
                    let is_record = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(FILE_SUFFIX) && !n.starts_with('.'));
                    if is_record {
                        std::fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
                    }
                }
                Ok(())
            }
        }
    }

    fn notify(&self, key: Option<&str>, source: TabId) {
        // No subscribers is fine.
        let _ = self.events.send(StorageEvent { key: key.map(ToOwned::to_owned), source });
    }
}

fn key_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}{FILE_SUFFIX}"))
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid { Ok(()) } else { Err(StorageError::InvalidKey(key.to_owned())) }
}

// =============================================================================
// TAB HANDLE
// =============================================================================

/// One tab's view of a [`StorageArea`], with a `localStorage`-like API.
#[derive(Clone)]
pub struct LocalStorage {
    area: Arc<StorageArea>,
    tab: TabId,
}

impl LocalStorage {
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab
    }

    /// Open a sibling tab on the same area.
    #[must_use]
    pub fn open_tab(&self) -> LocalStorage {
        self.area.open_tab()
    }

    /// # Errors
    ///
    /// Fails on an invalid key or an unreadable backing file.
    pub fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.area.read(key)
    }

    /// # Errors
    ///
    /// Fails on an invalid key or when the backing file cannot be written.
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.area.write(key, value)?;
        self.area.notify(Some(key), self.tab);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails on an invalid key or when the backing file cannot be removed.
    pub fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.area.remove(key)?;
        self.area.notify(Some(key), self.tab);
        Ok(())
    }

    /// Remove every key in the area.
    ///
    /// # Errors
    ///
    /// Fails when the backing directory cannot be listed or a file removed.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.area.clear()?;
        self.area.notify(None, self.tab);
        Ok(())
    }

    /// Subscribe to changes made by other tabs.
    #[must_use]
    pub fn subscribe(&self) -> StorageEvents {
        StorageEvents { rx: self.area.events.subscribe(), tab: self.tab }
    }
}
