//! # Local Cache
//!
//! Durable key-value persistence that lets the members view survive a
//! restart: the last confirmed members list is written on every snapshot and
//! every local delete, and read back on `start()` before the network answers.
//!
//! ## Key Components
//!
//! - [`KeyValueStore`]: the synchronous, process-local storage collaborator
//! - [`FileStore`]: one JSON file per key under the platform data directory
//! - [`MemoryStore`]: in-memory store for tests and demos
//! - [`MembersCache`]: typed save/load of the members list on top of a store
//!
//! A payload that cannot be read back is a cache miss, never an error.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::shared::config::DEFAULT_MEMBERS_CACHE_KEY;
use crate::shared::{CacheError, Entity, EntityId, RemoteDocument};

/// Synchronous key-value persistence
pub trait KeyValueStore: Send + Sync {
    fn save(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Stored value, `Ok(None)` when the key was never written
    fn load(&self, key: &str) -> Result<Option<String>, CacheError>;
}

/// Key-value store backed by files on disk
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory
    pub fn in_data_dir() -> Self {
        let mut dir = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        dir.push("clubsync");
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn save(&self, key: &str, value: &str) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Readers never see a torn payload: write aside, then rename over.
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, value)?;
        std::fs::rename(&staging, &path)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Key-value store kept in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn save(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}

/// Persisted copy of the last confirmed members view
#[derive(Clone)]
pub struct MembersCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl std::fmt::Debug for MembersCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembersCache").field("key", &self.key).finish()
    }
}

impl MembersCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_MEMBERS_CACHE_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Persist the confirmed entities; pending ones are never cached
    pub fn save<'a>(&self, entities: impl IntoIterator<Item = &'a Entity>) {
        let records: Vec<RemoteDocument> = entities
            .into_iter()
            .filter_map(|entity| match &entity.id {
                EntityId::Remote(id) if !entity.is_pending() => {
                    Some(RemoteDocument::new(id.clone(), entity.fields.clone()))
                }
                _ => None,
            })
            .collect();

        let result = serde_json::to_string(&records)
            .map_err(CacheError::from)
            .and_then(|payload| self.store.save(&self.key, &payload));
        match result {
            Ok(()) => tracing::debug!("Cached {} members under '{}'", records.len(), self.key),
            Err(e) => tracing::error!("Error caching members: {}", e),
        }
    }

    /// Last saved members, empty on a miss or an unreadable payload
    pub fn load(&self) -> Vec<Entity> {
        let payload = match self.store.load(&self.key) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("Members cache unreadable, treating as empty: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<RemoteDocument>>(&payload) {
            Ok(records) => {
                let mut seen = HashSet::new();
                let total = records.len();
                let entities: Vec<Entity> = records
                    .into_iter()
                    .filter(|record| seen.insert(record.id.clone()))
                    .map(Entity::from)
                    .collect();
                if entities.len() != total {
                    tracing::warn!(
                        "Members cache repeats {} ids, keeping first copies",
                        total - entities.len()
                    );
                }
                entities
            }
            Err(e) => {
                tracing::warn!("Members cache corrupt, treating as empty: {}", e);
                Vec::new()
            }
        }
    }
}
