//! Perishable key/value caching.
//!
//! [`KeyValueStore`] is the injected storage capability (in the browser this
//! was local storage). [`ExpiringCache`] layers `{data, expire}` envelopes on
//! top of any store, dropping entries that are stale or unreadable.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{AppError, Result};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// String key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::config("cache lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// Every write rewrites the whole file; this is meant for small caches.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// A missing or unreadable file starts an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Opens the store in the user's cache directory
    /// (e.g. `~/.cache/pixfit/cache.json` on Linux).
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("", "pixfit", "pixfit")
            .ok_or_else(|| AppError::config("no home directory for the cache"))?;
        Ok(Self::open(dirs.cache_dir().join("cache.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::config("cache lock poisoned"))?;
        change(&mut entries);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&*entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AppError::config("cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.mutate(|entries| entries.clear())
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    data: T,
    /// Expiry as unix milliseconds.
    expire: i64,
}

/// Records that can be removed from cached lists by id.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Time-limited cache over a [`KeyValueStore`].
pub struct ExpiringCache<S> {
    store: S,
    clock: fn() -> i64,
}

impl<S: KeyValueStore> ExpiringCache<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, now_millis)
    }

    /// Uses `clock` (unix milliseconds) instead of the system time.
    pub fn with_clock(store: S, clock: fn() -> i64) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn set<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            data,
            expire: (self.clock)().saturating_add(ttl_ms),
        };
        self.store.set(key, serde_json::to_string(&envelope)?)
    }

    /// Returns the cached value, or `None` if it is missing, expired or
    /// unreadable. Expired and unreadable entries are deleted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) if (self.clock)() > envelope.expire => {
                self.store.remove(key)?;
                Ok(None)
            }
            Ok(envelope) => Ok(Some(envelope.data)),
            Err(e) => {
                log::warn!("dropping unreadable cache entry {}: {}", key, e);
                self.store.remove(key)?;
                Ok(None)
            }
        }
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key)
    }

    pub fn clear_all(&self) -> Result<()> {
        self.store.clear()
    }

    /// Drops the record with `id` from a cached list and re-caches the rest
    /// with a fresh `ttl`. Missing or expired lists are left alone.
    pub fn remove_item_from_list<T>(&self, list_key: &str, id: &str, ttl: Duration) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Identified,
    {
        if let Some(list) = self.get::<Vec<T>>(list_key)? {
            let remaining: Vec<T> = list.into_iter().filter(|item| item.id() != id).collect();
            self.set(list_key, &remaining, ttl)?;
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
