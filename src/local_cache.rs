use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::log_client_event;

/// Synchronous same-device key/value storage, shaped like browser local storage.
pub trait CacheStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local storage; lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file backed storage that survives a restart. The whole map is
/// rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Opens `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let items = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<HashMap<String, String>>(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            items: Mutex::new(items),
        }
    }

    fn persist(&self, items: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string(items)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("writing cache file {}", self.path.display()))
    }
}

impl CacheStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("file storage lock poisoned"))?;
        items.insert(key.to_string(), value.to_string());
        self.persist(&items)
    }
}

/// Last card index seen on this device, with the epoch-millis time it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCacheEntry {
    pub index: i64,
    pub timestamp: i64,
}

/// Per-(user, chapter) resume hints over a [`CacheStorage`].
///
/// Entries are hints only: reads never fail (anything unparseable is treated
/// as absent) and writes never surface errors.
#[derive(Clone)]
pub struct LocalCache {
    storage: Arc<dyn CacheStorage>,
}

impl LocalCache {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// `None` when there is no user to scope the entry to.
    pub fn key(user_id: &str, chapter_id: Uuid) -> Option<String> {
        if user_id.is_empty() {
            return None;
        }
        Some(format!("chapter-progress-{}-{}", user_id, chapter_id))
    }

    pub fn read(&self, user_id: &str, chapter_id: Uuid) -> Option<LocalCacheEntry> {
        let key = Self::key(user_id, chapter_id)?;
        let raw = self.storage.get_item(&key)?;
        let entry = parse_entry(&raw);
        if entry.is_none() {
            log_client_event!(debug, "cache_read", chapter_id = chapter_id, "unreadable cache entry ignored");
        }
        entry
    }

    pub fn write(&self, user_id: &str, chapter_id: Uuid, entry: LocalCacheEntry) {
        let Some(key) = Self::key(user_id, chapter_id) else {
            return;
        };
        let result = serde_json::to_string(&entry)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.storage.set_item(&key, &raw));
        if let Err(e) = result {
            log_client_event!(failed, "cache_write", error = e);
        }
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }
}

/// Best-effort parse of a stored entry.
///
/// Accepts the structured `{"index", "timestamp"}` form, a bare JSON number
/// and older raw strings such as `"3"`. The latter two carry no time, so they
/// get timestamp 0 and lose to any server record.
pub fn parse_entry(raw: &str) -> Option<LocalCacheEntry> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => {
            let index = as_integer(map.get("index")?)?;
            let timestamp = as_integer(map.get("timestamp")?)?;
            Some(LocalCacheEntry { index, timestamp })
        }
        Ok(Value::Number(n)) => Some(LocalCacheEntry {
            index: as_integer(&Value::Number(n))?,
            timestamp: 0,
        }),
        Ok(Value::String(s)) => legacy_index(&s),
        Ok(_) => None,
        Err(_) => legacy_index(raw),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

// Leading-integer parse: "3", " 7abc" and "-1" are accepted, "abc" is not.
fn legacy_index(raw: &str) -> Option<LocalCacheEntry> {
    let trimmed = raw.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let index = digits[..end].parse::<i64>().ok()?;
    Some(LocalCacheEntry {
        index: sign * index,
        timestamp: 0,
    })
}
