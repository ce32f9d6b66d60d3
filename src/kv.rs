//! String key-value storage with `localStorage` semantics.
//!
//! The favorites fallback only needs `get_item`/`set_item`/`remove_item`
//! over strings, so any host storage can sit behind [`KeyValueStore`].
//! Two implementations ship with the crate:
//!
//! | Store | Persistence |
//! |-------|-------------|
//! | [`MemoryKeyValueStore`] | process lifetime |
//! | [`FileKeyValueStore`] | one JSON object file, rewritten atomically on every change |

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

use crate::errors::FavoritesError;

pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, FavoritesError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), FavoritesError>;
    fn remove_item(&self, key: &str) -> Result<(), FavoritesError>;
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, FavoritesError> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), FavoritesError> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), FavoritesError> {
        self.items.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Opens (or starts) the store at `path`. A corrupt file is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FavoritesError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let items = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(items) => items,
                Err(e) => {
                    log::warn!("Discarding unreadable key-value file {:?}: {}", path, e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        log::debug!("Opened key-value store at {:?} ({} keys)", path, items.len());

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), FavoritesError> {
        let json = serde_json::to_string_pretty(items)?;
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, FavoritesError> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), FavoritesError> {
        let mut items = self.items.lock();
        let previous = items.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&items) {
            // keep memory in step with disk
            match previous {
                Some(old) => items.insert(key.to_string(), old),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), FavoritesError> {
        let mut items = self.items.lock();
        if let Some(old) = items.remove(key) {
            if let Err(e) = self.persist(&items) {
                items.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get_item("a").unwrap(), None);

        store.set_item("a", "1").unwrap();
        store.set_item("a", "2").unwrap();
        assert_eq!(store.get_item("a").unwrap().as_deref(), Some("2"));

        store.remove_item("a").unwrap();
        store.remove_item("a").unwrap();
        assert_eq!(store.get_item("a").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        {
            let store = FileKeyValueStore::open(&path).unwrap();
            store.set_item("mealmates_favorites_u1", r#"["r1"]"#).unwrap();
            store.set_item("other", "x").unwrap();
            store.remove_item("other").unwrap();
        }

        let store = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(
            store.get_item("mealmates_favorites_u1").unwrap().as_deref(),
            Some(r#"["r1"]"#)
        );
        assert_eq!(store.get_item("other").unwrap(), None);

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{{{").unwrap();

        let store = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(store.get_item("anything").unwrap(), None);

        store.set_item("k", "v").unwrap();
        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get_item("k").unwrap().as_deref(), Some("v"));
    }
}
