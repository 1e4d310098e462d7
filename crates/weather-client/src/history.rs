use parking_lot::Mutex;

use crate::storage::{KeyValueStore, StorageError};

pub const HISTORY_STORAGE_KEY: &str = "search_history";
pub const MAX_HISTORY_ENTRIES: usize = 10;

/// Most-recent-first list of searched location labels.
pub struct SearchHistory<S> {
    store: S,
    entries: Mutex<Vec<String>>,
}

impl<S: KeyValueStore> SearchHistory<S> {
    /// Load persisted entries; unreadable or corrupt data starts empty.
    pub fn load(store: S) -> Self {
        let entries = match store.get(HISTORY_STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<Vec<String>>(&raw).unwrap_or_else(|error| {
                tracing::debug!(%error, "corrupt search history; starting empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(error) => {
                tracing::debug!(%error, "search history unreadable; starting empty");
                Vec::new()
            }
        };

        Self {
            store,
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Put `label` at the front. Blank labels and labels already present are
    /// ignored; returns whether the list changed.
    pub fn add(&self, label: &str) -> Result<bool, StorageError> {
        let label = label.trim();
        let mut entries = self.entries.lock();
        if label.is_empty() || entries.iter().any(|entry| entry == label) {
            return Ok(false);
        }

        entries.insert(0, label.to_string());
        entries.truncate(MAX_HISTORY_ENTRIES);
        self.persist(&entries)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.entries.lock().clear();
        self.store.remove(HISTORY_STORAGE_KEY)
    }

    fn persist(&self, entries: &[String]) -> Result<(), StorageError> {
        let payload = serde_json::to_string(entries).map_err(|error| StorageError::Write {
            path: HISTORY_STORAGE_KEY.into(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, error),
        })?;
        self.store.set(HISTORY_STORAGE_KEY, &payload)
    }
}
