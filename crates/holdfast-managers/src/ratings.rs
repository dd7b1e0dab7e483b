use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::warn;

use holdfast_core::GuardedCodec;
use holdfast_store::SnapshotStore;

use crate::notify::{ChangeEvent, ChangeRouter, Domain};

/// Highest permitted star rating.
pub const MAX_RATING: u8 = 5;

/// Star ratings (0-5) per package, persisted as one snapshot document.
///
/// `set_rating(.., save: false)` batches mutations in memory; a later
/// explicit [`save`](RatingsManager::save) publishes the whole document
/// once. Storage failures are logged and absorbed.
pub struct RatingsManager {
    store: SnapshotStore<BTreeMap<String, u8>>,
    ratings: Mutex<BTreeMap<String, u8>>,
    router: Arc<ChangeRouter>,
}

impl RatingsManager {
    /// Open the snapshot at `path` and load it.
    pub fn open(path: &Path, codec: Arc<GuardedCodec>, router: Arc<ChangeRouter>) -> Self {
        let store = SnapshotStore::new(path, codec);
        let ratings = store.load();
        Self {
            store,
            ratings: Mutex::new(ratings),
            router,
        }
    }

    /// The rating for `key`, if one was ever set.
    pub fn rating(&self, key: &str) -> Option<u8> {
        self.ratings
            .lock()
            .expect("ratings mutex poisoned")
            .get(key)
            .copied()
    }

    /// Set a rating, clamped to 0-5. A rating of 0 removes the entry.
    /// Persists immediately unless `save` is false; notifies subscribers
    /// either way (the in-memory state did change).
    pub fn set_rating(&self, key: &str, value: u8, save: bool) {
        let value = value.min(MAX_RATING);
        {
            let mut ratings = self.ratings.lock().expect("ratings mutex poisoned");
            if value == 0 {
                ratings.remove(key);
            } else {
                ratings.insert(key.to_string(), value);
            }
        }
        if save {
            self.save();
        }
        self.router.publish(&ChangeEvent {
            domain: Domain::Ratings,
            key: key.to_string(),
        });
    }

    /// Publish the full rating document.
    pub fn save(&self) {
        let ratings = self
            .ratings
            .lock()
            .expect("ratings mutex poisoned")
            .clone();
        if let Err(e) = self.store.save(&ratings) {
            warn!(error = %e, "ratings save skipped");
        }
    }

    /// Clone of the full rating map.
    pub fn all(&self) -> BTreeMap<String, u8> {
        self.ratings.lock().expect("ratings mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_at(path: &Path) -> RatingsManager {
        RatingsManager::open(
            path,
            Arc::new(GuardedCodec::new()),
            Arc::new(ChangeRouter::new()),
        )
    }

    #[test]
    fn set_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");

        let manager = open_at(&path);
        manager.set_rating("pkgA", 5, true);
        manager.set_rating("pkgB", 3, true);

        let reopened = open_at(&path);
        assert_eq!(reopened.rating("pkgA"), Some(5));
        assert_eq!(reopened.rating("pkgB"), Some(3));
    }

    #[test]
    fn ratings_clamp_to_five() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_at(&dir.path().join("ratings.json"));
        manager.set_rating("pkgA", 200, false);
        assert_eq!(manager.rating("pkgA"), Some(MAX_RATING));
    }

    #[test]
    fn zero_rating_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_at(&dir.path().join("ratings.json"));
        manager.set_rating("pkgA", 4, false);
        manager.set_rating("pkgA", 0, false);
        assert_eq!(manager.rating("pkgA"), None);
    }

    #[test]
    fn batched_sets_persist_on_manual_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");

        let manager = open_at(&path);
        manager.set_rating("pkgA", 2, false);
        manager.set_rating("pkgB", 4, false);
        // Nothing on disk yet.
        assert!(!path.exists());
        manager.save();

        let reopened = open_at(&path);
        assert_eq!(reopened.rating("pkgA"), Some(2));
        assert_eq!(reopened.rating("pkgB"), Some(4));
    }
}
