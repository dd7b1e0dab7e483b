use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use holdfast_store::{EventLogStore, LogConfig, LogOp};

use crate::notify::{ChangeEvent, ChangeRouter, Domain};

/// Favorite markers, persisted as an append-only add/remove log.
///
/// Every toggle is one independently-framed log append; the in-memory set
/// is the replay result. Storage failures are logged and absorbed -- a
/// toggle that could not be persisted still must not fault the host.
pub struct FavoritesManager {
    store: EventLogStore,
    router: Arc<ChangeRouter>,
}

impl FavoritesManager {
    /// Open the log at `path` and replay it.
    pub fn open(path: &Path, router: Arc<ChangeRouter>) -> Self {
        let store = EventLogStore::new(path, LogConfig::default());
        store.load();
        Self { store, router }
    }

    /// Whether `key` is currently marked as a favorite.
    pub fn is_favorite(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    /// Mark or unmark `key`; appends one Add/Remove record and notifies
    /// subscribers on success.
    pub fn set_favorite(&self, key: &str, on: bool) {
        let op = if on { LogOp::Add } else { LogOp::Remove };
        match self.store.append(key, op) {
            Ok(()) => self.router.publish(&ChangeEvent {
                domain: Domain::Favorites,
                key: key.to_string(),
            }),
            Err(e) => warn!(key, on, error = %e, "favorite toggle not persisted"),
        }
    }

    /// Clone of the current favorite set.
    pub fn all(&self) -> HashSet<String> {
        self.store.snapshot()
    }

    /// Rewrite the log to one Add per live key, bounding growth.
    pub fn compact(&self) {
        if let Err(e) = self.store.compact() {
            warn!(error = %e, "favorites compaction failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn toggle_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.log");
        let router = Arc::new(ChangeRouter::new());

        let manager = FavoritesManager::open(&path, Arc::clone(&router));
        manager.set_favorite("pkgA", true);
        manager.set_favorite("pkgB", true);
        manager.set_favorite("pkgA", false);

        assert!(!manager.is_favorite("pkgA"));
        assert!(manager.is_favorite("pkgB"));

        let reopened = FavoritesManager::open(&path, router);
        assert_eq!(reopened.all(), HashSet::from(["pkgB".to_string()]));
    }

    #[test]
    fn toggles_notify_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let router = Arc::new(ChangeRouter::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        router.subscribe(move |event| {
            assert_eq!(event.domain, Domain::Favorites);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let manager = FavoritesManager::open(&dir.path().join("fav.log"), router);
        manager.set_favorite("pkgA", true);
        manager.set_favorite("pkgA", false);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compaction_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fav.log");
        let router = Arc::new(ChangeRouter::new());

        let manager = FavoritesManager::open(&path, Arc::clone(&router));
        for i in 0..10 {
            manager.set_favorite(&format!("pkg{i}"), true);
        }
        for i in 0..5 {
            manager.set_favorite(&format!("pkg{i}"), false);
        }
        manager.compact();

        let reopened = FavoritesManager::open(&path, router);
        let expected: HashSet<String> = (5..10).map(|i| format!("pkg{i}")).collect();
        assert_eq!(reopened.all(), expected);
    }
}
