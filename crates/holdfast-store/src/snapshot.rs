use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use holdfast_core::{GuardedCodec, StorePaths};

use crate::error::{StoreError, StoreResult};

/// Smallest document the codec can plausibly emit (an empty JSON object).
/// Anything shorter is treated as a silent codec failure, and an on-disk
/// file at or below this size is not trusted as authoritative.
const MIN_PLAUSIBLE_LEN: u64 = 2;

struct SnapshotState<D> {
    document: D,
    loaded: bool,
}

/// Whole-state document store, rewritten atomically on every save.
///
/// The document type `D` is the entire persistent state (a rating map, a
/// pack-name set). `load` walks the fallback chain main -> backup -> empty,
/// self-healing the main file when the backup had to be used; `save`
/// publishes through a temp file and a single rename so a crash mid-save
/// never leaves a half-written current file.
///
/// `save` is gated on a successful prior `load`: an empty in-memory
/// document that exists only because load failed must never overwrite a
/// good backup.
pub struct SnapshotStore<D> {
    paths: StorePaths,
    codec: Arc<GuardedCodec>,
    state: Mutex<SnapshotState<D>>,
}

impl<D> SnapshotStore<D>
where
    D: Serialize + DeserializeOwned + Default + Clone,
{
    /// Create a store over the given main file path. No I/O happens until
    /// the first `load`.
    pub fn new(path: &Path, codec: Arc<GuardedCodec>) -> Self {
        Self {
            paths: StorePaths::new(path),
            codec,
            state: Mutex::new(SnapshotState {
                document: D::default(),
                loaded: false,
            }),
        }
    }

    /// Load the document, walking the fallback chain.
    ///
    /// Main file first: if it reads, is non-trivially sized and parses, it
    /// is authoritative. Otherwise the backup: if it parses, adopt it and
    /// immediately rewrite the main file from it (self-heal). Otherwise the
    /// empty document -- a valid, intentional starting state, distinct from
    /// "failed to determine state". All three outcomes mark the store as
    /// successfully loaded; `load` itself never fails.
    pub fn load(&self) -> D {
        let mut state = self.state.lock().expect("snapshot mutex poisoned");

        if let Some(doc) = self.try_parse_main() {
            debug!(path = %self.paths.main().display(), "snapshot loaded from main");
            state.document = doc;
        } else if let Some((doc, text)) = self.try_parse_backup() {
            warn!(
                path = %self.paths.main().display(),
                "main snapshot unusable; adopting backup"
            );
            if let Err(e) = fs::write(self.paths.main(), text.as_bytes()) {
                warn!(path = %self.paths.main().display(), error = %e, "self-heal rewrite failed");
            }
            state.document = doc;
        } else {
            debug!(path = %self.paths.main().display(), "no usable snapshot; starting empty");
            state.document = D::default();
        }

        state.loaded = true;
        state.document.clone()
    }

    /// Save the document, replacing the on-disk state wholesale.
    ///
    /// The codec guard is held only for the encode call. Any failing step
    /// aborts without touching what was already durably on disk.
    pub fn save(&self, document: &D) -> StoreResult<()> {
        let mut state = self.state.lock().expect("snapshot mutex poisoned");
        if !state.loaded {
            return Err(StoreError::NotLoaded);
        }

        let text = self.codec.encode(document)?;
        self.paths.publish(text.as_bytes(), MIN_PLAUSIBLE_LEN)?;
        state.document = document.clone();
        debug!(path = %self.paths.main().display(), bytes = text.len(), "snapshot saved");
        Ok(())
    }

    /// Whether a load has completed successfully.
    pub fn is_loaded(&self) -> bool {
        self.state.lock().expect("snapshot mutex poisoned").loaded
    }

    /// Path triple backing this store.
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn try_parse_main(&self) -> Option<D> {
        let text = match fs::read_to_string(self.paths.main()) {
            Ok(t) => t,
            Err(e) => {
                debug!(path = %self.paths.main().display(), error = %e, "main snapshot unreadable");
                return None;
            }
        };
        if (text.len() as u64) < MIN_PLAUSIBLE_LEN {
            warn!(path = %self.paths.main().display(), len = text.len(), "main snapshot trivially small");
            return None;
        }
        match self.codec.decode(&text) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(path = %self.paths.main().display(), error = %e, "main snapshot failed to parse");
                None
            }
        }
    }

    fn try_parse_backup(&self) -> Option<(D, String)> {
        let text = match fs::read_to_string(self.paths.backup()) {
            Ok(t) => t,
            Err(e) => {
                debug!(path = %self.paths.backup().display(), error = %e, "no usable backup");
                return None;
            }
        };
        match self.codec.decode(&text) {
            Ok(doc) => Some((doc, text)),
            Err(e) => {
                warn!(path = %self.paths.backup().display(), error = %e, "backup failed to parse");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn store_at<D>(path: &Path) -> SnapshotStore<D>
    where
        D: Serialize + DeserializeOwned + Default + Clone,
    {
        SnapshotStore::new(path, Arc::new(GuardedCodec::new()))
    }

    #[test]
    fn save_then_fresh_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");

        let store: SnapshotStore<BTreeMap<String, u8>> = store_at(&path);
        store.load();

        let mut doc = BTreeMap::new();
        doc.insert("pkgA".to_string(), 5u8);
        doc.insert("pkgB".to_string(), 3u8);
        store.save(&doc).unwrap();

        let fresh: SnapshotStore<BTreeMap<String, u8>> = store_at(&path);
        assert_eq!(fresh.load(), doc);
    }

    #[test]
    fn save_refused_before_load() {
        let dir = tempfile::tempdir().unwrap();
        let store: SnapshotStore<BTreeSet<String>> = store_at(&dir.path().join("set.json"));

        let err = store.save(&BTreeSet::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotLoaded));
        assert!(!store.paths().main().exists());
    }

    #[test]
    fn missing_files_load_empty_and_mark_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let store: SnapshotStore<BTreeSet<String>> = store_at(&dir.path().join("set.json"));

        assert!(store.load().is_empty());
        assert!(store.is_loaded());
        // An empty store is a valid starting state; saves are now honored.
        let mut doc = BTreeSet::new();
        doc.insert("pkgA".to_string());
        store.save(&doc).unwrap();
    }

    #[test]
    fn corrupt_main_falls_back_to_backup_and_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");
        let store: SnapshotStore<BTreeMap<String, u8>> = store_at(&path);

        store.load();
        let mut doc = BTreeMap::new();
        doc.insert("pkgA".to_string(), 4u8);
        store.save(&doc).unwrap();
        // Second save rotates the good state into the backup slot.
        let mut doc2 = doc.clone();
        doc2.insert("pkgB".to_string(), 2u8);
        store.save(&doc2).unwrap();

        // Scribble over the main file.
        fs::write(&path, b"%% not a document %%").unwrap();

        let fresh: SnapshotStore<BTreeMap<String, u8>> = store_at(&path);
        assert_eq!(fresh.load(), doc);
        // Self-heal: main resynced to the backup's bytes.
        let healed = fs::read_to_string(&path).unwrap();
        let backup = fs::read_to_string(fresh.paths().backup()).unwrap();
        assert_eq!(healed, backup);
    }

    #[test]
    fn deleted_main_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");
        let store: SnapshotStore<BTreeMap<String, u8>> = store_at(&path);

        store.load();
        let mut backup_doc = BTreeMap::new();
        backup_doc.insert("pkgA".to_string(), 4u8);
        store.save(&backup_doc).unwrap();
        let mut newer = BTreeMap::new();
        newer.insert("pkgA".to_string(), 5u8);
        newer.insert("pkgB".to_string(), 3u8);
        store.save(&newer).unwrap();

        // Main vanishes externally; the backup still holds the older state.
        fs::remove_file(&path).unwrap();

        let fresh: SnapshotStore<BTreeMap<String, u8>> = store_at(&path);
        assert_eq!(fresh.load(), backup_doc);
        assert!(path.exists(), "main must be rewritten from the backup");
    }

    #[test]
    fn both_files_corrupt_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.json");
        let store: SnapshotStore<BTreeSet<String>> = store_at(&path);
        fs::write(&path, b"garbage").unwrap();
        fs::write(store.paths().backup(), b"also garbage").unwrap();

        assert!(store.load().is_empty());
        assert!(store.is_loaded());
    }

    #[test]
    fn load_after_save_sees_saved_state() {
        let dir = tempfile::tempdir().unwrap();
        let store: SnapshotStore<BTreeSet<String>> = store_at(&dir.path().join("set.json"));
        store.load();

        let mut doc = BTreeSet::new();
        doc.insert("pkgZ".to_string());
        store.save(&doc).unwrap();
        assert_eq!(store.load(), doc);
    }
}
