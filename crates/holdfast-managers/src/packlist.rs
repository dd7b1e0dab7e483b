use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::warn;

use holdfast_core::GuardedCodec;
use holdfast_store::SnapshotStore;

use crate::notify::{ChangeEvent, ChangeRouter, Domain};

/// A persistent set of pack names, stored as one snapshot document.
///
/// The session constructs two of these: the auto-load list and the
/// dependency whitelist. Membership toggles support the same
/// `save: false` batching as the ratings manager.
pub struct PackListManager {
    store: SnapshotStore<BTreeSet<String>>,
    members: Mutex<BTreeSet<String>>,
    domain: Domain,
    router: Arc<ChangeRouter>,
}

impl PackListManager {
    /// Open the snapshot at `path` and load it.
    pub fn open(
        path: &Path,
        domain: Domain,
        codec: Arc<GuardedCodec>,
        router: Arc<ChangeRouter>,
    ) -> Self {
        let store = SnapshotStore::new(path, codec);
        let members = store.load();
        Self {
            store,
            members: Mutex::new(members),
            domain,
            router,
        }
    }

    /// Whether `key` is in the list.
    pub fn contains(&self, key: &str) -> bool {
        self.members
            .lock()
            .expect("packlist mutex poisoned")
            .contains(key)
    }

    /// Add or remove `key`. Persists immediately unless `save` is false;
    /// notifies subscribers either way.
    pub fn set_member(&self, key: &str, on: bool, save: bool) {
        {
            let mut members = self.members.lock().expect("packlist mutex poisoned");
            if on {
                members.insert(key.to_string());
            } else {
                members.remove(key);
            }
        }
        if save {
            self.save();
        }
        self.router.publish(&ChangeEvent {
            domain: self.domain,
            key: key.to_string(),
        });
    }

    /// Publish the full set.
    pub fn save(&self) {
        let members = self
            .members
            .lock()
            .expect("packlist mutex poisoned")
            .clone();
        if let Err(e) = self.store.save(&members) {
            warn!(domain = ?self.domain, error = %e, "pack list save skipped");
        }
    }

    /// Clone of the full set.
    pub fn all(&self) -> BTreeSet<String> {
        self.members.lock().expect("packlist mutex poisoned").clone()
    }
}
