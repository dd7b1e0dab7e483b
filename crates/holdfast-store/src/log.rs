use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, warn};

use holdfast_core::{framing, StorePaths};

use crate::error::{StoreError, StoreResult};

/// Opcode for a membership add.
const OP_ADD: u8 = 1;
/// Opcode for a membership remove.
const OP_REMOVE: u8 = 2;

/// A single logged mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogOp {
    /// Insert the key into the set.
    Add,
    /// Delete the key from the set.
    Remove,
}

impl LogOp {
    fn opcode(self) -> u8 {
        match self {
            LogOp::Add => OP_ADD,
            LogOp::Remove => OP_REMOVE,
        }
    }
}

/// Flush/sync strategy for appends.
///
/// `OsDefault` flushes to the OS on close but leaves forcing data to stable
/// storage to the platform; whether that survives power loss is not
/// verifiable from behavior alone. `EveryWrite` additionally `fsync`s.
#[derive(Clone, Copy, Debug, Default)]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Configuration for the event-log store.
#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    /// Flush/sync strategy for appends.
    pub sync_mode: SyncMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogState {
    Uninitialized,
    Loading,
    Ready,
}

impl LogState {
    fn name(self) -> &'static str {
        match self {
            LogState::Uninitialized => "uninitialized",
            LogState::Loading => "loading",
            LogState::Ready => "ready",
        }
    }
}

struct LogInner {
    state: LogState,
    keys: HashSet<String>,
}

/// Append-only log of add/remove mutations, replayed at load time.
///
/// Each mutation is one independently-framed record
/// `[opcode:1][keyLength:4 LE][keyBytes]`; the current set is the fold of
/// all valid records in file order. A torn tail is detected by the length
/// prefix and repaired by truncating the file back to the last valid
/// record, so future appends never land after garbage.
///
/// Lifecycle: `Uninitialized -> Loading -> Ready`; `Ready` is terminal for
/// the process lifetime, and `append`/`compact` are only honored in
/// `Ready`. The file handle is opened per operation rather than held, so an
/// abrupt shutdown has no long-lived handle to leak.
pub struct EventLogStore {
    paths: StorePaths,
    config: LogConfig,
    inner: Mutex<LogInner>,
}

impl EventLogStore {
    /// Create a store over the given log file path. No I/O happens until
    /// `load`.
    pub fn new(path: &Path, config: LogConfig) -> Self {
        Self {
            paths: StorePaths::new(path),
            config,
            inner: Mutex::new(LogInner {
                state: LogState::Uninitialized,
                keys: HashSet::new(),
            }),
        }
    }

    /// Replay the log and return the resulting set.
    ///
    /// If the main file is absent but a backup exists, the backup is copied
    /// into place first. After replay the file is truncated to the last
    /// valid record boundary, and -- only when the replayed set is
    /// non-empty -- the backup is refreshed from the repaired main. (A
    /// legitimate transition to an all-removed state therefore leaves the
    /// backup stale; this mirrors the upstream policy and is deliberately
    /// not corrected here.)
    ///
    /// `load` never fails: an unreadable file yields the empty set.
    pub fn load(&self) -> HashSet<String> {
        let mut inner = self.inner.lock().expect("log mutex poisoned");
        inner.state = LogState::Loading;

        if !self.paths.main().exists() && self.paths.backup().exists() {
            warn!(path = %self.paths.main().display(), "log missing; restoring from backup");
            if let Err(e) = self.paths.restore_backup() {
                warn!(path = %self.paths.main().display(), error = %e, "backup restore failed");
            }
        }

        let data = match fs::read(self.paths.main()) {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %self.paths.main().display(), error = %e, "log unreadable; starting empty");
                Vec::new()
            }
        };

        let outcome = framing::scan(&data);
        let mut keys = HashSet::new();
        for record in &outcome.records {
            let key = match std::str::from_utf8(&record.payload) {
                Ok(k) => k,
                Err(e) => {
                    warn!(error = %e, "log record key is not UTF-8; skipping");
                    continue;
                }
            };
            match record.opcode {
                OP_ADD => {
                    keys.insert(key.to_string());
                }
                OP_REMOVE => {
                    keys.remove(key);
                }
                other => warn!(opcode = other, "unknown log opcode; skipping"),
            }
        }

        if outcome.valid_len < data.len() as u64 {
            warn!(
                path = %self.paths.main().display(),
                valid = outcome.valid_len,
                physical = data.len(),
                "truncating corrupt log tail"
            );
            if let Err(e) = truncate_to(self.paths.main(), outcome.valid_len) {
                warn!(path = %self.paths.main().display(), error = %e, "tail truncation failed");
            }
        }

        if !keys.is_empty() {
            if let Err(e) = self.paths.refresh_backup() {
                warn!(path = %self.paths.backup().display(), error = %e, "backup refresh failed");
            }
        }

        debug!(
            path = %self.paths.main().display(),
            records = outcome.records.len(),
            keys = keys.len(),
            "log replay complete"
        );
        inner.keys = keys.clone();
        inner.state = LogState::Ready;
        keys
    }

    /// Append one mutation as a single framed record.
    ///
    /// Opens the log for appending, writes the frame, flushes, and closes.
    pub fn append(&self, key: &str, op: LogOp) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("log mutex poisoned");
        if inner.state != LogState::Ready {
            return Err(StoreError::NotReady(inner.state.name()));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.paths.main())?;
        framing::write_record(&mut file, op.opcode(), key.as_bytes())?;
        file.flush()?;
        if matches!(self.config.sync_mode, SyncMode::EveryWrite) {
            file.sync_all()?;
        }
        drop(file);

        match op {
            LogOp::Add => {
                inner.keys.insert(key.to_string());
            }
            LogOp::Remove => {
                inner.keys.remove(key);
            }
        }
        debug!(key, ?op, "log append");
        Ok(())
    }

    /// Rewrite the log as exactly one Add per live key.
    ///
    /// Bounds log growth from long sessions with many toggles: all Remove
    /// history and superseded Add/Remove pairs are dropped. Publishing goes
    /// through the same temp-file + atomic-rename discipline as the
    /// snapshot store, with the pre-compaction log rotated into the backup
    /// slot.
    pub fn compact(&self) -> StoreResult<()> {
        let inner = self.inner.lock().expect("log mutex poisoned");
        if inner.state != LogState::Ready {
            return Err(StoreError::NotReady(inner.state.name()));
        }

        let mut keys: Vec<&String> = inner.keys.iter().collect();
        keys.sort();

        let mut bytes = Vec::new();
        for key in &keys {
            framing::encode_record(&mut bytes, OP_ADD, key.as_bytes());
        }

        self.paths.publish(&bytes, 0)?;
        debug!(
            path = %self.paths.main().display(),
            keys = keys.len(),
            bytes = bytes.len(),
            "log compacted"
        );
        Ok(())
    }

    /// Whether the key is in the current set. `false` before `load`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().expect("log mutex poisoned").keys.contains(key)
    }

    /// Clone of the current set.
    pub fn snapshot(&self) -> HashSet<String> {
        self.inner.lock().expect("log mutex poisoned").keys.clone()
    }

    /// Number of keys in the current set.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("log mutex poisoned").keys.len()
    }

    /// Returns `true` when the current set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path triple backing this store.
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }
}

fn truncate_to(path: &Path, len: u64) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)
}
