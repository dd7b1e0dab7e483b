//! Durable local stores for Holdfast.
//!
//! Three storage strategies share one vocabulary -- opaque string keys, a
//! per-instance mutex, fallback-on-corruption, atomic publish -- but differ
//! in write pattern:
//!
//! - [`SnapshotStore`] -- whole-state document, rewritten atomically on
//!   every save (rating maps, pack-name sets)
//! - [`EventLogStore`] -- append-only add/remove log, replayed at load,
//!   periodically compacted (the favorites set)
//! - [`BlobStore`] -- append-only binary records with a replay-built
//!   offset index and freshness-gated reads (the thumbnail cache)
//!
//! # Design Rules
//!
//! 1. A torn trailing write is detected by length-prefix validation and
//!    repaired by truncation; it is never surfaced as an error.
//! 2. New snapshot content becomes current only via a single rename, so a
//!    reader never observes a partially-written file.
//! 3. Every store owns one mutex guarding its in-memory structure and its
//!    file access together; operations are strictly serialized per
//!    instance.
//! 4. `load` never fails: an unreadable or unparseable file degrades along
//!    the fallback chain down to the empty state.

pub mod blob;
pub mod error;
pub mod log;
pub mod snapshot;

pub use blob::{BlobMeta, BlobStore};
pub use error::{StoreError, StoreResult};
pub use log::{EventLogStore, LogConfig, LogOp, SyncMode};
pub use snapshot::SnapshotStore;
