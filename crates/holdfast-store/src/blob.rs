use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Fixed trailer after the key bytes:
/// freshness (8) + width (4) + height (4) + format (4) + data length (4).
const META_SIZE: u64 = 24;

/// Freshness and image metadata attached to a cached payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobMeta {
    /// Source last-modified stamp; a lookup with a different stamp is a
    /// logical miss (the cached bytes describe a stale version).
    pub freshness: i64,
    pub width: i32,
    pub height: i32,
    pub pixel_format: i32,
}

#[derive(Clone, Copy, Debug)]
struct IndexSlot {
    /// Byte offset of the payload within the file.
    offset: u64,
    /// Payload length.
    length: u32,
    meta: BlobMeta,
}

struct BlobInner {
    /// Held open for the lifetime of the store; `None` after `close`.
    file: Option<File>,
    index: HashMap<String, IndexSlot>,
    /// End of the last fully-valid record; new records land here.
    end: u64,
}

/// Append-only binary cache with a replay-built in-memory index.
///
/// On-disk record format (all integers little-endian):
/// ```text
/// [4: keyLength][keyBytes][8: freshness][4: width][4: height]
/// [4: pixelFormat][4: dataLength][data bytes]
/// ```
///
/// The index is transient: it is rebuilt by replaying the file every open,
/// with the same corrupt-tail rule as the event log (scanning stops at the
/// first header or length claim that exceeds the remaining file, and the
/// file is truncated back to the last valid boundary). A re-put key
/// replaces the index entry but the superseded bytes stay physically in the
/// file, unreferenced -- the file grows monotonically and no eviction is
/// performed. There is no sibling backup: loss is acceptable for a pure
/// cache keyed by freshness.
pub struct BlobStore {
    path: PathBuf,
    inner: Mutex<BlobInner>,
}

impl BlobStore {
    /// Open (or create) the cache file and rebuild the index by replay.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let (index, end) = replay(&mut file, path)?;
        debug!(path = %path.display(), entries = index.len(), end, "blob index rebuilt");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(BlobInner {
                file: Some(file),
                index,
                end,
            }),
        })
    }

    /// Look up `key`, gated on freshness.
    ///
    /// Absent key: miss. Present but `freshness != expected_freshness`:
    /// logical miss, index entry left in place (a fresh put will shadow
    /// it). A short read -- the file was truncated externally -- is also a
    /// miss, never an error.
    pub fn try_get(
        &self,
        key: &str,
        expected_freshness: i64,
    ) -> StoreResult<Option<(Vec<u8>, BlobMeta)>> {
        let mut inner = self.inner.lock().expect("blob mutex poisoned");
        let slot = match inner.index.get(key) {
            Some(s) => *s,
            None => return Ok(None),
        };
        if slot.meta.freshness != expected_freshness {
            debug!(
                key,
                cached = slot.meta.freshness,
                expected = expected_freshness,
                "stale cache entry"
            );
            return Ok(None);
        }

        let file = inner.file.as_mut().ok_or(StoreError::Closed)?;
        let mut payload = vec![0u8; slot.length as usize];
        if let Err(e) = file
            .seek(SeekFrom::Start(slot.offset))
            .and_then(|_| file.read_exact(&mut payload))
        {
            warn!(key, offset = slot.offset, error = %e, "short read; treating as miss");
            return Ok(None);
        }
        Ok(Some((payload, slot.meta)))
    }

    /// Append a record for `key` and replace its index entry.
    pub fn put(&self, key: &str, payload: &[u8], meta: BlobMeta) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("blob mutex poisoned");
        let end = inner.end;
        let file = inner.file.as_mut().ok_or(StoreError::Closed)?;

        let key_bytes = key.as_bytes();
        let mut record =
            Vec::with_capacity(4 + key_bytes.len() + META_SIZE as usize + payload.len());
        record.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
        record.extend_from_slice(key_bytes);
        record.extend_from_slice(&meta.freshness.to_le_bytes());
        record.extend_from_slice(&meta.width.to_le_bytes());
        record.extend_from_slice(&meta.height.to_le_bytes());
        record.extend_from_slice(&meta.pixel_format.to_le_bytes());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(payload);

        file.seek(SeekFrom::Start(end))?;
        file.write_all(&record)?;
        file.flush()?;

        let data_offset = end + 4 + key_bytes.len() as u64 + META_SIZE;
        inner.index.insert(
            key.to_string(),
            IndexSlot {
                offset: data_offset,
                length: payload.len() as u32,
                meta,
            },
        );
        inner.end = end + record.len() as u64;
        debug!(key, offset = data_offset, len = payload.len(), "blob put");
        Ok(())
    }

    /// Whether the index currently holds an entry for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .expect("blob mutex poisoned")
            .index
            .contains_key(key)
    }

    /// Number of live index entries.
    pub fn entry_count(&self) -> usize {
        self.inner.lock().expect("blob mutex poisoned").index.len()
    }

    /// Release the file handle. Further `put`/`try_get` calls fail with
    /// [`StoreError::Closed`]. Also runs on drop.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("blob mutex poisoned");
        if let Some(file) = inner.file.take() {
            if let Err(e) = file.sync_all() {
                warn!(path = %self.path.display(), error = %e, "sync on close failed");
            }
            debug!(path = %self.path.display(), "blob store closed");
        }
    }

    /// Path of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BlobStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Scan fixed-size headers sequentially, building the index.
///
/// Later records shadow earlier index entries for the same key. Returns the
/// index and the end offset of the last fully-valid record; the file is
/// truncated to that offset when a corrupt tail was found.
fn replay(file: &mut File, path: &Path) -> StoreResult<(HashMap<String, IndexSlot>, u64)> {
    let file_len = file.metadata()?.len();
    let mut data = Vec::with_capacity(file_len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut data)?;

    let mut index = HashMap::new();
    let mut offset: u64 = 0;

    loop {
        let Some(parsed) = parse_record(&data, offset) else {
            break;
        };
        index.insert(parsed.key, parsed.slot);
        offset = parsed.next;
    }

    if offset < file_len {
        warn!(
            path = %path.display(),
            valid = offset,
            physical = file_len,
            "truncating corrupt blob tail"
        );
        file.set_len(offset)?;
    }

    Ok((index, offset))
}

struct ParsedRecord {
    key: String,
    slot: IndexSlot,
    next: u64,
}

/// Parse one record at `offset`, or `None` if the remaining bytes cannot
/// hold a full record (the corrupt-tail condition).
fn parse_record(data: &[u8], offset: u64) -> Option<ParsedRecord> {
    let pos = offset as usize;
    let read_u32 = |at: usize| -> Option<u32> {
        Some(u32::from_le_bytes(data.get(at..at + 4)?.try_into().ok()?))
    };

    let key_len = read_u32(pos)? as usize;
    let meta_start = pos + 4 + key_len;
    // Key and fixed trailer must both fit before the data length is known.
    if meta_start + META_SIZE as usize > data.len() {
        return None;
    }

    let key = std::str::from_utf8(&data[pos + 4..pos + 4 + key_len]).ok()?;
    let freshness = i64::from_le_bytes(data[meta_start..meta_start + 8].try_into().ok()?);
    let width = i32::from_le_bytes(data[meta_start + 8..meta_start + 12].try_into().ok()?);
    let height = i32::from_le_bytes(data[meta_start + 12..meta_start + 16].try_into().ok()?);
    let pixel_format = i32::from_le_bytes(data[meta_start + 16..meta_start + 20].try_into().ok()?);
    let data_len = read_u32(meta_start + 20)? as usize;

    let data_start = meta_start + META_SIZE as usize;
    let next = data_start + data_len;
    if next > data.len() {
        return None;
    }

    Some(ParsedRecord {
        key: key.to_string(),
        slot: IndexSlot {
            offset: data_start as u64,
            length: data_len as u32,
            meta: BlobMeta {
                freshness,
                width,
                height,
                pixel_format,
            },
        },
        next: next as u64,
    })
}
