use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use holdfast_store::{BlobMeta, BlobStore};

use crate::error::ManagerResult;
use crate::notify::{ChangeEvent, ChangeRouter, Domain};

/// A cached thumbnail image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub pixel_format: i32,
}

/// Thumbnail byte cache over the indexed blob store.
///
/// Keys are source image paths; the source's last-modified stamp is the
/// freshness gate, so a regenerated source image simply misses until the
/// new bytes are stored. Background worker threads populate the cache
/// while the foreground reads; the store's internal lock serializes them.
/// All failures degrade to a miss or a skipped store.
pub struct ThumbnailCache {
    store: BlobStore,
    router: Arc<ChangeRouter>,
}

impl ThumbnailCache {
    /// Open (or create) the cache file and rebuild its index.
    pub fn open(path: &Path, router: Arc<ChangeRouter>) -> ManagerResult<Self> {
        let store = BlobStore::open(path)?;
        Ok(Self { store, router })
    }

    /// Fetch the cached thumbnail for `source_path`, if present and fresh.
    pub fn lookup(&self, source_path: &str, source_mtime: i64) -> Option<Thumbnail> {
        match self.store.try_get(source_path, source_mtime) {
            Ok(Some((bytes, meta))) => Some(Thumbnail {
                bytes,
                width: meta.width,
                height: meta.height,
                pixel_format: meta.pixel_format,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(key = source_path, error = %e, "thumbnail lookup failed; treating as miss");
                None
            }
        }
    }

    /// Store thumbnail bytes for `source_path`, shadowing any prior entry.
    pub fn store(&self, source_path: &str, source_mtime: i64, thumb: &Thumbnail) {
        let meta = BlobMeta {
            freshness: source_mtime,
            width: thumb.width,
            height: thumb.height,
            pixel_format: thumb.pixel_format,
        };
        match self.store.put(source_path, &thumb.bytes, meta) {
            Ok(()) => self.router.publish(&ChangeEvent {
                domain: Domain::Thumbnails,
                key: source_path.to_string(),
            }),
            Err(e) => warn!(key = source_path, error = %e, "thumbnail store skipped"),
        }
    }

    /// Release the underlying file handle.
    pub fn close(&self) {
        self.store.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thumb(fill: u8) -> Thumbnail {
        Thumbnail {
            bytes: vec![fill; 256],
            width: 16,
            height: 16,
            pixel_format: 4,
        }
    }

    #[test]
    fn store_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            ThumbnailCache::open(&dir.path().join("thumbs.bin"), Arc::new(ChangeRouter::new()))
                .unwrap();

        cache.store("scenes/a.png", 1000, &thumb(1));
        assert_eq!(cache.lookup("scenes/a.png", 1000), Some(thumb(1)));
    }

    #[test]
    fn stale_mtime_misses_until_restored() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            ThumbnailCache::open(&dir.path().join("thumbs.bin"), Arc::new(ChangeRouter::new()))
                .unwrap();

        cache.store("img1", 100, &thumb(1));
        cache.store("img1", 200, &thumb(2));

        assert_eq!(cache.lookup("img1", 100), None);
        assert_eq!(cache.lookup("img1", 200), Some(thumb(2)));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumbs.bin");
        {
            let cache = ThumbnailCache::open(&path, Arc::new(ChangeRouter::new())).unwrap();
            cache.store("img", 50, &thumb(9));
        }
        let cache = ThumbnailCache::open(&path, Arc::new(ChangeRouter::new())).unwrap();
        assert_eq!(cache.lookup("img", 50), Some(thumb(9)));
    }

    #[test]
    fn lookup_after_close_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            ThumbnailCache::open(&dir.path().join("thumbs.bin"), Arc::new(ChangeRouter::new()))
                .unwrap();
        cache.store("img", 50, &thumb(9));
        cache.close();
        assert_eq!(cache.lookup("img", 50), None);
    }
}
