use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use holdfast_core::GuardedCodec;

use crate::error::ManagerResult;
use crate::favorites::FavoritesManager;
use crate::notify::{ChangeEvent, ChangeRouter, Domain};
use crate::packlist::PackListManager;
use crate::ratings::RatingsManager;
use crate::thumbs::ThumbnailCache;

/// Composition root: one explicitly-constructed store per domain.
///
/// The session owns the shared codec, the change router and all five
/// managers; the host constructs it once at startup and hands managers to
/// the panels that need them. There are no lazy global singletons -- store
/// lifetime is the session's lifetime, ended by an explicit
/// [`close`](Session::close).
pub struct Session {
    pub favorites: FavoritesManager,
    pub ratings: RatingsManager,
    pub auto_load: PackListManager,
    pub whitelist: PackListManager,
    pub thumbnails: ThumbnailCache,
    router: Arc<ChangeRouter>,
    dir: PathBuf,
}

impl Session {
    /// Open every store under `dir`, creating the directory if needed.
    ///
    /// Snapshot and log stores load here; the blob store replays its index.
    /// Only setup-level failures (directory creation, cache-file open)
    /// propagate -- unreadable or corrupt store content degrades through
    /// each store's own fallback chain.
    pub fn open(dir: &Path) -> ManagerResult<Self> {
        fs::create_dir_all(dir)?;
        let codec = Arc::new(GuardedCodec::new());
        let router = Arc::new(ChangeRouter::new());

        let favorites =
            FavoritesManager::open(&dir.join("favorites.log"), Arc::clone(&router));
        let ratings = RatingsManager::open(
            &dir.join("ratings.json"),
            Arc::clone(&codec),
            Arc::clone(&router),
        );
        let auto_load = PackListManager::open(
            &dir.join("autoload.json"),
            Domain::AutoLoad,
            Arc::clone(&codec),
            Arc::clone(&router),
        );
        let whitelist = PackListManager::open(
            &dir.join("whitelist.json"),
            Domain::Whitelist,
            Arc::clone(&codec),
            Arc::clone(&router),
        );
        let thumbnails = ThumbnailCache::open(&dir.join("thumbnails.bin"), Arc::clone(&router))?;

        info!(dir = %dir.display(), "session opened");
        Ok(Self {
            favorites,
            ratings,
            auto_load,
            whitelist,
            thumbnails,
            router,
            dir: dir.to_path_buf(),
        })
    }

    /// Register a subscriber for change events from every manager.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.router.subscribe(callback);
    }

    /// Directory holding all store files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flush batched snapshot state and release the blob-store handle.
    pub fn close(self) {
        self.ratings.save();
        self.auto_load.save();
        self.whitelist.save();
        self.thumbnails.close();
        debug!(dir = %self.dir.display(), "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbs::Thumbnail;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn open_mutate_close_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let session = Session::open(dir.path()).unwrap();
        session.favorites.set_favorite("pkgA", true);
        session.ratings.set_rating("pkgA", 5, false);
        session.auto_load.set_member("pkgA", true, false);
        session.whitelist.set_member("dep1", true, false);
        session.thumbnails.store(
            "scenes/a.png",
            1000,
            &Thumbnail {
                bytes: vec![7; 64],
                width: 8,
                height: 8,
                pixel_format: 4,
            },
        );
        session.close();

        let session = Session::open(dir.path()).unwrap();
        assert!(session.favorites.is_favorite("pkgA"));
        assert_eq!(session.ratings.rating("pkgA"), Some(5));
        assert!(session.auto_load.contains("pkgA"));
        assert!(session.whitelist.contains("dep1"));
        assert!(session.thumbnails.lookup("scenes/a.png", 1000).is_some());
    }

    #[test]
    fn one_router_serves_all_domains() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path()).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        session.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.favorites.set_favorite("pkgA", true);
        session.ratings.set_rating("pkgA", 3, false);
        session.auto_load.set_member("pkgA", true, false);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stores_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path()).unwrap();

        // Corrupting one store's file must not disturb the others.
        session.favorites.set_favorite("pkgA", true);
        session.ratings.set_rating("pkgB", 4, true);
        fs::write(dir.path().join("favorites.log"), b"\xFF\xFF").unwrap();
        session.close();

        let session = Session::open(dir.path()).unwrap();
        assert!(!session.favorites.is_favorite("pkgA"));
        assert_eq!(session.ratings.rating("pkgB"), Some(4));
    }
}
