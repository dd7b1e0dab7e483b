use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{CoreError, CoreResult};

/// The main/backup/temp file triple for one durable store.
///
/// The backup is the last state known to have loaded successfully; the temp
/// file only exists mid-publish. Siblings are derived by suffixing the main
/// path (`ratings.json` -> `ratings.json.bak` / `ratings.json.tmp`).
#[derive(Clone, Debug)]
pub struct StorePaths {
    main: PathBuf,
    backup: PathBuf,
    temp: PathBuf,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl StorePaths {
    /// Derive the triple from the main file path.
    pub fn new(main: &Path) -> Self {
        Self {
            backup: sibling(main, ".bak"),
            temp: sibling(main, ".tmp"),
            main: main.to_path_buf(),
        }
    }

    /// Path of the current (published) file.
    pub fn main(&self) -> &Path {
        &self.main
    }

    /// Path of the backup file.
    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Path of the transient mid-publish file.
    pub fn temp(&self) -> &Path {
        &self.temp
    }

    /// Whether the main file exists with more than `min` bytes.
    pub fn main_is_nontrivial(&self, min: u64) -> bool {
        fs::metadata(&self.main).map(|m| m.len() > min).unwrap_or(false)
    }

    /// Atomically publish `bytes` as the new main file.
    ///
    /// Steps: write the temp file; verify it landed with at least
    /// `min_plausible` bytes (guards against a codec that silently produced
    /// an empty or truncated document); rotate the existing main into the
    /// backup slot when it is itself non-trivial; rename temp into main.
    ///
    /// A failure before the final rename leaves the previously-durable main
    /// untouched. A failed rotation degrades to "no backup exists yet": the
    /// stale main is deleted outright rather than left as a second,
    /// divergent current file.
    pub fn publish(&self, bytes: &[u8], min_plausible: u64) -> CoreResult<()> {
        fs::write(&self.temp, bytes)?;

        let temp_len = fs::metadata(&self.temp)?.len();
        if temp_len < min_plausible {
            let _ = fs::remove_file(&self.temp);
            error!(
                path = %self.temp.display(),
                len = temp_len,
                min = min_plausible,
                "publish aborted: encoded output implausibly small"
            );
            return Err(CoreError::ImplausibleOutput {
                len: temp_len,
                min: min_plausible,
            });
        }

        if self.main_is_nontrivial(0) {
            // Stale backup may not exist; ignore.
            let _ = fs::remove_file(&self.backup);
            if let Err(e) = fs::rename(&self.main, &self.backup) {
                warn!(
                    main = %self.main.display(),
                    error = %e,
                    "backup rotation failed; dropping main instead"
                );
                if let Err(e) = fs::remove_file(&self.main) {
                    warn!(main = %self.main.display(), error = %e, "failed to drop stale main");
                }
            }
        }

        fs::rename(&self.temp, &self.main)?;
        debug!(path = %self.main.display(), len = temp_len, "published");
        Ok(())
    }

    /// Self-heal: copy the backup over the main file.
    pub fn restore_backup(&self) -> CoreResult<()> {
        fs::copy(&self.backup, &self.main)?;
        debug!(path = %self.main.display(), "restored main from backup");
        Ok(())
    }

    /// Opportunistically refresh the backup from the current main file.
    pub fn refresh_backup(&self) -> CoreResult<()> {
        fs::copy(&self.main, &self.backup)?;
        debug!(path = %self.backup.display(), "refreshed backup");
        Ok(())
    }
}
