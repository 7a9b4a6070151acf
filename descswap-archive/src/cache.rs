//! Content-addressed staging cache for replacement content.
//!
//! One file per checksum under a private directory. Staging is idempotent:
//! an existing file is revalidated by hash and reused. Any mismatch prunes
//! the directory wholesale before re-staging, never a single file.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::reader::{sha256_hex, ArchiveReader};
use crate::ArchiveError;

pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The staging path for a checksum, whether or not it exists yet.
    pub fn path_for(&self, checksum: &str) -> PathBuf {
        self.root.join(format!("{checksum}.pkg"))
    }

    /// Materializes the entry with `checksum` into the cache and returns its
    /// path. Reuses a valid existing file; prunes the whole cache and
    /// re-stages when the existing file no longer matches its checksum.
    pub fn ensure(
        &self,
        archive: &mut dyn ArchiveReader,
        checksum: &str,
    ) -> Result<PathBuf, ArchiveError> {
        let path = self.path_for(checksum);

        if path.exists() {
            let existing = std::fs::read(&path)?;
            if sha256_hex(&existing) == checksum {
                return Ok(path);
            }
            warn!(path = %path.display(), "Staged content no longer matches checksum, pruning cache");
            self.prune()?;
        }

        let data = archive.open_entry(checksum)?;
        let actual = sha256_hex(&data);
        if actual != checksum {
            return Err(ArchiveError::ChecksumMismatch {
                expected: checksum.to_string(),
                actual,
            });
        }

        std::fs::create_dir_all(&self.root)?;
        std::fs::write(&path, &data)?;
        info!(path = %path.display(), bytes = data.len(), "Staged replacement content");
        Ok(path)
    }

    /// Removes every staged file and recreates the empty directory.
    pub fn prune(&self) -> Result<(), ArchiveError> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}
