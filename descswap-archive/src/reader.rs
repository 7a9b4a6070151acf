//! Random-access archive reading keyed by entry checksum.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::ArchiveError;

/// Lowercase SHA-256 hex of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A generic random-access archive yielding the bytes of a stored entry
/// identified by its content checksum.
pub trait ArchiveReader {
    /// Returns the entry bytes, or [`ArchiveError::EntryNotFound`] if no
    /// entry with that checksum exists.
    fn open_entry(&mut self, checksum: &str) -> Result<Vec<u8>, ArchiveError>;

    /// True if the archive holds an entry with that checksum.
    fn contains(&self, checksum: &str) -> bool;
}

/// Zip-backed [`ArchiveReader`]. Entries are indexed by SHA-256 once when
/// the archive is opened; lookups afterwards are by checksum only.
pub struct EmbeddedArchive {
    archive: ZipArchive<File>,
    /// checksum -> entry name
    index: HashMap<String, String>,
}

impl EmbeddedArchive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut index = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            let mut hasher = Sha256::new();
            std::io::copy(&mut entry, &mut hasher)?;
            index.insert(hex::encode(hasher.finalize()), name);
        }

        Ok(Self { archive, index })
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl ArchiveReader for EmbeddedArchive {
    fn open_entry(&mut self, checksum: &str) -> Result<Vec<u8>, ArchiveError> {
        let name = self
            .index
            .get(checksum)
            .ok_or_else(|| ArchiveError::EntryNotFound(checksum.to_string()))?
            .clone();

        let mut entry = self.archive.by_name(&name)?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }

    fn contains(&self, checksum: &str) -> bool {
        self.index.contains_key(checksum)
    }
}
