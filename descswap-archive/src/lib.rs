//! Checksum-addressed archive access and replacement-content staging.
//!
//! The swap engine needs exactly one thing from an archive: the bytes of a
//! stored entry identified by its content checksum. [`ArchiveReader`] is
//! that interface; [`EmbeddedArchive`] implements it over a zip container.
//! [`ContentCache`] stages entry bytes into a content-addressed directory
//! under private storage, one file per checksum, pruned wholesale whenever
//! contents stop matching.

mod cache;
mod error;
mod reader;

pub use cache::ContentCache;
pub use error::ArchiveError;
pub use reader::{sha256_hex, ArchiveReader, EmbeddedArchive};
