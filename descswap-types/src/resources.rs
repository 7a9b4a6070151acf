//! Realized resource sets and the shared asset payloads behind them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to loaded asset data. Cache duplication inserts a second
/// key mapped to the same payload handle: one physical copy, multiple keys.
pub type AssetPayload = Arc<AssetData>;

/// The loaded asset blob for one archive path. In a real host this is the
/// mapped asset file; here identity and origin are what matter.
#[derive(Debug)]
pub struct AssetData {
    /// Path the payload was originally loaded from.
    pub origin: PathBuf,
}

impl AssetData {
    pub fn load(origin: impl Into<PathBuf>) -> AssetPayload {
        Arc::new(Self {
            origin: origin.into(),
        })
    }
}

/// The realized resources of a descriptor: the public asset path it was
/// resolved for plus the shared payload backing it.
#[derive(Debug)]
pub struct ResourceSet {
    pub asset_path: PathBuf,
    pub payload: AssetPayload,
}

impl ResourceSet {
    pub fn new(asset_path: impl Into<PathBuf>, payload: AssetPayload) -> Self {
        Self {
            asset_path: asset_path.into(),
            payload,
        }
    }

    pub fn asset_path(&self) -> &Path {
        &self.asset_path
    }

    /// True when two resource sets are backed by the same physical payload.
    pub fn shares_payload_with(&self, other: &ResourceSet) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}
