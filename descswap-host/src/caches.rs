//! Shared, path-keyed asset caches.
//!
//! Real hosts keep two caches over loaded asset files: a bounded one over
//! recently loaded assets and a weak map over everything seen. Both key by
//! `{path, shared_lib, overlay}` and share payload handles; duplicating an
//! entry under a second path costs an index slot, not a payload copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use descswap_types::AssetPayload;

/// The shared cache kinds a host may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Bounded cache of recently loaded assets. Absent on some versions.
    LoadedAssets,
    /// Weak map over every asset seen.
    CachedAssets,
}

impl CacheKind {
    pub const ALL: [CacheKind; 2] = [CacheKind::LoadedAssets, CacheKind::CachedAssets];

    pub fn name(&self) -> &'static str {
        match self {
            CacheKind::LoadedAssets => "loaded-assets",
            CacheKind::CachedAssets => "cached-assets",
        }
    }
}

/// Cache key: a path plus the load flags that make it distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub path: PathBuf,
    pub shared_lib: bool,
    pub overlay: bool,
}

impl AssetKey {
    pub fn plain(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            shared_lib: false,
            overlay: false,
        }
    }

    /// The same key under a different path; flags carry over.
    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            shared_lib: self.shared_lib,
            overlay: self.overlay,
        }
    }
}

/// One asset cache instance.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: HashMap<AssetKey, AssetPayload>,
}

impl AssetCache {
    pub fn insert(&mut self, key: AssetKey, payload: AssetPayload) {
        self.entries.insert(key, payload);
    }

    pub fn get(&self, key: &AssetKey) -> Option<AssetPayload> {
        self.entries.get(key).cloned()
    }

    /// Every entry whose key path matches, cloned out so the caller can
    /// insert while iterating the snapshot.
    pub fn entries_for_path(&self, path: &Path) -> Vec<(AssetKey, AssetPayload)> {
        self.entries
            .iter()
            .filter(|(k, _)| k.path == path)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// First payload found under a path, any flags.
    pub fn payload_for(&self, path: &Path) -> Option<AssetPayload> {
        self.entries
            .iter()
            .find(|(k, _)| k.path == path)
            .map(|(_, v)| v.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descswap_types::AssetData;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn with_path_carries_flags() {
        let key = AssetKey {
            path: "/orig.pkg".into(),
            shared_lib: true,
            overlay: false,
        };
        let moved = key.with_path("/cache/abc.pkg");
        assert!(moved.shared_lib);
        assert!(!moved.overlay);
        assert_eq!(moved.path, PathBuf::from("/cache/abc.pkg"));
    }

    #[test]
    fn entries_for_path_matches_any_flags() {
        let mut cache = AssetCache::default();
        let payload = AssetData::load("/orig.pkg");
        cache.insert(AssetKey::plain("/orig.pkg"), payload.clone());
        cache.insert(
            AssetKey {
                path: "/orig.pkg".into(),
                shared_lib: true,
                overlay: false,
            },
            payload.clone(),
        );
        cache.insert(AssetKey::plain("/other.pkg"), payload);

        assert_eq!(cache.entries_for_path(Path::new("/orig.pkg")).len(), 2);
        assert_eq!(cache.entries_for_path(Path::new("/other.pkg")).len(), 1);
    }

    #[test]
    fn shared_payload_identity_survives_insert() {
        let mut cache = AssetCache::default();
        let payload = AssetData::load("/orig.pkg");
        cache.insert(AssetKey::plain("/orig.pkg"), payload.clone());
        let got = cache.payload_for(Path::new("/orig.pkg")).unwrap();
        assert!(Arc::ptr_eq(&got, &payload));
    }
}
