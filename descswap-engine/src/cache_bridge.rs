//! Duplication of shared, path-keyed host caches under the replacement
//! path. Duplication is additive: the original entries are never removed
//! or mutated, and payload handles are shared rather than copied.

use std::path::Path;

use descswap_host::{CacheKind, HostProcess, Probe};
use tracing::{debug, warn};

pub struct ResourceCacheBridge;

impl ResourceCacheBridge {
    /// Inserts, for every entry of `kind` keyed under `old_path`, a second
    /// entry identical except for the path, mapped to the same payload
    /// handle. An absent cache kind is a skip with a warning, never a
    /// failure. Returns how many entries were duplicated.
    pub fn duplicate(host: &HostProcess, kind: CacheKind, old_path: &Path, new_path: &Path) -> usize {
        let duplicated = host.with_asset_cache(kind, |cache| {
            let snapshot = cache.entries_for_path(old_path);
            let count = snapshot.len();
            for (key, payload) in snapshot {
                cache.insert(key.with_path(new_path), payload);
            }
            count
        });

        match duplicated {
            Probe::Found(count) => {
                debug!(cache = kind.name(), count, "Duplicated asset cache entries");
                count
            }
            Probe::Unavailable(surface) => {
                warn!(cache = surface, "Asset cache absent on this host, skipping duplication");
                0
            }
        }
    }

    /// Duplicates across every cache kind the host may carry.
    pub fn duplicate_all(host: &HostProcess, old_path: &Path, new_path: &Path) -> usize {
        CacheKind::ALL
            .iter()
            .map(|kind| Self::duplicate(host, *kind, old_path, new_path))
            .sum()
    }

    /// Aliases the loader-table entry for `old_path` under `new_path`, so
    /// both paths resolve to the same loader instance.
    pub fn share_loader(host: &HostProcess, old_path: &Path, new_path: &Path) -> bool {
        match host.loader_for(old_path) {
            Some(loader) => {
                host.register_loader(new_path, loader);
                true
            }
            None => {
                debug!(path = %old_path.display(), "No loader registered, nothing to share");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descswap_host::{AssetKey, HostShape, PackageSource};
    use descswap_types::{AssetData, ClassLoader};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn boot(shape: HostShape) -> Arc<HostProcess> {
        HostProcess::boot(shape, PackageSource::new("com.example.app", "/orig.pkg")).0
    }

    #[test]
    fn duplication_shares_payload_and_keeps_original() {
        let host = boot(HostShape::modern());
        let old = Path::new("/orig.pkg");
        let new = Path::new("/cache/abc.pkg");

        let count = ResourceCacheBridge::duplicate(&host, CacheKind::LoadedAssets, old, new);
        assert_eq!(count, 1);

        host.with_asset_cache(CacheKind::LoadedAssets, |cache| {
            let original = cache.get(&AssetKey::plain(old)).unwrap();
            let duplicate = cache.get(&AssetKey::plain(new)).unwrap();
            assert!(Arc::ptr_eq(&original, &duplicate));
        })
        .found()
        .unwrap();
    }

    #[test]
    fn duplication_preserves_key_flags() {
        let host = boot(HostShape::modern());
        let flagged = AssetKey {
            path: PathBuf::from("/orig.pkg"),
            shared_lib: true,
            overlay: false,
        };
        host.with_asset_cache(CacheKind::LoadedAssets, |cache| {
            cache.insert(flagged.clone(), AssetData::load("/orig.pkg"));
        })
        .found()
        .unwrap();

        ResourceCacheBridge::duplicate(
            &host,
            CacheKind::LoadedAssets,
            Path::new("/orig.pkg"),
            Path::new("/cache/abc.pkg"),
        );

        host.with_asset_cache(CacheKind::LoadedAssets, |cache| {
            assert!(cache.get(&flagged.with_path("/cache/abc.pkg")).is_some());
        })
        .found()
        .unwrap();
    }

    #[test]
    fn absent_cache_kind_is_a_skip() {
        let host = boot(HostShape::legacy());
        let count = ResourceCacheBridge::duplicate(
            &host,
            CacheKind::LoadedAssets,
            Path::new("/orig.pkg"),
            Path::new("/cache/abc.pkg"),
        );
        assert_eq!(count, 0);
    }

    #[test]
    fn duplicate_all_covers_available_kinds() {
        let host = boot(HostShape::modern());
        let total = ResourceCacheBridge::duplicate_all(
            &host,
            Path::new("/orig.pkg"),
            Path::new("/cache/abc.pkg"),
        );
        // Boot seeds one entry per available cache.
        assert_eq!(total, 2);
    }

    #[test]
    fn loader_sharing_aliases_the_same_instance() {
        let host = boot(HostShape::modern());
        assert!(ResourceCacheBridge::share_loader(
            &host,
            Path::new("/orig.pkg"),
            Path::new("/cache/abc.pkg"),
        ));

        let original = host.loader_for(Path::new("/orig.pkg")).unwrap();
        let aliased = host.loader_for(Path::new("/cache/abc.pkg")).unwrap();
        assert!(Arc::ptr_eq(&original, &aliased));
    }

    #[test]
    fn loader_sharing_without_registration_is_a_noop() {
        let host = boot(HostShape::modern());
        host.register_loader("/elsewhere.pkg", ClassLoader::new("/elsewhere.pkg"));
        assert!(!ResourceCacheBridge::share_loader(
            &host,
            Path::new("/never-loaded.pkg"),
            Path::new("/cache/abc.pkg"),
        ));
        assert!(host.loader_for(Path::new("/cache/abc.pkg")).is_none());
    }
}
