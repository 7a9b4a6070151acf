//! Host-version capability adapter and tagged introspection results.

use std::collections::HashSet;

use crate::caches::CacheKind;

/// Result of probing a shape-gated host structure. Unavailability is an
/// expected per-version condition, not an error: callers log and skip.
#[derive(Debug)]
pub enum Probe<T> {
    Found(T),
    /// The named surface does not exist on this host version.
    Unavailable(&'static str),
}

impl<T> Probe<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Probe::Found(v) => Some(v),
            Probe::Unavailable(_) => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Probe::Unavailable(_))
    }
}

/// Which structures and operations a given host version exposes.
///
/// The engine never branches on `release` directly; everything flows
/// through the capability fields so new host versions only touch this type.
#[derive(Debug, Clone)]
pub struct HostShape {
    pub release: u32,
    /// Newer hosts track in-flight clients in a separate table.
    pub has_launching_clients: bool,
    /// Which shared asset caches exist. Either may be compiled out.
    pub asset_cache_kinds: Vec<CacheKind>,
    /// Context operations that refuse hook installation on this version.
    pub unhookable_ops: HashSet<&'static str>,
}

impl HostShape {
    /// A current host: both asset caches, separate launching-client table,
    /// fully hookable construction surface.
    pub fn modern() -> Self {
        Self {
            release: 34,
            has_launching_clients: true,
            asset_cache_kinds: vec![CacheKind::LoadedAssets, CacheKind::CachedAssets],
            unhookable_ops: HashSet::new(),
        }
    }

    /// An older host: no launching-client table, only the weak asset cache.
    pub fn legacy() -> Self {
        Self {
            release: 29,
            has_launching_clients: false,
            asset_cache_kinds: vec![CacheKind::CachedAssets],
            unhookable_ops: HashSet::new(),
        }
    }

    pub fn has_cache(&self, kind: CacheKind) -> bool {
        self.asset_cache_kinds.contains(&kind)
    }

    pub fn can_hook(&self, op: &str) -> bool {
        !self.unhookable_ops.contains(op)
    }
}
