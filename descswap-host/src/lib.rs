//! The host-process surface the descswap engine mutates.
//!
//! [`HostProcess`] models everything in the running host that can hold a
//! reference to a live package descriptor: the pending binding record, the
//! descriptor-by-name cache, the pending task queue, tracked client records,
//! the loader table, the shared asset caches, the process-wide identity
//! factory slot, and the context objects with their hookable
//! construction-surface operations.
//!
//! Host versions differ in which structures exist and which operations can
//! be hooked. [`HostShape`] is the per-version capability adapter; access to
//! shape-gated structures returns a tagged [`Probe`] so callers skip
//! gracefully instead of treating version skew as an error.

mod caches;
mod context;
mod identity;
mod process;
mod shape;
mod tasks;

pub use caches::{AssetCache, AssetKey, CacheKind};
pub use context::{ops, ContextHandle, ContextHook, HookToken, OpInvocation, OpResult};
pub use identity::{BaseIdentityFactory, IdentityFactory, RawIdentity};
pub use process::{BindingRecord, HostProcess, PackageSource};
pub use shape::{HostShape, Probe};
pub use tasks::{ClientId, ClientRecord, ComponentRecord, PendingTask, TaskKind};

/// Errors surfaced by the host model.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("operation '{0}' cannot be hooked on this host")]
    UnhookableOperation(String),

    #[error("operation '{0}' already has a hook installed")]
    HookSlotOccupied(String),

    #[error("identity record error: {0}")]
    Identity(#[from] serde_json::Error),
}
