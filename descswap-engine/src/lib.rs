//! In-process descriptor hot-swap engine.
//!
//! Replaces the live package descriptor of a running host process with one
//! pointing at staged replacement content, without restarting the process:
//! every known holder of the old reference is enumerated and repaired,
//! shared caches are duplicated under the new path, identity queries are
//! shimmed to keep reporting the original signing credential, and a
//! self-removing interception net backstops the holders enumeration cannot
//! reach.

mod cache_bridge;
mod config;
mod error;
mod factory;
mod loader;
mod net;
mod orchestrator;
mod shim;
mod sites;

pub use cache_bridge::ResourceCacheBridge;
pub use config::{BypassLevel, PatchProfile};
pub use error::SwapError;
pub use factory::DescriptorFactory;
pub use loader::{NativeRedirect, NoRedirect, PatchLoader};
pub use net::InterceptionNet;
pub use orchestrator::{
    FailurePolicy, StepOutcome, SwapOrchestrator, SwapOutcome, SwapReport, SwapStep,
};
pub use shim::{IdentityShimRegistry, NoResolver, ReplacementResolver};
pub use sites::{ReferenceSiteRegistry, RepairStats};
