//! Core type definitions for descswap.
//!
//! This crate defines the fundamental, host-agnostic types shared across the
//! engine:
//! - Package descriptors and their class-loader sets
//! - Realized resource sets and shared asset payloads
//! - Package identity records (signing credentials)
//!
//! Everything stateful about the host process (holder sites, caches, the
//! identity factory slot) lives in `descswap-host`, not here.

mod descriptor;
mod identity;
mod resources;

pub use descriptor::{ClassLoader, ClassLoaderSet, Descriptor, DescriptorRef, LoaderHandle};
pub use identity::{PackageIdentity, SigningBlock, SigningCredential};
pub use resources::{AssetData, AssetPayload, ResourceSet};
