//! The process-wide identity factory, which deserializes package identity
//! records from their raw on-disk form.
//!
//! The factory lives in a single process-wide slot on [`crate::HostProcess`]
//! so that a wrapper installed once keeps seeing every materialization for
//! the lifetime of the process.

use descswap_types::PackageIdentity;

use crate::HostError;

/// The raw serialized form of an identity record, as the host stores it.
pub type RawIdentity = serde_json::Value;

/// Materializes package identity records. Implementations must be cheap to
/// call repeatedly; callers cache results separately.
pub trait IdentityFactory: Send + Sync {
    fn materialize(&self, raw: &RawIdentity) -> Result<PackageIdentity, HostError>;
}

/// The host's stock factory: straight deserialization, no rewriting.
pub struct BaseIdentityFactory;

impl IdentityFactory for BaseIdentityFactory {
    fn materialize(&self, raw: &RawIdentity) -> Result<PackageIdentity, HostError> {
        Ok(serde_json::from_value(raw.clone())?)
    }
}
