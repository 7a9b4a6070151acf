//! The identity shim: a wrapper around the host's identity factory that
//! rewrites signing credentials on deserialization.
//!
//! Install is called at most once per process and there is no uninstall;
//! identity queries keep resolving through the wrapper for the process's
//! lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use descswap_host::{HostError, HostProcess, IdentityFactory, RawIdentity};
use descswap_types::{PackageIdentity, SigningCredential};
use tracing::{debug, info};

/// Resolves a replacement credential for packages not seeded through
/// [`IdentityShimRegistry::preset`]. Real deployments look the credential
/// up in the package's own embedded patch metadata.
pub trait ReplacementResolver: Send + Sync {
    fn resolve(&self, package: &str) -> Option<String>;
}

/// Resolver that knows nothing; only preset packages get rewritten.
pub struct NoResolver;

impl ReplacementResolver for NoResolver {
    fn resolve(&self, _package: &str) -> Option<String> {
        None
    }
}

/// Maps package name to replacement credential with a tri-state cache:
/// a missing map entry means unknown (resolver consulted on next lookup),
/// `Some(None)` means known-absent (failed lookup never retried),
/// `Some(Some(_))` means known-present.
pub struct IdentityShimRegistry {
    states: Mutex<HashMap<String, Option<String>>>,
    resolver: Arc<dyn ReplacementResolver>,
}

impl IdentityShimRegistry {
    pub fn new(resolver: Arc<dyn ReplacementResolver>) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(HashMap::new()),
            resolver,
        })
    }

    /// Seeds a known replacement credential for a package.
    pub fn preset(&self, package: impl Into<String>, credential: impl Into<String>) {
        self.states
            .lock()
            .unwrap()
            .insert(package.into(), Some(credential.into()));
    }

    fn replacement_for(&self, package: &str) -> Option<String> {
        let mut states = self.states.lock().unwrap();
        if let Some(cached) = states.get(package) {
            return cached.clone();
        }
        let resolved = self.resolver.resolve(package);
        if resolved.is_none() {
            debug!(package, "No replacement identity, caching the miss");
        }
        states.insert(package.to_string(), resolved.clone());
        resolved
    }

    /// Rewrites the first signing credential of `identity`, in both
    /// representations, when a replacement is configured. Records without
    /// any non-empty credential are left untouched.
    pub fn rewrite(&self, identity: &mut PackageIdentity) {
        if !identity.has_credentials() {
            return;
        }
        let Some(replacement) = self.replacement_for(&identity.package_name) else {
            return;
        };
        if let Some(first) = identity.signatures.first_mut() {
            *first = SigningCredential::new(replacement.clone());
        }
        if let Some(block) = identity.signing_block.as_mut() {
            if let Some(first) = block.signers.first_mut() {
                *first = SigningCredential::new(replacement);
            }
        }
        debug!(package = %identity.package_name, "Rewrote reported signing credential");
    }

    /// Wraps the host's identity factory with this registry and invalidates
    /// the transient result cache so future queries route through the
    /// wrapper.
    pub fn install(self: &Arc<Self>, host: &HostProcess) {
        let inner = host.identity_factory();
        host.set_identity_factory(Arc::new(ShimFactory {
            inner,
            registry: self.clone(),
        }));
        host.clear_identity_results();
        info!("Identity shim installed");
    }
}

struct ShimFactory {
    inner: Arc<dyn IdentityFactory>,
    registry: Arc<IdentityShimRegistry>,
}

impl IdentityFactory for ShimFactory {
    fn materialize(&self, raw: &RawIdentity) -> Result<PackageIdentity, HostError> {
        let mut identity = self.inner.materialize(raw)?;
        self.registry.rewrite(&mut identity);
        Ok(identity)
    }
}
