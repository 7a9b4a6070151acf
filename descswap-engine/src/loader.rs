//! The top-level attach sequence: profile in hand, stage the replacement
//! content, install the identity shim, run the swap.

use std::path::Path;
use std::sync::Arc;

use descswap_archive::{ArchiveReader, ContentCache};
use descswap_host::{ContextHandle, HostProcess};
use tracing::{debug, info};

use crate::config::{BypassLevel, PatchProfile};
use crate::orchestrator::{SwapOrchestrator, SwapOutcome};
use crate::shim::{IdentityShimRegistry, NoResolver, ReplacementResolver};
use crate::SwapError;

/// Redirects direct file access from the original content path to the
/// replacement, for hosts where identity queries alone are not enough.
/// Interface only; the default does nothing.
pub trait NativeRedirect {
    fn redirect(&self, original: &Path, replacement: &Path);
}

pub struct NoRedirect;

impl NativeRedirect for NoRedirect {
    fn redirect(&self, _original: &Path, _replacement: &Path) {}
}

pub struct PatchLoader {
    profile: PatchProfile,
    shim: Arc<IdentityShimRegistry>,
    redirect: Box<dyn NativeRedirect>,
}

impl PatchLoader {
    pub fn new(profile: PatchProfile) -> Self {
        Self {
            profile,
            shim: IdentityShimRegistry::new(Arc::new(NoResolver)),
            redirect: Box::new(NoRedirect),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ReplacementResolver>) -> Self {
        self.shim = IdentityShimRegistry::new(resolver);
        self
    }

    pub fn with_redirect(mut self, redirect: Box<dyn NativeRedirect>) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn profile(&self) -> &PatchProfile {
        &self.profile
    }

    /// Stages the replacement content addressed by `checksum`, installs the
    /// identity shim when the configured level asks for it, and runs the
    /// swap protocol. Staging failures are fatal and happen before any
    /// holder is touched.
    pub fn attach(
        &self,
        host: &Arc<HostProcess>,
        stub_context: &Arc<ContextHandle>,
        archive: &mut dyn ArchiveReader,
        cache: &ContentCache,
        checksum: &str,
    ) -> Result<SwapOutcome, SwapError> {
        info!(
            use_manager = self.profile.use_manager,
            bypass = ?self.profile.identity_bypass_level,
            "Attaching patch"
        );

        let staged = cache.ensure(archive, checksum)?;
        let live = stub_context.descriptor();

        if self.profile.identity_bypass_level >= BypassLevel::PackageQueries {
            if let Some(original) = &self.profile.original_identity {
                self.shim.preset(live.package_name.clone(), original.clone());
            }
            self.shim.install(host);
        } else {
            debug!("Identity bypass disabled, shim not installed");
        }

        let orchestrator = SwapOrchestrator::new(self.profile.dynamic_factory_override.clone());
        let outcome = orchestrator.swap(host, stub_context, &staged)?;

        if self.profile.identity_bypass_level >= BypassLevel::SyscallRedirect {
            self.redirect.redirect(&live.source_path, &staged);
        }

        Ok(outcome)
    }
}
