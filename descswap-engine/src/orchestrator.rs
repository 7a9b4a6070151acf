//! The swap protocol: the ordered step sequence that retires a live
//! descriptor and publishes its replacement into every holder.
//!
//! Steps fail independently. Each failure is recorded in the report and,
//! unless the step's policy is fatal, later steps still run; partial
//! success is an acceptable terminal state backstopped by the armed net.

use std::path::Path;
use std::sync::Arc;

use descswap_host::{ContextHandle, HostProcess};
use descswap_types::{Descriptor, DescriptorRef, ResourceSet};
use tracing::{info, warn};

use crate::cache_bridge::ResourceCacheBridge;
use crate::factory::DescriptorFactory;
use crate::net::InterceptionNet;
use crate::sites::ReferenceSiteRegistry;
use crate::SwapError;

/// The protocol steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    CapturePath,
    BuildDescriptor,
    RepairHolders,
    DuplicateCaches,
    EvictCanonicalEntry,
    CanonicalLookup,
    PublishAuthoritative,
    RepairQueues,
    RealizeResources,
    AdoptLoaders,
    ArmNet,
}

/// What happens when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the whole swap with a fatal error.
    Fatal,
    /// Record the failure and keep going; the net backstops the gap.
    Continue,
}

impl SwapStep {
    pub const PROTOCOL: [SwapStep; 11] = [
        SwapStep::CapturePath,
        SwapStep::BuildDescriptor,
        SwapStep::RepairHolders,
        SwapStep::DuplicateCaches,
        SwapStep::EvictCanonicalEntry,
        SwapStep::CanonicalLookup,
        SwapStep::PublishAuthoritative,
        SwapStep::RepairQueues,
        SwapStep::RealizeResources,
        SwapStep::AdoptLoaders,
        SwapStep::ArmNet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SwapStep::CapturePath => "capture-path",
            SwapStep::BuildDescriptor => "build-descriptor",
            SwapStep::RepairHolders => "repair-holders",
            SwapStep::DuplicateCaches => "duplicate-caches",
            SwapStep::EvictCanonicalEntry => "evict-canonical-entry",
            SwapStep::CanonicalLookup => "canonical-lookup",
            SwapStep::PublishAuthoritative => "publish-authoritative",
            SwapStep::RepairQueues => "repair-queues",
            SwapStep::RealizeResources => "realize-resources",
            SwapStep::AdoptLoaders => "adopt-loaders",
            SwapStep::ArmNet => "arm-net",
        }
    }

    /// The failure policy table. Without a built replacement or an
    /// authoritative mint there is nothing to degrade to; everything else
    /// leaves the process in a state the remaining steps and the net can
    /// still repair.
    pub fn on_failure(&self) -> FailurePolicy {
        match self {
            SwapStep::BuildDescriptor | SwapStep::CanonicalLookup => FailurePolicy::Fatal,
            _ => FailurePolicy::Continue,
        }
    }
}

/// Terminal state of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// The step ran but skipped part of its work.
    Degraded(String),
    /// The step failed under a `Continue` policy.
    Failed(String),
}

/// The per-step outcome list of one protocol run.
#[derive(Debug, Default)]
pub struct SwapReport {
    pub steps: Vec<(SwapStep, StepOutcome)>,
}

impl SwapReport {
    fn record(&mut self, step: SwapStep, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Completed => {}
            StepOutcome::Degraded(reason) => {
                warn!(step = step.name(), reason = %reason, "Swap step degraded")
            }
            StepOutcome::Failed(reason) => {
                warn!(step = step.name(), reason = %reason, "Swap step failed")
            }
        }
        self.steps.push((step, outcome));
    }

    pub fn outcome_of(&self, step: SwapStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn fully_completed(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, o)| matches!(o, StepOutcome::Completed))
    }

    pub fn failures(&self) -> impl Iterator<Item = (SwapStep, &str)> {
        self.steps.iter().filter_map(|(s, o)| match o {
            StepOutcome::Failed(reason) => Some((*s, reason.as_str())),
            _ => None,
        })
    }
}

/// Everything the caller gets back from a completed (possibly partial)
/// swap.
pub struct SwapOutcome {
    pub report: SwapReport,
    /// The authoritative descriptor minted by the canonical lookup.
    pub descriptor: DescriptorRef,
    pub resources: Option<Arc<ResourceSet>>,
    /// The armed backstop. Dropping it does not disarm; it stays up until
    /// it fires.
    pub net: InterceptionNet,
}

pub struct SwapOrchestrator {
    configured_override: Option<String>,
}

impl SwapOrchestrator {
    pub fn new(configured_override: Option<String>) -> Self {
        Self { configured_override }
    }

    /// Runs the full protocol against the stub context's live descriptor.
    /// Single control-flow thread, no concurrent swaps.
    pub fn swap(
        &self,
        host: &Arc<HostProcess>,
        stub_context: &Arc<ContextHandle>,
        replacement_path: &Path,
    ) -> Result<SwapOutcome, SwapError> {
        let mut report = SwapReport::default();
        let stale = stub_context.descriptor();
        let package = stale.package_name.clone();
        info!(package, replacement = %replacement_path.display(), "Starting descriptor swap");

        // 1. Capture the live descriptor's current content paths.
        let old_source = stale.source_path.clone();
        let old_public = stale.public_path.clone();
        report.record(SwapStep::CapturePath, StepOutcome::Completed);

        // 2. Build the replacement.
        let replacement = DescriptorFactory::build(
            &stale,
            replacement_path,
            self.configured_override.as_deref(),
        );
        report.record(SwapStep::BuildDescriptor, StepOutcome::Completed);

        // 3. First repair pass over every enumerable holder.
        let stats = ReferenceSiteRegistry::repair_all(host, &package, &stale, &replacement);
        report.record(
            SwapStep::RepairHolders,
            if stats.launching_skipped {
                StepOutcome::Degraded("launching-client table absent".into())
            } else {
                StepOutcome::Completed
            },
        );

        // 4. Duplicate the shared caches and alias the loader table.
        ResourceCacheBridge::duplicate_all(host, &old_public, replacement_path);
        ResourceCacheBridge::share_loader(host, &old_source, replacement_path);
        report.record(SwapStep::DuplicateCaches, StepOutcome::Completed);

        // 5. Evict the by-name entry so step 6 mints through the host's own
        // path. Gated on instance identity; a no-op when step 3 already
        // evicted it.
        if host
            .cached_descriptor(&package)
            .is_some_and(|cached| Descriptor::same_instance(&cached, &stale))
        {
            host.remove_cached_descriptor(&package);
        }
        report.record(SwapStep::EvictCanonicalEntry, StepOutcome::Completed);

        // 6. Canonical lookup mints the authoritative descriptor.
        let authoritative = match host.descriptor_for_package(&package) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                return Err(Self::fatal(SwapStep::CanonicalLookup, e.to_string()));
            }
        };
        report.record(
            SwapStep::CanonicalLookup,
            if authoritative.fields_equal(&replacement) {
                StepOutcome::Completed
            } else {
                StepOutcome::Degraded("authoritative mint differs from built replacement".into())
            },
        );

        // 7. Publish into the binding record and the stub context; the
        // latter is already bound and unreachable by a future lookup alone.
        host.with_binding(|binding| binding.descriptor = authoritative.clone());
        stub_context.set_descriptor(authoritative.clone());
        report.record(SwapStep::PublishAuthoritative, StepOutcome::Completed);

        // 8. Second queue pass: tasks may have queued since step 1. A task
        // the host started processing between the passes is a known race
        // window, not repaired here.
        ReferenceSiteRegistry::repair_queues(host, &package, &stale, &authoritative);
        ReferenceSiteRegistry::repair_queues(host, &package, &replacement, &authoritative);
        report.record(SwapStep::RepairQueues, StepOutcome::Completed);

        // 9. Force realization; this also flushes remaining lazy consumers.
        let resources = match host.realize_resources(&authoritative) {
            Ok(set) => {
                report.record(SwapStep::RealizeResources, StepOutcome::Completed);
                Some(set)
            }
            Err(e) => {
                report.record(SwapStep::RealizeResources, StepOutcome::Failed(e.to_string()));
                None
            }
        };

        // 10. The sole permitted in-place mutation: holders that captured
        // the stale object identity can only be migrated by making it
        // answer with the new loaders.
        stale.adopt_class_loaders_from(&authoritative);
        report.record(SwapStep::AdoptLoaders, StepOutcome::Completed);

        // 11. Arm the backstop for unenumerable holders.
        let net = InterceptionNet::arm(
            host,
            stale.clone(),
            authoritative.clone(),
            resources.clone(),
        );
        report.record(SwapStep::ArmNet, StepOutcome::Completed);

        info!(
            package,
            fully_completed = report.fully_completed(),
            "Descriptor swap finished"
        );
        Ok(SwapOutcome {
            report,
            descriptor: authoritative,
            resources,
            net,
        })
    }

    fn fatal(step: SwapStep, reason: String) -> SwapError {
        debug_assert_eq!(step.on_failure(), FailurePolicy::Fatal);
        SwapError::TotalFailure {
            step: step.name(),
            reason,
        }
    }
}
