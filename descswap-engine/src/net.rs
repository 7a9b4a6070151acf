//! The interception net: self-removing hooks over the context-construction
//! surface, catching holders bound to context objects that enumeration
//! cannot discover.
//!
//! All installed handles share one disarm flag. The first invocation from a
//! context still holding the stale descriptor repairs it and releases every
//! handle; non-matching invocations pass through untouched.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use descswap_host::{ops, ContextHandle, HookToken, HostProcess, OpInvocation};
use descswap_types::{Descriptor, DescriptorRef, ResourceSet};
use tracing::{debug, info, warn};

pub struct InterceptionNet {
    state: Arc<NetState>,
}

struct NetState {
    disarmed: AtomicBool,
    fired: AtomicUsize,
    stale: DescriptorRef,
    replacement: DescriptorRef,
    resources: Option<Arc<ResourceSet>>,
    handles: Mutex<Vec<HookToken>>,
}

impl InterceptionNet {
    /// Hooks every operation of the construction surface. Installation
    /// failures are per-operation: an unhookable operation is logged and
    /// skipped, the rest of the net still goes up.
    pub fn arm(
        host: &HostProcess,
        stale: DescriptorRef,
        replacement: DescriptorRef,
        resources: Option<Arc<ResourceSet>>,
    ) -> Self {
        let state = Arc::new(NetState {
            disarmed: AtomicBool::new(false),
            fired: AtomicUsize::new(0),
            stale,
            replacement,
            resources,
            handles: Mutex::new(Vec::new()),
        });

        for op in host.context_ops() {
            let hook_state = state.clone();
            let installed = host.install_hook(
                op,
                Arc::new(move |host, context, invocation| {
                    hook_state.intercept(host, context, invocation);
                }),
            );
            match installed {
                Ok(token) => state.handles.lock().unwrap().push(token),
                Err(e) => warn!(op, error = %e, "Could not hook operation, net covers the rest"),
            }
        }

        info!(
            hooked = state.handles.lock().unwrap().len(),
            "Interception net armed"
        );
        Self { state }
    }

    /// How many times the net has repaired a context. At most 1.
    pub fn fired(&self) -> usize {
        self.state.fired.load(Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        !self.state.disarmed.load(Ordering::SeqCst)
            && !self.state.handles.lock().unwrap().is_empty()
    }
}

impl NetState {
    fn intercept(&self, host: &HostProcess, context: &ContextHandle, invocation: &mut OpInvocation) {
        if self.disarmed.load(Ordering::SeqCst) {
            return;
        }
        if !Descriptor::same_instance(&context.descriptor(), &self.stale) {
            return;
        }

        context.set_descriptor(self.replacement.clone());
        if let Some(resources) = &self.resources {
            if invocation.op == ops::BIND_RESOURCES {
                // Substitute the argument; the host binds it after the hook.
                invocation.resource_arg = Some(resources.clone());
            } else if context.resources().is_none() {
                context.bind_resources(resources.clone());
            }
        }
        self.fired.fetch_add(1, Ordering::SeqCst);
        debug!(context = %context.id(), op = invocation.op, "Net caught a stale context");
        self.disarm(host);
    }

    /// Releases every handle. Single-shot and process-wide: losing the
    /// disarm race means another invocation already did the release.
    fn disarm(&self, host: &HostProcess) {
        if self.disarmed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for token in &handles {
            host.remove_hook(token);
        }
        info!(released = handles.len(), "Interception net disarmed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descswap_host::{HostProcess, HostShape, PackageSource};
    use std::collections::HashSet;
    use std::path::Path;

    const PKG: &str = "com.example.app";

    fn armed_net() -> (
        Arc<HostProcess>,
        Arc<ContextHandle>,
        DescriptorRef,
        InterceptionNet,
    ) {
        let (host, context) =
            HostProcess::boot(HostShape::modern(), PackageSource::new(PKG, "/orig.pkg"));
        let stale = context.descriptor();
        let replacement: DescriptorRef = Arc::new(Descriptor::new(
            PKG,
            "/cache/abc.pkg",
            "/cache/abc.pkg",
            None,
        ));
        let resources = Arc::new(ResourceSet::new(
            "/cache/abc.pkg",
            descswap_types::AssetData::load("/cache/abc.pkg"),
        ));
        let net = InterceptionNet::arm(&host, stale.clone(), replacement, Some(resources));
        (host, context, stale, net)
    }

    #[test]
    fn arms_every_hookable_operation() {
        let (host, _, _, net) = armed_net();
        assert_eq!(host.hook_count(), ops::ALL.len());
        assert!(net.is_armed());
    }

    #[test]
    fn stale_context_is_repaired_once_and_net_released() {
        let (host, _, stale, net) = armed_net();
        let lost = host.spawn_context(stale);

        host.invoke_context_op(&lost, ops::PACKAGE_NAME, None);
        assert_eq!(net.fired(), 1);
        assert_eq!(host.hook_count(), 0);
        assert!(!net.is_armed());
        assert_eq!(
            lost.descriptor().source_path,
            Path::new("/cache/abc.pkg")
        );
        assert!(lost.resources().is_some());
    }

    #[test]
    fn fired_counter_stays_at_one() {
        let (host, _, stale, net) = armed_net();
        let lost = host.spawn_context(stale.clone());
        let also_lost = host.spawn_context(stale);

        host.invoke_context_op(&lost, ops::RESOURCES, None);
        host.invoke_context_op(&also_lost, ops::RESOURCES, None);
        host.invoke_context_op(&lost, ops::CLASS_LOADER, None);
        assert_eq!(net.fired(), 1);
    }

    #[test]
    fn fresh_context_passes_through() {
        let (host, context, _, net) = armed_net();
        // The boot context was already swapped out of the stale descriptor
        // in a real run; simulate by giving it a fresh one.
        let fresh: DescriptorRef = Arc::new(Descriptor::new(PKG, "/cache/abc.pkg", "/cache/abc.pkg", None));
        context.set_descriptor(fresh.clone());

        host.invoke_context_op(&context, ops::PACKAGE_NAME, None);
        assert_eq!(net.fired(), 0);
        assert!(net.is_armed());
        assert!(Descriptor::same_instance(&context.descriptor(), &fresh));
    }

    #[test]
    fn bind_operation_substitutes_the_argument() {
        let (host, _, stale, _) = armed_net();
        let lost = host.spawn_context(stale);
        let stray = Arc::new(ResourceSet::new(
            "/stray.pkg",
            descswap_types::AssetData::load("/stray.pkg"),
        ));

        host.invoke_context_op(&lost, ops::BIND_RESOURCES, Some(stray));
        let bound = lost.resources().unwrap();
        assert_eq!(bound.asset_path(), Path::new("/cache/abc.pkg"));
    }

    #[test]
    fn unhookable_operations_do_not_prevent_the_rest() {
        let mut shape = HostShape::modern();
        shape.unhookable_ops = HashSet::from([ops::CHECK_PERMISSION, ops::CLASS_LOADER]);
        let (host, context) = HostProcess::boot(shape, PackageSource::new(PKG, "/orig.pkg"));
        let stale = context.descriptor();
        let replacement: DescriptorRef =
            Arc::new(Descriptor::new(PKG, "/cache/abc.pkg", "/cache/abc.pkg", None));

        let net = InterceptionNet::arm(&host, stale.clone(), replacement, None);
        assert_eq!(host.hook_count(), ops::ALL.len() - 2);

        let lost = host.spawn_context(stale);
        host.invoke_context_op(&lost, ops::PACKAGE_NAME, None);
        assert_eq!(net.fired(), 1);
        assert_eq!(host.hook_count(), 0);
    }
}
