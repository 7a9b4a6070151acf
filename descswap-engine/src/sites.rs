//! Enumeration and repair of the known holder sites of a live descriptor
//! reference.
//!
//! The enumerated set is closed and hand-maintained; its completeness is
//! correctness-critical. Every comparison is pointer identity, so repairing
//! an already-repaired site is a no-op and a whole pass is idempotent.

use descswap_host::{ComponentRecord, HostProcess, Probe};
use descswap_types::{Descriptor, DescriptorRef};
use tracing::{debug, info, warn};

/// Per-site repair counts for one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairStats {
    /// The pending-binding record held the stale descriptor.
    pub binding_replaced: bool,
    /// The by-name cache entry was the stale instance and got evicted.
    pub canonical_evicted: bool,
    /// Component-record slots repaired in the pending-task queue.
    pub task_slots: usize,
    /// Descriptor and component slots repaired across tracked clients.
    pub client_slots: usize,
    /// Slots repaired in the launching-client table.
    pub launching_slots: usize,
    /// The launching-client table does not exist on this host.
    pub launching_skipped: bool,
}

impl RepairStats {
    pub fn total(&self) -> usize {
        usize::from(self.binding_replaced)
            + usize::from(self.canonical_evicted)
            + self.task_slots
            + self.client_slots
            + self.launching_slots
    }

    pub fn is_noop(&self) -> bool {
        self.total() == 0
    }
}

pub struct ReferenceSiteRegistry;

impl ReferenceSiteRegistry {
    /// One full repair pass over every enumerable holder site, in order:
    /// the pending-binding record, the descriptor-by-name cache (stale
    /// entry evicted, not replaced), the pending-task queue head-to-tail,
    /// and the tracked client records including the shape-gated
    /// launching-client table.
    pub fn repair_all(
        host: &HostProcess,
        package: &str,
        stale: &DescriptorRef,
        fresh: &DescriptorRef,
    ) -> RepairStats {
        let mut stats = RepairStats::default();

        // Site 1: the global pending-binding record. The source metadata is
        // rewritten along with the slot so future canonical mints produce
        // the replacement values.
        host.with_binding(|binding| {
            if binding.source.package_name == package {
                binding.source.source_path = fresh.source_path.clone();
                binding.source.public_path = fresh.public_path.clone();
                binding.source.dynamic_factory_override = fresh.dynamic_factory_override.clone();
            }
            if Descriptor::same_instance(&binding.descriptor, stale) {
                binding.descriptor = fresh.clone();
                stats.binding_replaced = true;
            }
        });

        // Site 2: by-name cache. Evicted, never replaced, so the next
        // canonical lookup mints fresh state through its own path. Gated on
        // the entry being the stale instance: evicting a fresh entry would
        // undo a completed lookup.
        if host
            .cached_descriptor(package)
            .is_some_and(|cached| Descriptor::same_instance(&cached, stale))
        {
            host.remove_cached_descriptor(package);
            stats.canonical_evicted = true;
        }

        let queues = Self::repair_queues(host, package, stale, fresh);
        stats.task_slots = queues.task_slots;
        stats.client_slots = queues.client_slots;
        stats.launching_slots = queues.launching_slots;
        stats.launching_skipped = queues.launching_skipped;

        info!(
            package,
            repaired = stats.total(),
            binding = stats.binding_replaced,
            evicted = stats.canonical_evicted,
            "Holder repair pass complete"
        );
        stats
    }

    /// The queue-only subset: pending tasks and tracked clients. Re-run as
    /// the protocol's second pass, since tasks may queue between the first
    /// pass and the canonical mint.
    pub fn repair_queues(
        host: &HostProcess,
        package: &str,
        stale: &DescriptorRef,
        fresh: &DescriptorRef,
    ) -> RepairStats {
        let mut stats = RepairStats::default();

        // Site 3: pending-task queue, head to tail. Bare tasks carry no
        // component record and are passed over.
        host.with_tasks(|tasks| {
            for task in tasks.iter_mut() {
                if let Some(component) = task.component.as_mut() {
                    stats.task_slots += Self::repair_component(component, package, stale, fresh);
                }
            }
        });

        // Site 4: tracked client records, direct slot plus nested
        // component records.
        host.with_clients(|clients| {
            for record in clients.values_mut() {
                if Descriptor::same_instance(&record.descriptor, stale) {
                    record.descriptor = fresh.clone();
                    stats.client_slots += 1;
                }
                if let Some(component) = record.component.as_mut() {
                    stats.client_slots += Self::repair_component(component, package, stale, fresh);
                }
            }
        });

        let launching = host.with_launching_clients(|clients| {
            let mut repaired = 0;
            for record in clients.values_mut() {
                if Descriptor::same_instance(&record.descriptor, stale) {
                    record.descriptor = fresh.clone();
                    repaired += 1;
                }
                if let Some(component) = record.component.as_mut() {
                    repaired += Self::repair_component(component, package, stale, fresh);
                }
            }
            repaired
        });
        match launching {
            Probe::Found(repaired) => stats.launching_slots = repaired,
            Probe::Unavailable(surface) => {
                warn!(surface, "Holder site absent on this host, skipping");
                stats.launching_skipped = true;
            }
        }

        debug!(
            package,
            tasks = stats.task_slots,
            clients = stats.client_slots,
            launching = stats.launching_slots,
            "Queue repair pass complete"
        );
        stats
    }

    /// Repairs one component record and, recursively, its children for the
    /// same package. Records for other packages are left alone.
    fn repair_component(
        record: &mut ComponentRecord,
        package: &str,
        stale: &DescriptorRef,
        fresh: &DescriptorRef,
    ) -> usize {
        let mut repaired = 0;
        if record.package_name == package && Descriptor::same_instance(&record.descriptor, stale) {
            record.descriptor = fresh.clone();
            repaired += 1;
        }
        for child in &mut record.children {
            repaired += Self::repair_component(child, package, stale, fresh);
        }
        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descswap_host::{
        ClientRecord, HostProcess, HostShape, PackageSource, PendingTask, TaskKind,
    };
    use std::sync::Arc;

    const PKG: &str = "com.example.app";

    fn booted(shape: HostShape) -> (Arc<HostProcess>, DescriptorRef, DescriptorRef) {
        let (host, context) = HostProcess::boot(shape, PackageSource::new(PKG, "/orig.pkg"));
        let stale = context.descriptor();
        let fresh: DescriptorRef = Arc::new(Descriptor::new(PKG, "/cache/abc.pkg", "/cache/abc.pkg", None));
        (host, stale, fresh)
    }

    #[test]
    fn repairs_binding_and_rewrites_source_metadata() {
        let (host, stale, fresh) = booted(HostShape::modern());
        let stats = ReferenceSiteRegistry::repair_all(&host, PKG, &stale, &fresh);

        assert!(stats.binding_replaced);
        host.with_binding(|binding| {
            assert!(Descriptor::same_instance(&binding.descriptor, &fresh));
            assert_eq!(binding.source.source_path, fresh.source_path);
            assert_eq!(binding.source.public_path, fresh.public_path);
        });
    }

    #[test]
    fn evicts_stale_by_name_entry() {
        let (host, stale, fresh) = booted(HostShape::modern());
        let stats = ReferenceSiteRegistry::repair_all(&host, PKG, &stale, &fresh);
        assert!(stats.canonical_evicted);
        assert!(host.cached_descriptor(PKG).is_none());
    }

    #[test]
    fn fresh_by_name_entry_survives_a_pass() {
        let (host, stale, fresh) = booted(HostShape::modern());
        host.remove_cached_descriptor(PKG);
        // Simulate a lookup having already minted fresh state.
        let minted = host.descriptor_for_package(PKG).unwrap();

        let stats = ReferenceSiteRegistry::repair_all(&host, PKG, &stale, &fresh);
        assert!(!stats.canonical_evicted);
        assert!(Descriptor::same_instance(
            &host.cached_descriptor(PKG).unwrap(),
            &minted
        ));
    }

    #[test]
    fn walks_task_queue_including_nested_components() {
        let (host, stale, fresh) = booted(HostShape::modern());
        host.enqueue_task(PendingTask::bare(TaskKind::ReceiveBroadcast));
        host.enqueue_task(PendingTask::new(
            TaskKind::LaunchActivity,
            ComponentRecord::new(PKG, stale.clone())
                .with_child(ComponentRecord::new(PKG, stale.clone())),
        ));

        let stats = ReferenceSiteRegistry::repair_queues(&host, PKG, &stale, &fresh);
        assert_eq!(stats.task_slots, 2);

        host.with_tasks(|tasks| {
            let component = tasks[1].component.as_ref().unwrap();
            assert!(Descriptor::same_instance(&component.descriptor, &fresh));
            assert!(Descriptor::same_instance(
                &component.children[0].descriptor,
                &fresh
            ));
        });
    }

    #[test]
    fn other_packages_are_left_alone() {
        let (host, stale, fresh) = booted(HostShape::modern());
        let foreign: DescriptorRef =
            Arc::new(Descriptor::new("com.other", "/other.pkg", "/other.pkg", None));
        host.enqueue_task(PendingTask::new(
            TaskKind::BindService,
            ComponentRecord::new("com.other", foreign.clone()),
        ));

        let stats = ReferenceSiteRegistry::repair_queues(&host, PKG, &stale, &fresh);
        assert_eq!(stats.task_slots, 0);
        host.with_tasks(|tasks| {
            let component = tasks[0].component.as_ref().unwrap();
            assert!(Descriptor::same_instance(&component.descriptor, &foreign));
        });
    }

    #[test]
    fn repairs_clients_and_launching_table() {
        let (host, stale, fresh) = booted(HostShape::modern());
        host.register_client(ClientRecord::new(stale.clone()));
        host.register_launching_client(
            ClientRecord::new(stale.clone())
                .with_component(ComponentRecord::new(PKG, stale.clone())),
        );

        let stats = ReferenceSiteRegistry::repair_queues(&host, PKG, &stale, &fresh);
        assert_eq!(stats.client_slots, 1);
        assert_eq!(stats.launching_slots, 2);
        assert!(!stats.launching_skipped);
    }

    #[test]
    fn missing_launching_table_is_skipped_not_failed() {
        let (host, stale, fresh) = booted(HostShape::legacy());
        let stats = ReferenceSiteRegistry::repair_queues(&host, PKG, &stale, &fresh);
        assert!(stats.launching_skipped);
        assert_eq!(stats.launching_slots, 0);
    }

    #[test]
    fn second_pass_is_a_noop() {
        let (host, stale, fresh) = booted(HostShape::modern());
        host.enqueue_task(PendingTask::new(
            TaskKind::BindApplication,
            ComponentRecord::new(PKG, stale.clone()),
        ));
        host.register_client(ClientRecord::new(stale.clone()));

        let first = ReferenceSiteRegistry::repair_all(&host, PKG, &stale, &fresh);
        assert!(first.total() > 0);

        let second = ReferenceSiteRegistry::repair_all(&host, PKG, &stale, &fresh);
        assert!(second.is_noop());
    }
}
