//! The live host process: every structure that can hold a descriptor
//! reference, plus the canonical lookup that mints authoritative
//! descriptors.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use descswap_types::{
    AssetData, ClassLoader, ClassLoaderSet, Descriptor, DescriptorRef, LoaderHandle, PackageIdentity,
    ResourceSet,
};
use tracing::debug;

use crate::caches::{AssetCache, AssetKey, CacheKind};
use crate::context::{ops, ContextHandle, ContextHook, HookToken, OpInvocation, OpResult};
use crate::identity::{BaseIdentityFactory, IdentityFactory, RawIdentity};
use crate::shape::{HostShape, Probe};
use crate::tasks::{ClientId, ClientRecord, PendingTask};
use crate::HostError;

/// The package metadata the canonical lookup mints descriptors from.
#[derive(Debug, Clone)]
pub struct PackageSource {
    pub package_name: String,
    pub source_path: PathBuf,
    pub public_path: PathBuf,
    pub dynamic_factory_override: Option<String>,
}

impl PackageSource {
    pub fn new(package_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            package_name: package_name.into(),
            source_path: path.clone(),
            public_path: path,
            dynamic_factory_override: None,
        }
    }
}

/// The single global pending-binding record: the package being bound into
/// this process, with its source metadata and current descriptor.
#[derive(Debug)]
pub struct BindingRecord {
    pub source: PackageSource,
    pub descriptor: DescriptorRef,
}

/// The live host process.
///
/// Single-threaded use is a design assumption of the swap protocol, not an
/// enforced property; interior locks exist so shared handles work, not to
/// make concurrent mutation of the same structures well-defined.
pub struct HostProcess {
    shape: HostShape,
    binding: Mutex<BindingRecord>,
    /// Descriptor-by-name cache consulted by the canonical lookup.
    packages: Mutex<HashMap<String, DescriptorRef>>,
    tasks: Mutex<VecDeque<PendingTask>>,
    clients: Mutex<HashMap<ClientId, ClientRecord>>,
    /// In-flight clients; only newer shapes track these separately.
    launching: Mutex<HashMap<ClientId, ClientRecord>>,
    /// Loader table: code path -> shared loader.
    loaders: Mutex<HashMap<PathBuf, LoaderHandle>>,
    asset_caches: Mutex<HashMap<CacheKind, AssetCache>>,
    contexts: Mutex<Vec<Arc<ContextHandle>>>,
    hooks: Mutex<HashMap<&'static str, (u64, ContextHook)>>,
    next_hook_id: AtomicU64,
    /// Process-wide identity factory slot. Installed wrappers stay for the
    /// process lifetime; there is no uninstall.
    identity_factory: RwLock<Arc<dyn IdentityFactory>>,
    /// Raw on-disk identity records by package name.
    identity_source: Mutex<HashMap<String, RawIdentity>>,
    /// Transient materialized-result cache; invalidated when the factory
    /// slot changes so future queries route through the new factory.
    identity_results: Mutex<HashMap<String, PackageIdentity>>,
    minted: AtomicUsize,
}

impl HostProcess {
    /// Boots a host with one bound package: mints the initial descriptor
    /// through the canonical path, loads it (loader table + asset caches +
    /// realized resources), and returns the stub context bound to it.
    pub fn boot(shape: HostShape, source: PackageSource) -> (Arc<Self>, Arc<ContextHandle>) {
        let host = Arc::new(Self {
            shape,
            binding: Mutex::new(BindingRecord {
                source: source.clone(),
                // placeholder, replaced right below by the minted descriptor
                descriptor: Arc::new(Descriptor::new(
                    source.package_name.clone(),
                    source.source_path.clone(),
                    source.public_path.clone(),
                    source.dynamic_factory_override.clone(),
                )),
            }),
            packages: Mutex::new(HashMap::new()),
            tasks: Mutex::new(VecDeque::new()),
            clients: Mutex::new(HashMap::new()),
            launching: Mutex::new(HashMap::new()),
            loaders: Mutex::new(HashMap::new()),
            asset_caches: Mutex::new(HashMap::new()),
            contexts: Mutex::new(Vec::new()),
            hooks: Mutex::new(HashMap::new()),
            next_hook_id: AtomicU64::new(1),
            identity_factory: RwLock::new(Arc::new(BaseIdentityFactory)),
            identity_source: Mutex::new(HashMap::new()),
            identity_results: Mutex::new(HashMap::new()),
            minted: AtomicUsize::new(0),
        });

        let descriptor = host
            .descriptor_for_package(&source.package_name)
            .expect("binding source always resolves");
        host.binding.lock().unwrap().descriptor = descriptor.clone();

        // The stub package is fully consumed at boot: loader registered,
        // asset caches populated, resources realized and flushed into the
        // stub context.
        let context = host.spawn_context(descriptor.clone());
        host.realize_resources(&descriptor)
            .expect("boot realization cannot miss");
        (host, context)
    }

    pub fn shape(&self) -> &HostShape {
        &self.shape
    }

    // ================================================================
    // Binding record and canonical lookup
    // ================================================================

    pub fn with_binding<R>(&self, f: impl FnOnce(&mut BindingRecord) -> R) -> R {
        f(&mut self.binding.lock().unwrap())
    }

    pub fn binding_descriptor(&self) -> DescriptorRef {
        self.binding.lock().unwrap().descriptor.clone()
    }

    /// The canonical lookup: returns the cached descriptor for a package or
    /// mints a fresh authoritative one from the binding source metadata.
    pub fn descriptor_for_package(&self, package: &str) -> Result<DescriptorRef, HostError> {
        if let Some(cached) = self.packages.lock().unwrap().get(package) {
            return Ok(cached.clone());
        }

        let source = {
            let binding = self.binding.lock().unwrap();
            if binding.source.package_name != package {
                return Err(HostError::UnknownPackage(package.to_string()));
            }
            binding.source.clone()
        };

        let minted: DescriptorRef = Arc::new(Descriptor::new(
            source.package_name,
            source.source_path,
            source.public_path,
            source.dynamic_factory_override,
        ));
        self.minted.fetch_add(1, Ordering::Relaxed);
        debug!(package, path = %minted.source_path.display(), "Minted descriptor");
        self.packages
            .lock()
            .unwrap()
            .insert(package.to_string(), minted.clone());
        Ok(minted)
    }

    pub fn cached_descriptor(&self, package: &str) -> Option<DescriptorRef> {
        self.packages.lock().unwrap().get(package).cloned()
    }

    /// Evicts the by-name cache entry, if any. The next canonical lookup
    /// will mint fresh state through its normal path.
    pub fn remove_cached_descriptor(&self, package: &str) -> Option<DescriptorRef> {
        self.packages.lock().unwrap().remove(package)
    }

    /// How many descriptors the canonical path has minted so far.
    pub fn minted_count(&self) -> usize {
        self.minted.load(Ordering::Relaxed)
    }

    // ================================================================
    // Queues, clients, loaders, caches
    // ================================================================

    pub fn with_tasks<R>(&self, f: impl FnOnce(&mut VecDeque<PendingTask>) -> R) -> R {
        f(&mut self.tasks.lock().unwrap())
    }

    pub fn enqueue_task(&self, task: PendingTask) {
        self.tasks.lock().unwrap().push_back(task);
    }

    pub fn with_clients<R>(&self, f: impl FnOnce(&mut HashMap<ClientId, ClientRecord>) -> R) -> R {
        f(&mut self.clients.lock().unwrap())
    }

    pub fn register_client(&self, record: ClientRecord) -> ClientId {
        let id = ClientId::new();
        self.clients.lock().unwrap().insert(id, record);
        id
    }

    /// Shape-gated: the separate in-flight client table.
    pub fn with_launching_clients<R>(
        &self,
        f: impl FnOnce(&mut HashMap<ClientId, ClientRecord>) -> R,
    ) -> Probe<R> {
        if !self.shape.has_launching_clients {
            return Probe::Unavailable("launching-clients");
        }
        Probe::Found(f(&mut self.launching.lock().unwrap()))
    }

    pub fn register_launching_client(&self, record: ClientRecord) -> Probe<ClientId> {
        self.with_launching_clients(|table| {
            let id = ClientId::new();
            table.insert(id, record);
            id
        })
    }

    pub fn loader_for(&self, path: &Path) -> Option<LoaderHandle> {
        self.loaders.lock().unwrap().get(path).cloned()
    }

    pub fn register_loader(&self, path: impl Into<PathBuf>, loader: LoaderHandle) {
        self.loaders.lock().unwrap().insert(path.into(), loader);
    }

    /// Shape-gated access to one asset cache.
    pub fn with_asset_cache<R>(
        &self,
        kind: CacheKind,
        f: impl FnOnce(&mut AssetCache) -> R,
    ) -> Probe<R> {
        if !self.shape.has_cache(kind) {
            return Probe::Unavailable(kind.name());
        }
        let mut caches = self.asset_caches.lock().unwrap();
        Probe::Found(f(caches.entry(kind).or_default()))
    }

    // ================================================================
    // Contexts and the construction surface
    // ================================================================

    pub fn spawn_context(&self, descriptor: DescriptorRef) -> Arc<ContextHandle> {
        let context = ContextHandle::new(descriptor);
        self.contexts.lock().unwrap().push(context.clone());
        context
    }

    pub fn contexts(&self) -> Vec<Arc<ContextHandle>> {
        self.contexts.lock().unwrap().clone()
    }

    /// The context-construction operations, enumerated dynamically.
    pub fn context_ops(&self) -> Vec<&'static str> {
        ops::ALL.to_vec()
    }

    /// Installs a hook on one operation. Fails per-operation when the host
    /// shape refuses it or a hook is already present.
    pub fn install_hook(
        &self,
        op: &'static str,
        hook: ContextHook,
    ) -> Result<HookToken, HostError> {
        if !self.shape.can_hook(op) {
            return Err(HostError::UnhookableOperation(op.to_string()));
        }
        let mut hooks = self.hooks.lock().unwrap();
        if hooks.contains_key(op) {
            return Err(HostError::HookSlotOccupied(op.to_string()));
        }
        let id = self.next_hook_id.fetch_add(1, Ordering::Relaxed);
        hooks.insert(op, (id, hook));
        Ok(HookToken { op, id })
    }

    /// Removes the hook a token refers to, if still installed.
    pub fn remove_hook(&self, token: &HookToken) {
        let mut hooks = self.hooks.lock().unwrap();
        if hooks.get(token.op).is_some_and(|(id, _)| *id == token.id) {
            hooks.remove(token.op);
        }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().unwrap().len()
    }

    /// Invokes a construction-surface operation on a context. The installed
    /// hook (if any) runs first and may rewrite the invocation.
    pub fn invoke_context_op(
        &self,
        context: &ContextHandle,
        op: &'static str,
        resource_arg: Option<Arc<ResourceSet>>,
    ) -> OpResult {
        let mut invocation = OpInvocation { op, resource_arg };

        let hook = self
            .hooks
            .lock()
            .unwrap()
            .get(op)
            .map(|(_, h)| h.clone());
        if let Some(hook) = hook {
            hook(self, context, &mut invocation);
        }

        match op {
            ops::RESOURCES => OpResult::Resources(context.resources()),
            ops::CLASS_LOADER => OpResult::Loaders(context.descriptor().class_loaders()),
            ops::PACKAGE_NAME => OpResult::Text(context.descriptor().package_name.clone()),
            ops::BIND_RESOURCES => {
                if let Some(set) = invocation.resource_arg {
                    context.bind_resources(set);
                }
                OpResult::Unit
            }
            _ => OpResult::Unit,
        }
    }

    // ================================================================
    // Resource realization
    // ================================================================

    /// Realizes a descriptor's resources: resolves its loader through the
    /// loader table, resolves the asset payload through the shared caches
    /// (reusing an existing payload when one is indexed under the public
    /// path), binds the resource set exactly once, and flushes lazy
    /// consumers: contexts holding this descriptor with unbound resources.
    ///
    /// May block on payload population; no timeout is imposed.
    pub fn realize_resources(
        &self,
        descriptor: &DescriptorRef,
    ) -> Result<Arc<ResourceSet>, HostError> {
        let loader = {
            let mut loaders = self.loaders.lock().unwrap();
            loaders
                .entry(descriptor.source_path.clone())
                .or_insert_with(|| ClassLoader::new(descriptor.source_path.clone()))
                .clone()
        };
        if !descriptor.class_loaders().is_loaded() {
            descriptor.set_class_loaders(ClassLoaderSet {
                base: Some(loader.clone()),
                default_loader: Some(loader),
                splits: Vec::new(),
            });
        }

        let public = descriptor.public_path.clone();
        let mut payload = None;
        for kind in CacheKind::ALL {
            if let Probe::Found(found) = self.with_asset_cache(kind, |c| c.payload_for(&public)) {
                if let Some(found) = found {
                    payload = Some(found);
                    break;
                }
            }
        }
        let payload = match payload {
            Some(p) => p,
            None => {
                let loaded = AssetData::load(&public);
                for kind in CacheKind::ALL {
                    self.with_asset_cache(kind, |c| {
                        c.insert(AssetKey::plain(&public), loaded.clone())
                    });
                }
                loaded
            }
        };

        let set = descriptor.bind_resources(Arc::new(ResourceSet::new(public, payload)));

        for context in self.contexts() {
            if Descriptor::same_instance(&context.descriptor(), descriptor)
                && context.resources().is_none()
            {
                context.bind_resources(set.clone());
            }
        }

        Ok(set)
    }

    // ================================================================
    // Identity factory and queries
    // ================================================================

    pub fn identity_factory(&self) -> Arc<dyn IdentityFactory> {
        self.identity_factory.read().unwrap().clone()
    }

    /// Replaces the process-wide factory. Callers installing a wrapper must
    /// also clear the transient result cache so future queries route
    /// through the new factory.
    pub fn set_identity_factory(&self, factory: Arc<dyn IdentityFactory>) {
        *self.identity_factory.write().unwrap() = factory;
    }

    pub fn clear_identity_results(&self) {
        self.identity_results.lock().unwrap().clear();
    }

    /// Seeds the raw on-disk identity record for a package.
    pub fn put_raw_identity(&self, package: impl Into<String>, raw: RawIdentity) {
        self.identity_source.lock().unwrap().insert(package.into(), raw);
    }

    /// The outward identity query: raw record through the current factory,
    /// memoized in the transient result cache.
    pub fn query_identity(&self, package: &str) -> Result<Option<PackageIdentity>, HostError> {
        if let Some(cached) = self.identity_results.lock().unwrap().get(package) {
            return Ok(Some(cached.clone()));
        }
        let raw = match self.identity_source.lock().unwrap().get(package) {
            Some(raw) => raw.clone(),
            None => return Ok(None),
        };
        let identity = self.identity_factory().materialize(&raw)?;
        self.identity_results
            .lock()
            .unwrap()
            .insert(package.to_string(), identity.clone());
        Ok(Some(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn boot_modern() -> (Arc<HostProcess>, Arc<ContextHandle>) {
        HostProcess::boot(
            HostShape::modern(),
            PackageSource::new("com.example.app", "/data/app/orig.pkg"),
        )
    }

    #[test]
    fn boot_mints_and_caches_descriptor() {
        let (host, context) = boot_modern();
        assert_eq!(host.minted_count(), 1);

        let cached = host.cached_descriptor("com.example.app").unwrap();
        assert!(Descriptor::same_instance(&cached, &context.descriptor()));
        assert!(Descriptor::same_instance(&cached, &host.binding_descriptor()));
    }

    #[test]
    fn boot_realizes_stub_resources() {
        let (host, context) = boot_modern();
        assert!(context.resources().is_some());
        assert!(host.loader_for(Path::new("/data/app/orig.pkg")).is_some());
    }

    #[test]
    fn canonical_lookup_mints_after_eviction() {
        let (host, _) = boot_modern();
        let first = host.descriptor_for_package("com.example.app").unwrap();

        host.remove_cached_descriptor("com.example.app");
        let second = host.descriptor_for_package("com.example.app").unwrap();

        assert!(!Descriptor::same_instance(&first, &second));
        assert!(first.fields_equal(&second));
        assert_eq!(host.minted_count(), 2);
    }

    #[test]
    fn unknown_package_is_an_error() {
        let (host, _) = boot_modern();
        assert!(matches!(
            host.descriptor_for_package("com.other"),
            Err(HostError::UnknownPackage(_))
        ));
    }

    #[test]
    fn launching_clients_gated_by_shape() {
        let (modern, _) = boot_modern();
        assert!(!modern
            .register_launching_client(ClientRecord::new(modern.binding_descriptor()))
            .is_unavailable());

        let (legacy, _) = HostProcess::boot(
            HostShape::legacy(),
            PackageSource::new("com.example.app", "/data/app/orig.pkg"),
        );
        assert!(legacy
            .register_launching_client(ClientRecord::new(legacy.binding_descriptor()))
            .is_unavailable());
    }

    #[test]
    fn asset_cache_gated_by_shape() {
        let (legacy, _) = HostProcess::boot(
            HostShape::legacy(),
            PackageSource::new("com.example.app", "/data/app/orig.pkg"),
        );
        assert!(legacy
            .with_asset_cache(CacheKind::LoadedAssets, |_| ())
            .is_unavailable());
        assert!(!legacy
            .with_asset_cache(CacheKind::CachedAssets, |_| ())
            .is_unavailable());
    }

    #[test]
    fn realization_reuses_cached_payload() {
        let (host, _) = boot_modern();
        let original = host.binding_descriptor();

        // A second descriptor for the same public path shares the payload.
        let twin: DescriptorRef = Arc::new(Descriptor::new(
            "com.example.app",
            "/data/app/orig.pkg",
            "/data/app/orig.pkg",
            None,
        ));
        let set = host.realize_resources(&twin).unwrap();
        assert!(set.shares_payload_with(&original.resources().unwrap()));
    }

    #[test]
    fn realization_flushes_lazy_contexts() {
        let (host, _) = boot_modern();
        let desc: DescriptorRef = Arc::new(Descriptor::new(
            "com.example.app",
            "/cache/new.pkg",
            "/cache/new.pkg",
            None,
        ));
        let lazy = host.spawn_context(desc.clone());
        assert!(lazy.resources().is_none());

        host.realize_resources(&desc).unwrap();
        assert!(lazy.resources().is_some());
    }

    #[test]
    fn hooks_run_before_default_behavior() {
        let (host, context) = boot_modern();
        let replacement: DescriptorRef = Arc::new(Descriptor::new(
            "com.example.app",
            "/cache/new.pkg",
            "/cache/new.pkg",
            None,
        ));

        let swapped = replacement.clone();
        let token = host
            .install_hook(
                ops::PACKAGE_NAME,
                Arc::new(move |_, ctx, _| ctx.set_descriptor(swapped.clone())),
            )
            .unwrap();

        host.invoke_context_op(&context, ops::PACKAGE_NAME, None);
        assert!(Descriptor::same_instance(&context.descriptor(), &replacement));

        host.remove_hook(&token);
        assert_eq!(host.hook_count(), 0);
    }

    #[test]
    fn unhookable_op_refuses_install() {
        let mut shape = HostShape::modern();
        shape.unhookable_ops.insert(ops::CHECK_PERMISSION);
        let (host, _) = HostProcess::boot(
            shape,
            PackageSource::new("com.example.app", "/data/app/orig.pkg"),
        );

        let result = host.install_hook(ops::CHECK_PERMISSION, Arc::new(|_, _, _| {}));
        assert!(matches!(result, Err(HostError::UnhookableOperation(_))));
    }

    #[test]
    fn occupied_hook_slot_refuses_second_install() {
        let (host, _) = boot_modern();
        host.install_hook(ops::RESOURCES, Arc::new(|_, _, _| {}))
            .unwrap();
        assert!(matches!(
            host.install_hook(ops::RESOURCES, Arc::new(|_, _, _| {})),
            Err(HostError::HookSlotOccupied(_))
        ));
    }

    #[test]
    fn stale_token_does_not_remove_new_hook() {
        let (host, _) = boot_modern();
        let first = host
            .install_hook(ops::RESOURCES, Arc::new(|_, _, _| {}))
            .unwrap();
        host.remove_hook(&first);
        host.install_hook(ops::RESOURCES, Arc::new(|_, _, _| {}))
            .unwrap();

        // Removing with the stale token must not clobber the new hook.
        host.remove_hook(&first);
        assert_eq!(host.hook_count(), 1);
    }

    #[test]
    fn identity_query_memoizes_results() {
        let (host, _) = boot_modern();
        host.put_raw_identity(
            "com.example.app",
            json!({ "package_name": "com.example.app", "signatures": ["sig-a"] }),
        );

        let first = host.query_identity("com.example.app").unwrap().unwrap();
        assert_eq!(first.signatures[0].as_str(), "sig-a");

        // Swap the raw record; the memoized result keeps answering until
        // the transient cache is cleared.
        host.put_raw_identity(
            "com.example.app",
            json!({ "package_name": "com.example.app", "signatures": ["sig-b"] }),
        );
        let second = host.query_identity("com.example.app").unwrap().unwrap();
        assert_eq!(second.signatures[0].as_str(), "sig-a");

        host.clear_identity_results();
        let third = host.query_identity("com.example.app").unwrap().unwrap();
        assert_eq!(third.signatures[0].as_str(), "sig-b");
    }

    #[test]
    fn identity_query_unknown_package_is_none() {
        let (host, _) = boot_modern();
        assert!(host.query_identity("com.absent").unwrap().is_none());
    }
}
