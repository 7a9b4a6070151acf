//! Package descriptors and their class-loader sets.
//!
//! A `Descriptor` is the record telling the host how to load a package's
//! code and resources. Holder sites all over the host keep `DescriptorRef`
//! handles to it; holder identity is pointer identity, never field equality.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use crate::resources::ResourceSet;

/// Shared handle to a live descriptor. This is what holder sites store.
pub type DescriptorRef = Arc<Descriptor>;

/// Opaque class-loader handle. Two descriptors share a loader exactly when
/// their handles are pointer-identical.
pub type LoaderHandle = Arc<ClassLoader>;

/// A loaded code unit. Identity matters, contents mostly don't.
#[derive(Debug)]
pub struct ClassLoader {
    pub code_path: PathBuf,
}

impl ClassLoader {
    pub fn new(code_path: impl Into<PathBuf>) -> LoaderHandle {
        Arc::new(Self {
            code_path: code_path.into(),
        })
    }
}

/// The full set of loader slots a descriptor carries. Real hosts keep
/// several loader fields on the descriptor object; the swap protocol copies
/// all of them at once, never one slot at a time.
#[derive(Debug, Clone, Default)]
pub struct ClassLoaderSet {
    pub base: Option<LoaderHandle>,
    pub default_loader: Option<LoaderHandle>,
    pub splits: Vec<LoaderHandle>,
}

impl ClassLoaderSet {
    /// True if any loader slot is populated.
    pub fn is_loaded(&self) -> bool {
        self.base.is_some() || self.default_loader.is_some() || !self.splits.is_empty()
    }
}

/// Record telling the host how to load a package's code and resources.
///
/// Exactly one descriptor is authoritative per package per process at any
/// instant. Descriptors are never edited field-by-field while reachable:
/// replacements are built whole and published atomically into holder slots.
/// The single exception is [`Descriptor::adopt_class_loaders_from`], needed
/// for holders that captured this exact object identity and cannot be
/// repaired by slot substitution.
#[derive(Debug)]
pub struct Descriptor {
    pub package_name: String,
    pub source_path: PathBuf,
    pub public_path: PathBuf,
    pub dynamic_factory_override: Option<String>,
    class_loaders: RwLock<ClassLoaderSet>,
    resources: OnceLock<Arc<ResourceSet>>,
}

impl Descriptor {
    pub fn new(
        package_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        public_path: impl Into<PathBuf>,
        dynamic_factory_override: Option<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            source_path: source_path.into(),
            public_path: public_path.into(),
            dynamic_factory_override,
            class_loaders: RwLock::new(ClassLoaderSet::default()),
            resources: OnceLock::new(),
        }
    }

    /// Pointer identity, the comparison every repair site uses.
    pub fn same_instance(a: &DescriptorRef, b: &DescriptorRef) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// Field equality over the value fields (paths, override, package).
    /// Loader and resource state is deliberately excluded: a freshly minted
    /// descriptor is field-equal to the replacement it was minted from even
    /// before realization.
    pub fn fields_equal(&self, other: &Descriptor) -> bool {
        self.package_name == other.package_name
            && self.source_path == other.source_path
            && self.public_path == other.public_path
            && self.dynamic_factory_override == other.dynamic_factory_override
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Snapshot of the current loader set.
    pub fn class_loaders(&self) -> ClassLoaderSet {
        self.class_loaders.read().unwrap().clone()
    }

    pub fn set_class_loaders(&self, set: ClassLoaderSet) {
        *self.class_loaders.write().unwrap() = set;
    }

    /// Copies the entire loader set of `other` onto `self` in place.
    ///
    /// This is the one permitted in-place mutation of a reachable
    /// descriptor: some holders are bound to this exact object identity and
    /// can only be migrated by making the old object answer with the new
    /// loaders.
    pub fn adopt_class_loaders_from(&self, other: &Descriptor) {
        let set = other.class_loaders();
        *self.class_loaders.write().unwrap() = set;
    }

    /// The realized resource set, if realization has happened.
    pub fn resources(&self) -> Option<Arc<ResourceSet>> {
        self.resources.get().cloned()
    }

    /// Binds the realized resource set. Set-once: a second bind returns the
    /// already-bound set and drops the argument.
    pub fn bind_resources(&self, set: Arc<ResourceSet>) -> Arc<ResourceSet> {
        self.resources.get_or_init(|| set).clone()
    }
}
