//! Context objects and the hookable context-construction surface.
//!
//! A context is the host object a hosted component runs against. It holds
//! its own descriptor slot, a holder site that cannot be enumerated from
//! the outside, and every externally observable operation on it routes
//! through a hook point, which is what makes the interception backstop
//! possible.

use std::sync::{Arc, RwLock};

use descswap_types::{ClassLoaderSet, DescriptorRef, ResourceSet};
use uuid::Uuid;

use crate::process::HostProcess;

/// The context-construction operation names. The set is enumerated
/// dynamically by [`HostProcess::context_ops`]; individual operations may be
/// unhookable on a given host shape.
pub mod ops {
    pub const RESOURCES: &str = "resources";
    pub const CLASS_LOADER: &str = "class-loader";
    pub const CHECK_PERMISSION: &str = "check-permission";
    pub const PACKAGE_NAME: &str = "package-name";
    /// The resource-binding operation: the one whose argument an armed
    /// interception net substitutes instead of delegating.
    pub const BIND_RESOURCES: &str = "bind-resources";

    pub const ALL: [&str; 5] = [
        RESOURCES,
        CLASS_LOADER,
        CHECK_PERMISSION,
        PACKAGE_NAME,
        BIND_RESOURCES,
    ];
}

/// A live context object bound to a descriptor.
#[derive(Debug)]
pub struct ContextHandle {
    id: Uuid,
    descriptor: RwLock<DescriptorRef>,
    resources: RwLock<Option<Arc<ResourceSet>>>,
}

impl ContextHandle {
    pub fn new(descriptor: DescriptorRef) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            descriptor: RwLock::new(descriptor),
            resources: RwLock::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn descriptor(&self) -> DescriptorRef {
        self.descriptor.read().unwrap().clone()
    }

    pub fn set_descriptor(&self, descriptor: DescriptorRef) {
        *self.descriptor.write().unwrap() = descriptor;
    }

    pub fn resources(&self) -> Option<Arc<ResourceSet>> {
        self.resources.read().unwrap().clone()
    }

    pub fn bind_resources(&self, set: Arc<ResourceSet>) {
        *self.resources.write().unwrap() = Some(set);
    }
}

/// Mutable view of one operation invocation, handed to an installed hook
/// before the default behavior runs. A hook may rewrite `resource_arg`; for
/// the bind operation the host then binds the substituted set.
pub struct OpInvocation {
    pub op: &'static str,
    pub resource_arg: Option<Arc<ResourceSet>>,
}

/// What an operation returned. Tests and the backstop only care about a few
/// shapes of result.
#[derive(Debug)]
pub enum OpResult {
    Resources(Option<Arc<ResourceSet>>),
    Loaders(ClassLoaderSet),
    Text(String),
    Unit,
}

/// A hook installed on one operation. Runs before the default behavior.
pub type ContextHook = Arc<dyn Fn(&HostProcess, &ContextHandle, &mut OpInvocation) + Send + Sync>;

/// Handle to one installed hook; removing it restores the plain operation.
#[derive(Debug)]
pub struct HookToken {
    pub(crate) op: &'static str,
    pub(crate) id: u64,
}

impl HookToken {
    pub fn op(&self) -> &'static str {
        self.op
    }
}
