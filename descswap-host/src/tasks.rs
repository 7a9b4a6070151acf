//! Pending tasks and tracked client records: the enumerable holder sites
//! that embed descriptor references inside component records.

use descswap_types::DescriptorRef;
use uuid::Uuid;

/// What a pending task would do when the host eventually processes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    BindApplication,
    CreateService,
    BindService,
    LaunchActivity,
    ReceiveBroadcast,
}

/// A component description embedded in a task or client record. Carries a
/// live descriptor reference and may nest further records for the same or
/// other packages.
#[derive(Debug)]
pub struct ComponentRecord {
    pub package_name: String,
    pub descriptor: DescriptorRef,
    pub children: Vec<ComponentRecord>,
}

impl ComponentRecord {
    pub fn new(package_name: impl Into<String>, descriptor: DescriptorRef) -> Self {
        Self {
            package_name: package_name.into(),
            descriptor,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: ComponentRecord) -> Self {
        self.children.push(child);
        self
    }
}

/// A task sitting in the host's pending queue, not yet processed.
#[derive(Debug)]
pub struct PendingTask {
    pub kind: TaskKind,
    pub component: Option<ComponentRecord>,
}

impl PendingTask {
    pub fn new(kind: TaskKind, component: ComponentRecord) -> Self {
        Self {
            kind,
            component: Some(component),
        }
    }

    /// A task with no component payload; the repair pass must tolerate these.
    pub fn bare(kind: TaskKind) -> Self {
        Self {
            kind,
            component: None,
        }
    }
}

/// Identifier of a tracked client record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A per-context client record tracked by the host: a direct descriptor
/// slot plus an optional embedded component record.
#[derive(Debug)]
pub struct ClientRecord {
    pub descriptor: DescriptorRef,
    pub component: Option<ComponentRecord>,
}

impl ClientRecord {
    pub fn new(descriptor: DescriptorRef) -> Self {
        Self {
            descriptor,
            component: None,
        }
    }

    pub fn with_component(mut self, component: ComponentRecord) -> Self {
        self.component = Some(component);
        self
    }
}
