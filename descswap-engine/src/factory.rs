//! Replacement-descriptor construction.

use std::path::Path;
use std::sync::Arc;

use descswap_types::{Descriptor, DescriptorRef};

/// Builds mutated copies of descriptors. Pure: never touches the input.
pub struct DescriptorFactory;

impl DescriptorFactory {
    /// Copies `old` with both content paths replaced. The dynamic factory
    /// override is cleared unless `configured_override` supplies one; a
    /// relative override (leading `.`) is namespaced under the package name.
    pub fn build(
        old: &Descriptor,
        replacement_path: &Path,
        configured_override: Option<&str>,
    ) -> DescriptorRef {
        let factory_override = configured_override.map(|o| {
            if let Some(rest) = o.strip_prefix('.') {
                format!("{}.{}", old.package_name, rest)
            } else {
                o.to_string()
            }
        });

        Arc::new(Descriptor::new(
            old.package_name.clone(),
            replacement_path,
            replacement_path,
            factory_override,
        ))
    }
}
