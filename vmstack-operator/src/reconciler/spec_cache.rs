use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::resource::VirtualMachineSpec;

/// Last accepted spec per resource name.
///
/// Entries are overwritten only by an accepted create or update and are
/// never evicted. A re-sync from the store only fills names that are absent.
#[derive(Default)]
pub struct SpecCache {
    specs: RwLock<HashMap<String, VirtualMachineSpec>>,
}

impl SpecCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<VirtualMachineSpec> {
        self.specs.read().await.get(name).cloned()
    }

    pub async fn insert(&self, name: &str, spec: VirtualMachineSpec) {
        self.specs.write().await.insert(name.to_string(), spec);
    }

    /// Insert the entries of `specs` whose names are not cached yet.
    ///
    /// Returns how many were added.
    pub async fn fill_missing(&self, specs: impl IntoIterator<Item = (String, VirtualMachineSpec)>) -> usize {
        let mut cached = self.specs.write().await;
        let before = cached.len();
        for (name, spec) in specs {
            cached.entry(name).or_insert(spec);
        }
        cached.len() - before
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.specs.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.specs.read().await.len()
    }
}
