//! ResourceStore trait definition.
//!
//! The store holding VirtualMachine resources lives outside the operator;
//! this trait is the whole surface the reconciler needs from it.

use async_trait::async_trait;

use super::error::Result;
use crate::resource::VirtualMachine;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a VirtualMachine by name. Fails with `NotFound` if absent.
    async fn get(&self, name: &str) -> Result<VirtualMachine>;

    /// List all VirtualMachines.
    async fn list(&self) -> Result<Vec<VirtualMachine>>;

    /// Replace a VirtualMachine.
    ///
    /// Fails with `VersionConflict` when `vm.resource_version` no longer
    /// matches the stored version. Returns the stored object.
    async fn update(&self, vm: VirtualMachine) -> Result<VirtualMachine>;
}
