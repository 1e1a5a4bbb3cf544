//! VirtualMachine reconciler.
//!
//! Dispatches on the client-set assembly phase, drives the stack driver and
//! persists the resulting status. Also applies the poller's stack
//! observations back onto resource status.

mod spec_cache;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub use spec_cache::SpecCache;

use crate::poller::StackObservation;
use crate::resource::{AssemblyPhase, VirtualMachine, VirtualMachineSpec, VirtualMachineStatus, VmStatus};
use crate::stack::{SpecError, StackFailure, StackService, StatStack, valid_spec, valid_update_spec};
use crate::store::{ResourceStore, StatusChange, StatusWriter, StoreError, TerminalState};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid spec for {name}: {source}")]
    Validation {
        name: String,
        #[source]
        source: SpecError,
    },

    #[error("{name} is not ready: {reason}")]
    NotReady { name: String, reason: &'static str },

    #[error(transparent)]
    Store(#[from] StoreError),
}

type StackResult = Result<VirtualMachineStatus, StackFailure>;

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The resource no longer exists.
    Gone,
    /// The resource is being removed; its stack is left alone.
    Terminating,
    /// A backend action ran and its status was persisted.
    Applied,
    /// Nothing to do for the current phase.
    Idle,
}

pub struct VmReconciler {
    store: Arc<dyn ResourceStore>,
    stacks: Arc<StackService>,
    specs: SpecCache,
    status: StatusWriter,
}

impl VmReconciler {
    pub fn new(store: Arc<dyn ResourceStore>, stacks: Arc<StackService>) -> Self {
        let status = StatusWriter::new(Arc::clone(&store));
        Self::with_status_writer(store, stacks, status)
    }

    pub fn with_status_writer(store: Arc<dyn ResourceStore>, stacks: Arc<StackService>, status: StatusWriter) -> Self {
        Self {
            store,
            stacks,
            specs: SpecCache::new(),
            status,
        }
    }

    pub fn specs(&self) -> &SpecCache {
        &self.specs
    }

    /// Converge the named resource once.
    pub async fn reconcile(&self, name: &str) -> Result<Outcome, ReconcileError> {
        let vm = match self.store.get(name).await {
            Ok(vm) => vm,
            Err(e) if e.is_not_found() => {
                debug!(name = %name, "VirtualMachine is gone");
                return Ok(Outcome::Gone);
            }
            Err(e) => return Err(e.into()),
        };

        if vm.is_marked_for_deletion() {
            info!(name = %name, stack_id = %vm.status.stack_id, "VirtualMachine is being removed, leaving stack in place");
            return Ok(Outcome::Terminating);
        }

        let result = match vm.spec.assembly_phase {
            AssemblyPhase::Creating => self.create(&vm).await?,
            AssemblyPhase::Updating => self.update(&vm).await?,
            AssemblyPhase::Deleting => self.delete(&vm).await?,
            phase => {
                debug!(name = %name, phase = ?phase, "Nothing to do");
                return Ok(Outcome::Idle);
            }
        };

        let status = match result {
            Ok(status) => status,
            Err(failure) => {
                warn!(name = %name, status = ?failure.status.vm_status, error = %failure.error, "Stack action failed");
                failure.status
            }
        };
        self.status.write(name, &StatusChange::Replace(status)).await?;
        Ok(Outcome::Applied)
    }

    async fn create(&self, vm: &VirtualMachine) -> Result<StackResult, ReconcileError> {
        valid_spec(&vm.spec).map_err(|source| ReconcileError::Validation {
            name: vm.name.clone(),
            source,
        })?;

        info!(name = %vm.name, "Creating stack");
        let result = self.stacks.create_or_update(&vm.name, "", Some(&vm.spec)).await;
        self.specs.insert(&vm.name, vm.spec.clone()).await;
        Ok(result)
    }

    async fn update(&self, vm: &VirtualMachine) -> Result<StackResult, ReconcileError> {
        let Some(prior) = self.specs.get(&vm.name).await else {
            return Err(ReconcileError::NotReady {
                name: vm.name.clone(),
                reason: "no accepted spec to update",
            });
        };
        valid_update_spec(&prior, &vm.spec).map_err(|source| ReconcileError::Validation {
            name: vm.name.clone(),
            source,
        })?;

        self.specs.insert(&vm.name, vm.spec.clone()).await;
        info!(name = %vm.name, stack_id = %vm.status.stack_id, "Updating stack");
        Ok(self
            .stacks
            .create_or_update(&vm.name, &vm.status.stack_id, Some(&vm.spec))
            .await)
    }

    async fn delete(&self, vm: &VirtualMachine) -> Result<StackResult, ReconcileError> {
        if vm.status.stack_id.is_empty() {
            info!(name = %vm.name, "No stack id recorded, nothing to delete");
            return Err(ReconcileError::NotReady {
                name: vm.name.clone(),
                reason: "no stack id to delete",
            });
        }

        info!(name = %vm.name, stack_id = %vm.status.stack_id, "Deleting stack");
        Ok(self.stacks.delete(&vm.name, &vm.status.stack_id, Some(&vm.spec)).await)
    }

    /// Cached spec for `name`, re-syncing the cache from the store once on a miss.
    pub async fn get_spec(&self, name: &str) -> Result<Option<VirtualMachineSpec>, StoreError> {
        if let Some(spec) = self.specs.get(name).await {
            return Ok(Some(spec));
        }
        self.sync_specs().await?;
        Ok(self.specs.get(name).await)
    }

    /// Cache the store's spec for every resource that has no cached spec yet.
    ///
    /// Cached entries are kept: the store may hold an update that was never
    /// accepted.
    pub async fn sync_specs(&self) -> Result<usize, StoreError> {
        let vms = self.store.list().await?;
        let listed = vms.len();
        let added = self.specs.fill_missing(vms.into_iter().map(|vm| (vm.name, vm.spec))).await;
        debug!(listed, added, "Synced spec cache from store");
        Ok(added)
    }

    /// Apply one polled stack onto the status of the resource it belongs to.
    pub async fn observe_stack(&self, stack: &StatStack) -> Result<(), StoreError> {
        if self.get_spec(&stack.name).await?.is_none() {
            warn!(stack = %stack.name, stack_id = %stack.id, "No VirtualMachine known for stack, skipping");
            return Ok(());
        }

        let change = status_change_for(stack);
        match self.status.write(&stack.name, &change).await {
            Ok(vm) => {
                debug!(name = %stack.name, stack_status = %stack.stack_status(), vm_status = ?vm.status.vm_status, "Applied stack observation");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(name = %stack.name, stack_id = %stack.id, "VirtualMachine disappeared before status write");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drain poller observations one at a time until the channel closes.
    pub async fn run_observations(self: Arc<Self>, mut observations: mpsc::Receiver<StackObservation>) {
        while let Some(StackObservation { stack, ack }) = observations.recv().await {
            let result = self.observe_stack(&stack).await;
            if let Err(e) = &result {
                error!(name = %stack.name, stack_id = %stack.id, error = %e, "Failed to apply stack observation");
            }
            let _ = ack.send(result);
        }
        debug!("Observation channel closed");
    }
}

/// Map a backend stack status onto a status change.
///
/// Failed families end in `Failed`, complete families in `Succeeded`, and
/// both force the assembly phase to match. Anything else only refreshes the
/// stack id.
pub fn status_change_for(stack: &StatStack) -> StatusChange {
    let status = stack.stack_status();
    let terminal = if status.is_failed() {
        Some(TerminalState {
            vm_status: VmStatus::Failed,
            phase: AssemblyPhase::Failed,
            message: (!stack.status_reason.is_empty()).then(|| stack.status_reason.clone()),
        })
    } else if status.is_complete() {
        Some(TerminalState {
            vm_status: VmStatus::Succeeded,
            phase: AssemblyPhase::Succeeded,
            message: None,
        })
    } else {
        None
    };

    StatusChange::Observed {
        stack_id: stack.id.clone(),
        terminal,
    }
}
