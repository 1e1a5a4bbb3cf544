//! Status persistence with optimistic-conflict retry.
//!
//! Every status write reads the current resource, replaces its status as a
//! whole and writes it back. A `VersionConflict` repeats the cycle against a
//! fresh read, up to the policy's attempt budget.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::error::Result;
use super::traits::ResourceStore;
use crate::resource::{AssemblyPhase, VirtualMachine, VirtualMachineStatus, VmStatus};

/// Bounded retry policy for conflicting writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of write attempts, including the first one.
    pub attempts: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub factor: f64,
    /// Random extra delay, as a fraction of the current delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(10),
            factor: 1.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let base = self.delay.as_secs_f64() * self.factor.powi(exp);
        let jitter = if self.jitter > 0.0 {
            base * self.jitter * rand::thread_rng().gen_range(0.0..=1.0)
        } else {
            0.0
        };
        Duration::from_secs_f64(base + jitter)
    }
}

/// Terminal state observed for a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalState {
    pub vm_status: VmStatus,
    /// Phase forced onto the spec so no further client action runs until reset.
    pub phase: AssemblyPhase,
    pub message: Option<String>,
}

/// How the status of a resource changes on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// Result of a reconcile action.
    Replace(VirtualMachineStatus),
    /// A polled stack observation. `terminal` is `None` while the stack is
    /// still in progress, in which case only the stack id is refreshed.
    Observed {
        stack_id: String,
        terminal: Option<TerminalState>,
    },
}

impl StatusChange {
    /// Apply the change to a freshly read resource.
    pub fn apply(&self, vm: &mut VirtualMachine) {
        let status = match self {
            StatusChange::Replace(status) => status.clone(),
            StatusChange::Observed { stack_id, terminal } => {
                let mut status = vm.status.clone();
                status.stack_id = stack_id.clone();
                if let Some(terminal) = terminal {
                    status.vm_status = terminal.vm_status;
                    status.message = terminal.message.clone();
                    vm.spec.assembly_phase = terminal.phase;
                }
                status
            }
        };
        vm.status = status;
    }
}

/// Writes resource status through a [`ResourceStore`].
pub struct StatusWriter {
    store: Arc<dyn ResourceStore>,
    policy: RetryPolicy,
}

impl StatusWriter {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn ResourceStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Persist `change` onto the named resource.
    ///
    /// Only `VersionConflict` is retried; any other error, or a conflict on
    /// the last attempt, is returned.
    pub async fn write(&self, name: &str, change: &StatusChange) -> Result<VirtualMachine> {
        let mut attempt = 1;
        loop {
            let mut vm = self.store.get(name).await?;
            change.apply(&mut vm);

            match self.store.update(vm).await {
                Ok(updated) => {
                    debug!(name = %name, version = updated.resource_version, status = ?updated.status.vm_status, "Status persisted");
                    return Ok(updated);
                }
                Err(e) if e.is_conflict() && attempt < self.policy.attempts => {
                    let delay = self.policy.backoff(attempt);
                    debug!(name = %name, attempt, delay = ?delay, "Status write conflicted, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_conflict() {
                        warn!(name = %name, attempts = attempt, "Status write still conflicting, giving up");
                    }
                    return Err(e);
                }
            }
        }
    }
}
