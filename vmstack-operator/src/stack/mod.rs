//! Stack driver.
//!
//! Turns a VirtualMachine spec into calls against the orchestration backend
//! and maps each call's outcome onto the status the resource should carry.

mod backend;
mod clients;
mod error;
mod render;
mod validate;

use std::sync::Arc;

use tracing::{debug, info, warn};

pub use backend::{
    BackendError, OrchestrationBackend, STACK_TAG, STACK_TIMEOUT_MINS, StackRequest, StackStatus,
    StackTemplate, StatStack, TenantSession,
};
pub use clients::{ClientCache, ClientCacheError};
pub use error::{StackError, StackFailure};
pub use render::{GROUP_TEMPLATE, NETWORK_TEMPLATE, SERVER_TEMPLATE, StackRenderer, locator};
pub use validate::{SpecError, valid_spec, valid_update_spec};

use crate::resource::{VirtualMachineSpec, VirtualMachineStatus, VmStatus};
use crate::templates::flatten_spec;

/// Tenant used when no spec is available, e.g. for listing.
pub const ADMIN_TENANT: &str = "cloud-admin";

pub struct StackService {
    backend: Arc<dyn OrchestrationBackend>,
    clients: ClientCache<TenantSession>,
    renderer: StackRenderer,
}

impl StackService {
    pub fn new(
        backend: Arc<dyn OrchestrationBackend>,
        clients: ClientCache<TenantSession>,
        renderer: StackRenderer,
    ) -> Self {
        Self {
            backend,
            clients,
            renderer,
        }
    }

    pub fn clients(&self) -> &ClientCache<TenantSession> {
        &self.clients
    }

    /// Create a stack when `existing_id` is empty, update it otherwise.
    ///
    /// Not idempotent: two calls with an empty id issue two creates.
    pub async fn create_or_update(
        &self,
        name: &str,
        existing_id: &str,
        spec: Option<&VirtualMachineSpec>,
    ) -> Result<VirtualMachineStatus, StackFailure> {
        let creating = existing_id.is_empty();
        let failed = || {
            if creating {
                VirtualMachineStatus::new(VmStatus::CreateFailed)
            } else {
                VirtualMachineStatus::new(VmStatus::UpdateFailed).with_stack_id(existing_id)
            }
        };

        if name.is_empty() {
            return Err(StackFailure::new(failed(), StackError::MissingName));
        }
        let session = self
            .session(spec)
            .await
            .map_err(|e| StackFailure::new(failed(), e))?;
        let request = self
            .prepare(name, spec)
            .await
            .map_err(|e| StackFailure::new(failed(), e))?;

        if creating {
            match self.backend.create_stack(&session, &request).await {
                Ok(id) => {
                    info!(name = %name, stack_id = %id, tenant = %session.tenant_id, "Stack create accepted");
                    Ok(VirtualMachineStatus::new(VmStatus::CreateInProgress).with_stack_id(id))
                }
                Err(source) => {
                    warn!(name = %name, error = %source, "Stack create failed");
                    Err(StackFailure::new(
                        failed(),
                        StackError::Backend {
                            operation: "create",
                            name: name.to_string(),
                            source,
                        },
                    ))
                }
            }
        } else {
            match self.backend.update_stack(&session, existing_id, &request).await {
                Ok(()) => {
                    info!(name = %name, stack_id = %existing_id, "Stack update accepted");
                    Ok(VirtualMachineStatus::new(VmStatus::UpdateInProgress).with_stack_id(existing_id))
                }
                Err(source) => {
                    warn!(name = %name, stack_id = %existing_id, error = %source, "Stack update failed");
                    Err(StackFailure::new(
                        failed(),
                        StackError::Backend {
                            operation: "update",
                            name: name.to_string(),
                            source,
                        },
                    ))
                }
            }
        }
    }

    /// Delete a stack.
    ///
    /// The backend deletes asynchronously, so an accepted delete yields
    /// `DeleteInProgress`. A delete the backend rejects is taken to mean the
    /// stack is already gone and yields `DeleteComplete`.
    pub async fn delete(
        &self,
        name: &str,
        stack_id: &str,
        spec: Option<&VirtualMachineSpec>,
    ) -> Result<VirtualMachineStatus, StackFailure> {
        let failed = || VirtualMachineStatus::new(VmStatus::DeleteFailed).with_stack_id(stack_id);

        if name.is_empty() {
            return Err(StackFailure::new(failed(), StackError::MissingName));
        }
        if stack_id.is_empty() {
            return Err(StackFailure::new(failed(), StackError::MissingId(name.to_string())));
        }
        let session = self
            .session(spec)
            .await
            .map_err(|e| StackFailure::new(failed(), e))?;

        match self.backend.delete_stack(&session, name, stack_id).await {
            Ok(()) => {
                info!(name = %name, stack_id = %stack_id, "Stack delete accepted");
                Ok(VirtualMachineStatus::new(VmStatus::DeleteInProgress).with_stack_id(stack_id))
            }
            Err(e) => {
                info!(name = %name, stack_id = %stack_id, error = %e, "Stack delete rejected, treating as already deleted");
                Ok(VirtualMachineStatus::new(VmStatus::DeleteComplete).with_stack_id(stack_id))
            }
        }
    }

    /// List every stack carrying [`STACK_TAG`], as seen by the admin tenant.
    pub async fn list(&self) -> Result<Vec<StatStack>, StackError> {
        let session = self.session(None).await?;
        let stacks = self
            .backend
            .list_stacks(&session, STACK_TAG)
            .await
            .map_err(StackError::List)?;
        debug!(count = stacks.len(), "Listed stacks");
        Ok(stacks)
    }

    async fn prepare(&self, name: &str, spec: Option<&VirtualMachineSpec>) -> Result<StackRequest, StackError> {
        let parameters = flatten_spec(spec)?;
        let template = self.renderer.render(&parameters).await?;

        Ok(StackRequest {
            name: name.to_string(),
            template,
            parameters,
            tags: vec![STACK_TAG.to_string()],
            timeout_mins: STACK_TIMEOUT_MINS,
        })
    }

    /// Tenant session for `spec`, or the admin session when there is none.
    async fn session(&self, spec: Option<&VirtualMachineSpec>) -> Result<TenantSession, StackError> {
        let Some(spec) = spec else {
            return self.clients.get(ADMIN_TENANT).await.map_err(|e| StackError::Client {
                tenant: ADMIN_TENANT.to_string(),
                source: BackendError::Auth {
                    tenant: ADMIN_TENANT.to_string(),
                    reason: e.to_string(),
                },
            });
        };

        let tenant = &spec.project.project_id;
        self.clients
            .get_or_create(tenant, || self.backend.authenticate(tenant, &spec.project.token))
            .await
            .map_err(|source| StackError::Client {
                tenant: tenant.clone(),
                source,
            })
    }
}
