//! Orchestration backend contract.
//!
//! The backend is an external provisioning engine that realizes named stacks
//! from a template bundle and a parameter map. Its wire protocol lives behind
//! [`OrchestrationBackend`]; the types here are what the operator exchanges
//! with it.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::templates::TemplateParams;

/// Tag carried by every stack this operator creates.
pub const STACK_TAG: &str = "vmstack";

/// Backend-side timeout for create and update, in minutes.
pub const STACK_TIMEOUT_MINS: u32 = 10;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("authentication failed for tenant {tenant}: {reason}")]
    Auth { tenant: String, reason: String },

    #[error("stack {0} not found")]
    NotFound(String),

    #[error("backend request failed: {0}")]
    Request(String),
}

/// Authenticated handle scoped to one tenant.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantSession {
    pub tenant_id: String,
    pub token: String,
    /// Orchestration endpoint resolved for the tenant.
    pub endpoint: String,
}

impl fmt::Debug for TenantSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantSession")
            .field("tenant_id", &self.tenant_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Backend stack status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    UpdateInProgress,
    UpdateComplete,
    UpdateFailed,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
    /// Any status string outside the create/update/delete families.
    Other(String),
}

impl StackStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "CREATE_IN_PROGRESS" => StackStatus::CreateInProgress,
            "CREATE_COMPLETE" => StackStatus::CreateComplete,
            "CREATE_FAILED" => StackStatus::CreateFailed,
            "UPDATE_IN_PROGRESS" => StackStatus::UpdateInProgress,
            "UPDATE_COMPLETE" => StackStatus::UpdateComplete,
            "UPDATE_FAILED" => StackStatus::UpdateFailed,
            "DELETE_IN_PROGRESS" => StackStatus::DeleteInProgress,
            "DELETE_COMPLETE" => StackStatus::DeleteComplete,
            "DELETE_FAILED" => StackStatus::DeleteFailed,
            other => StackStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StackStatus::CreateInProgress => "CREATE_IN_PROGRESS",
            StackStatus::CreateComplete => "CREATE_COMPLETE",
            StackStatus::CreateFailed => "CREATE_FAILED",
            StackStatus::UpdateInProgress => "UPDATE_IN_PROGRESS",
            StackStatus::UpdateComplete => "UPDATE_COMPLETE",
            StackStatus::UpdateFailed => "UPDATE_FAILED",
            StackStatus::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackStatus::DeleteComplete => "DELETE_COMPLETE",
            StackStatus::DeleteFailed => "DELETE_FAILED",
            StackStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateFailed | StackStatus::UpdateFailed | StackStatus::DeleteFailed
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateComplete | StackStatus::UpdateComplete | StackStatus::DeleteComplete
        )
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stack as reported by the backend listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatStack {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub status_reason: String,
}

impl StatStack {
    pub fn stack_status(&self) -> StackStatus {
        StackStatus::parse(&self.status)
    }
}

/// Rendered template bundle submitted with a stack request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTemplate {
    /// Locator of the entry-point document.
    pub entry: String,
    /// Rendered documents keyed by locator, entry point included.
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Create or update request.
#[derive(Debug, Clone)]
pub struct StackRequest {
    pub name: String,
    pub template: StackTemplate,
    pub parameters: TemplateParams,
    pub tags: Vec<String>,
    pub timeout_mins: u32,
}

/// External orchestration engine.
#[async_trait]
pub trait OrchestrationBackend: Send + Sync {
    /// Obtain a handle scoped to `tenant_id`.
    async fn authenticate(&self, tenant_id: &str, token: &str) -> Result<TenantSession, BackendError>;

    /// Create a stack and return its id.
    async fn create_stack(&self, session: &TenantSession, request: &StackRequest) -> Result<String, BackendError>;

    async fn update_stack(
        &self,
        session: &TenantSession,
        stack_id: &str,
        request: &StackRequest,
    ) -> Result<(), BackendError>;

    async fn delete_stack(&self, session: &TenantSession, name: &str, stack_id: &str) -> Result<(), BackendError>;

    /// List stacks carrying `tag`.
    async fn list_stacks(&self, session: &TenantSession, tag: &str) -> Result<Vec<StatStack>, BackendError>;
}
