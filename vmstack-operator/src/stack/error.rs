use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::backend::BackendError;
use crate::resource::VirtualMachineStatus;
use crate::templates::TemplateError;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("stack name is empty")]
    MissingName,

    #[error("stack {0} has no stack id")]
    MissingId(String),

    #[error("failed to obtain client for tenant {tenant}: {source}")]
    Client {
        tenant: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("template render task failed: {0}")]
    RenderTask(String),

    #[error("failed to write rendered template {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build template parameters: {0}")]
    Params(#[from] serde_json::Error),

    #[error("{operation} of stack {name} failed: {source}")]
    Backend {
        operation: &'static str,
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to list stacks: {0}")]
    List(#[source] BackendError),
}

/// A driver call that failed after computing the resulting status.
///
/// The status is what the resource should show for the failure; the error
/// is what went wrong.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct StackFailure {
    pub status: VirtualMachineStatus,
    #[source]
    pub error: StackError,
}

impl StackFailure {
    /// `status.message` is set from `error`.
    pub fn new(mut status: VirtualMachineStatus, error: StackError) -> Self {
        status.message = Some(error.to_string());
        Self { status, error }
    }
}
