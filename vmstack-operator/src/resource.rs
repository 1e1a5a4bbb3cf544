//! VirtualMachine resource model.
//!
//! The spec is written by clients and drives reconciliation through its
//! `assembly_phase`; the status is owned by the operator and is always
//! replaced as a whole.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssemblyPhase {
    Creating,
    Updating,
    Deleting,
    Failed,
    Succeeded,
    /// Empty or unrecognised phase. Never acted upon.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Lifecycle status of the VM as seen by the operator.
///
/// The `*InProgress` / `*Failed` / `DeleteComplete` values are produced by
/// the stack driver right after a backend call. `Failed` and `Succeeded` are
/// the terminal values written once polling observes the stack settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VmStatus {
    #[default]
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "CREATE_IN_PROGRESS")]
    CreateInProgress,
    #[serde(rename = "CREATE_FAILED")]
    CreateFailed,
    #[serde(rename = "UPDATE_IN_PROGRESS")]
    UpdateInProgress,
    #[serde(rename = "UPDATE_FAILED")]
    UpdateFailed,
    #[serde(rename = "DELETE_IN_PROGRESS")]
    DeleteInProgress,
    #[serde(rename = "DELETE_COMPLETE")]
    DeleteComplete,
    #[serde(rename = "DELETE_FAILED")]
    DeleteFailed,
    Failed,
    Succeeded,
}

impl VmStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, VmStatus::Failed | VmStatus::Succeeded)
    }
}

/// Tenant the stack is created in.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub project_id: String,
    pub token: String,
}

impl fmt::Debug for ProjectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectSpec")
            .field("project_id", &self.project_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub cidr: String,
    /// Availability zone hint for the network agents.
    #[serde(default)]
    pub neutron_az: String,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub floating_ip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub name: String,
    pub image: String,
    pub flavor: String,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
}

fn default_replicas() -> u32 {
    1
}

impl Default for ServerSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            image: String::new(),
            flavor: String::new(),
            availability_zone: String::new(),
            replicas: default_replicas(),
            key_name: None,
            security_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub volume_name: String,
    #[serde(default)]
    pub volume_type: String,
    /// Size in GiB.
    pub volume_size: u32,
}

/// Desired state of a VirtualMachine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineSpec {
    pub project: ProjectSpec,
    pub network: NetworkSpec,
    pub server: ServerSpec,
    #[serde(default)]
    pub volume: Vec<VolumeSpec>,
    /// Opaque software configuration passed through to the server.
    #[serde(default)]
    pub software_config: Vec<u8>,
    #[serde(default)]
    pub assembly_phase: AssemblyPhase,
}

/// Observed state of a VirtualMachine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineStatus {
    #[serde(default)]
    pub vm_status: VmStatus,
    /// External stack identifier, empty until a create succeeds.
    #[serde(default)]
    pub stack_id: String,
    /// Last error or backend status reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VirtualMachineStatus {
    pub fn new(vm_status: VmStatus) -> Self {
        Self {
            vm_status,
            ..Default::default()
        }
    }

    pub fn with_stack_id(mut self, stack_id: impl Into<String>) -> Self {
        self.stack_id = stack_id.into();
        self
    }
}

/// A VirtualMachine resource as held by the resource store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub name: String,
    /// Optimistic concurrency token, bumped by the store on every update.
    #[serde(default)]
    pub resource_version: u64,
    /// Set once removal of the resource has been requested.
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub spec: VirtualMachineSpec,
    #[serde(default)]
    pub status: VirtualMachineStatus,
}

impl VirtualMachine {
    pub fn new(name: impl Into<String>, spec: VirtualMachineSpec) -> Self {
        Self {
            name: name.into(),
            resource_version: 0,
            deletion_timestamp: None,
            spec,
            status: VirtualMachineStatus::default(),
        }
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_phase_deserializes() {
        let phase: AssemblyPhase = serde_json::from_str("\"Rebooting\"").unwrap();
        assert_eq!(phase, AssemblyPhase::Unknown);

        let phase: AssemblyPhase = serde_json::from_str("\"Deleting\"").unwrap();
        assert_eq!(phase, AssemblyPhase::Deleting);
    }

    #[test]
    fn test_spec_defaults() {
        let spec: VirtualMachineSpec = serde_json::from_value(serde_json::json!({
            "project": {"project_id": "p1", "token": "t"},
            "network": {"name": "net", "cidr": "10.0.0.0/24"},
            "server": {"name": "web", "image": "debian", "flavor": "m1.small"}
        }))
        .unwrap();

        assert_eq!(spec.assembly_phase, AssemblyPhase::Unknown);
        assert_eq!(spec.server.replicas, 1);
        assert!(spec.volume.is_empty());
    }

    #[test]
    fn test_status_wire_names() {
        let status = VirtualMachineStatus::new(VmStatus::CreateInProgress).with_stack_id("abc");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["vm_status"], "CREATE_IN_PROGRESS");
        assert_eq!(json["stack_id"], "abc");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_token_is_redacted() {
        let project = ProjectSpec {
            project_id: "p1".to_string(),
            token: "secret".to_string(),
        };
        assert!(!format!("{:?}", project).contains("secret"));
    }
}
