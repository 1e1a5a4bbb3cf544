//! Shared test utilities for vmstack-operator integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use vmstack_operator::config::{OperatorConfig, TemplatePaths};
use vmstack_operator::resource::{
    AssemblyPhase, NetworkSpec, ProjectSpec, ServerSpec, VirtualMachine, VirtualMachineSpec, VolumeSpec,
};
use vmstack_operator::stack::{
    ADMIN_TENANT, BackendError, ClientCache, OrchestrationBackend, StackRenderer, StackRequest, StackService,
    StatStack, TenantSession,
};
use vmstack_operator::store::{ResourceStore, Result as StoreResult, StoreError};
use vmstack_operator::templates::TemplateEngine;

type Interference = Box<dyn Fn(&mut VirtualMachine) + Send>;

/// In-memory resource store with optimistic version checks.
#[derive(Default)]
pub struct MemoryStore {
    vms: Mutex<HashMap<String, VirtualMachine>>,
    interference: Mutex<Option<(usize, Interference)>>,
    pub fail_updates: AtomicBool,
    pub get_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, vm: VirtualMachine) {
        self.vms.lock().unwrap().insert(vm.name.clone(), vm);
    }

    pub fn snapshot(&self, name: &str) -> VirtualMachine {
        self.vms.lock().unwrap().get(name).cloned().expect("resource not in store")
    }

    /// Before each of the next `times` updates, apply `change` to the stored
    /// resource as a concurrent writer would, bumping its version.
    pub fn interfere(&self, times: usize, change: impl Fn(&mut VirtualMachine) + Send + 'static) {
        *self.interference.lock().unwrap() = Some((times, Box::new(change)));
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, name: &str) -> StoreResult<VirtualMachine> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.vms
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<VirtualMachine>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vms.lock().unwrap().values().cloned().collect())
    }

    async fn update(&self, vm: VirtualMachine) -> StoreResult<VirtualMachine> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("update rejected".to_string()));
        }

        let mut vms = self.vms.lock().unwrap();
        let stored = vms
            .get_mut(&vm.name)
            .ok_or_else(|| StoreError::NotFound(vm.name.clone()))?;

        let mut interference = self.interference.lock().unwrap();
        let exhausted = match interference.as_mut() {
            Some((remaining, change)) => {
                change(stored);
                stored.resource_version += 1;
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            *interference = None;
        }

        if stored.resource_version != vm.resource_version {
            return Err(StoreError::VersionConflict {
                name: vm.name.clone(),
                expected: vm.resource_version,
                actual: stored.resource_version,
            });
        }

        let mut vm = vm;
        vm.resource_version += 1;
        *stored = vm.clone();
        Ok(vm)
    }
}

/// Orchestration backend that records calls and can be told to fail.
#[derive(Default)]
pub struct FakeBackend {
    pub stacks: Mutex<Vec<StatStack>>,
    pub requests: Mutex<Vec<StackRequest>>,
    pub fail_auth: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_list: AtomicBool,
    pub auth_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Calls that act on or authenticate for a stack. Listing is not counted.
    pub fn calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
            + self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn set_stacks(&self, stacks: Vec<StatStack>) {
        *self.stacks.lock().unwrap() = stacks;
    }

    pub fn last_request(&self) -> StackRequest {
        self.requests.lock().unwrap().last().cloned().expect("no request recorded")
    }
}

#[async_trait]
impl OrchestrationBackend for FakeBackend {
    async fn authenticate(&self, tenant_id: &str, token: &str) -> Result<TenantSession, BackendError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(BackendError::Auth {
                tenant: tenant_id.to_string(),
                reason: "invalid token".to_string(),
            });
        }
        Ok(TenantSession {
            tenant_id: tenant_id.to_string(),
            token: token.to_string(),
            endpoint: format!("https://orchestration.test/{}", tenant_id),
        })
    }

    async fn create_stack(&self, _session: &TenantSession, request: &StackRequest) -> Result<String, BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Request("quota exceeded".to_string()));
        }
        Ok(format!("stack-{}", uuid::Uuid::new_v4()))
    }

    async fn update_stack(
        &self,
        _session: &TenantSession,
        _stack_id: &str,
        request: &StackRequest,
    ) -> Result<(), BackendError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(BackendError::Request("stack is locked".to_string()));
        }
        Ok(())
    }

    async fn delete_stack(&self, _session: &TenantSession, _name: &str, stack_id: &str) -> Result<(), BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BackendError::NotFound(stack_id.to_string()));
        }
        Ok(())
    }

    async fn list_stacks(&self, session: &TenantSession, tag: &str) -> Result<Vec<StatStack>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(session.tenant_id, ADMIN_TENANT);
        assert_eq!(tag, "vmstack");
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::Request("service unavailable".to_string()));
        }
        Ok(self.stacks.lock().unwrap().clone())
    }
}

pub fn admin_session() -> TenantSession {
    TenantSession {
        tenant_id: ADMIN_TENANT.to_string(),
        token: "admin-token".to_string(),
        endpoint: "https://orchestration.test/admin".to_string(),
    }
}

/// Directory holding the templates shipped with the crate.
pub fn shipped_templates() -> TemplatePaths {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates");
    TemplatePaths {
        network: dir.join("network.yaml"),
        server: dir.join("vm.yaml"),
        group: dir.join("vm_group.yaml"),
    }
}

pub fn operator_config(scratch: &TempDir) -> OperatorConfig {
    OperatorConfig {
        templates: shipped_templates(),
        scratch_dir: scratch.path().to_path_buf(),
        polling_period: std::time::Duration::from_secs(5),
    }
}

/// Stack service over the shipped templates, rendering into `scratch`.
pub fn stack_service(backend: Arc<FakeBackend>, scratch: &TempDir) -> Arc<StackService> {
    let engine = TemplateEngine::new();
    for (name, path) in shipped_templates().entries() {
        engine.register(name, path).expect("Failed to register template");
    }
    let renderer = StackRenderer::new(Arc::new(engine), scratch.path());
    let clients = ClientCache::seeded(ADMIN_TENANT, admin_session());
    Arc::new(StackService::new(backend, clients, renderer))
}

pub fn make_spec(project_id: &str) -> VirtualMachineSpec {
    VirtualMachineSpec {
        project: ProjectSpec {
            project_id: project_id.to_string(),
            token: format!("{}-token", project_id),
        },
        network: NetworkSpec {
            name: "app-net".to_string(),
            cidr: "192.168.10.0/24".to_string(),
            neutron_az: "nova".to_string(),
            dns_servers: vec!["10.0.0.2".to_string()],
            floating_ip: false,
        },
        server: ServerSpec {
            name: "app".to_string(),
            image: "ubuntu-22.04".to_string(),
            flavor: "m1.medium".to_string(),
            replicas: 2,
            ..Default::default()
        },
        volume: vec![
            VolumeSpec {
                volume_name: "data".to_string(),
                volume_type: "ssd".to_string(),
                volume_size: 50,
            },
            VolumeSpec {
                volume_name: "logs".to_string(),
                volume_type: "hdd".to_string(),
                volume_size: 10,
            },
        ],
        software_config: b"#cloud-config\npackages: [nginx]\n".to_vec(),
        assembly_phase: AssemblyPhase::Creating,
    }
}

pub fn make_vm(name: &str, phase: AssemblyPhase) -> VirtualMachine {
    let mut spec = make_spec("project-a");
    spec.assembly_phase = phase;
    VirtualMachine::new(name, spec)
}

pub fn make_stat(name: &str, id: &str, status: &str) -> StatStack {
    StatStack {
        id: id.to_string(),
        name: name.to_string(),
        status: status.to_string(),
        status_reason: format!("Stack {} {}", name, status),
    }
}
