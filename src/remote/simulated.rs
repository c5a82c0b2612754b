//! Simulated Hypervisor
//!
//! In-memory management endpoint used for standalone mode and tests. Tasks
//! complete after a configurable number of polls and their effects (a cloned
//! VM appearing, a VM disappearing) only become visible on completion.
//! Faults can be injected per operation.

use crate::domain::ports::{
    ClientFactory, ClientId, CloneSpec, EndpointCredentials, EndpointId, HypervisorClient,
    PowerState, ReconfigureSpec, ScriptSpec, ScriptState, TaskHandle, TaskState, VmInfo,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Behaviour of a simulated endpoint
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Polls a task stays unfinished before it completes
    pub task_polls: u32,
    /// Polls a guest script keeps running before it exits
    pub script_polls: u32,
    /// Exit code reported by finished guest scripts
    pub script_exit_code: i32,
    /// Templates that can be cloned; empty accepts any template
    pub templates: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            task_polls: 1,
            script_polls: 1,
            script_exit_code: 0,
            templates: Vec::new(),
        }
    }
}

// =============================================================================
// Simulated State
// =============================================================================

#[derive(Debug, Clone)]
enum TaskEffect {
    Create(VmInfo),
    Reconfigure { vm: String, spec: ReconfigureSpec },
    Power { vm: String, state: PowerState },
    Delete { vm: String },
}

#[derive(Debug)]
struct SimTask {
    remaining_polls: u32,
    effect: Option<TaskEffect>,
    failure: Option<String>,
    done: bool,
}

#[derive(Debug)]
struct SimScript {
    remaining_polls: u32,
}

#[derive(Debug, Default)]
struct SimState {
    vms: BTreeMap<String, VmInfo>,
    tasks: HashMap<String, SimTask>,
    scripts: HashMap<(String, i64), SimScript>,
    /// operation -> reason for the next call to fail
    faults: HashMap<String, String>,
    /// reason for the next created task to fail
    task_fault: Option<String>,
    next_task: u64,
    next_pid: i64,
    session_epoch: u64,
}

/// One simulated management endpoint
#[derive(Debug)]
pub struct SimulatedHypervisor {
    config: SimulatorConfig,
    state: RwLock<SimState>,
}

impl SimulatedHypervisor {
    pub fn new(config: SimulatorConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: RwLock::new(SimState {
                next_pid: 1000,
                ..Default::default()
            }),
        })
    }

    /// Make the next call of `operation` fail with a protocol fault
    pub fn fail_next(&self, operation: &str, reason: &str) {
        self.state
            .write()
            .faults
            .insert(operation.to_string(), reason.to_string());
    }

    /// Make the next started task fail
    pub fn fail_next_task(&self, reason: &str) {
        self.state.write().task_fault = Some(reason.to_string());
    }

    /// Invalidate every session opened so far
    pub fn expire_sessions(&self) {
        self.state.write().session_epoch += 1;
    }

    /// Add a VM directly, bypassing tasks
    pub fn insert_vm(&self, vm: VmInfo) {
        self.state.write().vms.insert(vm.name.clone(), vm);
    }

    pub fn vm(&self, name: &str) -> Option<VmInfo> {
        self.state.read().vms.get(name).cloned()
    }

    pub fn vm_count(&self) -> usize {
        self.state.read().vms.len()
    }

    fn session_epoch(&self) -> u64 {
        self.state.read().session_epoch
    }

    fn check_fault(&self, endpoint: &EndpointId, operation: &str) -> Result<()> {
        match self.state.write().faults.remove(operation) {
            Some(reason) => Err(Error::RemoteCall {
                endpoint: endpoint.to_string(),
                operation: operation.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn start_task(&self, effect: TaskEffect) -> TaskHandle {
        let mut state = self.state.write();
        state.next_task += 1;
        let handle = format!("task-{}", state.next_task);
        let failure = state.task_fault.take();
        state.tasks.insert(
            handle.clone(),
            SimTask {
                remaining_polls: self.config.task_polls,
                effect: Some(effect),
                failure,
                done: false,
            },
        );
        debug!(task = %handle, "Simulated task started");
        TaskHandle(handle)
    }

    fn poll_task(&self, task: &TaskHandle) -> Option<TaskState> {
        let mut state = self.state.write();
        let sim = state.tasks.get_mut(&task.0)?;

        if !sim.done && sim.remaining_polls > 0 {
            let total = self.config.task_polls.max(1);
            sim.remaining_polls -= 1;
            let progress = ((total - sim.remaining_polls - 1) * 100 / total) as u8;
            return Some(TaskState::Running { progress });
        }

        sim.done = true;
        if let Some(reason) = sim.failure.clone() {
            return Some(TaskState::Failed { reason });
        }

        if let Some(effect) = sim.effect.take() {
            apply_effect(&mut state.vms, effect);
        }
        Some(TaskState::Succeeded)
    }
}

fn apply_effect(vms: &mut BTreeMap<String, VmInfo>, effect: TaskEffect) {
    match effect {
        TaskEffect::Create(vm) => {
            vms.insert(vm.name.clone(), vm);
        }
        TaskEffect::Reconfigure { vm, spec } => {
            if let Some(info) = vms.get_mut(&vm) {
                if let Some(cpu) = spec.cpu_count {
                    info.cpu_count = cpu;
                }
                if let Some(memory) = spec.memory_mb {
                    info.memory_mb = memory;
                }
            }
        }
        TaskEffect::Power { vm, state } => {
            if let Some(info) = vms.get_mut(&vm) {
                info.power_state = state;
            }
        }
        TaskEffect::Delete { vm } => {
            vms.remove(&vm);
        }
    }
}

// =============================================================================
// Simulated Client
// =============================================================================

/// Session against a [`SimulatedHypervisor`]
pub struct SimulatedClient {
    id: ClientId,
    endpoint: EndpointId,
    epoch: u64,
    hypervisor: Arc<SimulatedHypervisor>,
}

impl SimulatedClient {
    fn not_found(&self, operation: &str, vm_name: &str) -> Error {
        Error::RemoteCall {
            endpoint: self.endpoint.to_string(),
            operation: operation.to_string(),
            reason: format!("VM {} not found", vm_name),
        }
    }

    fn require_vm(&self, operation: &str, vm_name: &str) -> Result<VmInfo> {
        self.hypervisor
            .vm(vm_name)
            .ok_or_else(|| self.not_found(operation, vm_name))
    }
}

#[async_trait]
impl HypervisorClient for SimulatedClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    async fn is_session_valid(&self) -> bool {
        self.hypervisor.session_epoch() == self.epoch
    }

    async fn clone_vm(&self, spec: &CloneSpec) -> Result<TaskHandle> {
        self.hypervisor.check_fault(&self.endpoint, "clone_vm")?;

        let templates = &self.hypervisor.config.templates;
        if !templates.is_empty() && !templates.contains(&spec.template) {
            return Err(Error::RemoteCall {
                endpoint: self.endpoint.to_string(),
                operation: "clone_vm".into(),
                reason: format!("template {} not found", spec.template),
            });
        }
        if self.hypervisor.vm(&spec.vm_name).is_some() {
            return Err(Error::RemoteCall {
                endpoint: self.endpoint.to_string(),
                operation: "clone_vm".into(),
                reason: format!("VM {} already exists", spec.vm_name),
            });
        }

        let vm = VmInfo {
            name: spec.vm_name.clone(),
            host: spec.host.clone(),
            storage: spec.storage.clone(),
            power_state: if spec.power_on {
                PowerState::PoweredOn
            } else {
                PowerState::PoweredOff
            },
            ip_address: spec.network.as_ref().map(|n| n.ip_address.clone()),
            hostname: Some(format!("{}.{}", spec.vm_name, spec.domain_name)),
            cpu_count: spec.cpu_count.unwrap_or(1),
            memory_mb: spec.memory_mb.unwrap_or(1024),
        };
        Ok(self.hypervisor.start_task(TaskEffect::Create(vm)))
    }

    async fn task_state(&self, task: &TaskHandle) -> Result<TaskState> {
        self.hypervisor.check_fault(&self.endpoint, "task_state")?;
        self.hypervisor
            .poll_task(task)
            .ok_or_else(|| Error::RemoteCall {
                endpoint: self.endpoint.to_string(),
                operation: "task_state".into(),
                reason: format!("unknown task {}", task),
            })
    }

    async fn reconfigure_vm(&self, vm_name: &str, spec: &ReconfigureSpec) -> Result<TaskHandle> {
        self.hypervisor.check_fault(&self.endpoint, "reconfigure_vm")?;
        self.require_vm("reconfigure_vm", vm_name)?;
        Ok(self.hypervisor.start_task(TaskEffect::Reconfigure {
            vm: vm_name.to_string(),
            spec: spec.clone(),
        }))
    }

    async fn power_on(&self, vm_name: &str) -> Result<TaskHandle> {
        self.hypervisor.check_fault(&self.endpoint, "power_on")?;
        self.require_vm("power_on", vm_name)?;
        Ok(self.hypervisor.start_task(TaskEffect::Power {
            vm: vm_name.to_string(),
            state: PowerState::PoweredOn,
        }))
    }

    async fn power_off(&self, vm_name: &str) -> Result<TaskHandle> {
        self.hypervisor.check_fault(&self.endpoint, "power_off")?;
        self.require_vm("power_off", vm_name)?;
        Ok(self.hypervisor.start_task(TaskEffect::Power {
            vm: vm_name.to_string(),
            state: PowerState::PoweredOff,
        }))
    }

    async fn delete_vm(&self, vm_name: &str) -> Result<Option<TaskHandle>> {
        self.hypervisor.check_fault(&self.endpoint, "delete_vm")?;
        if self.hypervisor.vm(vm_name).is_none() {
            return Ok(None);
        }
        Ok(Some(self.hypervisor.start_task(TaskEffect::Delete {
            vm: vm_name.to_string(),
        })))
    }

    async fn vm_info(&self, vm_name: &str) -> Result<Option<VmInfo>> {
        self.hypervisor.check_fault(&self.endpoint, "vm_info")?;
        Ok(self.hypervisor.vm(vm_name))
    }

    async fn start_script(&self, vm_name: &str, script: &ScriptSpec) -> Result<i64> {
        self.hypervisor.check_fault(&self.endpoint, "start_script")?;
        let vm = self.require_vm("start_script", vm_name)?;
        if vm.power_state != PowerState::PoweredOn {
            return Err(Error::RemoteCall {
                endpoint: self.endpoint.to_string(),
                operation: "start_script".into(),
                reason: format!("VM {} is {}", vm_name, vm.power_state),
            });
        }

        let mut state = self.hypervisor.state.write();
        state.next_pid += 1;
        let pid = state.next_pid;
        state.scripts.insert(
            (vm_name.to_string(), pid),
            SimScript {
                remaining_polls: self.hypervisor.config.script_polls,
            },
        );
        debug!(vm = %vm_name, pid, bytes = script.content.len(), "Simulated script started");
        Ok(pid)
    }

    async fn script_state(&self, vm_name: &str, pid: i64) -> Result<ScriptState> {
        self.hypervisor.check_fault(&self.endpoint, "script_state")?;
        let mut state = self.hypervisor.state.write();
        let script = state
            .scripts
            .get_mut(&(vm_name.to_string(), pid))
            .ok_or_else(|| Error::RemoteCall {
                endpoint: self.endpoint.to_string(),
                operation: "script_state".into(),
                reason: format!("no process {} in {}", pid, vm_name),
            })?;

        if script.remaining_polls > 0 {
            script.remaining_polls -= 1;
            return Ok(ScriptState::Running);
        }
        Ok(ScriptState::Exited {
            code: self.hypervisor.config.script_exit_code,
        })
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Opens sessions against registered simulated endpoints
#[derive(Debug, Default)]
pub struct SimulatedClientFactory {
    endpoints: DashMap<EndpointId, Arc<SimulatedHypervisor>>,
    next_id: AtomicU64,
}

impl SimulatedClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: EndpointId, hypervisor: Arc<SimulatedHypervisor>) {
        self.endpoints.insert(endpoint, hypervisor);
    }

    /// Number of sessions opened so far
    pub fn connections(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ClientFactory for SimulatedClientFactory {
    async fn connect(
        &self,
        endpoint: &EndpointId,
        credentials: &EndpointCredentials,
    ) -> Result<Box<dyn HypervisorClient>> {
        let hypervisor = self
            .endpoints
            .get(endpoint)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::Connection {
                endpoint: endpoint.to_string(),
                reason: "host unreachable".into(),
            })?;

        if credentials.user.is_empty() {
            return Err(Error::Connection {
                endpoint: endpoint.to_string(),
                reason: "authentication failed".into(),
            });
        }

        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        Ok(Box::new(SimulatedClient {
            id,
            endpoint: endpoint.clone(),
            epoch: hypervisor.session_epoch(),
            hypervisor,
        }))
    }
}
