//! Hypervisor lifecycle actions
//!
//! Each action starts at most one hypervisor task and records its handle
//! under `TASK_HANDLE`; [`AwaitTask`] polls it on later polls.

use crate::controllers::vm::VmServices;
use crate::domain::ports::{
    CloneSpec, NetworkSettings, PowerState, ReconfigureSpec, TaskHandle, TaskState,
};
use crate::engine::{Action, ActionContext, Outcome};
use crate::error::{Error, Result};
use crate::settings::{keys, ProvisioningSettings};
use async_trait::async_trait;
use tracing::{debug, info};

fn precondition(component: &str, key: &str) -> Error {
    Error::MissingPrecondition {
        component: component.to_string(),
        key: key.to_string(),
    }
}

fn vm_name(settings: &ProvisioningSettings, component: &str) -> Result<String> {
    settings
        .get_non_empty(keys::INSTANCE_NAME)
        .map(str::to_string)
        .ok_or_else(|| precondition(component, keys::INSTANCE_NAME))
}

fn optional_u32(settings: &ProvisioningSettings, key: &str) -> Result<Option<u32>> {
    settings
        .get_u64(key)?
        .map(|v| {
            u32::try_from(v).map_err(|_| Error::InvalidSetting {
                key: key.to_string(),
                reason: format!("{} is out of range", v),
            })
        })
        .transpose()
}

fn record_task(settings: &mut ProvisioningSettings, task: &TaskHandle) {
    settings.set(keys::TASK_HANDLE, task.0.clone());
}

// =============================================================================
// createVm
// =============================================================================

/// Clone the VM from its template
pub struct CreateVm;

impl CreateVm {
    fn clone_spec(ctx: &ActionContext<'_, VmServices>) -> Result<CloneSpec> {
        let settings = &*ctx.settings;
        let services = ctx.services;

        let network = match settings.get_non_empty(keys::IP_ADDRESS) {
            None => None,
            Some(ip) => Some(NetworkSettings {
                network: settings.require(keys::NETWORK)?.to_string(),
                ip_address: ip.to_string(),
                gateway: settings.get_non_empty(keys::GATEWAY).map(str::to_string),
                subnet_mask: settings.get_non_empty(keys::SUBNET_MASK).map(str::to_string),
                dns_servers: settings
                    .get_non_empty(keys::DNS_SERVERS)
                    .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
            }),
        };

        Ok(CloneSpec {
            vm_name: vm_name(settings, "createVm")?,
            template: settings.require(keys::TEMPLATE)?.to_string(),
            host: settings
                .get_non_empty(keys::HOST)
                .ok_or_else(|| precondition("createVm", keys::HOST))?
                .to_string(),
            storage: settings
                .get_non_empty(keys::STORAGE)
                .ok_or_else(|| precondition("createVm", keys::STORAGE))?
                .to_string(),
            cpu_count: optional_u32(settings, keys::CPU_COUNT)?,
            memory_mb: settings.get_u64(keys::MEMORY_MB)?,
            disk_size_gb: settings.get_u64(keys::DISK_SIZE_GB)?,
            network,
            domain_name: services.domain_name(settings).to_string(),
            guest_password: services.guest_password(settings)?,
            power_on: services.config.power_on_after_clone,
        })
    }
}

#[async_trait]
impl Action<VmServices> for CreateVm {
    fn name(&self) -> &'static str {
        "createVm"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        if ctx.settings.get_non_empty(keys::TASK_HANDLE).is_some() {
            debug!(instance = %ctx.instance_id, "Clone already started");
            return Ok(Outcome::Creating);
        }

        let spec = Self::clone_spec(ctx)?;
        let client = ctx.services.client(ctx.settings).await?;
        let task = client.call(|c| c.clone_vm(&spec)).await?;

        info!(
            instance = %ctx.instance_id,
            vm = %spec.vm_name,
            template = %spec.template,
            host = %spec.host,
            task = %task,
            "Clone started"
        );
        record_task(ctx.settings, &task);
        Ok(Outcome::Creating)
    }
}

// =============================================================================
// awaitTask
// =============================================================================

/// Poll the recorded hypervisor task
///
/// `pending` while it runs, `success` once it completed, `skipped` when no
/// task is recorded. A failed task fails the instance.
pub struct AwaitTask;

#[async_trait]
impl Action<VmServices> for AwaitTask {
    fn name(&self) -> &'static str {
        "awaitTask"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let Some(handle) = ctx.settings.get_non_empty(keys::TASK_HANDLE) else {
            return Ok(Outcome::Skipped);
        };
        let task = TaskHandle(handle.to_string());

        let client = ctx.services.client(ctx.settings).await?;
        let state = client.call(|c| c.task_state(&task)).await?;
        drop(client);

        match state {
            TaskState::Queued | TaskState::Running { .. } => {
                debug!(instance = %ctx.instance_id, task = %task, state = ?state, "Task still running");
                Ok(Outcome::Pending)
            }
            TaskState::Succeeded => {
                ctx.settings.remove(keys::TASK_HANDLE);
                info!(instance = %ctx.instance_id, task = %task, "Task completed");
                Ok(Outcome::Success)
            }
            TaskState::Failed { reason } => {
                ctx.settings.remove(keys::TASK_HANDLE);
                Err(Error::RemoteTaskFailed {
                    task: task.0,
                    reason,
                })
            }
        }
    }
}

// =============================================================================
// reconfigureVm
// =============================================================================

/// Apply requested CPU and memory changes
pub struct ReconfigureVm;

#[async_trait]
impl Action<VmServices> for ReconfigureVm {
    fn name(&self) -> &'static str {
        "reconfigureVm"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let spec = ReconfigureSpec {
            cpu_count: optional_u32(ctx.settings, keys::CPU_COUNT)?,
            memory_mb: ctx.settings.get_u64(keys::MEMORY_MB)?,
        };
        let name = vm_name(ctx.settings, self.name())?;

        let client = ctx.services.client(ctx.settings).await?;
        let current = client
            .call(|c| c.vm_info(&name))
            .await?
            .ok_or_else(|| Error::RemoteCall {
                endpoint: client.endpoint().to_string(),
                operation: "vm_info".into(),
                reason: format!("VM {} not found", name),
            })?;

        let unchanged = spec.cpu_count.map_or(true, |c| c == current.cpu_count)
            && spec.memory_mb.map_or(true, |m| m == current.memory_mb);
        if unchanged {
            debug!(instance = %ctx.instance_id, vm = %name, "Hardware already matches");
            return Ok(Outcome::Skipped);
        }

        let task = client.call(|c| c.reconfigure_vm(&name, &spec)).await?;
        info!(instance = %ctx.instance_id, vm = %name, task = %task, "Reconfiguration started");
        record_task(ctx.settings, &task);
        Ok(Outcome::Updating)
    }
}

// =============================================================================
// deleteVm
// =============================================================================

/// Destroy the VM; `skipped` if it does not exist
pub struct DeleteVm;

#[async_trait]
impl Action<VmServices> for DeleteVm {
    fn name(&self) -> &'static str {
        "deleteVm"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        if ctx.settings.get_non_empty(keys::TASK_HANDLE).is_some() {
            return Ok(Outcome::Deleting);
        }
        let Some(name) = ctx.settings.get_non_empty(keys::INSTANCE_NAME).map(str::to_string)
        else {
            // never got far enough to be named
            return Ok(Outcome::Skipped);
        };

        let client = ctx.services.client(ctx.settings).await?;
        match client.call(|c| c.delete_vm(&name)).await? {
            Some(task) => {
                info!(instance = %ctx.instance_id, vm = %name, task = %task, "Deletion started");
                record_task(ctx.settings, &task);
                Ok(Outcome::Deleting)
            }
            None => {
                info!(instance = %ctx.instance_id, vm = %name, "VM already gone");
                Ok(Outcome::Skipped)
            }
        }
    }
}

// =============================================================================
// powerOn / powerOff
// =============================================================================

/// Switch the VM to a power state; `skipped` if it is already there
pub struct SetPowerState {
    target: PowerState,
}

impl SetPowerState {
    pub fn on() -> Self {
        Self {
            target: PowerState::PoweredOn,
        }
    }

    pub fn off() -> Self {
        Self {
            target: PowerState::PoweredOff,
        }
    }
}

#[async_trait]
impl Action<VmServices> for SetPowerState {
    fn name(&self) -> &'static str {
        match self.target {
            PowerState::PoweredOn => "powerOn",
            _ => "powerOff",
        }
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let name = vm_name(ctx.settings, self.name())?;
        let client = ctx.services.client(ctx.settings).await?;

        let info = client.call(|c| c.vm_info(&name)).await?;
        if info.as_ref().map(|vm| vm.power_state) == Some(self.target) {
            return Ok(Outcome::Skipped);
        }

        let task = match self.target {
            PowerState::PoweredOn => client.call(|c| c.power_on(&name)).await?,
            _ => client.call(|c| c.power_off(&name)).await?,
        };
        info!(instance = %ctx.instance_id, vm = %name, target = %self.target, task = %task, "Power change started");
        record_task(ctx.settings, &task);
        Ok(Outcome::Updating)
    }
}
