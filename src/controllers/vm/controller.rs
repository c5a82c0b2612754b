//! VM controller entry points and transition table

use super::actions::{
    AwaitOperator, AwaitTask, CheckScript, CreateVm, DeleteVm, ExecuteScript, ReconfigureVm,
    ReleaseIpAddress, ReserveIpAddress, SelectPlacement, SetPowerState, SuspendForManualStep,
    ValidateInstanceName,
};
use super::services::VmServices;
use super::states::VmState;
use crate::engine::{
    unsupported, ActionChain, DispatcherConfig, EngineMetrics, InstanceDescription,
    InstanceStatus, NotifyParameters, Outcome, PollDispatcher, ProvisioningController,
    StoredState, TransitionTable,
};
use crate::error::{Error, Result};
use crate::settings::{keys, ProvisioningSettings};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const CONTROLLER_NAME: &str = "vm";

/// Build the VM workflow
pub fn transition_table() -> Result<TransitionTable<VmState, VmServices>> {
    use Outcome::*;
    use VmState as S;

    TransitionTable::builder()
        .on(
            S::CreationRequested,
            ActionChain::new("requestCreation")
                .then(ValidateInstanceName)
                .then(SelectPlacement)
                .then(ReserveIpAddress)
                .then(CreateVm),
            &[
                (Creating, S::Creating),
                (Pending, S::CreationRequested),
                (Failed, S::Failed),
            ],
        )
        .on(
            S::Creating,
            ActionChain::new("awaitCreation")
                .then(AwaitTask)
                .then(ExecuteScript)
                .then(SuspendForManualStep),
            &[
                (Pending, S::Creating),
                (Success, S::Finished),
                (Skipped, S::Finished),
                (Running, S::ScriptExecuting),
                (Suspended, S::ManualStepPending),
                (Failed, S::Failed),
            ],
        )
        .on(
            S::ScriptExecuting,
            ActionChain::new("awaitScript")
                .then(CheckScript)
                .then(SuspendForManualStep),
            &[
                (Pending, S::ScriptExecuting),
                (Success, S::Finished),
                (Skipped, S::Finished),
                (Suspended, S::ManualStepPending),
                (Failed, S::Failed),
            ],
        )
        .on(
            S::ManualStepPending,
            AwaitOperator,
            &[(Pending, S::ManualStepPending)],
        )
        .on(
            S::ModificationRequested,
            ReconfigureVm,
            &[
                (Updating, S::Updating),
                (Skipped, S::Finished),
                (Pending, S::ModificationRequested),
                (Failed, S::Failed),
            ],
        )
        .on(
            S::ActivationRequested,
            SetPowerState::on(),
            &[
                (Updating, S::Updating),
                (Skipped, S::Finished),
                (Pending, S::ActivationRequested),
                (Failed, S::Failed),
            ],
        )
        .on(
            S::DeactivationRequested,
            SetPowerState::off(),
            &[
                (Updating, S::Updating),
                (Skipped, S::Finished),
                (Pending, S::DeactivationRequested),
                (Failed, S::Failed),
            ],
        )
        .on(
            S::Updating,
            AwaitTask,
            &[
                (Pending, S::Updating),
                (Success, S::Finished),
                (Skipped, S::Finished),
                (Failed, S::Failed),
            ],
        )
        .on(
            S::DeletionRequested,
            DeleteVm,
            &[
                (Deleting, S::Deleting),
                (Skipped, S::Deleting),
                (Pending, S::DeletionRequested),
                (Failed, S::Failed),
            ],
        )
        .on(
            S::Deleting,
            ActionChain::new("awaitDeletion")
                .then(AwaitTask)
                .then(ReleaseIpAddress),
            &[
                (Pending, S::Deleting),
                (Success, S::Deleted),
                (Skipped, S::Deleted),
                (Failed, S::Failed),
            ],
        )
        .build()
}

/// `<id>: <name>.<domain> (<address>) on <host>/<storage>`
fn access_info(instance_id: &str, settings: &ProvisioningSettings, default_domain: &str) -> String {
    let field = |key: &str| settings.get_non_empty(key).unwrap_or("-").to_string();
    format!(
        "{}: {}.{} ({}) on {}/{}",
        instance_id,
        field(keys::INSTANCE_NAME),
        settings
            .get_non_empty(keys::DOMAIN_NAME)
            .unwrap_or(default_domain),
        settings.get_non_empty(keys::IP_ADDRESS).unwrap_or("dhcp"),
        field(keys::HOST),
        field(keys::STORAGE),
    )
}

/// Provisions VMs on hypervisor endpoints
pub struct VmController {
    dispatcher: PollDispatcher<VmState, VmServices>,
}

impl VmController {
    pub fn new(services: Arc<VmServices>, metrics: EngineMetrics) -> Result<Self> {
        let config = DispatcherConfig {
            retry_budget: services.config.retry_budget,
        };
        let domain = services.config.default_domain_name.clone();
        let dispatcher = PollDispatcher::new(CONTROLLER_NAME, transition_table()?, services, config)
            .with_access_info(Arc::new(
                move |instance_id: &str, settings: &ProvisioningSettings| {
                    access_info(instance_id, settings, &domain)
                },
            ))
            .with_metrics(metrics);
        Ok(Self { dispatcher })
    }

    pub fn services(&self) -> &VmServices {
        self.dispatcher.services()
    }

    fn state(&self, settings: &ProvisioningSettings) -> StoredState<VmState> {
        self.dispatcher.stored_state(settings)
    }

    /// Entry point allowed only from a finished instance
    fn from_finished(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
        operation: &str,
        target: VmState,
    ) -> Result<InstanceDescription> {
        match self.state(&settings) {
            StoredState::Known(VmState::Finished) => {
                Ok(self.dispatcher.begin(instance_id, settings, target))
            }
            _ => Err(unsupported(&settings, operation)),
        }
    }
}

#[async_trait]
impl ProvisioningController for VmController {
    fn name(&self) -> &'static str {
        CONTROLLER_NAME
    }

    async fn create_instance(
        &self,
        instance_id: &str,
        mut settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        match self.state(&settings) {
            StoredState::Missing | StoredState::Known(VmState::Failed) => {}
            _ => return Err(unsupported(&settings, "create")),
        }
        settings.require(keys::ENDPOINT)?;
        settings.require(keys::TEMPLATE)?;
        settings.seal(
            &[keys::ENDPOINT_PASSWORD, keys::GUEST_PASSWORD],
            self.services().cipher.as_ref(),
        )?;

        // leftovers of a failed attempt
        settings.remove(keys::TASK_HANDLE);
        settings.remove(keys::SCRIPT_PID);

        Ok(self
            .dispatcher
            .begin(instance_id, settings, VmState::CreationRequested))
    }

    async fn modify_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        self.from_finished(instance_id, settings, "modify", VmState::ModificationRequested)
    }

    async fn delete_instance(
        &self,
        instance_id: &str,
        mut settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        match self.state(&settings) {
            StoredState::Known(state @ (VmState::DeletionRequested | VmState::Deleting)) => {
                info!(instance = %instance_id, state = %state, "Deletion already in progress");
                return Ok(InstanceDescription {
                    changed_settings: settings,
                    localized_messages: Vec::new(),
                });
            }
            StoredState::Known(state) if state.is_busy() => {
                return Err(unsupported(&settings, "delete"));
            }
            StoredState::Known(VmState::Deleted) | StoredState::Unknown(_) => {
                return Err(unsupported(&settings, "delete"));
            }
            StoredState::Known(_) | StoredState::Missing => {}
        }

        settings.remove(keys::TASK_HANDLE);
        Ok(self
            .dispatcher
            .begin(instance_id, settings, VmState::DeletionRequested))
    }

    async fn activate_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        self.from_finished(instance_id, settings, "activate", VmState::ActivationRequested)
    }

    async fn deactivate_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        self.from_finished(instance_id, settings, "deactivate", VmState::DeactivationRequested)
    }

    /// `command=finish` completes the manual step
    async fn notify_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
        parameters: &NotifyParameters,
    ) -> Result<InstanceDescription> {
        if self.state(&settings) != StoredState::Known(VmState::ManualStepPending) {
            return Err(unsupported(&settings, "notify"));
        }
        match parameters.get("command").map(String::as_str) {
            Some("finish") => {
                info!(instance = %instance_id, "Operator completed the manual step");
                Ok(self.dispatcher.begin(instance_id, settings, VmState::Finished))
            }
            other => Err(Error::InvalidSetting {
                key: "command".into(),
                reason: format!("unsupported notification {:?}", other.unwrap_or_default()),
            }),
        }
    }

    async fn get_instance_status(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> InstanceStatus {
        self.dispatcher
            .get_instance_status(instance_id, settings)
            .await
    }
}
