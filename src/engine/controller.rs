//! Host contract of a provisioning controller

use super::status::{InstanceDescription, InstanceStatus};
use crate::error::{Error, Result};
use crate::settings::ProvisioningSettings;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parameters passed with a notification, e.g. `command=finish`
pub type NotifyParameters = BTreeMap<String, String>;

/// The entry points a host platform calls
///
/// Lifecycle entry points only validate the request and record the
/// requested state; all work happens in later polls.
#[async_trait]
pub trait ProvisioningController: Send + Sync {
    /// Controller name used in routes and metrics
    fn name(&self) -> &'static str;

    async fn create_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription>;

    async fn modify_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription>;

    async fn delete_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription>;

    async fn activate_instance(
        &self,
        _instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        Err(unsupported(&settings, "activate"))
    }

    async fn deactivate_instance(
        &self,
        _instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        Err(unsupported(&settings, "deactivate"))
    }

    async fn notify_instance(
        &self,
        _instance_id: &str,
        settings: ProvisioningSettings,
        _parameters: &NotifyParameters,
    ) -> Result<InstanceDescription> {
        Err(unsupported(&settings, "notify"))
    }

    /// Host poll
    async fn get_instance_status(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> InstanceStatus;
}

pub type ControllerRef = Arc<dyn ProvisioningController>;

/// Error for an entry point the current state does not allow
pub fn unsupported(settings: &ProvisioningSettings, operation: &str) -> Error {
    Error::UnsupportedOperation {
        state: settings
            .get(crate::settings::keys::STATUS)
            .unwrap_or("<none>")
            .to_string(),
        operation: operation.to_string(),
    }
}
