//! Results returned to the host platform

use super::messages::LocalizedText;
use crate::settings::ProvisioningSettings;
use serde::{Deserialize, Serialize};

/// What one poll reports back to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    /// The request is complete (created, or removed)
    pub is_ready: bool,
    /// Settings to persist, including the new `STATUS`
    pub changed_settings: ProvisioningSettings,
    /// How to reach the instance; only set once it is finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_info: Option<String>,
    #[serde(default)]
    pub localized_messages: Vec<LocalizedText>,
    /// Whether the host should keep polling on its timer
    pub run_with_timer: bool,
}

impl InstanceStatus {
    /// Token of the state the poll ended in
    pub fn state(&self) -> Option<&str> {
        self.changed_settings.get(crate::settings::keys::STATUS)
    }
}

/// Result of a lifecycle entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescription {
    pub changed_settings: ProvisioningSettings,
    #[serde(default)]
    pub localized_messages: Vec<LocalizedText>,
}

/// What actions may contribute to the poll result besides settings
#[derive(Debug, Clone, Default)]
pub struct PartialResult {
    pub access_info: Option<String>,
    pub messages: Vec<LocalizedText>,
}

impl PartialResult {
    pub fn message(&mut self, text: LocalizedText) {
        self.messages.push(text);
    }
}
