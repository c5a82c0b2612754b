//! VM controller configuration

/// Defaults applied when an instance does not override them
#[derive(Debug, Clone)]
pub struct VmControllerConfig {
    /// Guest DNS domain when `DOMAIN_NAME` is not set
    pub default_domain_name: String,
    /// Name pattern when `INSTANCE_NAME_PATTERN` is not set
    pub instance_name_pattern: String,
    /// Polls an instance may wait for capacity or a pooled client
    pub retry_budget: u32,
    /// Guest account used to run customization scripts
    pub script_user: String,
    /// Power the clone on once it is created
    pub power_on_after_clone: bool,
}

impl Default for VmControllerConfig {
    fn default() -> Self {
        Self {
            default_domain_name: "localdomain".to_string(),
            instance_name_pattern: "^[a-z][a-z0-9-]{0,62}$".to_string(),
            retry_budget: 10,
            script_user: "root".to_string(),
            power_on_after_clone: true,
        }
    }
}
