//! Domain Ports - Core trait definitions for the provisioning controller
//!
//! These traits define the boundaries between the provisioning engine and
//! external systems. Adapters implement these traits to provide concrete
//! functionality; the simulator in [`crate::remote`] implements the
//! hypervisor side for standalone mode and tests.

use crate::error::Result;
use crate::inventory::InventorySnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Endpoint Identity
// =============================================================================

/// Identity of a hypervisor management endpoint (pool key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A plaintext secret that never shows up in `Debug` output
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(********)")
    }
}

/// Credentials used when a pool has to open a fresh session
#[derive(Debug, Clone, Default)]
pub struct EndpointCredentials {
    pub user: String,
    pub password: Secret,
}

// =============================================================================
// Remote Objects
// =============================================================================

/// Process-unique identity of one physical client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Handle of an asynchronous hypervisor task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub String);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a hypervisor task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running { progress: u8 },
    Succeeded,
    Failed { reason: String },
}

/// Power state of a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::PoweredOn => write!(f, "poweredOn"),
            PowerState::PoweredOff => write!(f, "poweredOff"),
            PowerState::Suspended => write!(f, "suspended"),
        }
    }
}

/// What the management API reports about a VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmInfo {
    pub name: String,
    pub host: String,
    pub storage: String,
    pub power_state: PowerState,
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub cpu_count: u32,
    pub memory_mb: u64,
}

/// Request to clone a VM from a template
#[derive(Debug, Clone)]
pub struct CloneSpec {
    pub vm_name: String,
    pub template: String,
    pub host: String,
    pub storage: String,
    pub cpu_count: Option<u32>,
    pub memory_mb: Option<u64>,
    pub disk_size_gb: Option<u64>,
    pub network: Option<NetworkSettings>,
    pub domain_name: String,
    pub guest_password: Option<Secret>,
    pub power_on: bool,
}

/// Guest network configuration applied during customization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub network: String,
    pub ip_address: String,
    pub gateway: Option<String>,
    pub subnet_mask: Option<String>,
    pub dns_servers: Vec<String>,
}

/// Request to change the hardware of an existing VM
#[derive(Debug, Clone, Default)]
pub struct ReconfigureSpec {
    pub cpu_count: Option<u32>,
    pub memory_mb: Option<u64>,
}

/// A script to run inside the guest
#[derive(Debug, Clone)]
pub struct ScriptSpec {
    pub content: String,
    pub user: String,
    pub password: Secret,
}

/// State of a guest script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Running,
    Exited { code: i32 },
}

// =============================================================================
// Hypervisor Client Port
// =============================================================================

/// One authenticated session against a management endpoint
///
/// Implementations are handed out by [`crate::remote::ClientPool`] and are
/// never used by two borrowers at the same time.
#[async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Physical identity of this session
    fn id(&self) -> ClientId;

    /// Endpoint this session is bound to
    fn endpoint(&self) -> &EndpointId;

    /// Whether the session is still authenticated
    async fn is_session_valid(&self) -> bool;

    /// Start cloning a VM from a template
    async fn clone_vm(&self, spec: &CloneSpec) -> Result<TaskHandle>;

    /// Poll a task
    async fn task_state(&self, task: &TaskHandle) -> Result<TaskState>;

    /// Start a hardware reconfiguration
    async fn reconfigure_vm(&self, vm_name: &str, spec: &ReconfigureSpec) -> Result<TaskHandle>;

    /// Start powering a VM on
    async fn power_on(&self, vm_name: &str) -> Result<TaskHandle>;

    /// Start powering a VM off
    async fn power_off(&self, vm_name: &str) -> Result<TaskHandle>;

    /// Start destroying a VM; `None` if the VM does not exist
    async fn delete_vm(&self, vm_name: &str) -> Result<Option<TaskHandle>>;

    /// Look up a VM
    async fn vm_info(&self, vm_name: &str) -> Result<Option<VmInfo>>;

    /// Start a script inside the guest, returning its process id
    async fn start_script(&self, vm_name: &str, script: &ScriptSpec) -> Result<i64>;

    /// Poll a guest script
    async fn script_state(&self, vm_name: &str, pid: i64) -> Result<ScriptState>;
}

/// Opens and validates sessions for the client pool
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Open and authenticate a new session
    async fn connect(
        &self,
        endpoint: &EndpointId,
        credentials: &EndpointCredentials,
    ) -> Result<Box<dyn HypervisorClient>>;

    /// Check a session before it is handed out
    async fn validate(&self, client: &dyn HypervisorClient) -> bool {
        client.is_session_valid().await
    }
}

// =============================================================================
// Host Platform Collaborators
// =============================================================================

/// Opaque encryption capability provided by the host platform
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// Operator notification (mail delivery lives outside the controller)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Where guest scripts are fetched from
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Produces complete inventory snapshots (importers live outside)
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn load(&self) -> Result<InventorySnapshot>;

    /// Human readable name for logs
    fn describe(&self) -> String;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ClientFactoryRef = Arc<dyn ClientFactory>;
pub type SecretCipherRef = Arc<dyn SecretCipher>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type ScriptSourceRef = Arc<dyn ScriptSource>;
pub type InventorySourceRef = Arc<dyn InventorySource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_masked() {
        let creds = EndpointCredentials {
            user: "admin".into(),
            password: Secret::new("hunter2"),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_power_state_display() {
        assert_eq!(format!("{}", PowerState::PoweredOn), "poweredOn");
        assert_eq!(format!("{}", PowerState::PoweredOff), "poweredOff");
    }
}
