//! Reserved settings keys
//!
//! Keys are case-sensitive. Anything not listed here is passed through
//! untouched by the engine.

/// Current provisioning state
pub const STATUS: &str = "STATUS";
/// Localized message describing the last failure
pub const ERROR_MESSAGE: &str = "ERROR_MESSAGE";
/// Number of polls spent waiting on an unavailable resource
pub const RETRY_COUNT: &str = "RETRY_COUNT";
/// Locale used for messages written to the settings
pub const LOCALE: &str = "LOCALE";

// =============================================================================
// Endpoint
// =============================================================================

/// Identity of the hypervisor management endpoint
pub const ENDPOINT: &str = "ENDPOINT";
/// User for the management endpoint
pub const ENDPOINT_USER: &str = "ENDPOINT_USER";
/// Password for the management endpoint (always encrypted)
pub const ENDPOINT_PASSWORD: &str = "ENDPOINT_PASSWORD";

// =============================================================================
// Instance
// =============================================================================

/// Template the VM is cloned from
pub const TEMPLATE: &str = "TEMPLATE";
/// Requested VM name
pub const INSTANCE_NAME: &str = "INSTANCE_NAME";
/// Pattern the requested name must match
pub const INSTANCE_NAME_PATTERN: &str = "INSTANCE_NAME_PATTERN";
/// DNS domain of the guest
pub const DOMAIN_NAME: &str = "DOMAIN_NAME";
/// Number of virtual CPUs
pub const CPU_COUNT: &str = "CPU_COUNT";
/// Memory in MB
pub const MEMORY_MB: &str = "MEMORY_MB";
/// Requested system disk size in GB
pub const DISK_SIZE_GB: &str = "DISK_SIZE_GB";
/// Guest administrator password (always encrypted)
pub const GUEST_PASSWORD: &str = "GUEST_PASSWORD";

// =============================================================================
// Placement & Network
// =============================================================================

/// Compute host chosen by the host balancer
pub const HOST: &str = "HOST";
/// Storage chosen by the storage balancer
pub const STORAGE: &str = "STORAGE";
/// Network the address was reserved in
pub const NETWORK: &str = "NETWORK";
/// Reserved guest address
pub const IP_ADDRESS: &str = "IP_ADDRESS";
/// Gateway of the reserved network
pub const GATEWAY: &str = "GATEWAY";
/// Subnet mask of the reserved network
pub const SUBNET_MASK: &str = "SUBNET_MASK";
/// Comma separated DNS servers of the reserved network
pub const DNS_SERVERS: &str = "DNS_SERVERS";

// =============================================================================
// Asynchronous Work
// =============================================================================

/// Handle of the running hypervisor task
pub const TASK_HANDLE: &str = "TASK_HANDLE";
/// URL of the guest customization script
pub const SCRIPT_URL: &str = "SCRIPT_URL";
/// Process id of the running guest script
pub const SCRIPT_PID: &str = "SCRIPT_PID";
/// Operator address notified before the manual step
pub const MAIL_FOR_COMPLETION: &str = "MAIL_FOR_COMPLETION";
