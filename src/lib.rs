//! Provisioning Controller
//!
//! Poll-driven provisioning engine for virtual machines. The host platform
//! persists each instance's settings and polls the controller; every poll
//! advances the instance by one table-driven step.
//!
//! # Architecture
//!
//! ```text
//! host poll ──► PollDispatcher ──► Action ──► { ClientPool, Balancers, Settings }
//!                    ▲                │
//!                    └── next state ◄─┘ outcome token
//! ```
//!
//! # Modules
//!
//! - [`settings`]: ordered key/value bag persisted by the host
//! - [`remote`]: per-endpoint client pool, simulator and collaborators
//! - [`inventory`]: snapshots, refresher and address book
//! - [`balancer`]: host and storage placement
//! - [`engine`]: actions, transition tables and the poll dispatcher
//! - [`controllers`]: the VM and approval controllers
//! - [`api`]: REST surface of the host contract
//! - [`domain`]: ports to external systems
//! - [`error`]: error types and classification

pub mod api;
pub mod balancer;
pub mod controllers;
pub mod domain;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod remote;
pub mod settings;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, RestRouter};

pub use balancer::{
    Balancer, BalancerDocument, BalancerFactory, BalancerKind, BalancerSection, Limit,
    PlacementBalancers,
};

pub use controllers::{
    ApprovalController, ApprovalServices, ApprovalState, VmController, VmControllerConfig,
    VmServices, VmState,
};

pub use domain::ports::{
    ClientFactory, EndpointCredentials, EndpointId, HypervisorClient, InventorySource, Notifier,
    ScriptSource, Secret, SecretCipher,
};

pub use engine::{
    Action, ActionChain, ActionContext, EngineMetrics, InstanceDescription, InstanceStatus,
    Outcome, PollDispatcher, ProvisioningController, StateSet, TransitionTable,
};

pub use error::{Error, ErrorAction, ErrorClass, Result};

pub use inventory::{
    DirectoryInventorySource, InventoryRefresher, InventorySnapshot, InventoryStore,
    RefresherConfig, StaticInventorySource,
};

pub use remote::{
    ClientPool, HttpScriptSource, LogNotifier, PoolConfig, PooledClient, SimulatedClientFactory,
    SimulatedHypervisor, SimulatorConfig,
};

pub use settings::{keys, PlaintextCipher, ProvisioningSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
