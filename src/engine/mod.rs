//! Provisioning Engine
//!
//! Generic, table-driven state machine that advances an instance by one step
//! per host poll:
//! - `state`: controller state sets and `STATUS` parsing
//! - `outcome`: tokens actions report
//! - `action`: action trait, chains and the error boundary
//! - `table`: `(state, outcome) -> next state` tables
//! - `dispatcher`: the poll handler
//! - `controller`: the host-facing entry points

pub mod action;
pub mod controller;
pub mod dispatcher;
pub mod messages;
pub mod metrics;
pub mod outcome;
pub mod state;
pub mod status;
pub mod table;

pub use action::{execute, Action, ActionChain, ActionContext};
pub use controller::{unsupported, ControllerRef, NotifyParameters, ProvisioningController};
pub use dispatcher::{AccessInfoFn, DispatcherConfig, PollDispatcher};
pub use messages::{LocalizedText, MessageKey};
pub use metrics::EngineMetrics;
pub use outcome::Outcome;
pub use state::{StateSet, StoredState};
pub use status::{InstanceDescription, InstanceStatus, PartialResult};
pub use table::{StateHandler, TransitionTable, TransitionTableBuilder};
