//! VM Actions
//!
//! Workflow steps of the VM controller, grouped by what they touch:
//! - `placement`: name validation, host/storage selection, guest addresses
//! - `lifecycle`: hypervisor tasks (clone, reconfigure, power, delete)
//! - `guest`: customization scripts and the operator hand-off

pub mod guest;
pub mod lifecycle;
pub mod placement;

pub use guest::{AwaitOperator, CheckScript, ExecuteScript, SuspendForManualStep};
pub use lifecycle::{AwaitTask, CreateVm, DeleteVm, ReconfigureVm, SetPowerState};
pub use placement::{ReleaseIpAddress, ReserveIpAddress, SelectPlacement, ValidateInstanceName};
