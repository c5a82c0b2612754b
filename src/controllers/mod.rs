//! Provisioning Controllers
//!
//! Concrete controllers built on the engine:
//! - `vm`: virtual machines cloned from hypervisor templates
//! - `approval`: requests parked until an approver decides

pub mod approval;
pub mod vm;

pub use approval::{ApprovalController, ApprovalServices, ApprovalState};
pub use vm::{VmController, VmControllerConfig, VmServices, VmState};
