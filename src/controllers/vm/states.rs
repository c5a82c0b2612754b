//! VM provisioning states

use crate::engine::StateSet;
use std::fmt;

/// Lifecycle of a virtual machine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmState {
    CreationRequested,
    Creating,
    ScriptExecuting,
    ManualStepPending,
    ModificationRequested,
    ActivationRequested,
    DeactivationRequested,
    Updating,
    DeletionRequested,
    Deleting,
    Finished,
    Deleted,
    Failed,
}

const ALL: &[VmState] = &[
    VmState::CreationRequested,
    VmState::Creating,
    VmState::ScriptExecuting,
    VmState::ManualStepPending,
    VmState::ModificationRequested,
    VmState::ActivationRequested,
    VmState::DeactivationRequested,
    VmState::Updating,
    VmState::DeletionRequested,
    VmState::Deleting,
    VmState::Finished,
    VmState::Deleted,
    VmState::Failed,
];

impl StateSet for VmState {
    const FAILED: Self = VmState::Failed;

    fn all() -> &'static [Self] {
        ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            VmState::CreationRequested => "CREATION_REQUESTED",
            VmState::Creating => "CREATING",
            VmState::ScriptExecuting => "SCRIPT_EXECUTING",
            VmState::ManualStepPending => "MANUAL_STEP_PENDING",
            VmState::ModificationRequested => "MODIFICATION_REQUESTED",
            VmState::ActivationRequested => "ACTIVATION_REQUESTED",
            VmState::DeactivationRequested => "DEACTIVATION_REQUESTED",
            VmState::Updating => "UPDATING",
            VmState::DeletionRequested => "DELETION_REQUESTED",
            VmState::Deleting => "DELETING",
            VmState::Finished => "FINISHED",
            VmState::Deleted => "DELETED",
            VmState::Failed => "FAILED",
        }
    }

    fn is_success(&self) -> bool {
        *self == VmState::Finished
    }

    fn is_removed(&self) -> bool {
        *self == VmState::Deleted
    }

    fn suspends_timer(&self) -> bool {
        *self == VmState::ManualStepPending
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VmState {
    /// States in which hypervisor work may be in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            VmState::Creating | VmState::ScriptExecuting | VmState::Updating | VmState::Deleting
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_round_trip() {
        for state in VmState::all() {
            assert_eq!(VmState::parse(state.as_str()), Some(*state));
        }
        assert_eq!(VmState::parse("creating"), None);
    }

    #[test]
    fn test_manual_step_stops_timer() {
        assert!(VmState::ManualStepPending.suspends_timer());
        assert!(!VmState::ManualStepPending.is_terminal());
        assert!(VmState::Deleted.is_ready());
        assert!(!VmState::Failed.is_ready());
    }
}
