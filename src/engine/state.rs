//! Provisioning state sets
//!
//! Each controller defines its own closed set of states. The engine only
//! needs to know how to parse them from the `STATUS` setting and which ones
//! end the lifecycle.

use crate::settings::{keys, ProvisioningSettings};
use std::fmt;
use std::hash::Hash;

/// A controller's provisioning states
pub trait StateSet:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Terminal failure state; also used for unknown or missing states
    const FAILED: Self;

    /// Every state of the set
    fn all() -> &'static [Self];

    /// Token stored under `STATUS`
    fn as_str(&self) -> &'static str;

    /// Terminal success (e.g. `FINISHED`)
    fn is_success(&self) -> bool;

    /// Terminal removal (e.g. `DELETED`, `DESTROYED`)
    fn is_removed(&self) -> bool;

    /// Waits for an external event; timer-driven polling is disabled
    fn suspends_timer(&self) -> bool {
        false
    }

    fn parse(token: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.as_str() == token)
    }

    fn is_terminal(&self) -> bool {
        self.is_success() || self.is_removed() || *self == Self::FAILED
    }

    /// The host may stop polling and consider the request done
    fn is_ready(&self) -> bool {
        self.is_success() || self.is_removed()
    }
}

/// Parsed `STATUS` of an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredState<S> {
    Known(S),
    Missing,
    Unknown(String),
}

impl<S: StateSet> StoredState<S> {
    pub fn read(settings: &ProvisioningSettings) -> Self {
        match settings.get_non_empty(keys::STATUS) {
            None => StoredState::Missing,
            Some(token) => match S::parse(token) {
                Some(state) => StoredState::Known(state),
                None => StoredState::Unknown(token.to_string()),
            },
        }
    }

    /// The state to act on; anything unparseable is `FAILED`
    pub fn effective(&self) -> S {
        match self {
            StoredState::Known(state) => *state,
            _ => S::FAILED,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_states::Toy;
    use super::*;

    #[test]
    fn test_unknown_and_missing_are_failed() {
        let settings = ProvisioningSettings::new();
        assert_eq!(StoredState::<Toy>::read(&settings), StoredState::Missing);
        assert_eq!(StoredState::<Toy>::read(&settings).effective(), Toy::Failed);

        let mut settings = ProvisioningSettings::new();
        settings.set(keys::STATUS, "EXPLODED");
        assert_eq!(
            StoredState::<Toy>::read(&settings),
            StoredState::Unknown("EXPLODED".into())
        );
        assert_eq!(StoredState::<Toy>::read(&settings).effective(), Toy::Failed);
    }

    #[test]
    fn test_ready_only_for_success_and_removal() {
        for state in Toy::all() {
            let expected = matches!(state, Toy::Done | Toy::Gone);
            assert_eq!(state.is_ready(), expected, "{}", state);
        }
        assert!(Toy::Failed.is_terminal());
        assert!(!Toy::Failed.is_ready());
    }
}
