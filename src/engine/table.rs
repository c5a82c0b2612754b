//! Transition table
//!
//! Per controller: which action runs in which state, and which state each
//! outcome of that action leads to. Outcomes a handler does not map, and
//! states without a handler, lead to `FAILED`.

use super::action::Action;
use super::outcome::Outcome;
use super::state::StateSet;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Action and outcome mapping for one state
pub struct StateHandler<S, Svc> {
    action: Box<dyn Action<Svc>>,
    transitions: HashMap<Outcome, S>,
}

impl<S: StateSet, Svc: Send + Sync> StateHandler<S, Svc> {
    pub fn action(&self) -> &dyn Action<Svc> {
        self.action.as_ref()
    }

    /// Next state for an outcome, if mapped
    pub fn target(&self, outcome: Outcome) -> Option<S> {
        self.transitions.get(&outcome).copied()
    }
}

/// Deterministic `(state, outcome) -> next state` table
pub struct TransitionTable<S, Svc> {
    handlers: HashMap<S, StateHandler<S, Svc>>,
}

impl<S: StateSet, Svc: Send + Sync + 'static> TransitionTable<S, Svc> {
    pub fn builder() -> TransitionTableBuilder<S, Svc> {
        TransitionTableBuilder {
            handlers: HashMap::new(),
            duplicate: None,
        }
    }

    pub fn handler(&self, state: S) -> Option<&StateHandler<S, Svc>> {
        self.handlers.get(&state)
    }

    /// Next state; anything unmodeled is `FAILED`
    pub fn next_state(&self, state: S, outcome: Outcome) -> S {
        self.handlers
            .get(&state)
            .and_then(|h| h.target(outcome))
            .unwrap_or(S::FAILED)
    }

    /// States that have a handler
    pub fn states(&self) -> Vec<S> {
        S::all()
            .iter()
            .copied()
            .filter(|s| self.handlers.contains_key(s))
            .collect()
    }
}

impl<S: StateSet, Svc: Send + Sync + 'static> fmt::Debug for TransitionTable<S, Svc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for state in self.states() {
            if let Some(handler) = self.handlers.get(&state) {
                map.entry(&state.as_str(), &handler.action.name());
            }
        }
        map.finish()
    }
}

/// Builder validating that the table is complete
pub struct TransitionTableBuilder<S, Svc> {
    handlers: HashMap<S, StateHandler<S, Svc>>,
    duplicate: Option<S>,
}

impl<S: StateSet, Svc: Send + Sync + 'static> TransitionTableBuilder<S, Svc> {
    /// Run `action` in `state` and move according to `transitions`
    pub fn on(
        mut self,
        state: S,
        action: impl Action<Svc> + 'static,
        transitions: &[(Outcome, S)],
    ) -> Self {
        let handler = StateHandler {
            action: Box::new(action),
            transitions: transitions.iter().copied().collect(),
        };
        if self.handlers.insert(state, handler).is_some() {
            self.duplicate.get_or_insert(state);
        }
        self
    }

    /// Every non-terminal state needs exactly one handler
    pub fn build(self) -> Result<TransitionTable<S, Svc>> {
        if let Some(state) = self.duplicate {
            return Err(Error::Configuration(format!(
                "state {} has more than one handler",
                state
            )));
        }

        for state in S::all() {
            let has_handler = self.handlers.contains_key(state);
            if state.is_terminal() && has_handler {
                return Err(Error::Configuration(format!(
                    "terminal state {} must not have a handler",
                    state
                )));
            }
            if !state.is_terminal() && !has_handler {
                return Err(Error::Configuration(format!(
                    "state {} has no handler",
                    state
                )));
            }
        }

        Ok(TransitionTable {
            handlers: self.handlers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::test_actions::Fixed;
    use crate::engine::state::test_states::Toy;
    use assert_matches::assert_matches;

    fn complete() -> TransitionTableBuilder<Toy, ()> {
        TransitionTable::builder()
            .on(
                Toy::Requested,
                Fixed("start", Outcome::Creating),
                &[(Outcome::Creating, Toy::Working)],
            )
            .on(
                Toy::Working,
                Fixed("work", Outcome::Success),
                &[(Outcome::Success, Toy::Done), (Outcome::Pending, Toy::Working)],
            )
            .on(Toy::Waiting, Fixed("wait", Outcome::Pending), &[(Outcome::Pending, Toy::Waiting)])
    }

    #[test]
    fn test_unmapped_outcome_is_failed() {
        let table = complete().build().unwrap();
        assert_eq!(table.next_state(Toy::Working, Outcome::Success), Toy::Done);
        assert_eq!(table.next_state(Toy::Working, Outcome::Running), Toy::Failed);
        assert_eq!(table.next_state(Toy::Done, Outcome::Success), Toy::Failed);
    }

    #[test]
    fn test_missing_handler_rejected() {
        let builder = TransitionTable::<Toy, ()>::builder().on(
            Toy::Requested,
            Fixed("start", Outcome::Creating),
            &[(Outcome::Creating, Toy::Working)],
        );
        assert_matches!(builder.build(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_terminal_handler_rejected() {
        let builder = complete().on(Toy::Done, Fixed("again", Outcome::Success), &[]);
        assert_matches!(builder.build(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_duplicate_handler_rejected() {
        let builder = complete().on(Toy::Working, Fixed("other", Outcome::Success), &[]);
        assert_matches!(builder.build(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_debug_lists_actions_by_state() {
        let table = complete().build().unwrap();
        assert_eq!(
            format!("{:?}", table),
            r#"{"REQUESTED": "start", "WORKING": "work", "WAITING": "wait"}"#
        );
    }

    #[test]
    fn test_states_in_declaration_order() {
        let table = complete().build().unwrap();
        assert_eq!(table.states(), vec![Toy::Requested, Toy::Working, Toy::Waiting]);
    }
}
