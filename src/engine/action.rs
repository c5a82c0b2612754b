//! Actions
//!
//! An action is one named step of a provisioning workflow. It reads and
//! writes the instance settings, may use the controller's shared services,
//! and reports an [`Outcome`]. Actions keep no state between polls; anything
//! that must survive a poll goes into the settings.
//!
//! Errors never leave the action boundary: [`execute`] turns them into
//! `pending` (resource temporarily unavailable, within the retry budget) or
//! `failed` with a localized `ERROR_MESSAGE`. `RETRY_COUNT` counts
//! consecutive polls that hit an unavailable resource; only the dispatcher
//! resets it, once a whole poll passes without such a miss.

use super::messages::{self, MessageKey};
use super::outcome::Outcome;
use super::status::PartialResult;
use crate::error::{Error, ErrorAction, Result};
use crate::settings::{keys, ProvisioningSettings};
use async_trait::async_trait;
use tracing::{debug, error, warn};

// =============================================================================
// Action Context
// =============================================================================

/// Everything an action may touch during one poll
pub struct ActionContext<'a, Svc> {
    pub instance_id: &'a str,
    pub settings: &'a mut ProvisioningSettings,
    pub result: &'a mut PartialResult,
    pub services: &'a Svc,
    /// Polls an instance may wait on an unavailable resource
    pub retry_budget: u32,
}

impl<'a, Svc> ActionContext<'a, Svc> {
    pub fn locale(&self) -> String {
        messages::locale_of(self.settings).to_string()
    }

    /// Convert an error into an outcome at the action boundary
    fn absorb(&mut self, action: &str, err: Error) -> Outcome {
        let locale = self.locale();

        if err.action() == ErrorAction::RetryNextPoll {
            let attempt = self
                .settings
                .get_u64(keys::RETRY_COUNT)
                .ok()
                .flatten()
                .unwrap_or(0)
                + 1;
            if attempt <= u64::from(self.retry_budget) {
                warn!(
                    instance = %self.instance_id,
                    action = %action,
                    attempt,
                    error = %err,
                    "Resource unavailable, retrying on next poll"
                );
                self.settings.set(keys::RETRY_COUNT, attempt.to_string());
                let attempt = attempt.to_string();
                let reason = err.to_string();
                self.result.message(messages::render(
                    &locale,
                    MessageKey::WaitingForResources,
                    &[&reason, &attempt],
                ));
                return Outcome::Pending;
            }
            warn!(instance = %self.instance_id, action = %action, "Retry budget exhausted");
        }

        error!(
            instance = %self.instance_id,
            action = %action,
            class = ?err.class(),
            error = %err,
            "Action failed"
        );
        let reason = err.to_string();
        let text = messages::render(&locale, MessageKey::ActionFailed, &[action, &reason]);
        self.settings.set(keys::ERROR_MESSAGE, text.text.clone());
        self.result.message(text);
        Outcome::Failed
    }
}

// =============================================================================
// Action Trait
// =============================================================================

/// One named workflow step
#[async_trait]
pub trait Action<Svc: Send + Sync>: Send + Sync {
    /// Registry name, e.g. `createVm`
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut ActionContext<'_, Svc>) -> Result<Outcome>;
}

/// Run an action and absorb its error into an outcome
pub async fn execute<Svc: Send + Sync>(
    action: &dyn Action<Svc>,
    ctx: &mut ActionContext<'_, Svc>,
) -> Outcome {
    match action.run(ctx).await {
        Ok(outcome) => {
            debug!(instance = %ctx.instance_id, action = action.name(), outcome = %outcome, "Action completed");
            outcome
        }
        Err(err) => ctx.absorb(action.name(), err),
    }
}

// =============================================================================
// Action Chain
// =============================================================================

/// Runs steps in order while their outcome is in the continue set
pub struct ActionChain<Svc> {
    name: &'static str,
    steps: Vec<Box<dyn Action<Svc>>>,
    continue_on: Vec<Outcome>,
}

impl<Svc: Send + Sync + 'static> ActionChain<Svc> {
    /// Chain continuing on `success` and `skipped`
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
            continue_on: vec![Outcome::Success, Outcome::Skipped],
        }
    }

    pub fn then(mut self, step: impl Action<Svc> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn continue_on(mut self, outcomes: &[Outcome]) -> Self {
        self.continue_on = outcomes.to_vec();
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl<Svc: Send + Sync + 'static> Action<Svc> for ActionChain<Svc> {
    fn name(&self) -> &'static str {
        self.name
    }

    /// The outcome of the last step that ran; `skipped` for an empty chain
    async fn run(&self, ctx: &mut ActionContext<'_, Svc>) -> Result<Outcome> {
        let mut last = Outcome::Skipped;
        for step in &self.steps {
            last = execute(step.as_ref(), ctx).await;
            if !self.continue_on.contains(&last) {
                break;
            }
        }
        Ok(last)
    }
}


#[cfg(test)]
mod tests {
    use super::test_actions::{Fixed, Starved};
    use super::*;

    struct Broken;

    #[async_trait]
    impl Action<()> for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn run(&self, _ctx: &mut ActionContext<'_, ()>) -> Result<Outcome> {
            Err(Error::InvalidInstanceName {
                name: "Bad Name".into(),
                pattern: "^[a-z]+$".into(),
            })
        }
    }

    async fn run_once(action: &dyn Action<()>, settings: &mut ProvisioningSettings) -> Outcome {
        let mut result = PartialResult::default();
        let mut ctx = ActionContext {
            instance_id: "inst-1",
            settings,
            result: &mut result,
            services: &(),
            retry_budget: 2,
        };
        execute(action, &mut ctx).await
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_non_continue_outcome() {
        let chain = ActionChain::<()>::new("chain")
            .then(Fixed("a", Outcome::Success))
            .then(Fixed("b", Outcome::Running))
            .then(Fixed("c", Outcome::Success));
        let mut settings = ProvisioningSettings::new();

        assert_eq!(run_once(&chain, &mut settings).await, Outcome::Running);
        assert!(settings.contains("RAN_a"));
        assert!(settings.contains("RAN_b"));
        assert!(!settings.contains("RAN_c"));
    }

    #[tokio::test]
    async fn test_chain_continues_over_skipped() {
        let chain = ActionChain::<()>::new("chain")
            .then(Fixed("a", Outcome::Skipped))
            .then(Fixed("b", Outcome::Success));
        let mut settings = ProvisioningSettings::new();
        assert_eq!(run_once(&chain, &mut settings).await, Outcome::Success);
        assert_eq!(chain.step_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_error_becomes_failed_with_message() {
        let mut settings = ProvisioningSettings::new();
        settings.set(keys::LOCALE, "de");

        assert_eq!(run_once(&Broken, &mut settings).await, Outcome::Failed);
        let message = settings.get(keys::ERROR_MESSAGE).unwrap();
        assert!(message.starts_with("Aktion broken fehlgeschlagen"));
        assert!(message.contains("Bad Name"));
    }

    #[tokio::test]
    async fn test_resource_errors_wait_within_budget() {
        let mut settings = ProvisioningSettings::new();

        assert_eq!(run_once(&Starved, &mut settings).await, Outcome::Pending);
        assert_eq!(run_once(&Starved, &mut settings).await, Outcome::Pending);
        assert_eq!(settings.get(keys::RETRY_COUNT), Some("2"));
        assert!(!settings.contains(keys::ERROR_MESSAGE));

        assert_eq!(run_once(&Starved, &mut settings).await, Outcome::Failed);
        assert!(settings.contains(keys::ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_chain_steps_keep_retry_count() {
        let chain = ActionChain::<()>::new("chain")
            .then(Fixed("validate", Outcome::Success))
            .then(Starved);
        let mut settings = ProvisioningSettings::new();

        assert_eq!(run_once(&chain, &mut settings).await, Outcome::Pending);
        assert_eq!(run_once(&chain, &mut settings).await, Outcome::Pending);
        assert_eq!(settings.get(keys::RETRY_COUNT), Some("2"));
        assert_eq!(run_once(&chain, &mut settings).await, Outcome::Failed);
    }
}
