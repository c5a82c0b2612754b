//! Poll Dispatcher
//!
//! Answers one host poll: read the state from the settings, run the state's
//! action once, move to the state its outcome maps to and report the result.
//! Waiting is always expressed as staying in a state; nothing blocks across
//! polls.

use super::action::{execute, ActionContext};
use super::messages::{self, MessageKey};
use super::metrics::EngineMetrics;
use super::outcome::Outcome;
use super::state::{StateSet, StoredState};
use super::status::{InstanceDescription, InstanceStatus, PartialResult};
use super::table::TransitionTable;
use crate::settings::{keys, ProvisioningSettings};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Formats access info for a finished instance
pub type AccessInfoFn = Arc<dyn Fn(&str, &ProvisioningSettings) -> String + Send + Sync>;

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Polls an instance may wait on an unavailable resource before failing
    pub retry_budget: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { retry_budget: 10 }
    }
}

/// Table-driven poll handler of one controller
pub struct PollDispatcher<S, Svc> {
    controller: &'static str,
    table: TransitionTable<S, Svc>,
    services: Arc<Svc>,
    config: DispatcherConfig,
    access_info: AccessInfoFn,
    metrics: EngineMetrics,
}

impl<S: StateSet, Svc: Send + Sync + 'static> PollDispatcher<S, Svc> {
    pub fn new(
        controller: &'static str,
        table: TransitionTable<S, Svc>,
        services: Arc<Svc>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            controller,
            table,
            services,
            config,
            access_info: Arc::new(|instance_id: &str, _: &ProvisioningSettings| {
                instance_id.to_string()
            }),
            metrics: EngineMetrics::new(),
        }
    }

    pub fn with_access_info(mut self, access_info: AccessInfoFn) -> Self {
        self.access_info = access_info;
        self
    }

    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn services(&self) -> &Svc {
        &self.services
    }

    pub fn table(&self) -> &TransitionTable<S, Svc> {
        &self.table
    }

    /// Current state of an instance as stored in its settings
    pub fn stored_state(&self, settings: &ProvisioningSettings) -> StoredState<S> {
        StoredState::read(settings)
    }

    /// Host poll entry point
    pub async fn get_instance_status(
        &self,
        instance_id: &str,
        mut settings: ProvisioningSettings,
    ) -> InstanceStatus {
        let started = Instant::now();
        let mut result = PartialResult::default();

        let (current, outcome, next) = match StoredState::<S>::read(&settings) {
            StoredState::Known(state) if state.is_terminal() => {
                debug!(instance = %instance_id, state = %state, "Instance is in a terminal state");
                (state, None, state)
            }
            StoredState::Known(state) => match self.table.handler(state) {
                Some(handler) => {
                    let retries_before = settings.get(keys::RETRY_COUNT).map(str::to_string);
                    let mut ctx = ActionContext {
                        instance_id,
                        settings: &mut settings,
                        result: &mut result,
                        services: self.services.as_ref(),
                        retry_budget: self.config.retry_budget,
                    };
                    let outcome = execute(handler.action(), &mut ctx).await;
                    settle_retry_count(&mut settings, retries_before.as_deref(), outcome);

                    let next = match handler.target(outcome) {
                        Some(next) => next,
                        None => {
                            error!(
                                instance = %instance_id,
                                state = %state,
                                outcome = %outcome,
                                "Outcome not modeled for state"
                            );
                            if outcome != Outcome::Failed
                                || !settings.contains(keys::ERROR_MESSAGE)
                            {
                                fail_with(
                                    &mut settings,
                                    &mut result,
                                    MessageKey::UnmodeledOutcome,
                                    &[outcome.as_str(), state.as_str()],
                                );
                            }
                            S::FAILED
                        }
                    };
                    (state, Some(outcome), next)
                }
                None => {
                    error!(instance = %instance_id, state = %state, "No handler for state");
                    fail_with(
                        &mut settings,
                        &mut result,
                        MessageKey::MissingHandler,
                        &[state.as_str()],
                    );
                    (state, None, S::FAILED)
                }
            },
            stored => {
                let token = match &stored {
                    StoredState::Unknown(token) => token.clone(),
                    _ => String::new(),
                };
                warn!(instance = %instance_id, status = %token, "Unknown provisioning state");
                fail_with(&mut settings, &mut result, MessageKey::UnknownState, &[&token]);
                (S::FAILED, None, S::FAILED)
            }
        };

        settings.set(keys::STATUS, next.as_str());

        let outcome_token = outcome.map(|o| o.as_str()).unwrap_or("none");
        self.metrics.record_poll(
            self.controller,
            current.as_str(),
            outcome_token,
            started.elapsed().as_secs_f64(),
        );
        self.metrics
            .record_transition(self.controller, current.as_str(), next.as_str());

        if current != next {
            info!(
                controller = self.controller,
                instance = %instance_id,
                from = %current,
                to = %next,
                outcome = outcome_token,
                "State transition"
            );
        }

        let access_info = if next.is_success() {
            Some(
                result
                    .access_info
                    .take()
                    .unwrap_or_else(|| (self.access_info)(instance_id, &settings)),
            )
        } else {
            None
        };

        let mut localized_messages = result.messages;
        localized_messages.push(self.status_message(instance_id, next, &settings));

        InstanceStatus {
            is_ready: next.is_ready(),
            run_with_timer: !next.is_terminal() && !next.suspends_timer(),
            access_info,
            localized_messages,
            changed_settings: settings,
        }
    }

    /// Put an instance into the state a lifecycle entry point requested
    pub fn begin(
        &self,
        instance_id: &str,
        mut settings: ProvisioningSettings,
        state: S,
    ) -> InstanceDescription {
        settings.remove(keys::ERROR_MESSAGE);
        settings.remove(keys::RETRY_COUNT);
        settings.set(keys::STATUS, state.as_str());
        info!(controller = self.controller, instance = %instance_id, state = %state, "Request accepted");

        let text = messages::render(
            messages::locale_of(&settings),
            MessageKey::InProgress,
            &[instance_id],
        );
        InstanceDescription {
            changed_settings: settings,
            localized_messages: vec![text],
        }
    }

    fn status_message(
        &self,
        instance_id: &str,
        state: S,
        settings: &ProvisioningSettings,
    ) -> messages::LocalizedText {
        let locale = messages::locale_of(settings);
        if state == S::FAILED {
            let reason = settings.get(keys::ERROR_MESSAGE).unwrap_or_default();
            return messages::LocalizedText {
                locale: locale.to_string(),
                text: reason.to_string(),
            };
        }
        let key = if state.is_success() {
            MessageKey::Finished
        } else if state.is_removed() {
            MessageKey::Deleted
        } else if state.suspends_timer() {
            MessageKey::ManualStepPending
        } else {
            MessageKey::InProgress
        };
        messages::render(locale, key, &[instance_id])
    }
}

/// Record a localized failure reason under `ERROR_MESSAGE`
fn fail_with(
    settings: &mut ProvisioningSettings,
    result: &mut PartialResult,
    key: MessageKey,
    args: &[&str],
) {
    let text = messages::render(messages::locale_of(settings), key, args);
    settings.set(keys::ERROR_MESSAGE, text.text.clone());
    result.message(text);
}

/// `RETRY_COUNT` survives a poll only while resource misses are consecutive
fn settle_retry_count(
    settings: &mut ProvisioningSettings,
    before: Option<&str>,
    outcome: Outcome,
) {
    if outcome == Outcome::Failed {
        return;
    }
    if settings.get(keys::RETRY_COUNT) == before {
        settings.remove(keys::RETRY_COUNT);
    }
}
