//! Approval Controller
//!
//! Parks a request until an approver decides on it. Shares the engine with
//! the VM controller but has its own state set and a two-state workflow.

use crate::domain::ports::NotifierRef;
use crate::engine::{
    unsupported, Action, ActionContext, DispatcherConfig, EngineMetrics, InstanceDescription,
    InstanceStatus, NotifyParameters, Outcome, PollDispatcher, ProvisioningController, StateSet,
    StoredState, TransitionTable,
};
use crate::error::{Error, Result};
use crate::settings::{keys, ProvisioningSettings};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub const CONTROLLER_NAME: &str = "approval";

/// Who decides on the request
pub const APPROVER: &str = "APPROVER";

// =============================================================================
// States
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalState {
    Requested,
    AwaitingDecision,
    Approved,
    Withdrawn,
    Failed,
}

const ALL: &[ApprovalState] = &[
    ApprovalState::Requested,
    ApprovalState::AwaitingDecision,
    ApprovalState::Approved,
    ApprovalState::Withdrawn,
    ApprovalState::Failed,
];

impl StateSet for ApprovalState {
    const FAILED: Self = ApprovalState::Failed;

    fn all() -> &'static [Self] {
        ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            ApprovalState::Requested => "APPROVAL_REQUESTED",
            ApprovalState::AwaitingDecision => "AWAITING_DECISION",
            ApprovalState::Approved => "APPROVED",
            ApprovalState::Withdrawn => "WITHDRAWN",
            ApprovalState::Failed => "FAILED",
        }
    }

    fn is_success(&self) -> bool {
        *self == ApprovalState::Approved
    }

    fn is_removed(&self) -> bool {
        *self == ApprovalState::Withdrawn
    }

    fn suspends_timer(&self) -> bool {
        *self == ApprovalState::AwaitingDecision
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Actions
// =============================================================================

pub struct ApprovalServices {
    pub notifier: NotifierRef,
}

/// Ask the approver for a decision
struct RequestDecision;

#[async_trait]
impl Action<ApprovalServices> for RequestDecision {
    fn name(&self) -> &'static str {
        "requestDecision"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, ApprovalServices>) -> Result<Outcome> {
        let approver = ctx.settings.require(APPROVER)?.to_string();
        let subject = format!("Approval requested for {}", ctx.instance_id);
        let body = format!(
            "Instance {} is waiting for your decision (approve or reject).",
            ctx.instance_id
        );
        ctx.services.notifier.notify(&approver, &subject, &body).await?;
        Ok(Outcome::Suspended)
    }
}

struct AwaitDecision;

#[async_trait]
impl Action<ApprovalServices> for AwaitDecision {
    fn name(&self) -> &'static str {
        "awaitDecision"
    }

    async fn run(&self, _ctx: &mut ActionContext<'_, ApprovalServices>) -> Result<Outcome> {
        Ok(Outcome::Pending)
    }
}

fn transition_table() -> Result<TransitionTable<ApprovalState, ApprovalServices>> {
    TransitionTable::builder()
        .on(
            ApprovalState::Requested,
            RequestDecision,
            &[
                (Outcome::Suspended, ApprovalState::AwaitingDecision),
                (Outcome::Failed, ApprovalState::Failed),
            ],
        )
        .on(
            ApprovalState::AwaitingDecision,
            AwaitDecision,
            &[(Outcome::Pending, ApprovalState::AwaitingDecision)],
        )
        .build()
}

// =============================================================================
// Controller
// =============================================================================

pub struct ApprovalController {
    dispatcher: PollDispatcher<ApprovalState, ApprovalServices>,
}

impl ApprovalController {
    pub fn new(services: Arc<ApprovalServices>, metrics: EngineMetrics) -> Result<Self> {
        let dispatcher = PollDispatcher::new(
            CONTROLLER_NAME,
            transition_table()?,
            services,
            DispatcherConfig::default(),
        )
        .with_access_info(Arc::new(|instance_id: &str, settings: &ProvisioningSettings| {
            format!(
                "{} approved by {}",
                instance_id,
                settings.get_non_empty(APPROVER).unwrap_or("-")
            )
        }))
        .with_metrics(metrics);
        Ok(Self { dispatcher })
    }
}

#[async_trait]
impl ProvisioningController for ApprovalController {
    fn name(&self) -> &'static str {
        CONTROLLER_NAME
    }

    async fn create_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        match self.dispatcher.stored_state(&settings) {
            StoredState::Missing | StoredState::Known(ApprovalState::Failed) => {}
            _ => return Err(unsupported(&settings, "create")),
        }
        settings.require(APPROVER)?;
        Ok(self
            .dispatcher
            .begin(instance_id, settings, ApprovalState::Requested))
    }

    async fn modify_instance(
        &self,
        _instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        Err(unsupported(&settings, "modify"))
    }

    /// Withdraw the request; nothing remote to clean up
    async fn delete_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> Result<InstanceDescription> {
        if let StoredState::Unknown(_) = self.dispatcher.stored_state(&settings) {
            return Err(unsupported(&settings, "delete"));
        }
        Ok(self
            .dispatcher
            .begin(instance_id, settings, ApprovalState::Withdrawn))
    }

    /// `command=approve` or `command=reject`
    async fn notify_instance(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
        parameters: &NotifyParameters,
    ) -> Result<InstanceDescription> {
        if self.dispatcher.stored_state(&settings)
            != StoredState::Known(ApprovalState::AwaitingDecision)
        {
            return Err(unsupported(&settings, "notify"));
        }

        match parameters.get("command").map(String::as_str) {
            Some("approve") => {
                info!(instance = %instance_id, "Request approved");
                Ok(self
                    .dispatcher
                    .begin(instance_id, settings, ApprovalState::Approved))
            }
            Some("reject") => {
                info!(instance = %instance_id, "Request rejected");
                let reason = parameters
                    .get("reason")
                    .cloned()
                    .unwrap_or_else(|| "rejected by approver".to_string());
                let mut description =
                    self.dispatcher
                        .begin(instance_id, settings, ApprovalState::Failed);
                description
                    .changed_settings
                    .set(keys::ERROR_MESSAGE, reason);
                Ok(description)
            }
            other => Err(Error::InvalidSetting {
                key: "command".into(),
                reason: format!("unsupported notification {:?}", other.unwrap_or_default()),
            }),
        }
    }

    async fn get_instance_status(
        &self,
        instance_id: &str,
        settings: ProvisioningSettings,
    ) -> InstanceStatus {
        self.dispatcher
            .get_instance_status(instance_id, settings)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LogNotifier;
    use assert_matches::assert_matches;

    fn controller() -> (ApprovalController, Arc<LogNotifier>) {
        let notifier = Arc::new(LogNotifier::new());
        let services = Arc::new(ApprovalServices {
            notifier: notifier.clone(),
        });
        (
            ApprovalController::new(services, EngineMetrics::new()).unwrap(),
            notifier,
        )
    }

    fn request() -> ProvisioningSettings {
        let mut settings = ProvisioningSettings::new();
        settings.set(APPROVER, "lead@example.com");
        settings
    }

    fn command(value: &str) -> NotifyParameters {
        let mut parameters = NotifyParameters::new();
        parameters.insert("command".into(), value.into());
        parameters
    }

    #[tokio::test]
    async fn test_approve_flow() {
        let (c, notifier) = controller();

        let created = c.create_instance("req-1", request()).await.unwrap();
        let status = c
            .get_instance_status("req-1", created.changed_settings)
            .await;
        assert_eq!(status.state(), Some("AWAITING_DECISION"));
        assert!(!status.run_with_timer);
        assert_eq!(notifier.sent()[0].recipient, "lead@example.com");

        let approved = c
            .notify_instance("req-1", status.changed_settings, &command("approve"))
            .await
            .unwrap();
        let status = c
            .get_instance_status("req-1", approved.changed_settings)
            .await;
        assert!(status.is_ready);
        assert_eq!(
            status.access_info.as_deref(),
            Some("req-1 approved by lead@example.com")
        );
    }

    #[tokio::test]
    async fn test_reject_fails_with_reason() {
        let (c, _) = controller();
        let created = c.create_instance("req-1", request()).await.unwrap();
        let status = c
            .get_instance_status("req-1", created.changed_settings)
            .await;

        let mut parameters = command("reject");
        parameters.insert("reason".into(), "over budget".into());
        let rejected = c
            .notify_instance("req-1", status.changed_settings, &parameters)
            .await
            .unwrap();

        let status = c
            .get_instance_status("req-1", rejected.changed_settings)
            .await;
        assert_eq!(status.state(), Some("FAILED"));
        assert!(!status.is_ready);
        assert_eq!(
            status.changed_settings.get(keys::ERROR_MESSAGE),
            Some("over budget")
        );
    }

    #[tokio::test]
    async fn test_create_needs_approver() {
        let (c, _) = controller();
        assert_matches!(
            c.create_instance("req-1", ProvisioningSettings::new()).await,
            Err(Error::MissingSetting { .. })
        );
    }

    #[tokio::test]
    async fn test_withdraw() {
        let (c, _) = controller();
        let created = c.create_instance("req-1", request()).await.unwrap();
        let withdrawn = c
            .delete_instance("req-1", created.changed_settings)
            .await
            .unwrap();
        let status = c
            .get_instance_status("req-1", withdrawn.changed_settings)
            .await;
        assert_eq!(status.state(), Some("WITHDRAWN"));
        assert!(status.is_ready);
    }
}
