//! Guest customization and operator hand-off

use crate::controllers::vm::VmServices;
use crate::domain::ports::{ScriptSpec, ScriptState, Secret};
use crate::engine::messages::{self, MessageKey};
use crate::engine::{Action, ActionContext, Outcome};
use crate::error::{Error, Result};
use crate::settings::{keys, ProvisioningSettings};
use async_trait::async_trait;
use tracing::{debug, info};

fn vm_name(settings: &ProvisioningSettings, component: &str) -> Result<String> {
    settings
        .get_non_empty(keys::INSTANCE_NAME)
        .map(str::to_string)
        .ok_or_else(|| Error::MissingPrecondition {
            component: component.to_string(),
            key: keys::INSTANCE_NAME.to_string(),
        })
}

fn script_pid(settings: &ProvisioningSettings) -> Result<Option<i64>> {
    settings
        .get_non_empty(keys::SCRIPT_PID)
        .map(|raw| {
            raw.parse::<i64>().map_err(|e| Error::InvalidSetting {
                key: keys::SCRIPT_PID.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

// =============================================================================
// executeScript
// =============================================================================

/// Download the customization script and start it in the guest
///
/// `skipped` without `SCRIPT_URL`. A script that was already started is not
/// started twice.
pub struct ExecuteScript;

#[async_trait]
impl Action<VmServices> for ExecuteScript {
    fn name(&self) -> &'static str {
        "executeScript"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let Some(url) = ctx.settings.get_non_empty(keys::SCRIPT_URL).map(str::to_string) else {
            return Ok(Outcome::Skipped);
        };
        let name = vm_name(ctx.settings, self.name())?;

        if let Some(pid) = script_pid(ctx.settings)? {
            let client = ctx.services.client(ctx.settings).await?;
            let state = client.call(|c| c.script_state(&name, pid)).await?;
            return Ok(match state {
                ScriptState::Running => Outcome::Running,
                ScriptState::Exited { .. } => Outcome::Skipped,
            });
        }

        // the download must not hold one of the endpoint's client slots
        let content = ctx.services.scripts.fetch(&url).await?;
        let spec = ScriptSpec {
            content,
            user: ctx.services.config.script_user.clone(),
            password: ctx
                .services
                .guest_password(ctx.settings)?
                .unwrap_or_else(|| Secret::new("")),
        };
        let client = ctx.services.client(ctx.settings).await?;
        let pid = client.call(|c| c.start_script(&name, &spec)).await?;

        info!(instance = %ctx.instance_id, vm = %name, url = %url, pid, "Guest script started");
        ctx.settings.set(keys::SCRIPT_PID, pid.to_string());
        let locale = ctx.locale();
        ctx.result.message(messages::render(
            &locale,
            MessageKey::ScriptRunning,
            &[ctx.instance_id],
        ));
        Ok(Outcome::Running)
    }
}

// =============================================================================
// checkScript
// =============================================================================

/// Poll the guest script started by [`ExecuteScript`]
///
/// A nonzero exit code fails the instance.
pub struct CheckScript;

#[async_trait]
impl Action<VmServices> for CheckScript {
    fn name(&self) -> &'static str {
        "checkScript"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let Some(pid) = script_pid(ctx.settings)? else {
            return Ok(Outcome::Skipped);
        };
        let name = vm_name(ctx.settings, self.name())?;
        let client = ctx.services.client(ctx.settings).await?;

        match client.call(|c| c.script_state(&name, pid)).await? {
            ScriptState::Running => {
                debug!(instance = %ctx.instance_id, pid, "Guest script still running");
                Ok(Outcome::Pending)
            }
            ScriptState::Exited { code: 0 } => {
                info!(instance = %ctx.instance_id, pid, "Guest script finished");
                Ok(Outcome::Success)
            }
            ScriptState::Exited { code } => Err(Error::RemoteTaskFailed {
                task: format!("script {} in {}", pid, name),
                reason: format!("exit code {}", code),
            }),
        }
    }
}

// =============================================================================
// suspendForManualStep / awaitOperator
// =============================================================================

/// Notify the operator and stop polling until they report back
///
/// `skipped` without `MAIL_FOR_COMPLETION`.
pub struct SuspendForManualStep;

#[async_trait]
impl Action<VmServices> for SuspendForManualStep {
    fn name(&self) -> &'static str {
        "suspendForManualStep"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let Some(recipient) = ctx
            .settings
            .get_non_empty(keys::MAIL_FOR_COMPLETION)
            .map(str::to_string)
        else {
            return Ok(Outcome::Skipped);
        };

        let locale = ctx.locale();
        let text = messages::render(&locale, MessageKey::ManualStepPending, &[ctx.instance_id]);
        let subject = format!("Manual step required for {}", ctx.instance_id);
        ctx.services
            .notifier
            .notify(&recipient, &subject, &text.text)
            .await?;

        info!(instance = %ctx.instance_id, recipient = %recipient, "Waiting for operator");
        ctx.result.message(text);
        Ok(Outcome::Suspended)
    }
}

/// Keeps an instance parked until the operator completes it
pub struct AwaitOperator;

#[async_trait]
impl Action<VmServices> for AwaitOperator {
    fn name(&self) -> &'static str {
        "awaitOperator"
    }

    async fn run(&self, _ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        Ok(Outcome::Pending)
    }
}
