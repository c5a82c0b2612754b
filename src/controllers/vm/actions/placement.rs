//! Naming, placement and address actions

use crate::controllers::vm::VmServices;
use crate::engine::{Action, ActionContext, Outcome};
use crate::error::{Error, Result};
use crate::settings::keys;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

// =============================================================================
// validateInstanceName
// =============================================================================

/// Check the VM name against the configured pattern
///
/// Falls back to the instance id when no name was requested and records the
/// name that will be used.
pub struct ValidateInstanceName;

#[async_trait]
impl Action<VmServices> for ValidateInstanceName {
    fn name(&self) -> &'static str {
        "validateInstanceName"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let name = ctx
            .settings
            .get_non_empty(keys::INSTANCE_NAME)
            .unwrap_or(ctx.instance_id)
            .to_string();
        let pattern = ctx
            .settings
            .get_non_empty(keys::INSTANCE_NAME_PATTERN)
            .unwrap_or(ctx.services.config.instance_name_pattern.as_str())
            .to_string();

        let regex = Regex::new(&pattern)?;
        if !regex.is_match(&name) {
            return Err(Error::InvalidInstanceName { name, pattern });
        }

        ctx.settings.set(keys::INSTANCE_NAME, name);
        Ok(Outcome::Success)
    }
}

// =============================================================================
// selectPlacement
// =============================================================================

/// Choose host and storage with the placement balancers
///
/// Values already present in the settings are kept, so a retried poll does
/// not move an instance that was partly placed.
pub struct SelectPlacement;

#[async_trait]
impl Action<VmServices> for SelectPlacement {
    fn name(&self) -> &'static str {
        "selectPlacement"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let services = ctx.services;
        services.balancers.set_inventory(services.inventory.snapshot());

        if ctx.settings.get_non_empty(keys::HOST).is_none() {
            let host = services.balancers.select_host(ctx.settings)?;
            ctx.settings.set(keys::HOST, host);
        }
        if ctx.settings.get_non_empty(keys::STORAGE).is_none() {
            let storage = services.balancers.select_storage(ctx.settings)?;
            ctx.settings.set(keys::STORAGE, storage);
        }

        info!(
            instance = %ctx.instance_id,
            host = ctx.settings.get(keys::HOST).unwrap_or_default(),
            storage = ctx.settings.get(keys::STORAGE).unwrap_or_default(),
            "Placement selected"
        );
        Ok(Outcome::Success)
    }
}

// =============================================================================
// reserveIpAddress
// =============================================================================

/// Reserve a guest address in the requested (or first usable) network
///
/// Skipped when an address is already recorded, or when no network is
/// requested and none is available on the host (the guest uses DHCP).
pub struct ReserveIpAddress;

#[async_trait]
impl Action<VmServices> for ReserveIpAddress {
    fn name(&self) -> &'static str {
        "reserveIpAddress"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        if ctx.settings.get_non_empty(keys::IP_ADDRESS).is_some() {
            return Ok(Outcome::Skipped);
        }

        let snapshot = ctx.services.inventory.snapshot();
        let network = match ctx.settings.get_non_empty(keys::NETWORK) {
            Some(id) => snapshot.network(id).ok_or_else(|| Error::NoCapacity {
                scope: format!("network {}", id),
                reason: "not in the inventory".into(),
            })?,
            None => {
                let host = ctx.settings.get_non_empty(keys::HOST).ok_or_else(|| {
                    Error::MissingPrecondition {
                        component: "reserveIpAddress".into(),
                        key: keys::HOST.into(),
                    }
                })?;
                let candidates = snapshot.networks_for_host(host);
                if candidates.is_empty() {
                    debug!(instance = %ctx.instance_id, host = %host, "No managed network, skipping");
                    return Ok(Outcome::Skipped);
                }
                candidates
                    .into_iter()
                    .find(|n| ctx.services.addresses.has_free(n))
                    .ok_or_else(|| Error::NoCapacity {
                        scope: format!("networks of host {}", host),
                        reason: "no free address".into(),
                    })?
            }
        };

        let address = ctx.services.addresses.reserve(network, ctx.instance_id)?;

        ctx.settings.set(keys::NETWORK, network.id.clone());
        ctx.settings.set(keys::IP_ADDRESS, address);
        if let Some(gateway) = &network.gateway {
            ctx.settings.set(keys::GATEWAY, gateway.clone());
        }
        if let Some(mask) = &network.subnet_mask {
            ctx.settings.set(keys::SUBNET_MASK, mask.clone());
        }
        if !network.dns_servers.is_empty() {
            ctx.settings.set(keys::DNS_SERVERS, network.dns_servers.join(","));
        }
        Ok(Outcome::Success)
    }
}

// =============================================================================
// releaseIpAddress
// =============================================================================

/// Return every address held by the instance
pub struct ReleaseIpAddress;

#[async_trait]
impl Action<VmServices> for ReleaseIpAddress {
    fn name(&self) -> &'static str {
        "releaseIpAddress"
    }

    async fn run(&self, ctx: &mut ActionContext<'_, VmServices>) -> Result<Outcome> {
        let released = ctx.services.addresses.release_instance(ctx.instance_id);
        ctx.settings.remove(keys::IP_ADDRESS);
        if released == 0 {
            return Ok(Outcome::Skipped);
        }
        info!(instance = %ctx.instance_id, released, "Released addresses");
        Ok(Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::vm::testing::{run_action, Fixture};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_name_defaults_to_instance_id() {
        let fx = Fixture::new();
        let mut settings = fx.settings();
        settings.remove(keys::INSTANCE_NAME);

        let (outcome, _) = run_action(&fx, &ValidateInstanceName, "web-01", &mut settings).await;
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(settings.get(keys::INSTANCE_NAME), Some("web-01"));
    }

    #[tokio::test]
    async fn test_invalid_name_fails_with_pattern_in_message() {
        let fx = Fixture::new();
        let mut settings = fx.settings();
        settings.set(keys::INSTANCE_NAME, "Bad_Name");

        let (outcome, _) = run_action(&fx, &ValidateInstanceName, "i-1", &mut settings).await;
        assert_eq!(outcome, Outcome::Failed);
        let message = settings.get(keys::ERROR_MESSAGE).unwrap();
        assert!(message.contains("Bad_Name"));
        assert!(message.contains(&fx.services.config.instance_name_pattern));
    }

    #[tokio::test]
    async fn test_placement_fills_host_and_storage() {
        let fx = Fixture::new();
        let mut settings = fx.settings();

        let (outcome, _) = run_action(&fx, &SelectPlacement, "i-1", &mut settings).await;
        assert_eq!(outcome, Outcome::Success);
        let host = settings.get(keys::HOST).unwrap().to_string();
        let storage = settings.get(keys::STORAGE).unwrap();
        let snapshot = fx.services.inventory.snapshot();
        assert!(snapshot.storage(storage).unwrap().attached_to(&host));
    }

    #[tokio::test]
    async fn test_placement_keeps_existing_host() {
        let fx = Fixture::new();
        let mut settings = fx.settings();
        settings.set(keys::HOST, "esx-2");

        run_action(&fx, &SelectPlacement, "i-1", &mut settings).await;
        assert_eq!(settings.get(keys::HOST), Some("esx-2"));
        assert_eq!(settings.get(keys::STORAGE), Some("ds-2"));
    }

    #[tokio::test]
    async fn test_no_capacity_waits_for_next_poll() {
        let fx = Fixture::with_inventory(crate::inventory::InventorySnapshot::empty());
        let mut settings = fx.settings();

        let (outcome, result) = run_action(&fx, &SelectPlacement, "i-1", &mut settings).await;
        assert_eq!(outcome, Outcome::Pending);
        assert_eq!(settings.get(keys::RETRY_COUNT), Some("1"));
        assert_eq!(result.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_reserve_and_release_address() {
        let fx = Fixture::new();
        let mut settings = fx.settings();
        settings.set(keys::HOST, "esx-1");

        let (outcome, _) = run_action(&fx, &ReserveIpAddress, "i-1", &mut settings).await;
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(settings.get(keys::IP_ADDRESS), Some("10.0.0.10"));
        assert_eq!(settings.get(keys::NETWORK), Some("vlan-10"));
        assert_eq!(settings.get(keys::GATEWAY), Some("10.0.0.1"));

        let (again, _) = run_action(&fx, &ReserveIpAddress, "i-1", &mut settings).await;
        assert_eq!(again, Outcome::Skipped);

        let (released, _) = run_action(&fx, &ReleaseIpAddress, "i-1", &mut settings).await;
        assert_eq!(released, Outcome::Success);
        assert!(!settings.contains(keys::IP_ADDRESS));
        assert!(fx.services.addresses.reserved("vlan-10").is_empty());
    }

    #[tokio::test]
    async fn test_reserve_requires_host_without_network() {
        let fx = Fixture::new();
        let mut settings = fx.settings();

        let (outcome, _) = run_action(&fx, &ReserveIpAddress, "i-1", &mut settings).await;
        assert_eq!(outcome, Outcome::Failed);
        assert_matches!(settings.get(keys::ERROR_MESSAGE), Some(m) if m.contains("HOST"));
    }
}
