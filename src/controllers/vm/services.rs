//! Shared services of the VM controller
//!
//! Injected into every action; the pool, inventory store and address book
//! are shared by all instances and synchronize internally.

use super::config::VmControllerConfig;
use crate::balancer::PlacementBalancers;
use crate::domain::ports::{
    EndpointCredentials, EndpointId, NotifierRef, ScriptSourceRef, Secret, SecretCipherRef,
};
use crate::error::Result;
use crate::inventory::{AddressBook, InventoryStore};
use crate::remote::{ClientPool, PooledClient};
use crate::settings::{keys, ProvisioningSettings};
use std::sync::Arc;

pub struct VmServices {
    pub pool: Arc<ClientPool>,
    pub inventory: Arc<InventoryStore>,
    pub balancers: Arc<PlacementBalancers>,
    pub addresses: Arc<AddressBook>,
    pub cipher: SecretCipherRef,
    pub notifier: NotifierRef,
    pub scripts: ScriptSourceRef,
    pub config: VmControllerConfig,
}

impl VmServices {
    /// Endpoint and credentials recorded for an instance
    pub fn endpoint(
        &self,
        settings: &ProvisioningSettings,
    ) -> Result<(EndpointId, EndpointCredentials)> {
        let endpoint = EndpointId::new(settings.require(keys::ENDPOINT)?);
        let user = settings.require(keys::ENDPOINT_USER)?.to_string();
        let password = settings
            .reveal(keys::ENDPOINT_PASSWORD, self.cipher.as_ref())?
            .unwrap_or_default();
        Ok((
            endpoint,
            EndpointCredentials {
                user,
                password: Secret::new(password),
            },
        ))
    }

    /// Borrow a client for the instance's endpoint
    pub async fn client(&self, settings: &ProvisioningSettings) -> Result<PooledClient> {
        let (endpoint, credentials) = self.endpoint(settings)?;
        self.pool.borrow(&endpoint, &credentials).await
    }

    /// Decrypted guest password, if one was requested
    pub fn guest_password(&self, settings: &ProvisioningSettings) -> Result<Option<Secret>> {
        Ok(settings
            .reveal(keys::GUEST_PASSWORD, self.cipher.as_ref())?
            .map(Secret::new))
    }

    pub fn domain_name<'a>(&'a self, settings: &'a ProvisioningSettings) -> &'a str {
        settings
            .get_non_empty(keys::DOMAIN_NAME)
            .unwrap_or(self.config.default_domain_name.as_str())
    }
}
