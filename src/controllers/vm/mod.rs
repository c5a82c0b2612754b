//! VM Controller
//!
//! Provisions virtual machines by cloning hypervisor templates:
//! - `states`: the VM state set
//! - `actions`: workflow steps
//! - `services`: shared pool, inventory, balancers and collaborators
//! - `controller`: transition table and host entry points

pub mod actions;
pub mod config;
pub mod controller;
pub mod services;
pub mod states;

pub use config::VmControllerConfig;
pub use controller::VmController;
pub use services::VmServices;
pub use states::VmState;

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::balancer::{
        BalancerDocument, BalancerElement, BalancerKind, BalancerSection, Limit,
        PlacementBalancers,
    };
    use crate::domain::ports::{EndpointId, PowerState, VmInfo};
    use crate::engine::{execute, Action, ActionContext, Outcome, PartialResult};
    use crate::inventory::snapshot::fixtures::{host, network, storage};
    use crate::inventory::{AddressBook, InventorySnapshot, InventoryStore};
    use crate::remote::{
        ClientPool, InlineScriptSource, LogNotifier, PoolConfig, SimulatedClientFactory,
        SimulatedHypervisor, SimulatorConfig,
    };
    use crate::settings::{keys, PlaintextCipher, ProvisioningSettings};
    use std::sync::Arc;
    use std::time::Duration;

    pub const SCRIPT_URL: &str = "https://scripts.example.com/setup.sh";

    /// Two hosts with one storage each and one shared network
    pub fn inventory() -> InventorySnapshot {
        InventorySnapshot::new(
            vec![host("esx-1", 2_000, 8_192, 2), host("esx-2", 6_000, 32_768, 5)],
            vec![storage("ds-1", "esx-1", 50), storage("ds-2", "esx-2", 40)],
            vec![network("vlan-10", &["10.0.0.10", "10.0.0.11", "10.0.0.12"])],
        )
    }

    pub struct Fixture {
        pub hypervisor: Arc<SimulatedHypervisor>,
        pub pool: Arc<ClientPool>,
        pub notifier: Arc<LogNotifier>,
        pub services: Arc<VmServices>,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self::build(inventory(), SimulatorConfig::default())
        }

        pub fn with_inventory(snapshot: InventorySnapshot) -> Self {
            Self::build(snapshot, SimulatorConfig::default())
        }

        pub fn with_simulator(config: SimulatorConfig) -> Self {
            Self::build(inventory(), config)
        }

        fn build(snapshot: InventorySnapshot, simulator: SimulatorConfig) -> Self {
            let hypervisor = SimulatedHypervisor::new(simulator);
            let factory = SimulatedClientFactory::new();
            factory.register(EndpointId::new("vc-1"), hypervisor.clone());
            let pool = ClientPool::new(
                Arc::new(factory),
                PoolConfig {
                    max_clients_per_endpoint: 2,
                    borrow_timeout: Duration::from_millis(50),
                    ..Default::default()
                },
            );

            let document = BalancerDocument {
                host: BalancerSection::new(BalancerKind::DynamicEquipartition)
                    .with_element(BalancerElement::new("esx-1"))
                    .with_element(BalancerElement::new("esx-2")),
                storage: BalancerSection::new(BalancerKind::Storage)
                    .with_default_limit(Limit::Percent(10.0)),
            };
            let balancers =
                PlacementBalancers::from_document(&document).expect("fixture balancers");

            let notifier = Arc::new(LogNotifier::new());
            let services = Arc::new(VmServices {
                pool: pool.clone(),
                inventory: InventoryStore::with_snapshot(snapshot),
                balancers: Arc::new(balancers),
                addresses: AddressBook::new(),
                cipher: Arc::new(PlaintextCipher),
                notifier: notifier.clone(),
                scripts: Arc::new(
                    InlineScriptSource::new().with_script(SCRIPT_URL, "#!/bin/sh\ntrue\n"),
                ),
                config: VmControllerConfig::default(),
            });

            Self {
                hypervisor,
                pool,
                notifier,
                services,
            }
        }

        /// Settings of a freshly requested instance named `vm-01`
        pub fn settings(&self) -> ProvisioningSettings {
            let mut settings = ProvisioningSettings::new();
            settings.set(keys::ENDPOINT, "vc-1");
            settings.set(keys::ENDPOINT_USER, "admin");
            settings
                .store_secret(keys::ENDPOINT_PASSWORD, "secret", &PlaintextCipher)
                .expect("plaintext cipher");
            settings.set(keys::TEMPLATE, "tmpl-linux");
            settings.set(keys::INSTANCE_NAME, "vm-01");
            settings
        }

        /// Put a powered-on VM on esx-1 without going through a task
        pub fn insert_vm(&self, name: &str, cpu_count: u32, memory_mb: u64) {
            self.hypervisor.insert_vm(VmInfo {
                name: name.to_string(),
                host: "esx-1".into(),
                storage: "ds-1".into(),
                power_state: PowerState::PoweredOn,
                ip_address: None,
                hostname: None,
                cpu_count,
                memory_mb,
            });
        }
    }

    /// Run one action through the error boundary
    pub async fn run_action(
        fx: &Fixture,
        action: &dyn Action<VmServices>,
        instance_id: &str,
        settings: &mut ProvisioningSettings,
    ) -> (Outcome, PartialResult) {
        let mut result = PartialResult::default();
        let mut ctx = ActionContext {
            instance_id,
            settings,
            result: &mut result,
            services: fx.services.as_ref(),
            retry_budget: fx.services.config.retry_budget,
        };
        let outcome = execute(action, &mut ctx).await;
        (outcome, result)
    }
}
