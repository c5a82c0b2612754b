//! Inventory Snapshot
//!
//! Read-only, timestamped description of the placement targets known to the
//! controller. Built by an [`InventorySource`](crate::domain::InventorySource)
//! and never patched in place.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_true() -> bool {
    true
}

// =============================================================================
// Descriptors
// =============================================================================

/// A compute host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDescriptor {
    /// Host name as known to the management endpoint
    pub id: String,
    /// Total CPU capacity in MHz
    pub cpu_capacity_mhz: u64,
    /// CPU in use in MHz
    #[serde(default)]
    pub cpu_usage_mhz: u64,
    /// Total memory in MB
    pub memory_capacity_mb: u64,
    /// Memory in use in MB
    #[serde(default)]
    pub memory_usage_mb: u64,
    /// Number of VMs currently placed on the host
    #[serde(default)]
    pub vm_count: u32,
    /// Whether the host accepts new VMs
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl HostDescriptor {
    /// CPU usage ratio in [0, 1]
    pub fn cpu_utilization(&self) -> f64 {
        ratio(self.cpu_usage_mhz, self.cpu_capacity_mhz)
    }

    /// Memory usage ratio in [0, 1]
    pub fn memory_utilization(&self) -> f64 {
        ratio(self.memory_usage_mb, self.memory_capacity_mb)
    }
}

/// A storage volume reachable from one or more hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDescriptor {
    /// Storage name
    pub id: String,
    /// Hosts that can reach this storage
    pub hosts: Vec<String>,
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Free capacity in bytes
    pub free_bytes: u64,
    /// Whether the storage accepts new disks
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl StorageDescriptor {
    /// Free space as a percentage of the total
    pub fn free_percent(&self) -> f64 {
        ratio(self.free_bytes, self.total_bytes) * 100.0
    }

    pub fn attached_to(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h == host)
    }
}

/// A guest network with its assignable addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    /// Network (port group) name
    pub id: String,
    /// Hosts the network is available on; empty means every host
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub subnet_mask: Option<String>,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    /// Assignable addresses in preference order
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl NetworkDescriptor {
    pub fn available_on(&self, host: &str) -> bool {
        self.hosts.is_empty() || self.hosts.iter().any(|h| h == host)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        1.0
    } else {
        (part as f64 / whole as f64).min(1.0)
    }
}

// =============================================================================
// Inventory Snapshot
// =============================================================================

/// One consistent view of the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySnapshot {
    #[serde(default = "Utc::now")]
    taken_at: DateTime<Utc>,
    #[serde(default)]
    hosts: Vec<HostDescriptor>,
    #[serde(default)]
    storages: Vec<StorageDescriptor>,
    #[serde(default)]
    networks: Vec<NetworkDescriptor>,
}

impl Default for InventorySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl InventorySnapshot {
    /// Build a snapshot stamped with the current time
    pub fn new(
        hosts: Vec<HostDescriptor>,
        storages: Vec<StorageDescriptor>,
        networks: Vec<NetworkDescriptor>,
    ) -> Self {
        Self {
            taken_at: Utc::now(),
            hosts,
            storages,
            networks,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    /// Combine partial documents (e.g. one file per site) into one snapshot
    pub fn merge(parts: impl IntoIterator<Item = InventorySnapshot>) -> Result<Self> {
        let mut merged = Self::empty();
        for part in parts {
            merged.hosts.extend(part.hosts);
            merged.storages.extend(part.storages);
            merged.networks.extend(part.networks);
        }
        merged.validate()?;
        Ok(merged)
    }

    /// Reject documents with duplicate identifiers
    pub fn validate(&self) -> Result<()> {
        check_unique("host", self.hosts.iter().map(|h| h.id.as_str()))?;
        check_unique("storage", self.storages.iter().map(|s| s.id.as_str()))?;
        check_unique("network", self.networks.iter().map(|n| n.id.as_str()))?;
        Ok(())
    }

    /// Re-stamp the snapshot with the current time
    pub fn stamped(mut self) -> Self {
        self.taken_at = Utc::now();
        self
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn hosts(&self) -> &[HostDescriptor] {
        &self.hosts
    }

    pub fn host(&self, id: &str) -> Option<&HostDescriptor> {
        self.hosts.iter().find(|h| h.id == id)
    }

    pub fn storages(&self) -> &[StorageDescriptor] {
        &self.storages
    }

    /// Storages reachable from a host, in inventory order
    pub fn storage_by_host(&self, host: &str) -> Vec<&StorageDescriptor> {
        self.storages.iter().filter(|s| s.attached_to(host)).collect()
    }

    pub fn storage(&self, id: &str) -> Option<&StorageDescriptor> {
        self.storages.iter().find(|s| s.id == id)
    }

    pub fn networks(&self) -> &[NetworkDescriptor] {
        &self.networks
    }

    pub fn network(&self, id: &str) -> Option<&NetworkDescriptor> {
        self.networks.iter().find(|n| n.id == id)
    }

    /// Networks usable from a host, in inventory order
    pub fn networks_for_host(&self, host: &str) -> Vec<&NetworkDescriptor> {
        self.networks.iter().filter(|n| n.available_on(host)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.storages.is_empty() && self.networks.is_empty()
    }
}

fn check_unique<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(Error::Inventory(format!("duplicate {} id: {}", kind, id)));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn host(id: &str, cpu_used: u64, mem_used: u64, vms: u32) -> HostDescriptor {
        HostDescriptor {
            id: id.to_string(),
            cpu_capacity_mhz: 10_000,
            cpu_usage_mhz: cpu_used,
            memory_capacity_mb: 65_536,
            memory_usage_mb: mem_used,
            vm_count: vms,
            enabled: true,
        }
    }

    pub fn storage(id: &str, host: &str, free_percent: u64) -> StorageDescriptor {
        StorageDescriptor {
            id: id.to_string(),
            hosts: vec![host.to_string()],
            total_bytes: 100 * GIB,
            free_bytes: free_percent * GIB,
            enabled: true,
        }
    }

    pub fn network(id: &str, addresses: &[&str]) -> NetworkDescriptor {
        NetworkDescriptor {
            id: id.to_string(),
            hosts: Vec::new(),
            gateway: Some("10.0.0.1".into()),
            subnet_mask: Some("255.255.255.0".into()),
            dns_servers: vec!["10.0.0.53".into()],
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub const GIB: u64 = 1024 * 1024 * 1024;
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_storage_by_host() {
        let snapshot = InventorySnapshot::new(
            vec![host("esx-1", 0, 0, 0), host("esx-2", 0, 0, 0)],
            vec![
                storage("ds-1", "esx-1", 50),
                storage("ds-2", "esx-2", 50),
                storage("ds-3", "esx-1", 10),
            ],
            vec![],
        );

        let ids: Vec<_> = snapshot
            .storage_by_host("esx-1")
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["ds-1", "ds-3"]);
        assert!(snapshot.storage_by_host("esx-9").is_empty());
    }

    #[test]
    fn test_free_percent() {
        let ds = storage("ds-1", "esx-1", 85);
        assert!((ds.free_percent() - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_rejects_duplicates() {
        let a = InventorySnapshot::new(vec![host("esx-1", 0, 0, 0)], vec![], vec![]);
        let b = InventorySnapshot::new(vec![host("esx-1", 0, 0, 0)], vec![], vec![]);
        assert!(matches!(
            InventorySnapshot::merge(vec![a, b]),
            Err(Error::Inventory(_))
        ));
    }

    #[test]
    fn test_network_without_hosts_is_everywhere() {
        let net = network("vlan-10", &["10.0.0.10"]);
        assert!(net.available_on("any-host"));
    }

    #[test]
    fn test_yaml_document() {
        let yaml = r#"
hosts:
  - id: esx-1
    cpuCapacityMhz: 20000
    memoryCapacityMb: 131072
    vmCount: 3
storages:
  - id: VMdev0
    hosts: [esx-1]
    totalBytes: 1000
    freeBytes: 900
networks:
  - id: vlan-10
    addresses: ["10.0.0.10", "10.0.0.11"]
"#;
        let snapshot: InventorySnapshot = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(snapshot.hosts().len(), 1);
        assert!(snapshot.hosts()[0].enabled);
        assert_eq!(snapshot.storage_by_host("esx-1")[0].id, "VMdev0");
        assert_eq!(snapshot.network("vlan-10").unwrap().addresses.len(), 2);
    }
}
