//! Inventory Sources
//!
//! Implementations of [`InventorySource`]. Importers owned by the host
//! platform write YAML documents; the directory source merges every document
//! that matches a glob pattern.

use super::snapshot::InventorySnapshot;
use crate::domain::ports::InventorySource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

// =============================================================================
// Static Source
// =============================================================================

/// Source that always yields the same inventory
#[derive(Debug, Clone)]
pub struct StaticInventorySource {
    snapshot: InventorySnapshot,
}

impl StaticInventorySource {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl InventorySource for StaticInventorySource {
    async fn load(&self) -> Result<InventorySnapshot> {
        Ok(self.snapshot.clone().stamped())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

// =============================================================================
// Directory Source
// =============================================================================

/// Source that merges all YAML documents matching a glob pattern
#[derive(Debug, Clone)]
pub struct DirectoryInventorySource {
    pattern: String,
}

impl DirectoryInventorySource {
    /// Create a source for e.g. `/etc/provisioning/inventory/*.yaml`
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

#[async_trait]
impl InventorySource for DirectoryInventorySource {
    async fn load(&self) -> Result<InventorySnapshot> {
        let paths = glob::glob(&self.pattern)
            .map_err(|e| Error::Configuration(format!("Invalid inventory pattern: {}", e)))?;

        let mut parts = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| Error::Inventory(e.to_string()))?;
            let content = tokio::fs::read_to_string(&path).await?;
            let part: InventorySnapshot = serde_yaml::from_str(&content).map_err(|e| {
                Error::Inventory(format!("{}: {}", path.display(), e))
            })?;
            debug!(path = %path.display(), hosts = part.hosts().len(), "Loaded inventory document");
            parts.push(part);
        }

        if parts.is_empty() {
            return Err(Error::Inventory(format!(
                "no inventory documents match {}",
                self.pattern
            )));
        }

        InventorySnapshot::merge(parts)
    }

    fn describe(&self) -> String {
        format!("directory:{}", self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SITE_A: &str = r#"
hosts:
  - id: esx-a1
    cpuCapacityMhz: 10000
    memoryCapacityMb: 65536
storages:
  - id: ds-a1
    hosts: [esx-a1]
    totalBytes: 100
    freeBytes: 50
"#;

    const SITE_B: &str = r#"
hosts:
  - id: esx-b1
    cpuCapacityMhz: 10000
    memoryCapacityMb: 65536
"#;

    #[tokio::test]
    async fn test_directory_source_merges_documents() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.yaml"), SITE_A).unwrap();
        std::fs::write(tmp.path().join("b.yaml"), SITE_B).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let pattern = format!("{}/*.yaml", tmp.path().display());
        let snapshot = DirectoryInventorySource::new(pattern).load().await.unwrap();

        assert_eq!(snapshot.hosts().len(), 2);
        assert_eq!(snapshot.storage_by_host("esx-a1").len(), 1);
    }

    #[tokio::test]
    async fn test_directory_source_without_documents_fails() {
        let tmp = TempDir::new().unwrap();
        let pattern = format!("{}/*.yaml", tmp.path().display());
        let result = DirectoryInventorySource::new(pattern).load().await;
        assert!(matches!(result, Err(Error::Inventory(_))));
    }

    #[tokio::test]
    async fn test_directory_source_reports_bad_document() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("bad.yaml"), "hosts: [ {id: 1").unwrap();
        let pattern = format!("{}/*.yaml", tmp.path().display());
        let err = DirectoryInventorySource::new(pattern).load().await.unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }
}
