//! Balancer Configuration
//!
//! YAML document describing the placement balancers of a deployment: one
//! `host` section and one `storage` section, each naming its kind and the
//! elements it may choose from.
//!
//! ```yaml
//! host:
//!   kind: dynamic_equipartition
//!   weights: { cpu: 1.0, memory: 1.0, vmCount: 0.5 }
//!   elements:
//!     - name: esx-01
//!     - name: esx-02
//!       enabled: false
//! storage:
//!   kind: storage
//!   defaultLimit: "15%"
//!   elements:
//!     - name: VMdev0
//!       limit: "85%"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const GIB: u64 = 1024 * 1024 * 1024;

fn default_true() -> bool {
    true
}

// =============================================================================
// Balancer Kind
// =============================================================================

/// Placement algorithm of a balancer section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancerKind {
    /// Fixed host list, round-robin or least-loaded
    Equipartition,
    /// Weighted score from live host metrics
    DynamicEquipartition,
    /// Storage selection scoped to the chosen host
    Storage,
}

impl FromStr for BalancerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "equipartition" | "static" => Ok(BalancerKind::Equipartition),
            "dynamic_equipartition" | "dynamic" => Ok(BalancerKind::DynamicEquipartition),
            "storage" => Ok(BalancerKind::Storage),
            _ => Err(Error::UnknownBalancer {
                kind: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BalancerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalancerKind::Equipartition => write!(f, "equipartition"),
            BalancerKind::DynamicEquipartition => write!(f, "dynamic_equipartition"),
            BalancerKind::Storage => write!(f, "storage"),
        }
    }
}

/// How the static host balancer walks its list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    #[default]
    LeastLoaded,
}

// =============================================================================
// Weights
// =============================================================================

/// Score weights for the dynamic host balancer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Weights {
    pub cpu: f64,
    pub memory: f64,
    pub vm_count: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory: 1.0,
            vm_count: 0.0,
        }
    }
}

// =============================================================================
// Storage Limit
// =============================================================================

/// Free space a storage must keep after placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LimitRepr", into = "String")]
pub enum Limit {
    /// Percentage of the total capacity
    Percent(f64),
    /// Absolute number of bytes
    Bytes(u64),
}

impl Limit {
    /// Whether `free_bytes` out of `total_bytes` is strictly above the limit
    pub fn admits(&self, free_bytes: u64, total_bytes: u64) -> bool {
        match *self {
            Limit::Percent(percent) => {
                if total_bytes == 0 {
                    return false;
                }
                free_bytes as f64 * 100.0 / total_bytes as f64 > percent
            }
            Limit::Bytes(bytes) => free_bytes > bytes,
        }
    }
}

impl Default for Limit {
    fn default() -> Self {
        Limit::Bytes(0)
    }
}

impl FromStr for Limit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |reason: &str| Error::InvalidSetting {
            key: "limit".into(),
            reason: format!("'{}': {}", s, reason),
        };

        if let Some(percent) = s.strip_suffix('%') {
            let value: f64 = percent
                .trim()
                .parse()
                .map_err(|_| invalid("not a percentage"))?;
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid("percentage out of range"));
            }
            return Ok(Limit::Percent(value));
        }

        let lower = s.to_ascii_lowercase();
        let (digits, factor) = if let Some(n) = lower.strip_suffix("gib") {
            (n, GIB)
        } else if let Some(n) = lower.strip_suffix("gb") {
            (n, GIB)
        } else {
            (lower.as_str(), 1)
        };

        let value: u64 = digits
            .trim()
            .parse()
            .map_err(|_| invalid("not a size"))?;
        Ok(Limit::Bytes(value.saturating_mul(factor)))
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Percent(p) => write!(f, "{}%", p),
            Limit::Bytes(b) => write!(f, "{}", b),
        }
    }
}

impl From<Limit> for String {
    fn from(limit: Limit) -> Self {
        limit.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LimitRepr {
    Bytes(u64),
    Text(String),
}

impl TryFrom<LimitRepr> for Limit {
    type Error = Error;

    fn try_from(repr: LimitRepr) -> Result<Self> {
        match repr {
            LimitRepr::Bytes(b) => Ok(Limit::Bytes(b)),
            LimitRepr::Text(s) => s.parse(),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// One selectable element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancerElement {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Storage only: overrides the section default limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit>,
}

impl BalancerElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Configuration of one balancer instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancerSection {
    pub kind: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<Limit>,
    #[serde(default)]
    pub elements: Vec<BalancerElement>,
}

impl BalancerSection {
    pub fn new(kind: BalancerKind) -> Self {
        Self {
            kind: kind.to_string(),
            strategy: Strategy::default(),
            weights: Weights::default(),
            default_limit: None,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: BalancerElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_default_limit(mut self, limit: Limit) -> Self {
        self.default_limit = Some(limit);
        self
    }

    pub fn kind(&self) -> Result<BalancerKind> {
        self.kind.parse()
    }

    /// Names of enabled elements in configuration order
    pub fn enabled_elements(&self) -> Vec<String> {
        self.elements
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Reject duplicate element names
    pub fn validate(&self) -> Result<()> {
        self.kind()?;
        let mut seen = std::collections::HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate balancer element: {}",
                    element.name
                )));
            }
        }
        let weights = &self.weights;
        if weights.cpu < 0.0 || weights.memory < 0.0 || weights.vm_count < 0.0 {
            return Err(Error::Configuration("balancer weights must not be negative".into()));
        }
        Ok(())
    }
}

/// Balancer configuration of a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancerDocument {
    pub host: BalancerSection,
    pub storage: BalancerSection,
}

impl BalancerDocument {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: Self = serde_yaml::from_str(yaml)?;
        document.host.validate()?;
        document.storage.validate()?;
        Ok(document)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}
