//! Inventory Events
//!
//! Events emitted by the inventory store for external consumers.

use serde::{Deserialize, Serialize};

/// Events emitted when the inventory changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InventoryEvent {
    /// A new snapshot was swapped in
    Refreshed {
        generation: u64,
        hosts: usize,
        storages: usize,
        networks: usize,
    },

    /// A refresh attempt gave up; the previous snapshot stays active
    RefreshFailed { source: String, reason: String },
}

impl InventoryEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::Refreshed { .. } => "refreshed",
            InventoryEvent::RefreshFailed { .. } => "refresh_failed",
        }
    }
}
