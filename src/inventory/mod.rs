//! Inventory Module
//!
//! Periodically rebuilt model of the hosts, storages and networks available
//! for placement. Snapshots are immutable and swapped in wholesale so that a
//! balancer always decides against one consistent view.

pub mod addresses;
pub mod events;
pub mod snapshot;
pub mod source;
pub mod store;

pub use addresses::*;
pub use events::*;
pub use snapshot::*;
pub use source::*;
pub use store::*;
