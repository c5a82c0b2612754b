//! Settings Store Module
//!
//! The per-instance key/value bag that is round-tripped through the host
//! platform on every poll. It is the single source of truth for the current
//! provisioning state, configuration and intermediate results.

pub mod cipher;
pub mod keys;
pub mod store;

pub use cipher::*;
pub use store::*;
