//! Remote Side
//!
//! Session pooling for hypervisor management endpoints plus the adapters for
//! the host platform collaborators:
//! - `pool`: per-endpoint bounded client pool
//! - `simulated`: in-memory hypervisor for standalone mode and tests
//! - `script`: guest script download
//! - `notify`: operator notifications

pub mod notify;
pub mod pool;
pub mod script;
pub mod simulated;

pub use notify::*;
pub use pool::*;
pub use script::*;
pub use simulated::*;
