//! API Module
//!
//! REST surface of the host contract: lifecycle entry points, the poll and
//! health probes.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
