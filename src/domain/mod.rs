//! Domain layer - Core types and port definitions
//!
//! This module defines the traits (ports) through which the engine talks to
//! the hypervisor management API and the host platform's collaborators,
//! following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
