//! Domain layer - Core types and port definitions
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod memory;
pub mod ports;

pub use memory::*;
pub use ports::*;
