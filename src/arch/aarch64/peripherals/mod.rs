//! ARM64 Peripheral Drivers
//!
//! This module provides low-level access to ARM-specific peripherals:
//! - ARM Generic Timer

pub mod timer;

pub use timer::*;
