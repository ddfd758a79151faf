//! ARM64/AArch64 architecture support
//!
//! This module contains ARM64-specific virtualization support including:
//! - Architectural constants
//! - Trapped register state
//! - Generic timer register access
//! - Stage-2 translation descriptors

pub mod defs;
pub mod irq;
pub mod mm;
pub mod peripherals;
pub mod regs;

pub use regs::*;
