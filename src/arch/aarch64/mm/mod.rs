//! Memory Management for ARM64
//!
//! This module handles:
//! - Stage-2 translation table descriptors (IPA -> PA)
//! - Memory attribute encoding

pub mod descriptor;

pub use descriptor::*;
