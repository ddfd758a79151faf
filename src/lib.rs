#![cfg_attr(not(test), no_std)]

//! EL2 hypervisor core: generic timer virtualization and stage-2
//! translation descriptor construction for ARMv8-A.
//!
//! Register and interrupt-controller access goes through the traits in
//! [`arch::traits`], so everything except the raw system register and
//! DAIF accessors also runs on the host.

pub mod arch;
pub mod dtb;
pub mod error;
pub mod platform;
pub mod uart;
pub mod vtimer;

pub use error::{HvError, HvResult};
