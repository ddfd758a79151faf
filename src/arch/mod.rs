//! Architecture-specific code
//!
//! Register layouts and descriptor formats are plain data and build on any
//! host; only the code issuing system-register instructions is limited to
//! `target_arch = "aarch64"`.

pub mod aarch64;
pub mod traits;

pub use aarch64::*;
