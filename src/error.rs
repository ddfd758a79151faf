//! Hypervisor status codes
//!
//! Every fallible operation in the crate returns [`HvResult`]. `Ok(())` is
//! the success status; the error variants are the failure statuses a caller
//! can observe. Hardware is only touched after all checks pass, so an `Err`
//! never comes with a partial register write.

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HvError {
    /// The operation has no control path for the selected timer source, or
    /// the interrupt controller refused the handler.
    UnsupportedFeature,
    /// A caller-supplied value does not fit the architectural field it
    /// targets (attribute index, interval, malformed descriptor).
    InvalidArgument,
    /// Access to a register that cannot be accessed that way from EL2.
    InvalidRegister,
    /// A timer interrupt was enabled or delivered with no callback bound.
    CallbackUnbound,
    /// The timer registry was locked when the IRQ path needed it.
    Busy,
}

impl HvError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            HvError::UnsupportedFeature => "unsupported feature",
            HvError::InvalidArgument => "invalid argument",
            HvError::InvalidRegister => "invalid register",
            HvError::CallbackUnbound => "no callback bound",
            HvError::Busy => "resource busy",
        }
    }
}

impl fmt::Display for HvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type HvResult<T = ()> = Result<T, HvError>;
