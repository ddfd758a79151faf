//! ARM64 Register Definitions
//!
//! The register snapshot the exception entry code saves before calling into
//! an IRQ handler. Handlers may rewrite it; the exit path restores it.

/// Trapped register state at the time of an interrupt
///
/// In ARM64, we have 31 general purpose registers:
/// - x0-x30: General purpose registers
/// - x29: Frame Pointer (FP)
/// - x30: Link Register (LR)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub x: [u64; 31],
    /// Exception Link Register (ELR_EL2), return address
    pub elr_el2: u64,
    /// Saved Program Status Register (SPSR_EL2)
    pub spsr_el2: u64,
}

impl TrapFrame {
    /// Get value of a general purpose register
    ///
    /// # Arguments
    /// * `reg` - Register number (0-30); x31 reads as the zero register
    pub fn get_reg(&self, reg: u8) -> u64 {
        match reg {
            0..=30 => self.x[reg as usize],
            _ => 0,
        }
    }

    /// Set value of a general purpose register. Writes to x31 are discarded.
    pub fn set_reg(&mut self, reg: u8, value: u64) {
        if let 0..=30 = reg {
            self.x[reg as usize] = value;
        }
    }
}
