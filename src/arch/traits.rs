//! Architecture-Portable Trait Definitions
//!
//! These traits are the seams between the hypervisor core and the hardware
//! it drives. The timer module reaches the generic timer and the interrupt
//! controller only through them, so tests can substitute recording mocks.

use crate::arch::aarch64::peripherals::timer::{TimerReg32, TimerReg64};
use crate::arch::aarch64::regs::TrapFrame;
use crate::error::{HvError, HvResult};

/// Generic timer register file of the executing core
///
/// Implementors provide the raw accessors. `write32`/`write64` refuse
/// registers that are read-only from EL2 with `HvError::InvalidRegister`
/// before `store32`/`store64` is reached.
pub trait TimerRegisters: Sync {
    fn read32(&self, reg: TimerReg32) -> u32;
    fn read64(&self, reg: TimerReg64) -> u64;

    /// Raw write; only called for writable registers.
    fn store32(&self, reg: TimerReg32, value: u32);
    /// Raw write; only called for writable registers.
    fn store64(&self, reg: TimerReg64, value: u64);

    fn write32(&self, reg: TimerReg32, value: u32) -> HvResult {
        if !reg.is_writable() {
            return Err(HvError::InvalidRegister);
        }
        self.store32(reg, value);
        Ok(())
    }

    fn write64(&self, reg: TimerReg64, value: u64) -> HvResult {
        if !reg.is_writable() {
            return Err(HvError::InvalidRegister);
        }
        self.store64(reg, value);
        Ok(())
    }
}

/// Interrupt-context entry point
///
/// Called by the interrupt dispatch code with the trapped register state.
/// Implementations must not block or allocate.
pub trait IrqHandler: Sync {
    fn handle_irq(&self, irq: u32, regs: &mut TrapFrame);
}

/// Interrupt controller operations (GIC on ARM)
pub trait InterruptController: Sync {
    /// Install `handler` for `irq`.
    fn register_handler(&self, irq: u32, handler: &'static dyn IrqHandler) -> HvResult;
    /// Configure `irq` (priority, target, enable) for delivery to this core.
    fn configure_routing(&self, irq: u32) -> HvResult;
}
