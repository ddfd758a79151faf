//! Local IRQ masking
//!
//! The timer registry is shared with the IRQ path on the same core. Normal
//! path code masks IRQs (PSTATE.I) while it holds the registry lock so the
//! IRQ path never finds it taken.

/// Restores the saved DAIF value when dropped.
pub struct IrqGuard {
    #[allow(dead_code)]
    daif: u64,
}

/// Mask IRQs on the current core and return a guard restoring the
/// previous mask state.
#[inline]
pub fn local_irq_save() -> IrqGuard {
    #[cfg(target_arch = "aarch64")]
    {
        let daif: u64;
        unsafe {
            core::arch::asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack));
            core::arch::asm!("msr daifset, #2", options(nomem, nostack)); // Set I bit
        }
        IrqGuard { daif }
    }

    #[cfg(not(target_arch = "aarch64"))]
    IrqGuard { daif: 0 }
}

impl Drop for IrqGuard {
    #[inline]
    fn drop(&mut self) {
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("msr daif, {}", in(reg) self.daif, options(nomem, nostack));
        }
    }
}
