//! ARM Generic Timer register access
//!
//! ARM provides several timers:
//! - Hypervisor Physical Timer (EL2): CNTHP_CTL/TVAL/CVAL_EL2, PPI 26
//! - Virtual Timer (EL1): CNTV_CTL/TVAL/CVAL_EL0, PPI 27
//! - Non-secure Physical Timer (EL1): CNTP_CTL/TVAL/CVAL_EL0, PPI 30
//!
//! Registers are named by closed enums split by width, so a 64-bit access
//! to a 32-bit register cannot be expressed. Read-only registers (CNTFRQ
//! from EL2 and the counters) reject writes with `InvalidRegister`.

use bitflags::bitflags;

#[cfg(target_arch = "aarch64")]
use crate::arch::traits::TimerRegisters;

bitflags! {
    /// Timer control register bits (CNTHP_CTL, CNTP_CTL, CNTV_CTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerCtl: u32 {
        /// Enable timer
        const ENABLE = 1 << 0;
        /// Interrupt mask (1 = masked)
        const IMASK = 1 << 1;
        /// Interrupt status (read-only)
        const ISTATUS = 1 << 2;
    }
}

/// 32-bit generic timer registers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerReg32 {
    /// CNTFRQ_EL0, counter frequency in Hz
    Freq,
    /// CNTHCTL_EL2, EL1 access controls
    Hctl,
    /// CNTKCTL_EL1, EL0 access controls
    Kctl,
    /// CNTHP_CTL_EL2
    HypCtl,
    /// CNTHP_TVAL_EL2
    HypTval,
    /// CNTP_CTL_EL0
    PhysCtl,
    /// CNTP_TVAL_EL0
    PhysTval,
    /// CNTV_CTL_EL0
    VirtCtl,
    /// CNTV_TVAL_EL0
    VirtTval,
}

impl TimerReg32 {
    pub const ALL: [TimerReg32; 9] = [
        TimerReg32::Freq,
        TimerReg32::Hctl,
        TimerReg32::Kctl,
        TimerReg32::HypCtl,
        TimerReg32::HypTval,
        TimerReg32::PhysCtl,
        TimerReg32::PhysTval,
        TimerReg32::VirtCtl,
        TimerReg32::VirtTval,
    ];

    /// CNTFRQ is only writable from the highest implemented EL.
    pub const fn is_writable(self) -> bool {
        !matches!(self, TimerReg32::Freq)
    }
}

/// 64-bit generic timer registers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerReg64 {
    /// CNTHP_CVAL_EL2
    HypCval,
    /// CNTP_CVAL_EL0
    PhysCval,
    /// CNTV_CVAL_EL0
    VirtCval,
    /// CNTVOFF_EL2
    VirtOff,
    /// CNTPCT_EL0
    PhysCount,
    /// CNTVCT_EL0
    VirtCount,
}

impl TimerReg64 {
    pub const ALL: [TimerReg64; 6] = [
        TimerReg64::HypCval,
        TimerReg64::PhysCval,
        TimerReg64::VirtCval,
        TimerReg64::VirtOff,
        TimerReg64::PhysCount,
        TimerReg64::VirtCount,
    ];

    pub const fn is_writable(self) -> bool {
        !matches!(self, TimerReg64::PhysCount | TimerReg64::VirtCount)
    }
}

#[cfg(target_arch = "aarch64")]
macro_rules! read_sysreg {
    ($name:literal) => {{
        let value: u64;
        unsafe {
            core::arch::asm!(
                concat!("mrs {}, ", $name),
                out(reg) value,
                options(nomem, nostack, preserves_flags),
            );
        }
        value
    }};
}

#[cfg(target_arch = "aarch64")]
macro_rules! write_sysreg {
    ($name:literal, $value:expr) => {{
        let value: u64 = $value;
        unsafe {
            core::arch::asm!(
                concat!("msr ", $name, ", {}"),
                "isb",
                in(reg) value,
                options(nostack, preserves_flags),
            );
        }
    }};
}

/// The generic timer of the executing core, accessed through system registers
#[cfg(target_arch = "aarch64")]
#[derive(Clone, Copy, Debug, Default)]
pub struct SysRegTimer;

#[cfg(target_arch = "aarch64")]
impl TimerRegisters for SysRegTimer {
    fn read32(&self, reg: TimerReg32) -> u32 {
        let value = match reg {
            TimerReg32::Freq => read_sysreg!("cntfrq_el0"),
            TimerReg32::Hctl => read_sysreg!("cnthctl_el2"),
            TimerReg32::Kctl => read_sysreg!("cntkctl_el1"),
            TimerReg32::HypCtl => read_sysreg!("cnthp_ctl_el2"),
            TimerReg32::HypTval => read_sysreg!("cnthp_tval_el2"),
            TimerReg32::PhysCtl => read_sysreg!("cntp_ctl_el0"),
            TimerReg32::PhysTval => read_sysreg!("cntp_tval_el0"),
            TimerReg32::VirtCtl => read_sysreg!("cntv_ctl_el0"),
            TimerReg32::VirtTval => read_sysreg!("cntv_tval_el0"),
        };
        value as u32
    }

    fn store32(&self, reg: TimerReg32, value: u32) {
        let value = value as u64;
        match reg {
            // read-only from EL2, refused by `write32`
            TimerReg32::Freq => {}
            TimerReg32::Hctl => write_sysreg!("cnthctl_el2", value),
            TimerReg32::Kctl => write_sysreg!("cntkctl_el1", value),
            TimerReg32::HypCtl => write_sysreg!("cnthp_ctl_el2", value),
            TimerReg32::HypTval => write_sysreg!("cnthp_tval_el2", value),
            TimerReg32::PhysCtl => write_sysreg!("cntp_ctl_el0", value),
            TimerReg32::PhysTval => write_sysreg!("cntp_tval_el0", value),
            TimerReg32::VirtCtl => write_sysreg!("cntv_ctl_el0", value),
            TimerReg32::VirtTval => write_sysreg!("cntv_tval_el0", value),
        }
    }

    fn read64(&self, reg: TimerReg64) -> u64 {
        match reg {
            TimerReg64::HypCval => read_sysreg!("cnthp_cval_el2"),
            TimerReg64::PhysCval => read_sysreg!("cntp_cval_el0"),
            TimerReg64::VirtCval => read_sysreg!("cntv_cval_el0"),
            TimerReg64::VirtOff => read_sysreg!("cntvoff_el2"),
            TimerReg64::PhysCount => read_sysreg!("cntpct_el0"),
            TimerReg64::VirtCount => read_sysreg!("cntvct_el0"),
        }
    }

    fn store64(&self, reg: TimerReg64, value: u64) {
        match reg {
            TimerReg64::HypCval => write_sysreg!("cnthp_cval_el2", value),
            TimerReg64::PhysCval => write_sysreg!("cntp_cval_el0", value),
            TimerReg64::VirtCval => write_sysreg!("cntv_cval_el0", value),
            TimerReg64::VirtOff => write_sysreg!("cntvoff_el2", value),
            // counters are read-only, refused by `write64`
            TimerReg64::PhysCount | TimerReg64::VirtCount => {}
        }
    }
}
