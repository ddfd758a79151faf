//! Generic timer virtualization
//!
//! Keeps a registry of the three architectural timer sources, programs the
//! hypervisor physical timer (CNTHP_*) and relays its interrupt to a
//! registered callback.
//!
//! Only the HYP source has a control path. VIR and NSP get their IRQ
//! numbers at init, but every control call made through their handles is
//! refused with `UnsupportedFeature` before any register is touched.
//!
//! The registry is shared with the IRQ path on the same core. Normal path
//! updates run with IRQs masked; the IRQ path only ever `try_lock`s and
//! calls the callback after releasing the lock.

use core::time::Duration;

use spin::Mutex;

use crate::arch::aarch64::defs::{HYP_TIMER_IRQ, NS_PHYS_TIMER_IRQ, VIRT_TIMER_IRQ};
use crate::arch::aarch64::irq::local_irq_save;
use crate::arch::aarch64::peripherals::timer::{TimerCtl, TimerReg32, TimerReg64};
use crate::arch::aarch64::regs::TrapFrame;
use crate::arch::traits::{InterruptController, IrqHandler, TimerRegisters};
use crate::dtb::TimerIrqs;
use crate::error::{HvError, HvResult};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Architectural timer sources
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerSource {
    /// Hypervisor physical timer (CNTHP), PPI 26
    Hyp,
    /// Virtual timer (CNTV), PPI 27
    Vir,
    /// Non-secure physical timer (CNTP), PPI 30
    Nsp,
}

pub const TIMER_SOURCE_COUNT: usize = 3;

impl TimerSource {
    pub const ALL: [TimerSource; TIMER_SOURCE_COUNT] =
        [TimerSource::Hyp, TimerSource::Vir, TimerSource::Nsp];

    const fn slot(self) -> usize {
        match self {
            TimerSource::Hyp => 0,
            TimerSource::Vir => 1,
            TimerSource::Nsp => 2,
        }
    }

    /// Interrupt ID fixed by the Cortex-A15/A57 interrupt map
    pub const fn default_irq(self) -> u32 {
        match self {
            TimerSource::Hyp => HYP_TIMER_IRQ,
            TimerSource::Vir => VIRT_TIMER_IRQ,
            TimerSource::Nsp => NS_PHYS_TIMER_IRQ,
        }
    }

    pub const fn ctl_reg(self) -> TimerReg32 {
        match self {
            TimerSource::Hyp => TimerReg32::HypCtl,
            TimerSource::Vir => TimerReg32::VirtCtl,
            TimerSource::Nsp => TimerReg32::PhysCtl,
        }
    }

    pub const fn tval_reg(self) -> TimerReg32 {
        match self {
            TimerSource::Hyp => TimerReg32::HypTval,
            TimerSource::Vir => TimerReg32::VirtTval,
            TimerSource::Nsp => TimerReg32::PhysTval,
        }
    }

    pub const fn cval_reg(self) -> TimerReg64 {
        match self {
            TimerSource::Hyp => TimerReg64::HypCval,
            TimerSource::Vir => TimerReg64::VirtCval,
            TimerSource::Nsp => TimerReg64::PhysCval,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TimerSource::Hyp => "hyp",
            TimerSource::Vir => "vir",
            TimerSource::Nsp => "nsp",
        }
    }
}

/// Receiver of timer expiry events
///
/// Runs in interrupt context: it must not block or allocate. The module
/// does not re-arm the timer; a callback wanting periodic ticks programs
/// the next interval itself before returning.
pub trait TimerCallback: Sync {
    fn on_timer_fire(&self, regs: &mut TrapFrame);
}

impl<F> TimerCallback for F
where
    F: Fn(&mut TrapFrame) + Sync,
{
    fn on_timer_fire(&self, regs: &mut TrapFrame) {
        self(regs)
    }
}

#[derive(Clone, Copy)]
struct TimerSlot {
    irq: u32,
    tval: u32,
    callback: Option<&'static dyn TimerCallback>,
}

impl TimerSlot {
    const EMPTY: Self = Self {
        irq: 0,
        tval: 0,
        callback: None,
    };
}

/// Generic timer module
///
/// `R` is the register file of the executing core, `G` the interrupt
/// controller the HYP timer IRQ is registered with.
pub struct GenericTimer<R, G> {
    regs: R,
    gic: G,
    slots: Mutex<[TimerSlot; TIMER_SOURCE_COUNT]>,
}

impl<R: TimerRegisters, G: InterruptController> GenericTimer<R, G> {
    pub const fn new(regs: R, gic: G) -> Self {
        Self {
            regs,
            gic,
            slots: Mutex::new([TimerSlot::EMPTY; TIMER_SOURCE_COUNT]),
        }
    }

    /// Assign the fixed timer IRQs: HYP 26, NSP 30, VIR 27.
    pub fn init(&self) -> HvResult {
        self.assign_irqs(&TimerIrqs::DEFAULT);
        Ok(())
    }

    /// Assign the timer IRQs described by the device tree's timer node.
    pub fn init_from_fdt(&self, fdt: &fdt::Fdt) -> HvResult {
        self.assign_irqs(&crate::dtb::timer_irqs(fdt));
        Ok(())
    }

    /// Like [`init_from_fdt`](Self::init_from_fdt), parsing a raw blob first.
    /// A blob that is not a device tree is `InvalidArgument`.
    pub fn init_from_dtb(&self, dtb: &[u8]) -> HvResult {
        let fdt = fdt::Fdt::new(dtb).map_err(|_| HvError::InvalidArgument)?;
        self.init_from_fdt(&fdt)
    }

    fn assign_irqs(&self, irqs: &TimerIrqs) {
        self.with_slots(|slots| {
            slots[TimerSource::Hyp.slot()].irq = irqs.hyp;
            slots[TimerSource::Nsp.slot()].irq = irqs.nonsecure_phys;
            slots[TimerSource::Vir.slot()].irq = irqs.virt;
        });
        log::debug!(
            "[TIMER] irqs: hyp={} vir={} nsp={}",
            irqs.hyp,
            irqs.virt,
            irqs.nonsecure_phys
        );
    }

    /// Control handle for one timer source
    pub fn source(&self, source: TimerSource) -> TimerHandle<'_, R, G> {
        TimerHandle { timer: self, source }
    }

    /// Control handle for the hypervisor timer
    pub fn hyp(&self) -> TimerHandle<'_, R, G> {
        self.source(TimerSource::Hyp)
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn interrupt_controller(&self) -> &G {
        &self.gic
    }

    /// Counter frequency in Hz (CNTFRQ)
    pub fn frequency(&self) -> u32 {
        self.regs.read32(TimerReg32::Freq)
    }

    pub fn physical_count(&self) -> u64 {
        self.regs.read64(TimerReg64::PhysCount)
    }

    pub fn virtual_count(&self) -> u64 {
        self.regs.read64(TimerReg64::VirtCount)
    }

    pub fn virtual_offset(&self) -> u64 {
        self.regs.read64(TimerReg64::VirtOff)
    }

    /// Program CNTVOFF; the guest sees CNTVCT = CNTPCT - offset.
    pub fn set_virtual_offset(&self, offset: u64) -> HvResult {
        self.regs.write64(TimerReg64::VirtOff, offset)
    }

    /// Convert `duration` to down-counter ticks at the current frequency.
    pub fn interval_for(&self, duration: Duration) -> HvResult<u32> {
        let freq = self.frequency();
        if freq == 0 {
            log::error!("[TIMER] CNTFRQ not programmed by firmware");
            return Err(HvError::InvalidRegister);
        }

        let ticks = freq as u128 * duration.as_nanos() / NANOS_PER_SEC;
        u32::try_from(ticks).map_err(|_| HvError::InvalidArgument)
    }

    fn with_slots<T>(&self, f: impl FnOnce(&mut [TimerSlot; TIMER_SOURCE_COUNT]) -> T) -> T {
        let _irq = local_irq_save();
        let mut slots = self.slots.lock();
        f(&mut slots)
    }

    fn slot(&self, source: TimerSource) -> TimerSlot {
        self.with_slots(|slots| slots[source.slot()])
    }

    /// IRQ path: look up the callback for `source` and run it once.
    fn dispatch(&self, source: TimerSource, regs: &mut TrapFrame) -> HvResult {
        let callback = match self.slots.try_lock() {
            Some(slots) => slots[source.slot()].callback,
            None => return Err(HvError::Busy),
        };

        match callback {
            Some(callback) => {
                callback.on_timer_fire(regs);
                Ok(())
            }
            None => Err(HvError::CallbackUnbound),
        }
    }
}

impl<R: TimerRegisters, G: InterruptController> IrqHandler for GenericTimer<R, G> {
    fn handle_irq(&self, irq: u32, regs: &mut TrapFrame) {
        match self.dispatch(TimerSource::Hyp, regs) {
            Ok(()) => {}
            Err(HvError::CallbackUnbound) => {
                panic!("hyp timer IRQ {} fired with no callback bound", irq)
            }
            Err(e) => log::error!("[TIMER] IRQ {} dropped: {}", irq, e),
        }
    }
}

/// Per-source control handle
///
/// Every control operation applies to the handle's source only.
pub struct TimerHandle<'t, R, G> {
    timer: &'t GenericTimer<R, G>,
    source: TimerSource,
}

impl<R, G> Clone for TimerHandle<'_, R, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, G> Copy for TimerHandle<'_, R, G> {}

impl<'t, R: TimerRegisters, G: InterruptController> TimerHandle<'t, R, G> {
    pub fn source(&self) -> TimerSource {
        self.source
    }

    /// Assigned interrupt ID, 0 before init
    pub fn irq(&self) -> u32 {
        self.timer.slot(self.source).irq
    }

    /// Most recently programmed down-counter value
    pub fn last_interval(&self) -> u32 {
        self.timer.slot(self.source).tval
    }

    pub fn has_callback(&self) -> bool {
        self.timer.slot(self.source).callback.is_some()
    }

    fn require_control(&self, op: &str) -> HvResult {
        if self.source == TimerSource::Hyp {
            return Ok(());
        }
        log::warn!("[TIMER] {} not supported on {} timer", op, self.source.name());
        Err(HvError::UnsupportedFeature)
    }

    /// Program the down-counter (TVAL) of the hypervisor timer.
    pub fn set_interval(&self, ticks: u32) -> HvResult {
        self.require_control("set_interval")?;

        self.timer.with_slots(|slots| slots[self.source.slot()].tval = ticks);
        self.timer.regs.write32(self.source.tval_reg(), ticks)?;
        log::debug!("[TIMER] {} tval={}", self.source.name(), ticks);
        Ok(())
    }

    /// Enable the timer with its output unmasked.
    ///
    /// Refused with `CallbackUnbound` while no callback is bound, since the
    /// interrupt would have nowhere to go.
    pub fn enable_interrupt(&self) -> HvResult {
        self.require_control("enable_interrupt")?;
        if !self.has_callback() {
            log::error!("[TIMER] {} enabled before a callback was bound", self.source.name());
            return Err(HvError::CallbackUnbound);
        }

        let reg = self.source.ctl_reg();
        let mut ctl = TimerCtl::from_bits_retain(self.timer.regs.read32(reg));
        ctl.insert(TimerCtl::ENABLE);
        ctl.remove(TimerCtl::IMASK);
        self.timer.regs.write32(reg, ctl.bits())
    }

    /// Disable the timer and mask its output.
    pub fn disable_interrupt(&self) -> HvResult {
        self.require_control("disable_interrupt")?;

        let reg = self.source.ctl_reg();
        let mut ctl = TimerCtl::from_bits_retain(self.timer.regs.read32(reg));
        ctl.remove(TimerCtl::ENABLE);
        ctl.insert(TimerCtl::IMASK);
        self.timer.regs.write32(reg, ctl.bits())
    }

    /// Check if the timer condition is met (ISTATUS).
    pub fn is_pending(&self) -> HvResult<bool> {
        self.require_control("is_pending")?;
        let ctl = TimerCtl::from_bits_retain(self.timer.regs.read32(self.source.ctl_reg()));
        Ok(ctl.contains(TimerCtl::ISTATUS))
    }

    pub fn compare_value(&self) -> HvResult<u64> {
        self.require_control("compare_value")?;
        Ok(self.timer.regs.read64(self.source.cval_reg()))
    }

    /// Program an absolute deadline (CVAL) instead of a relative interval.
    pub fn set_compare_value(&self, cval: u64) -> HvResult {
        self.require_control("set_compare_value")?;
        self.timer.regs.write64(self.source.cval_reg(), cval)
    }

    /// Bind `callback` to this source, replacing any previous one.
    pub fn set_callback(&self, callback: &'static dyn TimerCallback) -> HvResult {
        self.timer
            .with_slots(|slots| slots[self.source.slot()].callback = Some(callback));
        Ok(())
    }

    /// Log the registry slot of this source. Touches no hardware.
    pub fn dump(&self) -> HvResult {
        let slot = self.timer.slot(self.source);
        log::debug!(
            "[TIMER] {}: irq={} tval={} callback={}",
            self.source.name(),
            slot.irq,
            slot.tval,
            if slot.callback.is_some() { "bound" } else { "none" }
        );
        Ok(())
    }
}

impl<R, G> TimerHandle<'static, R, G>
where
    R: TimerRegisters + 'static,
    G: InterruptController + 'static,
{
    /// Register the timer IRQ handler and route the IRQ to this core.
    pub fn request_irq(&self) -> HvResult {
        self.require_control("request_irq")?;

        let irq = self.irq();
        let timer: &'static GenericTimer<R, G> = self.timer;
        if let Err(e) = timer.gic.register_handler(irq, timer) {
            log::warn!("[TIMER] IRQ {} registration failed: {}", irq, e);
            return Err(HvError::UnsupportedFeature);
        }

        timer.gic.configure_routing(irq)
    }
}

/// Timer operations table consumed by the hypervisor timer framework
pub trait TimerOps: Sync {
    fn init(&self) -> HvResult;
    fn request_irq(&self) -> HvResult;
    /// Not wired up; a no-op rather than a failure.
    fn free_irq(&self) -> HvResult {
        Ok(())
    }
    fn enable(&self) -> HvResult;
    fn disable(&self) -> HvResult;
    fn set_interval(&self, ticks: u32) -> HvResult;
    fn set_callbacks(&self, callback: &'static dyn TimerCallback) -> HvResult;
    fn dump(&self) -> HvResult;
}

impl<R, G> TimerOps for TimerHandle<'static, R, G>
where
    R: TimerRegisters + 'static,
    G: InterruptController + 'static,
{
    fn init(&self) -> HvResult {
        self.timer.init()
    }

    fn request_irq(&self) -> HvResult {
        TimerHandle::request_irq(self)
    }

    fn enable(&self) -> HvResult {
        self.enable_interrupt()
    }

    fn disable(&self) -> HvResult {
        self.disable_interrupt()
    }

    fn set_interval(&self, ticks: u32) -> HvResult {
        TimerHandle::set_interval(self, ticks)
    }

    fn set_callbacks(&self, callback: &'static dyn TimerCallback) -> HvResult {
        self.set_callback(callback)
    }

    fn dump(&self) -> HvResult {
        TimerHandle::dump(self)
    }
}

/// Identity record published to the timer framework for diagnostics
pub struct TimerModule<'a> {
    pub name: &'static str,
    pub author: &'static str,
    pub ops: &'a dyn TimerOps,
}

impl<'a> TimerModule<'a> {
    pub const NAME: &'static str = "Generic Timer Module";
    pub const AUTHOR: &'static str = "hypervisor-core";

    pub fn new(ops: &'a dyn TimerOps) -> Self {
        Self {
            name: Self::NAME,
            author: Self::AUTHOR,
            ops,
        }
    }
}
