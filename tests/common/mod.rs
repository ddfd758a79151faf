//! Shared fixtures for the integration tests
//!
//! Recording mocks for the timer register file and the interrupt
//! controller, plus a minimal flattened device tree writer.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use hypervisor_core::arch::aarch64::peripherals::timer::{TimerReg32, TimerReg64};
use hypervisor_core::arch::aarch64::regs::TrapFrame;
use hypervisor_core::arch::traits::{InterruptController, IrqHandler, TimerRegisters};
use hypervisor_core::vtimer::{GenericTimer, TimerCallback};
use hypervisor_core::{HvError, HvResult};

/// CNTFRQ on QEMU virt
pub const QEMU_CNTFRQ: u32 = 62_500_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegWrite {
    W32(TimerReg32, u32),
    W64(TimerReg64, u64),
}

#[derive(Default)]
struct RegState {
    regs32: HashMap<TimerReg32, u32>,
    regs64: HashMap<TimerReg64, u64>,
    writes: Vec<RegWrite>,
}

/// Timer register file backed by maps; every store is logged.
#[derive(Default)]
pub struct MockTimerRegs {
    state: Mutex<RegState>,
}

impl MockTimerRegs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frequency(hz: u32) -> Self {
        let regs = Self::new();
        regs.preset32(TimerReg32::Freq, hz);
        regs
    }

    /// Set a register as hardware would, without logging a write.
    pub fn preset32(&self, reg: TimerReg32, value: u32) {
        self.state.lock().unwrap().regs32.insert(reg, value);
    }

    pub fn preset64(&self, reg: TimerReg64, value: u64) {
        self.state.lock().unwrap().regs64.insert(reg, value);
    }

    pub fn value32(&self, reg: TimerReg32) -> u32 {
        self.read32(reg)
    }

    pub fn value64(&self, reg: TimerReg64) -> u64 {
        self.read64(reg)
    }

    pub fn writes(&self) -> Vec<RegWrite> {
        self.state.lock().unwrap().writes.clone()
    }
}

impl TimerRegisters for MockTimerRegs {
    fn read32(&self, reg: TimerReg32) -> u32 {
        self.state.lock().unwrap().regs32.get(&reg).copied().unwrap_or(0)
    }

    fn read64(&self, reg: TimerReg64) -> u64 {
        self.state.lock().unwrap().regs64.get(&reg).copied().unwrap_or(0)
    }

    fn store32(&self, reg: TimerReg32, value: u32) {
        let mut state = self.state.lock().unwrap();
        state.regs32.insert(reg, value);
        state.writes.push(RegWrite::W32(reg, value));
    }

    fn store64(&self, reg: TimerReg64, value: u64) {
        let mut state = self.state.lock().unwrap();
        state.regs64.insert(reg, value);
        state.writes.push(RegWrite::W64(reg, value));
    }
}

/// Interrupt controller that records registrations and can replay IRQs.
pub struct MockGic {
    handlers: Mutex<Vec<(u32, &'static dyn IrqHandler)>>,
    routed: Mutex<Vec<u32>>,
    refuse_registration: AtomicBool,
    routing_result: Mutex<HvResult>,
}

impl MockGic {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            routed: Mutex::new(Vec::new()),
            refuse_registration: AtomicBool::new(false),
            routing_result: Mutex::new(Ok(())),
        }
    }

    pub fn refusing() -> Self {
        let gic = Self::new();
        gic.refuse_registration.store(true, Ordering::SeqCst);
        gic
    }

    pub fn set_routing_result(&self, result: HvResult) {
        *self.routing_result.lock().unwrap() = result;
    }

    pub fn registered_irqs(&self) -> Vec<u32> {
        self.handlers.lock().unwrap().iter().map(|(irq, _)| *irq).collect()
    }

    pub fn routed_irqs(&self) -> Vec<u32> {
        self.routed.lock().unwrap().clone()
    }

    /// Deliver `irq` the way the exception vector would. Returns false if
    /// no handler is registered for it.
    pub fn fire(&self, irq: u32, regs: &mut TrapFrame) -> bool {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .find(|(i, _)| *i == irq)
            .map(|(_, h)| *h);

        match handler {
            Some(handler) => {
                handler.handle_irq(irq, regs);
                true
            }
            None => false,
        }
    }
}

impl InterruptController for MockGic {
    fn register_handler(&self, irq: u32, handler: &'static dyn IrqHandler) -> HvResult {
        if self.refuse_registration.load(Ordering::SeqCst) {
            return Err(HvError::Busy);
        }
        self.handlers.lock().unwrap().push((irq, handler));
        Ok(())
    }

    fn configure_routing(&self, irq: u32) -> HvResult {
        self.routed.lock().unwrap().push(irq);
        *self.routing_result.lock().unwrap()
    }
}

pub type MockTimer = GenericTimer<MockTimerRegs, MockGic>;

pub fn leak_timer(regs: MockTimerRegs, gic: MockGic) -> &'static MockTimer {
    Box::leak(Box::new(GenericTimer::new(regs, gic)))
}

/// What a callback saw
#[derive(Default)]
pub struct Hits {
    pub count: AtomicUsize,
    pub last_x0: AtomicU64,
}

impl Hits {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn last_x0(&self) -> u64 {
        self.last_x0.load(Ordering::SeqCst)
    }
}

/// A callback counting its invocations and capturing x0 of the snapshot.
pub fn counting_callback() -> (&'static dyn TimerCallback, &'static Hits) {
    let hits: &'static Hits = Box::leak(Box::default());
    let callback: &'static dyn TimerCallback = Box::leak(Box::new(move |regs: &mut TrapFrame| {
        hits.count.fetch_add(1, Ordering::SeqCst);
        hits.last_x0.store(regs.x[0], Ordering::SeqCst);
    }));
    (callback, hits)
}

// ── Flattened device tree writer ─────────────────────────────────────

const FDT_MAGIC: u32 = 0xD00D_FEED;
const FDT_BEGIN_NODE: u32 = 1;
const FDT_END_NODE: u32 = 2;
const FDT_PROP: u32 = 3;
const FDT_END: u32 = 9;
const FDT_HEADER_SIZE: usize = 40;
const FDT_RSVMAP_SIZE: usize = 16;

#[derive(Default)]
struct FdtWriter {
    structure: Vec<u8>,
    strings: Vec<u8>,
}

impl FdtWriter {
    fn token(&mut self, token: u32) {
        self.structure.extend_from_slice(&token.to_be_bytes());
    }

    fn pad(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    fn begin_node(&mut self, name: &str) {
        self.token(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad();
    }

    fn end_node(&mut self) {
        self.token(FDT_END_NODE);
    }

    fn prop(&mut self, name: &str, value: &[u8]) {
        let name_off = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);

        self.token(FDT_PROP);
        self.structure.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.structure.extend_from_slice(&name_off.to_be_bytes());
        self.structure.extend_from_slice(value);
        self.pad();
    }

    fn prop_u32(&mut self, name: &str, value: u32) {
        self.prop(name, &value.to_be_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        self.token(FDT_END);

        let off_struct = FDT_HEADER_SIZE + FDT_RSVMAP_SIZE;
        let off_strings = off_struct + self.structure.len();
        let total = off_strings + self.strings.len();

        let header = [
            FDT_MAGIC,
            total as u32,
            off_struct as u32,
            off_strings as u32,
            FDT_HEADER_SIZE as u32,
            17, // version
            16, // last compatible version
            0,  // boot cpu
            self.strings.len() as u32,
            self.structure.len() as u32,
        ];

        let mut blob = Vec::with_capacity(total);
        for word in header {
            blob.extend_from_slice(&word.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; FDT_RSVMAP_SIZE]);
        blob.extend_from_slice(&self.structure);
        blob.extend_from_slice(&self.strings);
        blob
    }
}

fn cells(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// A device tree with a single timer node.
///
/// `interrupts` is the flat cell list, three cells per interrupt.
pub fn timer_dtb(compatible: &str, interrupts: &[u32]) -> Vec<u8> {
    let mut w = FdtWriter::default();
    w.begin_node("");
    w.prop_u32("#address-cells", 2);
    w.prop_u32("#size-cells", 2);
    w.prop("compatible", b"linux,dummy-virt\0");

    w.begin_node("timer");
    let mut compat = compatible.as_bytes().to_vec();
    compat.push(0);
    w.prop("compatible", &compat);
    w.prop("interrupts", &cells(interrupts));
    w.end_node();

    w.end_node();
    w.finish()
}

/// A device tree with no timer node at all.
pub fn empty_dtb() -> Vec<u8> {
    let mut w = FdtWriter::default();
    w.begin_node("");
    w.prop_u32("#address-cells", 2);
    w.prop_u32("#size-cells", 2);
    w.end_node();
    w.finish()
}

/// Timer interrupts as QEMU virt generates them: PPIs 13, 14, 11, 10.
pub const QEMU_VIRT_TIMER_INTERRUPTS: [u32; 12] =
    [1, 13, 0xf04, 1, 14, 0xf04, 1, 11, 0xf04, 1, 10, 0xf04];
