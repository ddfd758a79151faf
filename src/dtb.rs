//! Device tree discovery of the generic timer interrupts
//!
//! The architected timer node (`arm,armv8-timer`) lists its interrupts in
//! a fixed order: secure physical, non-secure physical, virtual and
//! hypervisor. Each entry is three big-endian cells `<type num flags>`
//! where type 0 is an SPI and type 1 a PPI.
//!
//! The `fdt` crate parses zero-copy, so this works before any heap exists.
//! A missing node or a short property keeps the QEMU virt defaults.

use crate::arch::aarch64::defs::{
    GIC_MAX_SPI_ID, GIC_PPI_BASE, GIC_PPI_COUNT, GIC_SPI_BASE, HYP_TIMER_IRQ, NS_PHYS_TIMER_IRQ,
    SEC_PHYS_TIMER_IRQ, VIRT_TIMER_IRQ,
};
use crate::error::{HvError, HvResult};

pub const TIMER_COMPATIBLE: &[&str] = &["arm,armv8-timer", "arm,armv7-timer"];

const GIC_SPI: u32 = 0;
const GIC_PPI: u32 = 1;
const CELLS_PER_IRQ: usize = 3;

/// Interrupt IDs of the four architected timers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerIrqs {
    pub secure_phys: u32,
    pub nonsecure_phys: u32,
    pub virt: u32,
    pub hyp: u32,
}

impl TimerIrqs {
    pub const DEFAULT: Self = Self {
        secure_phys: SEC_PHYS_TIMER_IRQ,
        nonsecure_phys: NS_PHYS_TIMER_IRQ,
        virt: VIRT_TIMER_IRQ,
        hyp: HYP_TIMER_IRQ,
    };

    fn slot_mut(&mut self, index: usize) -> Option<&mut u32> {
        match index {
            0 => Some(&mut self.secure_phys),
            1 => Some(&mut self.nonsecure_phys),
            2 => Some(&mut self.virt),
            3 => Some(&mut self.hyp),
            _ => None,
        }
    }
}

impl Default for TimerIrqs {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Translate one `<type num flags>` specifier to a GIC interrupt ID.
///
/// `None` for an unknown type or a number outside the PPI/SPI range.
fn irq_from_cells(kind: u32, num: u32) -> Option<u32> {
    match kind {
        GIC_SPI => num
            .checked_add(GIC_SPI_BASE)
            .filter(|&irq| irq <= GIC_MAX_SPI_ID),
        GIC_PPI if num < GIC_PPI_COUNT => Some(num + GIC_PPI_BASE),
        _ => None,
    }
}

/// Decode a raw `interrupts` property over the defaults.
pub fn decode_interrupts(value: &[u8]) -> TimerIrqs {
    let mut irqs = TimerIrqs::DEFAULT;

    let cells = value
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]));
    let mut cells = cells.peekable();

    let mut index = 0;
    while cells.peek().is_some() {
        let (Some(kind), Some(num), Some(_flags)) = (cells.next(), cells.next(), cells.next())
        else {
            log::warn!("[DTB] truncated timer interrupt specifier");
            break;
        };

        match (irq_from_cells(kind, num), irqs.slot_mut(index)) {
            (Some(irq), Some(slot)) => *slot = irq,
            (None, _) => log::warn!(
                "[DTB] timer interrupt {} has invalid specifier <{} {}>",
                index,
                kind,
                num
            ),
            (_, None) => break,
        }
        index += 1;
    }

    irqs
}

/// Timer IRQs described by `fdt`, or the defaults if it has no timer node.
pub fn timer_irqs(fdt: &fdt::Fdt) -> TimerIrqs {
    let Some(node) = fdt.find_compatible(TIMER_COMPATIBLE) else {
        log::info!("[DTB] no timer node, using default IRQs");
        return TimerIrqs::DEFAULT;
    };

    match node.property("interrupts") {
        Some(prop) if prop.value.len() >= CELLS_PER_IRQ * 4 => decode_interrupts(prop.value),
        _ => {
            log::warn!("[DTB] {} has no usable interrupts property", node.name);
            TimerIrqs::DEFAULT
        }
    }
}

/// Parse a raw device tree blob and extract the timer IRQs.
pub fn parse_timer_irqs(dtb: &[u8]) -> HvResult<TimerIrqs> {
    let fdt = fdt::Fdt::new(dtb).map_err(|_| HvError::InvalidArgument)?;
    Ok(timer_irqs(&fdt))
}
