//! PL011 UART Driver and console logger
//!
//! Base address: 0x0900_0000 (QEMU virt). Firmware has already configured
//! the baud rate, so only the data and flag registers are used.

use core::fmt;

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::arch::aarch64::irq::local_irq_save;
use crate::error::{HvError, HvResult};
use crate::platform;

/// PL011 register offsets
const UART_DR: usize = 0x00; // Data Register
const UART_FR: usize = 0x18; // Flag Register

/// Flag Register bits
const UART_FR_TXFF: u32 = 1 << 5; // Transmit FIFO full

/// PL011 device at a fixed MMIO base
#[derive(Clone, Copy)]
pub struct Pl011 {
    base: usize,
}

impl Pl011 {
    /// # Safety
    ///
    /// `base` must map a PL011 register block (or equivalent writable
    /// memory) for as long as this value is used.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Write a byte, spinning while the TX FIFO is full.
    pub fn putc(&self, c: u8) {
        while self.read_reg(UART_FR) & UART_FR_TXFF != 0 {}
        self.write_reg(UART_DR, c as u32);
    }

    pub fn puts(&self, s: &str) {
        for byte in s.bytes() {
            self.putc(byte);
        }
    }

    #[inline]
    fn read_reg(&self, offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write_reg(&self, offset: usize, value: u32) {
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl fmt::Write for Pl011 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s);
        Ok(())
    }
}

/// Board console
const CONSOLE: Pl011 = unsafe { Pl011::new(platform::UART_BASE) };

/// `log` backend writing `[LEVEL target] message` lines to a PL011
pub struct UartLogger {
    uart: Pl011,
    level: LevelFilter,
    lock: Mutex<()>,
}

impl UartLogger {
    pub const fn new(uart: Pl011, level: LevelFilter) -> Self {
        Self {
            uart,
            level,
            lock: Mutex::new(()),
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl Log for UartLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Whole lines only; IRQs masked so the timer handler cannot
        // re-enter while this core holds the lock.
        let _irq = local_irq_save();
        let _line = self.lock.lock();
        let mut uart = self.uart;
        let _ = fmt::Write::write_fmt(
            &mut uart,
            format_args!("[{} {}] {}\n", record.level(), record.target(), record.args()),
        );
    }

    fn flush(&self) {}
}

/// Install `logger` as the global `log` backend.
///
/// Fails with `Busy` if a logger was already installed.
pub fn init_logger(logger: &'static UartLogger) -> HvResult {
    log::set_logger(logger).map_err(|_| HvError::Busy)?;
    log::set_max_level(logger.level());
    Ok(())
}

static DEFAULT_LOGGER: UartLogger = UartLogger::new(CONSOLE, platform::DEFAULT_LOG_LEVEL);

/// Route `log` output to the board console.
pub fn init() -> HvResult {
    init_logger(&DEFAULT_LOGGER)
}
