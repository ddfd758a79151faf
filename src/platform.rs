//! Platform/Board Constants (QEMU virt machine)
//!
//! Board-specific addresses and boot defaults live here so they can be
//! changed in one place when targeting a different platform. Timer IRQs
//! are discovered from the device tree instead (see `dtb`).

use log::LevelFilter;

// ── UART (PL011) ─────────────────────────────────────────────────────
pub const UART_BASE: usize = 0x0900_0000;

// ── Logging ──────────────────────────────────────────────────────────
/// Console log level until `uart::init_logger` installs another logger
pub const DEFAULT_LOG_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::Debug
} else {
    LevelFilter::Info
};
