//! ARM64 Architecture Constants
//!
//! Named constants for generic timer interrupt IDs and long-descriptor
//! translation table fields. Eliminates magic numbers throughout the
//! codebase.

// ── Generic timer interrupt IDs (PPIs) ───────────────────────────────
pub const HYP_TIMER_IRQ: u32 = 26;
pub const VIRT_TIMER_IRQ: u32 = 27;
pub const SEC_PHYS_TIMER_IRQ: u32 = 29;
pub const NS_PHYS_TIMER_IRQ: u32 = 30;

// ── GIC interrupt ID bases ───────────────────────────────────────────
pub const GIC_PPI_BASE: u32 = 16;
pub const GIC_SPI_BASE: u32 = 32;
pub const GIC_PPI_COUNT: u32 = 16;
/// Largest SPI ID; 1020-1023 are special
pub const GIC_MAX_SPI_ID: u32 = 1019;

// ── Descriptor type bits ─────────────────────────────────────────────
pub const PTE_VALID: u64 = 1 << 0;
pub const PTE_TABLE: u64 = 1 << 1;
pub const PTE_TYPE_MASK: u64 = PTE_VALID | PTE_TABLE;

// ── Output / next-level address fields (4KB granule, 48-bit OA) ──────
pub const PTE_ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;
pub const TABLE_ADDR_MASK: u64 = PTE_ADDR_MASK;

pub const BLOCK_SIZE_1GB: u64 = 1 << 30;
pub const BLOCK_SIZE_2MB: u64 = 1 << 21;
pub const PAGE_SIZE_4KB: u64 = 1 << 12;

// ── Lower attribute fields ───────────────────────────────────────────
pub const S2_MEMATTR_SHIFT: u32 = 2;
pub const S2_MEMATTR_MASK: u64 = 0xF << S2_MEMATTR_SHIFT;
pub const ATTR_INDX_SHIFT: u32 = 2;
pub const ATTR_INDX_MASK: u64 = 0x7 << ATTR_INDX_SHIFT;
pub const PTE_SH_SHIFT: u32 = 8;
pub const PTE_SH_MASK: u64 = 0x3 << PTE_SH_SHIFT;

// ── Reserved (RES0) fields ───────────────────────────────────────────
/// Stage-2 block/page: bit 11, OA[51:48], bit 53, bits [63:55]
pub const S2_LEAF_RES0: u64 = (1 << 11) | (0xF << 48) | (1 << 53) | (0x1FF << 55);
/// Long-format block: OA[51:48]
pub const LONG_BLOCK_RES0: u64 = 0xF << 48;
/// Stage-2 table descriptor: OA[51:48] and the stage-1-only table attributes [63:59]
pub const S2_TABLE_RES0: u64 = (0xF << 48) | (0x1F << 59);
