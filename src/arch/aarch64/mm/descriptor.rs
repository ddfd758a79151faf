//! Stage-2 Translation Table Descriptors
//!
//! Builds the 64-bit long-format entries the MMU walks when a guest touches
//! memory. Nothing here allocates tables or keeps walker state; the caller
//! owns every entry and decides which slot it lands in.
//!
//! Table Levels (for 4KB granule):
//! - Level 1: 1GB blocks (entry covers bits [38:30])
//! - Level 2: 2MB blocks or a pointer to a level-3 table (bits [29:21])
//! - Level 3: 4KB pages (entry covers bits [20:12])
//!
//! Two attribute layouts share the same 64 bits:
//!
//! ```text
//! Stage-2 block/page          Long (table) layout
//! [0]     valid               [0]     valid
//! [1]     table/page          [1]     table
//! [5:2]   MemAttr             [4:2]   AttrIndx
//!                             [5]     NS
//! [7:6]   S2AP (R, W)         [7:6]   AP (user, read-only)
//! [9:8]   SH                  [9:8]   SH
//! [10]    AF                  [10]    AF
//! [11]    RES0                [11]    nG
//! [47:12] output address      [47:12] address
//! [52]    contiguous          [52]    contiguous
//! [54]    XN                  [53]    PXN, [54] XN
//! ```
//!
//! Level-1 blocks use the long layout, level-2 blocks and level-3 pages use
//! the stage-2 layout; [`S2Entry::decode`] follows the same rule.

use bitflags::bitflags;

use crate::arch::aarch64::defs::*;
use crate::error::{HvError, HvResult};

/// Translation table level for the 4KB granule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    L1,
    L2,
    L3,
}

impl Level {
    /// Bytes covered by one leaf entry at this level
    pub const fn granule(self) -> u64 {
        match self {
            Level::L1 => BLOCK_SIZE_1GB,
            Level::L2 => BLOCK_SIZE_2MB,
            Level::L3 => PAGE_SIZE_4KB,
        }
    }

    /// Output address bits a leaf entry at this level carries
    pub const fn output_mask(self) -> u64 {
        !(self.granule() - 1) & PTE_ADDR_MASK
    }
}

/// Stage-2 memory type, MemAttr[3:0]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemAttr(u8);

impl MemAttr {
    pub const DEVICE_NGNRNE: Self = Self(0b0000);
    pub const DEVICE_NGNRE: Self = Self(0b0001);
    pub const DEVICE_GRE: Self = Self(0b0011);
    pub const NORMAL_NON_CACHEABLE: Self = Self(0b0101);
    pub const NORMAL_WRITE_THROUGH: Self = Self(0b1010);
    pub const NORMAL_WRITE_BACK: Self = Self(0b1111);

    pub const fn new(bits: u8) -> HvResult<Self> {
        if bits > 0xF {
            return Err(HvError::InvalidArgument);
        }
        Ok(Self(bits))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Index into the memory attribute indirection register, AttrIndx[2:0]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttrIndex(u8);

impl AttrIndex {
    pub const MAX: u8 = 7;

    pub const fn new(index: u8) -> HvResult<Self> {
        if index > Self::MAX {
            return Err(HvError::InvalidArgument);
        }
        Ok(Self(index))
    }

    pub const fn index(self) -> u8 {
        self.0
    }
}

/// Shareability, SH[1:0]. 0b01 is reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shareability {
    NonShareable = 0b00,
    OuterShareable = 0b10,
    InnerShareable = 0b11,
}

impl Shareability {
    const fn bits(self) -> u64 {
        (self as u64) << PTE_SH_SHIFT
    }

    fn from_entry(raw: u64) -> HvResult<Self> {
        match (raw & PTE_SH_MASK) >> PTE_SH_SHIFT {
            0b00 => Ok(Shareability::NonShareable),
            0b10 => Ok(Shareability::OuterShareable),
            0b11 => Ok(Shareability::InnerShareable),
            _ => Err(HvError::InvalidArgument),
        }
    }
}

bitflags! {
    /// Single-bit attributes of a stage-2 block/page descriptor
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct S2LeafFlags: u64 {
        /// S2AP[0], guest reads permitted
        const READ = 1 << 6;
        /// S2AP[1], guest writes permitted
        const WRITE = 1 << 7;
        /// Access flag
        const AF = 1 << 10;
        const CONTIGUOUS = 1 << 52;
        /// Execute never
        const XN = 1 << 54;
    }
}

bitflags! {
    /// Single-bit attributes of a long-format block descriptor
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LongBlockFlags: u64 {
        /// Non-secure output address
        const NS = 1 << 5;
        /// AP[1], unprivileged access
        const AP_USER = 1 << 6;
        /// AP[2], read-only
        const AP_RO = 1 << 7;
        /// Access flag
        const AF = 1 << 10;
        /// Not global
        const NG = 1 << 11;
        const CONTIGUOUS = 1 << 52;
        /// Privileged execute never
        const PXN = 1 << 53;
        /// Execute never
        const XN = 1 << 54;
    }
}

/// Attributes of a block or page mapping
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockAttrs {
    /// Stage-2 layout: memory type selected directly by MemAttr
    Stage2 {
        mem_attr: MemAttr,
        sh: Shareability,
        flags: S2LeafFlags,
    },
    /// Long layout: memory type selected through AttrIndx
    Indexed {
        attr_index: AttrIndex,
        sh: Shareability,
        flags: LongBlockFlags,
    },
}

impl BlockAttrs {
    /// Read/write, non-shareable, accessed, executable
    pub const fn guest_rw(mem_attr: MemAttr) -> Self {
        BlockAttrs::Stage2 {
            mem_attr,
            sh: Shareability::NonShareable,
            flags: S2LeafFlags::READ
                .union(S2LeafFlags::WRITE)
                .union(S2LeafFlags::AF),
        }
    }

    const fn bits(self) -> u64 {
        match self {
            BlockAttrs::Stage2 { mem_attr, sh, flags } => {
                ((mem_attr.bits() as u64) << S2_MEMATTR_SHIFT) | sh.bits() | flags.bits()
            }
            BlockAttrs::Indexed { attr_index, sh, flags } => {
                ((attr_index.index() as u64) << ATTR_INDX_SHIFT) | sh.bits() | flags.bits()
            }
        }
    }
}

/// Decoded translation table entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Descriptor {
    /// Leaf mapping: level-1/2 block or level-3 page
    Block {
        level: Level,
        output_address: u64,
        attrs: BlockAttrs,
    },
    /// Pointer to the next-level table (level 1 or 2)
    TablePointer { next_table: u64 },
}

impl Descriptor {
    /// Pack into the 64-bit wire format. Addresses are masked to the
    /// level's granule and every reserved field is zero.
    pub const fn encode(&self) -> u64 {
        match *self {
            Descriptor::Block { level, output_address, attrs } => {
                let ty = match level {
                    Level::L3 => PTE_VALID | PTE_TABLE,
                    Level::L1 | Level::L2 => PTE_VALID,
                };
                ty | (output_address & level.output_mask()) | attrs.bits()
            }
            Descriptor::TablePointer { next_table } => {
                PTE_VALID | PTE_TABLE | (next_table & TABLE_ADDR_MASK)
            }
        }
    }
}

/// Stage-2 translation table entry
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct S2Entry(u64);

impl S2Entry {
    /// Create an invalid entry
    pub const fn invalid() -> Self {
        Self(0)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get raw value
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Check if entry is valid
    pub const fn is_valid(&self) -> bool {
        self.0 & PTE_VALID != 0
    }

    /// Check the table/page bit, regardless of validity
    pub const fn is_table(&self) -> bool {
        self.0 & PTE_TABLE != 0
    }

    /// Next-level table (or page) address field
    pub const fn table_address(&self) -> u64 {
        self.0 & TABLE_ADDR_MASK
    }

    /// Interpret this entry as found at `level`.
    ///
    /// Returns `Ok(None)` for an invalid entry, which the walker ignores
    /// whatever its other bits hold. Set reserved bits, a reserved
    /// shareability encoding, or output address bits below the granule are
    /// `InvalidArgument`.
    pub fn decode(&self, level: Level) -> HvResult<Option<Descriptor>> {
        let raw = self.0;
        if !self.is_valid() {
            return Ok(None);
        }

        if self.is_table() && level != Level::L3 {
            if raw & S2_TABLE_RES0 != 0 {
                return Err(HvError::InvalidArgument);
            }
            return Ok(Some(Descriptor::TablePointer {
                next_table: raw & TABLE_ADDR_MASK,
            }));
        }

        if level == Level::L3 && !self.is_table() {
            // 0b01 at level 3 is reserved
            return Err(HvError::InvalidArgument);
        }

        let output_address = raw & level.output_mask();
        if raw & PTE_ADDR_MASK & !level.output_mask() != 0 {
            return Err(HvError::InvalidArgument);
        }

        let sh = Shareability::from_entry(raw)?;
        let attrs = match level {
            Level::L1 => {
                if raw & LONG_BLOCK_RES0 != 0 {
                    return Err(HvError::InvalidArgument);
                }
                BlockAttrs::Indexed {
                    attr_index: AttrIndex(((raw & ATTR_INDX_MASK) >> ATTR_INDX_SHIFT) as u8),
                    sh,
                    flags: LongBlockFlags::from_bits_truncate(raw),
                }
            }
            Level::L2 | Level::L3 => {
                if raw & S2_LEAF_RES0 != 0 {
                    return Err(HvError::InvalidArgument);
                }
                BlockAttrs::Stage2 {
                    mem_attr: MemAttr(((raw & S2_MEMATTR_MASK) >> S2_MEMATTR_SHIFT) as u8),
                    sh,
                    flags: S2LeafFlags::from_bits_truncate(raw),
                }
            }
        };

        Ok(Some(Descriptor::Block {
            level,
            output_address,
            attrs,
        }))
    }

    /// Point this level-2 entry at a level-3 table, or disable it.
    ///
    /// Enabling rewrites the whole entry, so no block attribute survives.
    /// A disabled entry keeps its table bit and address so that
    /// [`enable_table`](Self::enable_table) restores the same mapping.
    pub fn configure_table(&mut self, table_base: u64, valid: bool) {
        if valid {
            self.0 = Descriptor::TablePointer {
                next_table: table_base,
            }
            .encode();
        } else {
            self.disable_table();
        }
    }

    /// Set valid and table; the address field is untouched.
    pub fn enable_table(&mut self) {
        self.0 |= PTE_VALID | PTE_TABLE;
    }

    /// Clear valid only.
    pub fn disable_table(&mut self) {
        self.0 &= !PTE_VALID;
    }
}

impl From<Descriptor> for S2Entry {
    fn from(desc: Descriptor) -> Self {
        Self(desc.encode())
    }
}

/// Level 1 Block, 1GB, for the given physical address
///
/// Privileged, non-secure, outer shareable, accessed, executable. Address
/// bits below 1GB are discarded; callers pre-align. `attr_index` selects a
/// MAIR slot and must be at most [`AttrIndex::MAX`].
pub fn build_level1_block(pa: u64, attr_index: u8) -> HvResult<S2Entry> {
    let attr_index = AttrIndex::new(attr_index)?;
    log::trace!("[mm] l1 block pa={:#x} attr_idx={}", pa, attr_index.index());

    let desc = Descriptor::Block {
        level: Level::L1,
        output_address: pa,
        attrs: BlockAttrs::Indexed {
            attr_index,
            sh: Shareability::OuterShareable,
            flags: LongBlockFlags::NS
                | LongBlockFlags::AP_USER
                | LongBlockFlags::AF
                | LongBlockFlags::NG,
        },
    };
    Ok(desc.into())
}

/// Level 2 Block, 2MB, guest read/write with the given stage-2 memory type
pub fn build_level2_block(pa: u64, mem_attr: u8) -> HvResult<S2Entry> {
    let mem_attr = MemAttr::new(mem_attr)?;
    log::trace!("[mm] l2 block pa={:#x} mattr={:#x}", pa, mem_attr.bits());

    let desc = Descriptor::Block {
        level: Level::L2,
        output_address: pa,
        attrs: BlockAttrs::guest_rw(mem_attr),
    };
    Ok(desc.into())
}

/// Install `table_base` as the level-3 table of a level-2 entry, or clear
/// its valid bit when `valid` is false.
pub fn configure_level2_table(entry: &mut S2Entry, table_base: u64, valid: bool) {
    entry.configure_table(table_base, valid);
}

pub fn enable_level2_table(entry: &mut S2Entry) {
    entry.enable_table();
}

pub fn disable_level2_table(entry: &mut S2Entry) {
    entry.disable_table();
}

/// Level 3 Page, 4KB, guest read/write with the given stage-2 memory type
///
/// On error `entry` is left as it was.
pub fn map_level3_page(entry: &mut S2Entry, pa: u64, mem_attr: u8) -> HvResult {
    let mem_attr = MemAttr::new(mem_attr)?;

    *entry = Descriptor::Block {
        level: Level::L3,
        output_address: pa,
        attrs: BlockAttrs::guest_rw(mem_attr),
    }
    .into();
    Ok(())
}
