//! ADMA2 descriptor tables (32-bit addressing).
//!
//! Each descriptor line is laid out as
//!
//! ```text
//!  ___________________________________________________
//! | Attribute   | Length        | Data Address        |
//! | (16 bit)    | (16 bit)      | (32 bit)            |
//! |_____________|_______________|_____________________|
//! ```

use alloc::vec::Vec;
use bitflags::bitflags;
use log::debug;

use crate::platform::{Platform, RegisterIo};

use super::{SdhciHost, constant::SDHCI_ADMA_DESC_LINE_SZ};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AdmaAttr: u16 {
        const VALID = 1 << 0;
        const END   = 1 << 1;
        const TRAN  = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct AdmaDescriptor {
    attr: AdmaAttr,
    len: u16,
    addr: u32,
}

impl AdmaDescriptor {
    fn transfer(addr: u32, len: u32, end: bool) -> Self {
        let mut attr = AdmaAttr::VALID | AdmaAttr::TRAN;
        if end {
            attr |= AdmaAttr::END;
        }
        Self {
            attr,
            // A full line is encoded as 0
            len: (len % SDHCI_ADMA_DESC_LINE_SZ) as u16,
            addr,
        }
    }

    pub fn attr(&self) -> AdmaAttr {
        self.attr
    }

    /// Bytes covered by this line.
    pub fn length(&self) -> u32 {
        if self.len == 0 {
            SDHCI_ADMA_DESC_LINE_SZ
        } else {
            self.len as u32
        }
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }
}

/// Descriptor chain for one data command. The memory backing it is released
/// when the table is dropped.
#[derive(Debug)]
pub struct AdmaTable {
    desc: Vec<AdmaDescriptor>,
}

impl AdmaTable {
    /// Describe `len` bytes starting at bus address `addr`, split into full
    /// lines plus a final line flagged END.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero or the range runs past the 4 GiB the 32-bit
    /// descriptors can address.
    pub fn build(addr: u32, len: u32) -> Self {
        assert!(len > 0, "empty ADMA transfer");
        assert!(
            addr as u64 + len as u64 <= 1 << 32,
            "ADMA transfer {:#x}+{:#x} crosses 4 GiB",
            addr,
            len
        );

        let lines = len.div_ceil(SDHCI_ADMA_DESC_LINE_SZ) as usize;
        let mut desc = Vec::with_capacity(lines);

        let mut addr = addr;
        let mut remain = len;
        for _ in 0..lines - 1 {
            desc.push(AdmaDescriptor::transfer(addr, SDHCI_ADMA_DESC_LINE_SZ, false));
            addr += SDHCI_ADMA_DESC_LINE_SZ;
            remain -= SDHCI_ADMA_DESC_LINE_SZ;
        }
        desc.push(AdmaDescriptor::transfer(addr, remain, true));

        Self { desc }
    }

    pub fn descriptors(&self) -> &[AdmaDescriptor] {
        &self.desc
    }

    /// CPU address of the first descriptor.
    pub fn as_ptr(&self) -> *const AdmaDescriptor {
        self.desc.as_ptr()
    }

    /// Size of the table in bytes.
    pub fn byte_len(&self) -> usize {
        core::mem::size_of_val(self.desc.as_slice())
    }
}

impl<R: RegisterIo, P: Platform> SdhciHost<R, P> {
    /// Build the descriptor chain for `len` bytes at CPU address `data` and
    /// push it out to memory for the controller.
    pub(super) fn prep_desc_table(&self, data: usize, len: u32) -> AdmaTable {
        let table = AdmaTable::build(self.platform.dma_address(data), len);

        self.platform
            .clean_invalidate_dcache_range(table.as_ptr() as usize, table.byte_len());

        debug!("ADMA table: {} lines for {} bytes", table.descriptors().len(), len);
        table
    }
}
