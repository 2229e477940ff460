//! Services the engine consumes from the surrounding boot firmware.
//!
//! Nothing in here is implemented by the engine itself: the board code
//! provides register access, cache maintenance, interrupt plumbing and a
//! delay source, and the engine only sequences calls into them.

use alloc::boxed::Box;

/// Typed access to one memory-mapped register block. Offsets are in bytes
/// from the start of the block.
pub trait RegisterIo {
    fn read8(&self, offset: u32) -> u8;
    fn read16(&self, offset: u32) -> u16;
    fn read32(&self, offset: u32) -> u32;
    fn write8(&self, offset: u32, value: u8);
    fn write16(&self, offset: u32, value: u16);
    fn write32(&self, offset: u32, value: u32);
}

/// Register block reached through volatile loads and stores.
#[derive(Debug, Clone, Copy)]
pub struct MmioRegs {
    base_addr: usize,
}

impl MmioRegs {
    /// # Safety
    ///
    /// `base_addr` must be the mapped, device-memory address of a register
    /// block that stays mapped for as long as this value is used.
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self { base_addr }
    }

    pub fn base_addr(&self) -> usize {
        self.base_addr
    }
}

impl RegisterIo for MmioRegs {
    fn read8(&self, offset: u32) -> u8 {
        unsafe { core::ptr::read_volatile((self.base_addr + offset as usize) as *const u8) }
    }

    fn read16(&self, offset: u32) -> u16 {
        unsafe { core::ptr::read_volatile((self.base_addr + offset as usize) as *const u16) }
    }

    fn read32(&self, offset: u32) -> u32 {
        unsafe { core::ptr::read_volatile((self.base_addr + offset as usize) as *const u32) }
    }

    fn write8(&self, offset: u32, value: u8) {
        unsafe { core::ptr::write_volatile((self.base_addr + offset as usize) as *mut u8, value) }
    }

    fn write16(&self, offset: u32, value: u16) {
        unsafe { core::ptr::write_volatile((self.base_addr + offset as usize) as *mut u16, value) }
    }

    fn write32(&self, offset: u32, value: u32) {
        unsafe { core::ptr::write_volatile((self.base_addr + offset as usize) as *mut u32, value) }
    }
}

/// Interrupt service routine registered with the platform interrupt
/// controller. Runs in interrupt context.
pub trait IrqHandler {
    fn handle(&self);
}

/// Board services used by the engine.
pub trait Platform {
    /// Busy-wait for `us` microseconds.
    fn delay_us(&self, us: u32);

    /// Write back and invalidate the data cache lines covering the range.
    fn clean_invalidate_dcache_range(&self, addr: usize, len: usize);

    /// Invalidate the data cache lines covering the range without writeback.
    fn invalidate_dcache_range(&self, addr: usize, len: usize);

    fn register_irq_handler(&self, irq: u32, handler: Box<dyn IrqHandler>);

    fn unmask_irq(&self, irq: u32);

    /// Idle until an interrupt may have been delivered.
    fn wait_for_interrupt(&self) {
        core::hint::spin_loop();
    }

    /// Bus address the controller's DMA engine uses for a CPU address.
    ///
    /// The default is the identity map. It panics for addresses the 32-bit
    /// ADMA2 engine cannot reach; boards with memory above 4 GiB override it.
    fn dma_address(&self, addr: usize) -> u32 {
        let Ok(bus) = u32::try_from(addr) else {
            panic!("address {:#x} is beyond 32-bit DMA reach", addr);
        };
        bus
    }
}
