//! Simulated SDHCI controller, vendor core and board services.
#![allow(dead_code)]

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::cell::RefCell;
use std::rc::Rc;

use sdhci_boot::platform::{IrqHandler, Platform, RegisterIo};
use sdhci_boot::sdhci::constant::*;

const DMA_WINDOW: u32 = 0x0400_0000;
const DMA_BASE: u32 = 0x4000_0000;

/// Controller capabilities: 200 MHz base clock, 512 byte blocks, 8-bit bus,
/// ADMA2 and 3.3V.
pub const CAPS_200MHZ_33V: u32 = (200 << 8) | SDHCI_CAN_DO_8BIT | SDHCI_CAN_DO_ADMA2 | SDHCI_CAN_VDD_330;
pub const CAPS1_SDR50_DDR50: u32 = SDHCI_SUPPORT_SDR50 | SDHCI_SUPPORT_DDR50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmaLine {
    pub attr: u16,
    pub len: u16,
    pub addr: u32,
}

/// Register values latched when the command register was written.
#[derive(Debug, Clone, Default)]
pub struct IssuedCommand {
    pub command: u16,
    pub argument: u32,
    pub argument2: u32,
    pub block_size: u16,
    pub block_count: u16,
    pub transfer_mode: u16,
    pub timeout_control: u8,
    pub adma: Vec<AdmaLine>,
}

impl IssuedCommand {
    pub fn index(&self) -> u8 {
        (self.command >> 8) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    CleanInvalidate(usize, usize),
    Invalidate(usize, usize),
}

pub struct Controller {
    hc: [u8; 256],
    mci: [u8; 256],
    dma_map: Vec<(usize, u32)>,

    pub reset_stuck: bool,
    pub clock_never_stable: bool,
    pub lines_busy: bool,
    pub card_inserted: bool,
    pub write_protect: bool,
    pub cmd_completes: bool,
    pub xfer_completes: bool,
    /// Error status raised with the next command
    pub inject_error: u16,
    /// Raw response registers loaded on every command
    pub response: [u32; 4],

    pub commands: Vec<IssuedCommand>,
    pub resets: Vec<u8>,
    pub hc_writes: Vec<(u32, u32)>,
    pub pwr_acks: Vec<u32>,
    pub written: Vec<u8>,
    pub pwr_irq_pending: bool,

    pub delay_calls: usize,
    pub delay_total_us: u64,
    pub cache_ops: Vec<CacheOp>,
    pub registered_irq: Option<u32>,
    pub unmasked: Vec<u32>,
    pub wfi_calls: usize,
}

impl Controller {
    fn new(caps0: u32, caps1: u32) -> Self {
        let mut c = Self {
            hc: [0; 256],
            mci: [0; 256],
            dma_map: Vec::new(),
            reset_stuck: false,
            clock_never_stable: false,
            lines_busy: false,
            card_inserted: true,
            write_protect: false,
            cmd_completes: true,
            xfer_completes: true,
            inject_error: 0,
            response: [0; 4],
            commands: Vec::new(),
            resets: Vec::new(),
            hc_writes: Vec::new(),
            pwr_acks: Vec::new(),
            written: Vec::new(),
            pwr_irq_pending: false,
            delay_calls: 0,
            delay_total_us: 0,
            cache_ops: Vec::new(),
            registered_irq: None,
            unmasked: Vec::new(),
            wfi_calls: 0,
        };
        store(&mut c.hc, SDHCI_CAPABILITIES, 4, caps0);
        store(&mut c.hc, SDHCI_CAPABILITIES_1, 4, caps1);
        store(&mut c.hc, SDHCI_HOST_VERSION, 2, 0x0002);
        c
    }

    pub fn hc(&self, offset: u32, width: usize) -> u32 {
        load(&self.hc, offset, width)
    }

    pub fn mci(&self, offset: u32) -> u32 {
        load(&self.mci, offset, 4)
    }

    pub fn set_hc(&mut self, offset: u32, width: usize, value: u32) {
        store(&mut self.hc, offset, width, value)
    }

    pub fn normal_status(&self) -> u16 {
        self.hc(SDHCI_NRML_INT_STATUS, 2) as u16
    }

    pub fn error_status(&self) -> u16 {
        self.hc(SDHCI_ERR_INT_STATUS, 2) as u16
    }

    /// Writes to `offset` seen so far, oldest first.
    pub fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.hc_writes.iter().filter(|(o, _)| *o == offset).map(|(_, v)| *v).collect()
    }

    fn dma_address(&mut self, addr: usize) -> u32 {
        if let Some(bus) = self.cpu_to_bus(addr) {
            return bus;
        }
        let bus = DMA_BASE + self.dma_map.len() as u32 * DMA_WINDOW;
        self.dma_map.push((addr, bus));
        bus
    }

    fn cpu_to_bus(&self, addr: usize) -> Option<u32> {
        self.dma_map
            .iter()
            .find(|(cpu, _)| addr >= *cpu && addr - *cpu < DMA_WINDOW as usize)
            .map(|(cpu, bus)| bus + (addr - cpu) as u32)
    }

    fn bus_to_cpu(&self, addr: u32) -> usize {
        self.dma_map
            .iter()
            .find(|(_, bus)| addr >= *bus && addr - *bus < DMA_WINDOW)
            .map(|(cpu, bus)| cpu + (addr - bus) as usize)
            .unwrap_or_else(|| panic!("bus address {addr:#x} was never mapped"))
    }

    fn read(&mut self, offset: u32, width: usize) -> u32 {
        if offset == SDHCI_PRESENT_STATE {
            let mut state = PresentState::empty();
            if self.lines_busy {
                state |= PresentState::CMD_INHIBIT | PresentState::DAT_INHIBIT;
            }
            if self.card_inserted {
                state |= PresentState::CARD_INSERTED;
            }
            if self.write_protect {
                state |= PresentState::WRITE_PROTECT;
            }
            store(&mut self.hc, SDHCI_PRESENT_STATE, 4, state.bits());
        }
        if offset == SDHCI_NRML_INT_STATUS {
            let mut normal = self.normal_status() & !NormalIntStatus::ERROR.bits();
            if self.error_status() != 0 {
                normal |= NormalIntStatus::ERROR.bits();
            }
            store(&mut self.hc, SDHCI_NRML_INT_STATUS, 2, normal as u32);
        }
        load(&self.hc, offset, width)
    }

    fn write(&mut self, offset: u32, width: usize, value: u32) {
        self.hc_writes.push((offset, value));

        match offset {
            SDHCI_NRML_INT_STATUS | SDHCI_ERR_INT_STATUS => {
                let cur = load(&self.hc, offset, width);
                store(&mut self.hc, offset, width, cur & !value);
            }
            SDHCI_SOFTWARE_RESET => {
                self.resets.push(value as u8);
                let held = if self.reset_stuck { value } else { 0 };
                store(&mut self.hc, offset, width, held);
            }
            SDHCI_CLOCK_CONTROL => {
                let mut clk = value as u16 & !ClockControl::INT_CLK_STABLE.bits();
                if clk & ClockControl::INT_CLK_EN.bits() != 0 && !self.clock_never_stable {
                    clk |= ClockControl::INT_CLK_STABLE.bits();
                }
                store(&mut self.hc, offset, width, clk as u32);
            }
            SDHCI_POWER_CONTROL => {
                store(&mut self.hc, offset, width, value);
                if value as u8 & PowerControl::BUS_POWER_ON.bits() != 0 {
                    self.pwr_irq_pending = true;
                }
            }
            SDHCI_COMMAND => {
                store(&mut self.hc, offset, width, value);
                self.run_command();
            }
            _ => store(&mut self.hc, offset, width, value),
        }
    }

    fn write_mci(&mut self, offset: u32, value: u32) {
        store(&mut self.mci, offset, 4, value);
        if offset == SDCC_HC_PWRCTL_CTL {
            self.pwr_acks.push(value);
        }
    }

    fn run_command(&mut self) {
        let mut cmd = IssuedCommand {
            command: self.hc(SDHCI_COMMAND, 2) as u16,
            argument: self.hc(SDHCI_ARGUMENT, 4),
            argument2: self.hc(SDHCI_ARGUMENT2, 4),
            block_size: self.hc(SDHCI_BLOCK_SIZE, 2) as u16,
            block_count: self.hc(SDHCI_BLOCK_COUNT, 2) as u16,
            transfer_mode: self.hc(SDHCI_TRANSFER_MODE, 2) as u16,
            timeout_control: self.hc(SDHCI_TIMEOUT_CONTROL, 1) as u8,
            adma: Vec::new(),
        };

        let data = cmd.command & SDHCI_CMD_DATA_PRESENT != 0;
        if data {
            cmd.adma = self.walk_adma();
            self.run_dma(&cmd);
        }

        for (i, word) in self.response.into_iter().enumerate() {
            store(&mut self.hc, SDHCI_RESPONSE + 4 * i as u32, 4, word);
        }

        let mut normal = self.normal_status();
        if self.cmd_completes {
            normal |= NormalIntStatus::CMD_COMPLETE.bits();
        }
        if (data || cmd.index() == MMC_SWITCH) && self.xfer_completes {
            normal |= NormalIntStatus::XFER_COMPLETE.bits();
        }
        store(&mut self.hc, SDHCI_NRML_INT_STATUS, 2, normal as u32);

        let err = self.error_status() | self.inject_error;
        store(&mut self.hc, SDHCI_ERR_INT_STATUS, 2, err as u32);

        self.commands.push(cmd);
    }

    fn walk_adma(&self) -> Vec<AdmaLine> {
        let mut lines = Vec::new();
        let mut cpu = self.bus_to_cpu(self.hc(SDHCI_ADMA_ADDRESS, 4));
        loop {
            let raw = unsafe { std::ptr::read_unaligned(cpu as *const [u8; 8]) };
            let line = AdmaLine {
                attr: u16::from_le_bytes([raw[0], raw[1]]),
                len: u16::from_le_bytes([raw[2], raw[3]]),
                addr: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            };
            lines.push(line);
            if line.attr & 0x2 != 0 || line.attr & 0x1 == 0 || lines.len() > 1024 {
                break;
            }
            cpu += 8;
        }
        lines
    }

    fn run_dma(&mut self, cmd: &IssuedCommand) {
        let read = cmd.transfer_mode & TransferMode::READ.bits() != 0;
        let mut pos = 0usize;
        for line in &cmd.adma {
            let len = if line.len == 0 { 65536 } else { line.len as usize };
            let cpu = self.bus_to_cpu(line.addr);
            if read {
                for i in 0..len {
                    unsafe { *((cpu + i) as *mut u8) = fill_byte(pos + i) };
                }
            } else {
                let src = unsafe { std::slice::from_raw_parts(cpu as *const u8, len) };
                self.written.extend_from_slice(src);
            }
            pos += len;
        }
    }
}

/// Byte the simulated card returns at `pos` of a read.
pub fn fill_byte(pos: usize) -> u8 {
    (pos % 251) as u8
}

fn load(mem: &[u8; 256], offset: u32, width: usize) -> u32 {
    let o = offset as usize;
    let mut v = 0u32;
    for i in 0..width {
        v |= (mem[o + i] as u32) << (8 * i);
    }
    v
}

fn store(mem: &mut [u8; 256], offset: u32, width: usize, value: u32) {
    let o = offset as usize;
    for i in 0..width {
        mem[o + i] = (value >> (8 * i)) as u8;
    }
}

#[derive(Clone)]
enum Block {
    Hc,
    Mci,
}

#[derive(Clone)]
pub struct SimRegs {
    state: Rc<RefCell<Controller>>,
    block: Block,
}

impl RegisterIo for SimRegs {
    fn read8(&self, offset: u32) -> u8 {
        self.read(offset, 1) as u8
    }

    fn read16(&self, offset: u32) -> u16 {
        self.read(offset, 2) as u16
    }

    fn read32(&self, offset: u32) -> u32 {
        self.read(offset, 4)
    }

    fn write8(&self, offset: u32, value: u8) {
        self.write(offset, 1, value as u32)
    }

    fn write16(&self, offset: u32, value: u16) {
        self.write(offset, 2, value as u32)
    }

    fn write32(&self, offset: u32, value: u32) {
        self.write(offset, 4, value)
    }
}

impl SimRegs {
    fn read(&self, offset: u32, width: usize) -> u32 {
        let mut state = self.state.borrow_mut();
        match self.block {
            Block::Hc => state.read(offset, width),
            Block::Mci => load(&state.mci, offset, width),
        }
    }

    fn write(&self, offset: u32, width: usize, value: u32) {
        let mut state = self.state.borrow_mut();
        match self.block {
            Block::Hc => state.write(offset, width, value),
            Block::Mci => state.write_mci(offset, value),
        }
    }
}

type Handler = Rc<RefCell<Option<Box<dyn IrqHandler>>>>;

#[derive(Clone)]
pub struct SimPlatform {
    state: Rc<RefCell<Controller>>,
    handler: Handler,
}

impl Platform for SimPlatform {
    fn delay_us(&self, us: u32) {
        let mut state = self.state.borrow_mut();
        state.delay_calls += 1;
        state.delay_total_us += us as u64;
    }

    fn clean_invalidate_dcache_range(&self, addr: usize, len: usize) {
        self.state.borrow_mut().cache_ops.push(CacheOp::CleanInvalidate(addr, len));
    }

    fn invalidate_dcache_range(&self, addr: usize, len: usize) {
        self.state.borrow_mut().cache_ops.push(CacheOp::Invalidate(addr, len));
    }

    fn register_irq_handler(&self, irq: u32, handler: Box<dyn IrqHandler>) {
        self.state.borrow_mut().registered_irq = Some(irq);
        *self.handler.borrow_mut() = Some(handler);
    }

    fn unmask_irq(&self, irq: u32) {
        self.state.borrow_mut().unmasked.push(irq);
    }

    fn wait_for_interrupt(&self) {
        let fire = {
            let mut state = self.state.borrow_mut();
            state.wfi_calls += 1;
            assert!(state.wfi_calls < 1000, "power interrupt never delivered");
            let irq = state.registered_irq;
            let fire = state.pwr_irq_pending && irq.is_some_and(|irq| state.unmasked.contains(&irq));
            if fire {
                state.pwr_irq_pending = false;
            }
            fire
        };

        if fire {
            if let Some(handler) = self.handler.borrow().as_ref() {
                handler.handle();
            }
        }
    }

    fn dma_address(&self, addr: usize) -> u32 {
        self.state.borrow_mut().dma_address(addr)
    }
}

/// One simulated controller with handles for the host and for inspection.
pub struct Sim {
    state: Rc<RefCell<Controller>>,
    handler: Handler,
}

impl Sim {
    pub fn new(caps0: u32, caps1: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(Controller::new(caps0, caps1))),
            handler: Rc::new(RefCell::new(None)),
        }
    }

    pub fn regs(&self) -> SimRegs {
        SimRegs {
            state: self.state.clone(),
            block: Block::Hc,
        }
    }

    pub fn mci(&self) -> SimRegs {
        SimRegs {
            state: self.state.clone(),
            block: Block::Mci,
        }
    }

    pub fn platform(&self) -> SimPlatform {
        SimPlatform {
            state: self.state.clone(),
            handler: self.handler.clone(),
        }
    }

    pub fn state(&self) -> std::cell::RefMut<'_, Controller> {
        self.state.borrow_mut()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.borrow().is_some()
    }
}

/// Heap buffer aligned to a cache line.
pub struct AlignedBuf {
    ptr: *mut u8,
    layout: Layout,
}

impl AlignedBuf {
    pub fn new(len: usize) -> Self {
        let layout = Layout::from_size_align(len, SDHCI_CACHE_LINE_SIZE).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        Self { ptr, layout }
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.layout.size()) }
    }

    pub fn addr(&self) -> usize {
        self.ptr as usize
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) }
    }
}
