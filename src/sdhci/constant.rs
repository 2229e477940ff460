use bitflags::bitflags;

// SDHCI register offsets
pub const SDHCI_ARGUMENT2: u32 = 0x00;
pub const SDHCI_BLOCK_SIZE: u32 = 0x04;
pub const SDHCI_BLOCK_COUNT: u32 = 0x06;
pub const SDHCI_ARGUMENT: u32 = 0x08;
pub const SDHCI_TRANSFER_MODE: u32 = 0x0C;
pub const SDHCI_COMMAND: u32 = 0x0E;
pub const SDHCI_RESPONSE: u32 = 0x10; // 0x10-0x1F, 4 registers
pub const SDHCI_PRESENT_STATE: u32 = 0x24;
pub const SDHCI_HOST_CONTROL: u32 = 0x28;
pub const SDHCI_POWER_CONTROL: u32 = 0x29;
pub const SDHCI_CLOCK_CONTROL: u32 = 0x2C;
pub const SDHCI_TIMEOUT_CONTROL: u32 = 0x2E;
pub const SDHCI_SOFTWARE_RESET: u32 = 0x2F;
pub const SDHCI_NRML_INT_STATUS: u32 = 0x30;
pub const SDHCI_ERR_INT_STATUS: u32 = 0x32;
pub const SDHCI_NRML_INT_STATUS_EN: u32 = 0x34;
pub const SDHCI_ERR_INT_STATUS_EN: u32 = 0x36;
pub const SDHCI_NRML_INT_SIGNAL_EN: u32 = 0x38;
pub const SDHCI_ERR_INT_SIGNAL_EN: u32 = 0x3A;
pub const SDHCI_HOST_CONTROL2: u32 = 0x3E;
pub const SDHCI_CAPABILITIES: u32 = 0x40;
pub const SDHCI_CAPABILITIES_1: u32 = 0x44;
pub const SDHCI_ADMA_ADDRESS: u32 = 0x58;
pub const SDHCI_HOST_VERSION: u32 = 0xFE;

/*
 * Vendor core (MCI) registers, relative to the core block base.
 */
pub const SDCC_MCI_HC_MODE: u32 = 0x78;
pub const SDCC_HC_PWRCTL_MASK: u32 = 0xE0;
pub const SDCC_HC_PWRCTL_CTL: u32 = 0xE8;

pub const SDCC_HC_MODE_EN: u32 = 0x1;
pub const SDCC_HC_MODE_DIS: u32 = 0x0;

// Capabilities register 0
pub const SDHCI_CAP_BASE_CLK_MASK: u32 = 0x0000_FF00;
pub const SDHCI_CAP_BASE_CLK_SHIFT: u32 = 8;
pub const SDHCI_CAP_MAX_BLK_LEN_MASK: u32 = 0x0003_0000;
pub const SDHCI_CAP_MAX_BLK_LEN_SHIFT: u32 = 16;
pub const SDHCI_CAN_DO_8BIT: u32 = 0x0004_0000;
pub const SDHCI_CAN_DO_ADMA2: u32 = 0x0008_0000;
pub const SDHCI_CAN_VDD_330: u32 = 0x0100_0000;
pub const SDHCI_CAN_VDD_300: u32 = 0x0200_0000;
pub const SDHCI_CAN_VDD_180: u32 = 0x0400_0000;

// Capabilities register 1
pub const SDHCI_SUPPORT_SDR50: u32 = 0x0000_0001;
pub const SDHCI_SUPPORT_DDR50: u32 = 0x0000_0004;

// Command register layout
pub const SDHCI_CMD_DATA_PRESENT: u16 = 1 << 5;
pub const SDHCI_CMD_TYPE_SHIFT: u16 = 6;
pub const SDHCI_CMD_INDEX_SHIFT: u16 = 8;

// Clock control divider layout (SDHCI 3.0, 10-bit divided clock mode)
pub const SDHCI_DIVIDER_SHIFT: u16 = 8;
pub const SDHCI_DIVIDER_HI_SHIFT: u16 = 6;
pub const SDHCI_DIV_MASK: u16 = 0xFF;
pub const SDHCI_DIV_HI_MASK: u16 = 0x300;

pub const SDHCI_POWER_VOLTAGE_SHIFT: u8 = 1;

/// Data timeout counter value, TMCLK x 2^27.
pub const SDHCI_CMD_TIMEOUT: u8 = 0xE;

pub const SDHCI_MMC_BLK_SZ: u32 = 512;
pub const SDHCI_CLK_MAX_DIV: u32 = 2046;
pub const SDHCI_CLK_400KHZ: u32 = 400_000;
pub const SDHCI_CLK_100MHZ: u32 = 100_000_000;

// Largest span one ADMA2 descriptor can cover; a length field of 0 encodes it.
pub const SDHCI_ADMA_DESC_LINE_SZ: u32 = 65536;
pub const SDHCI_ADMA_ADDR_ALIGN: usize = 4;

pub const SDHCI_CACHE_LINE_SIZE: usize = 64;

// Polling budgets: (attempts, delay between attempts in us)
pub const SDHCI_LINES_FREE_RETRY: u32 = 10;
pub const SDHCI_LINES_FREE_DELAY_US: u32 = 1000;
pub const SDHCI_MAX_CMD_RETRY: u32 = 10000;
pub const SDHCI_CMD_RETRY_DELAY_US: u32 = 500;
pub const SDHCI_MAX_TRANS_RETRY: u32 = 100000;
pub const SDHCI_TRANS_RETRY_DELAY_US: u32 = 1000;
pub const SDHCI_RESET_RETRY: u32 = 20;
pub const SDHCI_CLK_STABLE_RETRY: u32 = 20;
pub const SDHCI_WAIT_DELAY_US: u32 = 1000;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PresentState: u32 {
        const CMD_INHIBIT = 1 << 0;
        const DAT_INHIBIT = 1 << 1;
        const CARD_INSERTED = 1 << 16;
        const WRITE_PROTECT = 1 << 19;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostControl1: u8 {
        const LED = 0x01;
        const DATA_WIDTH_4BIT = 0x02;
        const HIGH_SPEED = 0x04;
        const DMA_SELECT_MASK = 0x18;
        const ADMA32 = 0x10;
        const EXT_DATA_WIDTH_8BIT = 0x20;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostControl2: u16 {
        const UHS_MODE_MASK = 0x0007;
        const UHS_SDR50 = 0x0002;
        const UHS_DDR50 = 0x0004;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PowerControl: u8 {
        const BUS_POWER_ON = 0x01;
        const VOLTAGE_MASK = 0x0E;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClockControl: u16 {
        const INT_CLK_EN = 0x0001;
        const INT_CLK_STABLE = 0x0002;
        const CARD_CLK_EN = 0x0004;
        const DIVIDER_HI = 0x00C0;
        const DIVIDER = 0xFF00;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SoftwareReset: u8 {
        const ALL = 0x01;
        const CMD = 0x02;
        const DATA = 0x04;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransferMode: u16 {
        const DMA_EN = 0x01;
        const BLK_CNT_EN = 0x02;
        const AUTO_CMD12 = 0x04;
        const AUTO_CMD23 = 0x08;
        const READ = 0x10;
        const MULTI_BLOCK = 0x20;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NormalIntStatus: u16 {
        const CMD_COMPLETE = 1 << 0;
        const XFER_COMPLETE = 1 << 1;
        const BLOCK_GAP = 1 << 2;
        const DMA_INT = 1 << 3;
        const CARD_INSERT = 1 << 6;
        const CARD_REMOVE = 1 << 7;
        const CARD_INT = 1 << 8;
        const ERROR = 1 << 15;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorIntStatus: u16 {
        const CMD_TIMEOUT = 1 << 0;
        const CMD_CRC = 1 << 1;
        const CMD_END_BIT = 1 << 2;
        const CMD_INDEX = 1 << 3;
        const DATA_TIMEOUT = 1 << 4;
        const DATA_CRC = 1 << 5;
        const DATA_END_BIT = 1 << 6;
        const CURRENT_LIMIT = 1 << 7;
        const AUTO_CMD12 = 1 << 8;
        const ADMA = 1 << 9;
    }
}

/// Normal interrupts enabled at bring-up: command complete, transfer
/// complete and DMA interrupt.
pub const SDHCI_NRML_INT_ENABLE: NormalIntStatus = NormalIntStatus::CMD_COMPLETE
    .union(NormalIntStatus::XFER_COMPLETE)
    .union(NormalIntStatus::DMA_INT);
pub const SDHCI_ERR_INT_ENABLE: u16 = 0xFFFF;

bitflags! {
    /// Conditions the power-control interrupt can be raised for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PwrCtlIrq: u32 {
        const BUS_ON = 1 << 0;
        const BUS_OFF = 1 << 1;
        const IO_SIG_LOW = 1 << 2;
        const IO_SIG_HIGH = 1 << 3;
    }
}

bitflags! {
    /// Acknowledgment written to the power-control CTL register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PwrCtlAck: u32 {
        const BUS_ON_OFF_SUCC = 1 << 0;
        const IO_SIG_SUCC = 1 << 2;
    }
}

/// Response length field of the command register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResponseLength {
    None = 0,
    Long136 = 1,
    Short48 = 2,
    Short48Busy = 3,
}

/// Bus voltage select field of the power control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BusVoltage {
    V1_8 = 0b101,
    V3_0 = 0b110,
    V3_3 = 0b111,
}

impl BusVoltage {
    pub const fn power_bits(self) -> u8 {
        (self as u8) << SDHCI_POWER_VOLTAGE_SHIFT
    }
}

// SD/MMC command indices the engine treats specially
pub const MMC_SWITCH: u8 = 6;

// Response types
pub const MMC_RSP_PRESENT: u32 = 1 << 0;
pub const MMC_RSP_136: u32 = 1 << 1; // 136-bit response
pub const MMC_RSP_CRC: u32 = 1 << 2; // Expect valid CRC
pub const MMC_RSP_BUSY: u32 = 1 << 3; // Card may send busy
pub const MMC_RSP_OPCODE: u32 = 1 << 4; // Response contains opcode

pub const MMC_RSP_NONE: u32 = 0;
pub const MMC_RSP_R1: u32 = MMC_RSP_PRESENT | MMC_RSP_CRC | MMC_RSP_OPCODE;
pub const MMC_RSP_R1B: u32 = MMC_RSP_PRESENT | MMC_RSP_CRC | MMC_RSP_OPCODE | MMC_RSP_BUSY;
pub const MMC_RSP_R2: u32 = MMC_RSP_PRESENT | MMC_RSP_136 | MMC_RSP_CRC;
pub const MMC_RSP_R3: u32 = MMC_RSP_PRESENT;
pub const MMC_RSP_R4: u32 = MMC_RSP_PRESENT;
pub const MMC_RSP_R5: u32 = MMC_RSP_PRESENT | MMC_RSP_CRC | MMC_RSP_OPCODE;
pub const MMC_RSP_R6: u32 = MMC_RSP_PRESENT | MMC_RSP_CRC | MMC_RSP_OPCODE;
pub const MMC_RSP_R7: u32 = MMC_RSP_PRESENT | MMC_RSP_CRC | MMC_RSP_OPCODE;
