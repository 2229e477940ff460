pub mod constant;

mod adma;
mod caps;
mod clock;
mod cmd;
mod config;
mod mode;
mod power;

use core::fmt::Display;

use alloc::sync::Arc;
use log::{debug, error, info};

use crate::err::SdError;
use crate::platform::{Platform, RegisterIo};
use constant::*;

pub use adma::{AdmaAttr, AdmaDescriptor, AdmaTable};
pub use caps::Capabilities;
pub use clock::{clock_divisor, divider_bits};
pub use cmd::{
    CmdState, CmdType, DataBuffer, MmcCommand, MmcData, assemble_r2, classify_error, make_command,
    response_length,
};
pub use config::{AutoCmd, HostConfig, RegRange, SdhciRegions, probe};
pub use mode::BusWidth;
pub use power::{PowerIrqHandler, PowerSignal};

/// SDHCI host controller with a vendor core carrying the power-control
/// handshake.
pub struct SdhciHost<R: RegisterIo, P: Platform> {
    regs: R,
    mci: R,
    platform: P,
    config: HostConfig,
    caps: Capabilities,
    cur_clk_rate: u32,
    pwr_signal: Arc<PowerSignal>,
}

impl<R: RegisterIo, P: Platform> Display for SdhciHost<R, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "SDHCI Controller {{ base clock: {} Hz, max block: {}, voltage: {:?}, clock: {} Hz }}",
            self.caps.base_clk_rate, self.caps.max_blk_len, self.caps.voltage, self.cur_clk_rate
        )
    }
}

impl<R: RegisterIo + Clone + 'static, P: Platform> SdhciHost<R, P> {
    /// Bring the controller up to the point where commands can be issued:
    /// reset, capabilities, bus power, 1-bit bus, ADMA2 and interrupts, then
    /// the identification clock if the config asks for one.
    ///
    /// Blocks until the power-control interrupt acknowledges bus power.
    pub fn initialize(regs: R, mci: R, platform: P, config: HostConfig) -> Result<Self, SdError> {
        info!("Init SDHCI Controller");

        let mut host = Self {
            regs,
            mci,
            platform,
            config,
            caps: Capabilities::default(),
            cur_clk_rate: 0,
            pwr_signal: Arc::new(PowerSignal::new()),
        };

        if host.config.enable_hc_mode {
            host.set_host_mode(true);
        }

        host.reset(SoftwareReset::ALL)?;

        info!("SDHCI Version: {:#x}", host.version());
        host.caps = host.read_capabilities();

        host.enable_power_irq();
        host.set_bus_power_on();
        host.wait_power_ack();

        host.set_bus_width(BusWidth::One);
        host.set_adma_mode();

        host.enable_interrupts();

        if let Some(freq) = host.config.init_clock {
            host.supply_clock(freq)?;
        }

        info!("SDHCI Controller ready: {}", host);
        Ok(host)
    }
}

impl<R: RegisterIo, P: Platform> SdhciHost<R, P> {
    // Read a 32-bit register
    fn read_reg(&self, offset: u32) -> u32 {
        self.regs.read32(offset)
    }

    // Read a 16-bit register
    fn read_reg16(&self, offset: u32) -> u16 {
        self.regs.read16(offset)
    }

    // Read an 8-bit register
    fn read_reg8(&self, offset: u32) -> u8 {
        self.regs.read8(offset)
    }

    // Write a 32-bit register
    fn write_reg(&self, offset: u32, value: u32) {
        self.regs.write32(offset, value)
    }

    // Write a 16-bit register
    fn write_reg16(&self, offset: u32, value: u16) {
        self.regs.write16(offset, value)
    }

    // Write an 8-bit register
    fn write_reg8(&self, offset: u32, value: u8) {
        self.regs.write8(offset, value)
    }

    /// Issue a software reset and wait for the controller to clear it.
    pub fn reset(&self, mask: SoftwareReset) -> Result<(), SdError> {
        self.write_reg8(SDHCI_SOFTWARE_RESET, mask.bits());

        let mut timeout = SDHCI_RESET_RETRY;
        while self.read_reg8(SDHCI_SOFTWARE_RESET) & mask.bits() != 0 {
            if timeout == 0 {
                error!("Reset {:#x} never completed", mask.bits());
                return Err(SdError::ResetTimeout);
            }
            timeout -= 1;
            self.platform.delay_us(SDHCI_WAIT_DELAY_US);
        }

        Ok(())
    }

    /// Reset the command and data line state machines without waiting.
    pub fn reset_lines(&self) {
        self.write_reg8(SDHCI_SOFTWARE_RESET, (SoftwareReset::CMD | SoftwareReset::DATA).bits());
    }

    /// Switch the vendor core between SDHCI and legacy mode.
    pub fn set_host_mode(&self, enable: bool) {
        let mode = if enable { SDCC_HC_MODE_EN } else { SDCC_HC_MODE_DIS };
        self.mci.write32(SDCC_MCI_HC_MODE, mode);
        debug!("SDCC HC mode: {:#x}", mode);
    }

    fn enable_interrupts(&self) {
        self.write_reg16(SDHCI_NRML_INT_STATUS_EN, SDHCI_NRML_INT_ENABLE.bits());
        self.write_reg16(SDHCI_ERR_INT_STATUS_EN, SDHCI_ERR_INT_ENABLE);

        self.write_reg16(SDHCI_NRML_INT_SIGNAL_EN, SDHCI_NRML_INT_ENABLE.bits());
        self.write_reg16(SDHCI_ERR_INT_SIGNAL_EN, SDHCI_ERR_INT_ENABLE);
    }

    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Host controller version register.
    pub fn version(&self) -> u16 {
        self.read_reg16(SDHCI_HOST_VERSION)
    }

    // Check if card is present
    pub fn is_card_present(&self) -> bool {
        let state = PresentState::from_bits_truncate(self.read_reg(SDHCI_PRESENT_STATE));
        state.contains(PresentState::CARD_INSERTED)
    }

    // Check if card is write protected
    pub fn is_write_protected(&self) -> bool {
        let state = PresentState::from_bits_truncate(self.read_reg(SDHCI_PRESENT_STATE));
        state.contains(PresentState::WRITE_PROTECT)
    }
}
