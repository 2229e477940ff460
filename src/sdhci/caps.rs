use log::{info, warn};

use crate::platform::{Platform, RegisterIo};

use super::{SdhciHost, constant::*};

/// Controller capabilities, decoded once during bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Base clock for SD clock, in Hz
    pub base_clk_rate: u32,
    /// Max block length, in bytes
    pub max_blk_len: u32,
    pub bus_width_8bit: bool,
    pub adma_support: bool,
    /// Highest advertised bus voltage
    pub voltage: Option<BusVoltage>,
    pub ddr_support: bool,
    pub sdr50_support: bool,
}

impl Capabilities {
    pub fn decode(caps0: u32, caps1: u32) -> Self {
        let base_clk_rate = ((caps0 & SDHCI_CAP_BASE_CLK_MASK) >> SDHCI_CAP_BASE_CLK_SHIFT) * 1_000_000;
        let max_blk_len = 512 << ((caps0 & SDHCI_CAP_MAX_BLK_LEN_MASK) >> SDHCI_CAP_MAX_BLK_LEN_SHIFT);

        let voltage = if caps0 & SDHCI_CAN_VDD_330 != 0 {
            Some(BusVoltage::V3_3)
        } else if caps0 & SDHCI_CAN_VDD_300 != 0 {
            Some(BusVoltage::V3_0)
        } else if caps0 & SDHCI_CAN_VDD_180 != 0 {
            Some(BusVoltage::V1_8)
        } else {
            None
        };

        Self {
            base_clk_rate,
            max_blk_len,
            bus_width_8bit: caps0 & SDHCI_CAN_DO_8BIT != 0,
            adma_support: caps0 & SDHCI_CAN_DO_ADMA2 != 0,
            voltage,
            ddr_support: caps1 & SDHCI_SUPPORT_DDR50 != 0,
            sdr50_support: caps1 & SDHCI_SUPPORT_SDR50 != 0,
        }
    }
}

impl<R: RegisterIo, P: Platform> SdhciHost<R, P> {
    pub(super) fn read_capabilities(&self) -> Capabilities {
        let caps0 = self.read_reg(SDHCI_CAPABILITIES);
        let caps1 = self.read_reg(SDHCI_CAPABILITIES_1);
        info!("SDHCI Capabilities: {:#x} {:#x}", caps0, caps1);

        let caps = Capabilities::decode(caps0, caps1);
        if caps.voltage.is_none() {
            warn!("Controller advertises no supported bus voltage");
        }
        caps
    }
}
