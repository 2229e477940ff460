use log::{debug, error, warn};

use crate::err::SdError;
use crate::platform::{Platform, RegisterIo};

use super::{SdhciHost, constant::*};

/// Data bus width, in data lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    One,
    Four,
    Eight,
}

impl TryFrom<u8> for BusWidth {
    type Error = SdError;

    fn try_from(lines: u8) -> Result<Self, Self::Error> {
        match lines {
            1 => Ok(BusWidth::One),
            4 => Ok(BusWidth::Four),
            8 => Ok(BusWidth::Eight),
            _ => Err(SdError::InvalidWidth),
        }
    }
}

impl BusWidth {
    pub fn lines(self) -> u8 {
        match self {
            BusWidth::One => 1,
            BusWidth::Four => 4,
            BusWidth::Eight => 8,
        }
    }

    fn host_control_bits(self) -> HostControl1 {
        match self {
            BusWidth::One => HostControl1::empty(),
            BusWidth::Four => HostControl1::DATA_WIDTH_4BIT,
            BusWidth::Eight => HostControl1::EXT_DATA_WIDTH_8BIT,
        }
    }
}

impl<R: RegisterIo, P: Platform> SdhciHost<R, P> {
    /// Set the controller data bus width. Unrelated host control bits are
    /// kept.
    pub fn set_bus_width(&mut self, width: BusWidth) {
        if width == BusWidth::Eight && !self.caps.bus_width_8bit {
            warn!("8-bit bus requested but not advertised by the controller");
        }

        let mut ctrl = HostControl1::from_bits_retain(self.read_reg8(SDHCI_HOST_CONTROL));
        ctrl.remove(HostControl1::DATA_WIDTH_4BIT | HostControl1::EXT_DATA_WIDTH_8BIT);
        ctrl.insert(width.host_control_bits());
        self.write_reg8(SDHCI_HOST_CONTROL, ctrl.bits());

        debug!("Bus width set to {} bit", width.lines());
    }

    /// [`set_bus_width`](Self::set_bus_width) from a data line count.
    /// Anything but 1, 4 or 8 is rejected without touching the controller.
    pub fn set_bus_width_raw(&mut self, lines: u8) -> Result<(), SdError> {
        let width = BusWidth::try_from(lines).inspect_err(|_| {
            error!("Bus width is invalid: {}", lines);
        })?;
        self.set_bus_width(width);
        Ok(())
    }

    /// Select 32-bit ADMA2 descriptors.
    pub fn set_adma_mode(&mut self) {
        let mut ctrl = HostControl1::from_bits_retain(self.read_reg8(SDHCI_HOST_CONTROL));
        ctrl.remove(HostControl1::DMA_SELECT_MASK);
        ctrl.insert(HostControl1::ADMA32);
        self.write_reg8(SDHCI_HOST_CONTROL, ctrl.bits());
    }

    /// Switch to SDR50 timing (when the controller supports it) and run the
    /// SD clock at 100 MHz. SDR50 needs no tuning.
    pub fn set_sdr_mode(&mut self) -> Result<(), SdError> {
        self.disable_card_clock();

        if self.caps.sdr50_support {
            self.set_uhs_mode(HostControl2::UHS_SDR50);
        }

        self.supply_clock(SDHCI_CLK_100MHZ)
    }

    /// Switch to DDR50 timing keeping the current clock rate.
    pub fn set_ddr_mode(&mut self) -> Result<(), SdError> {
        self.disable_card_clock();

        self.set_uhs_mode(HostControl2::UHS_DDR50);

        self.supply_clock(self.cur_clk_rate)
    }

    fn set_uhs_mode(&self, mode: HostControl2) {
        let mut ctrl = HostControl2::from_bits_retain(self.read_reg16(SDHCI_HOST_CONTROL2));
        ctrl.remove(HostControl2::UHS_MODE_MASK);
        ctrl.insert(mode);
        self.write_reg16(SDHCI_HOST_CONTROL2, ctrl.bits());
    }
}
