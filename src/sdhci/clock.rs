use log::{debug, error, info};

use crate::err::SdError;
use crate::platform::{Platform, RegisterIo};

use super::{SdhciHost, constant::*};

/// SD clock divisor for `target` Hz off a `base` Hz controller clock.
///
/// Returns 1 (bypass) when the target is the base clock. Otherwise the
/// first even divisor, scanning upwards, whose output does not exceed the
/// target; the scan stops at [`SDHCI_CLK_MAX_DIV`].
pub fn clock_divisor(base: u32, target: u32) -> Result<u32, SdError> {
    if target > base {
        return Err(SdError::UnsupportedFrequency);
    }

    if target == base {
        return Ok(1);
    }

    // SD clock divisors are even
    let div = (2..SDHCI_CLK_MAX_DIV)
        .step_by(2)
        .find(|div| base / div <= target)
        .unwrap_or(SDHCI_CLK_MAX_DIV);

    Ok(div)
}

/// Clock control bits carrying `divisor`.
///
/// The register holds divisor / 2 as a 10-bit value: bits 7:0 at [15:8] and
/// bits 9:8 at [7:6].
pub fn divider_bits(divisor: u32) -> ClockControl {
    let n = (divisor >> 1) as u16;
    let mut clk = (n & SDHCI_DIV_MASK) << SDHCI_DIVIDER_SHIFT;
    clk |= ((n & SDHCI_DIV_HI_MASK) >> 8) << SDHCI_DIVIDER_HI_SHIFT;
    ClockControl::from_bits_retain(clk)
}

impl<R: RegisterIo, P: Platform> SdhciHost<R, P> {
    /// Program the SD clock as close to `freq` as the divider allows without
    /// exceeding it, and enable it.
    pub fn supply_clock(&mut self, freq: u32) -> Result<(), SdError> {
        let base = self.caps.base_clk_rate;
        let div = clock_divisor(base, freq).inspect_err(|_| {
            error!("Requested clk freq {} is more than supported {}", freq, base);
        })?;

        let clk = divider_bits(div) | ClockControl::INT_CLK_EN;
        debug!("SDHCI clock divisor {} for {} Hz, ctrl {:#x}", div, freq, clk.bits());
        self.write_reg16(SDHCI_CLOCK_CONTROL, clk.bits());

        self.wait_clock_stable()?;

        // Now clock is stable, enable it
        let clk = self.read_reg16(SDHCI_CLOCK_CONTROL) | ClockControl::CARD_CLK_EN.bits();
        self.write_reg16(SDHCI_CLOCK_CONTROL, clk);

        self.cur_clk_rate = base / div;
        info!("SD clock set to {} Hz", self.cur_clk_rate);

        Ok(())
    }

    /// Gate the SD clock. Refused while a command or transfer is in flight.
    pub fn stop_clock(&mut self) -> Result<(), SdError> {
        let state = PresentState::from_bits_truncate(self.read_reg(SDHCI_PRESENT_STATE));
        if state.intersects(PresentState::CMD_INHIBIT | PresentState::DAT_INHIBIT) {
            error!("SDCC command & data line are active");
            return Err(SdError::Busy);
        }

        self.write_reg16(SDHCI_CLOCK_CONTROL, 0);

        Ok(())
    }

    pub fn change_frequency(&mut self, freq: u32) -> Result<(), SdError> {
        self.stop_clock().inspect_err(|_| {
            error!("Card is busy, cannot change frequency");
        })?;

        self.supply_clock(freq).inspect_err(|_| {
            error!("Cannot change frequency to {}", freq);
        })
    }

    /// Last rate programmed by [`supply_clock`](Self::supply_clock), in Hz.
    pub fn current_clock(&self) -> u32 {
        self.cur_clk_rate
    }

    /// Clear the card clock enable bit, keeping divider and internal clock.
    pub(super) fn disable_card_clock(&self) {
        let clk = self.read_reg16(SDHCI_CLOCK_CONTROL) & !ClockControl::CARD_CLK_EN.bits();
        self.write_reg16(SDHCI_CLOCK_CONTROL, clk);
    }

    fn wait_clock_stable(&self) -> Result<(), SdError> {
        let mut timeout = SDHCI_CLK_STABLE_RETRY;
        while self.read_reg16(SDHCI_CLOCK_CONTROL) & ClockControl::INT_CLK_STABLE.bits() == 0 {
            if timeout == 0 {
                error!("Internal clock never stabilised");
                return Err(SdError::ClockTimeout);
            }
            timeout -= 1;
            self.platform.delay_us(SDHCI_WAIT_DELAY_US);
        }

        Ok(())
    }
}
