use core::sync::atomic::{AtomicU32, Ordering};

use alloc::boxed::Box;
use alloc::sync::Arc;
use log::{debug, info, warn};

use crate::platform::{IrqHandler, Platform, RegisterIo};

use super::{SdhciHost, constant::*};

const SIGNAL_PENDING: u32 = 1 << 31;

/// Single-slot, auto-resetting handoff from the power-control interrupt to
/// the one thread of control waiting for it.
///
/// Only the first signal is kept until it is taken; later signals are
/// dropped.
#[derive(Debug, Default)]
pub struct PowerSignal {
    slot: AtomicU32,
}

impl PowerSignal {
    pub const fn new() -> Self {
        Self {
            slot: AtomicU32::new(0),
        }
    }

    /// Publish `ack`. Returns false if an earlier signal is still unconsumed.
    pub fn signal(&self, ack: PwrCtlAck) -> bool {
        self.slot
            .compare_exchange(0, SIGNAL_PENDING | ack.bits(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Take the pending signal, rearming the slot.
    pub fn try_take(&self) -> Option<PwrCtlAck> {
        let v = self.slot.swap(0, Ordering::AcqRel);
        if v & SIGNAL_PENDING != 0 {
            Some(PwrCtlAck::from_bits_truncate(v))
        } else {
            None
        }
    }

    /// Block until signalled, idling through the platform in between.
    pub fn wait<P: Platform>(&self, platform: &P) -> PwrCtlAck {
        loop {
            if let Some(ack) = self.try_take() {
                return ack;
            }
            platform.wait_for_interrupt();
        }
    }
}

/// Power-control interrupt service routine.
///
/// Acknowledges every enabled bus power and IO signal level request as
/// successful, then wakes the waiter.
pub struct PowerIrqHandler<R> {
    mci: R,
    signal: Arc<PowerSignal>,
}

impl<R: RegisterIo> PowerIrqHandler<R> {
    pub fn new(mci: R, signal: Arc<PowerSignal>) -> Self {
        Self { mci, signal }
    }
}

impl<R: RegisterIo> IrqHandler for PowerIrqHandler<R> {
    fn handle(&self) {
        let status = PwrCtlIrq::from_bits_truncate(self.mci.read32(SDCC_HC_PWRCTL_MASK));

        let mut ack = PwrCtlAck::empty();
        if status.intersects(PwrCtlIrq::BUS_ON | PwrCtlIrq::BUS_OFF) {
            ack |= PwrCtlAck::BUS_ON_OFF_SUCC;
        }
        if status.intersects(PwrCtlIrq::IO_SIG_LOW | PwrCtlIrq::IO_SIG_HIGH) {
            ack |= PwrCtlAck::IO_SIG_SUCC;
        }

        self.mci.write32(SDCC_HC_PWRCTL_CTL, ack.bits());

        if !self.signal.signal(ack) {
            warn!("Power ack {:#x} dropped, previous one not consumed", ack.bits());
        }
    }
}

impl<R: RegisterIo + Clone + 'static, P: Platform> SdhciHost<R, P> {
    /// Hook the power-control interrupt and enable all its sources.
    pub(super) fn enable_power_irq(&self) {
        let handler = PowerIrqHandler::new(self.mci.clone(), self.pwr_signal.clone());
        self.platform
            .register_irq_handler(self.config.pwrctl_irq, Box::new(handler));
        self.platform.unmask_irq(self.config.pwrctl_irq);

        self.mci.write32(SDCC_HC_PWRCTL_MASK, PwrCtlIrq::all().bits());
    }
}

impl<R: RegisterIo, P: Platform> SdhciHost<R, P> {
    /// Select the advertised bus voltage and switch bus power on.
    ///
    /// Completion is reported through the power-control interrupt.
    pub fn set_bus_power_on(&mut self) {
        let voltage = self.caps.voltage.map_or(0, BusVoltage::power_bits);

        self.write_reg8(SDHCI_POWER_CONTROL, voltage);
        self.write_reg8(SDHCI_POWER_CONTROL, voltage | PowerControl::BUS_POWER_ON.bits());

        debug!("SDHCI Power Control: {:#x}", self.read_reg8(SDHCI_POWER_CONTROL));
    }

    pub(super) fn wait_power_ack(&self) {
        let ack = self.pwr_signal.wait(&self.platform);
        info!("Power control acknowledged: {:#x}", ack.bits());
    }
}
