use fdt_parser::Fdt;
use log::{debug, info};

use super::constant::SDHCI_CLK_400KHZ;

/// Auto command issued by the controller after a multi-block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoCmd {
    /// STOP_TRANSMISSION after the last block
    #[default]
    Cmd12,
    /// SET_BLOCK_COUNT ahead of the transfer, count taken from ARGUMENT2
    Cmd23,
}

/// Board configuration for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Power-control interrupt line
    pub pwrctl_irq: u32,
    /// Switch the vendor core into SDHCI mode before reset
    pub enable_hc_mode: bool,
    /// Clock supplied at the end of bring-up, `None` leaves the clock off
    pub init_clock: Option<u32>,
    pub auto_cmd: AutoCmd,
}

impl HostConfig {
    pub const fn new(pwrctl_irq: u32) -> Self {
        Self {
            pwrctl_irq,
            enable_hc_mode: true,
            init_clock: Some(SDHCI_CLK_400KHZ),
            auto_cmd: AutoCmd::Cmd12,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Physical register window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegRange {
    pub address: usize,
    pub size: usize,
}

/// Register windows of a controller found in the device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdhciRegions {
    /// SDHCI standard registers
    pub hc: RegRange,
    /// Vendor core registers, second `reg` entry when present
    pub core: Option<RegRange>,
}

/// Find the first node matching `compatible` and return its register
/// windows. The addresses still need mapping before use.
pub fn probe(fdt: &Fdt, compatible: &[&str]) -> Option<SdhciRegions> {
    let node = fdt.find_compatible(compatible).next()?;
    debug!("SDHCI node: {}", node.name);

    let mut regs = node.reg()?.map(|reg| RegRange {
        address: reg.address as usize,
        size: reg.size.unwrap_or(0),
    });

    let hc = regs.next()?;
    let core = regs.next();

    info!("SDHCI reg {:#x}, {:#x}", hc.address, hc.size);
    if let Some(core) = core {
        info!("SDHCI core reg {:#x}, {:#x}", core.address, core.size);
    }

    Some(SdhciRegions { hc, core })
}
