//! CPU helpers a board can forward its [`Platform`](crate::platform::Platform)
//! implementation to.

use crate::sdhci::constant::SDHCI_CACHE_LINE_SIZE;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        use aarch64_cpu::asm::barrier;
        use aarch64_cpu::registers::{CNTFRQ_EL0, CNTPCT_EL0, Readable};

        /// Spin on the generic timer counter.
        pub fn delay_us(us: u32) {
            let freq = CNTFRQ_EL0.get();
            let ticks = freq * us as u64 / 1_000_000;
            let start = CNTPCT_EL0.get();
            while CNTPCT_EL0.get().wrapping_sub(start) < ticks {
                core::hint::spin_loop();
            }
        }

        pub fn clean_invalidate_dcache_range(addr: usize, len: usize) {
            for line in cache_lines(addr, len) {
                unsafe { core::arch::asm!("dc civac, {}", in(reg) line) };
            }
            barrier::dsb(barrier::SY);
        }

        pub fn invalidate_dcache_range(addr: usize, len: usize) {
            for line in cache_lines(addr, len) {
                unsafe { core::arch::asm!("dc ivac, {}", in(reg) line) };
            }
            barrier::dsb(barrier::SY);
        }

        pub fn wait_for_interrupt() {
            aarch64_cpu::asm::wfi();
        }
    } else {
        use core::sync::atomic::{fence, Ordering};

        const SPINS_PER_US: u64 = 100;

        /// Uncalibrated spin for targets without a known counter.
        pub fn delay_us(us: u32) {
            for _ in 0..u64::from(us) * SPINS_PER_US {
                core::hint::spin_loop();
            }
        }

        // Coherent DMA on these targets; only ordering is required.
        pub fn clean_invalidate_dcache_range(_addr: usize, _len: usize) {
            fence(Ordering::SeqCst);
        }

        pub fn invalidate_dcache_range(_addr: usize, _len: usize) {
            fence(Ordering::SeqCst);
        }

        pub fn wait_for_interrupt() {
            core::hint::spin_loop();
        }
    }
}

/// Start address of every cache line overlapping `addr..addr + len`.
#[cfg_attr(not(target_arch = "aarch64"), allow(dead_code))]
fn cache_lines(addr: usize, len: usize) -> impl Iterator<Item = usize> {
    let start = addr & !(SDHCI_CACHE_LINE_SIZE - 1);
    let end = addr + len;
    (start..end).step_by(SDHCI_CACHE_LINE_SIZE)
}
