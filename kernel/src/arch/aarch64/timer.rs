//! The generic ARM timer, programmed as the clock-tick source.
//!
//! Drives the scheduler's `jiffies` counter: [`clock_init_irq`] arms the
//! timer for the first tick, [`clock_isr`] is called from the trap
//! dispatcher on every subsequent timer PPI, rearms the comparator, and
//! publishes a wakeup on the `TIMER` event channel.

use core::arch::asm;

use crate::config::HZ;

/// Compute the CNTP_TVAL reload value for one tick at [`HZ`].
fn reload_value() -> u64 {
    let cntfrq: u64;
    // SAFETY: CNTFRQ_EL0 is readable from EL1 and reports the counter
    // frequency programmed by firmware; reading it has no side effect.
    unsafe {
        asm!("mrs {}, CNTFRQ_EL0", out(reg) cntfrq, options(nomem, nostack, preserves_flags));
    }
    cntfrq / HZ
}

/// Arm the physical timer for the first tick and unmask it at the timer
/// itself (the GIC-side unmask happens separately via `gic::enable_irq`).
pub fn clock_init_irq() {
    let tval = reload_value();
    // SAFETY: writes the one-shot reload value and enables the comparator.
    // Both registers are EL1-accessible and touch only this CPU's timer
    // banked state.
    unsafe {
        asm!("msr CNTP_TVAL_EL0, {}", in(reg) tval, options(nomem, nostack, preserves_flags));
        asm!("msr CNTP_CTL_EL0, {}", in(reg) 1u64, options(nomem, nostack, preserves_flags));
    }
}

/// Rearm the comparator for the next tick. Called from the ISR, once per
/// interrupt, before returning.
pub fn rearm() {
    let tval = reload_value();
    // SAFETY: same register, same justification as `clock_init_irq`.
    unsafe {
        asm!("msr CNTP_TVAL_EL0, {}", in(reg) tval, options(nomem, nostack, preserves_flags));
    }
}
