//! Exception vector table installation.
//!
//! The table itself lives in `vectors.S`; this module only embeds it and
//! points `VBAR_EL1` at it. Must run before interrupts are unmasked and
//! before the first SVC can be taken, i.e. as part of early boot.

use core::arch::{asm, global_asm};

global_asm!(include_str!("vectors.S"));

extern "C" {
    static __vectors_el1: u8;
}

/// Install the exception vector table. Idempotent, but there is never a
/// reason to call it more than once.
pub fn init() {
    // SAFETY: `__vectors_el1` is the linker-provided, 2 KiB aligned table
    // defined in `vectors.S`; VBAR_EL1 accepts any such address and takes
    // effect immediately for exceptions taken on this core from here on.
    unsafe {
        let base = &__vectors_el1 as *const u8 as u64;
        asm!("msr vbar_el1, {}", in(reg) base, options(nostack, preserves_flags));
        asm!("isb");
    }
}
