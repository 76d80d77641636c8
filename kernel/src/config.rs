//! Compile-time tunables for the kernel core.
//!
//! These mirror the `#define`s of the original C source: the QEMU `virt`
//! RAM window, the scheduler's static table sizes, and the tick rate. They
//! are centralized here rather than scattered through the modules that use
//! them.

/// Base of the RAM window the page allocator manages.
///
/// Matches QEMU's `virt` machine RAM origin.
pub const RAM_BASE: u64 = 0x4000_0000;

/// Size, in bytes, of the RAM window. Must be a multiple of
/// `PAGE_SIZE * PAGES_PER_SLOT`.
pub const RAM_SIZE: u64 = 0x0400_0000;

/// End of the RAM window (exclusive).
pub const RAM_END: u64 = RAM_BASE + RAM_SIZE;

/// Page size / bitmap granularity.
pub const PAGE_SIZE: u64 = 4096;
pub const PAGE_SHIFT: u32 = 12;

/// Frames tracked by the bitmap allocator.
pub const MAX_PAGES: usize = (RAM_SIZE / PAGE_SIZE) as usize;

/// Bits per bitmap slot.
pub const PAGES_PER_SLOT: usize = 64;
pub const SLOT_SHIFT: u32 = 6;

/// Number of 64-bit slots in the bitmap.
pub const NUM_SLOTS: usize = MAX_PAGES / PAGES_PER_SLOT;

const _: () = assert!(MAX_PAGES % PAGES_PER_SLOT == 0, "RAM_SIZE must be a multiple of PAGE_SIZE * 64");
const _: () = assert!(1usize << SLOT_SHIFT == PAGES_PER_SLOT);

/// Maximum number of threads in the scheduler's static table.
pub const MAX_THREADS: usize = 32;

/// Per-thread kernel stack size.
pub const THREAD_STACK_SIZE: usize = 8192;

/// Timer tick rate in Hz.
pub const HZ: u64 = 100;

/// GICv2 distributor base (QEMU `virt`).
pub const GICD_BASE: usize = 0x0800_0000;
/// GICv2 CPU interface base (QEMU `virt`).
pub const GICC_BASE: usize = 0x0801_0000;

/// PL011 UART base (QEMU `virt`).
pub const UART0_BASE: usize = 0x0900_0000;

/// Timer PPI id (CNTP, non-secure physical timer).
pub const IRQ_TIMER_PPI: u32 = 30;
/// UART SPI id on the `virt` machine.
pub const IRQ_UART_SPI: u32 = 33;

/// Largest single `read`/`write` length accepted at the syscall boundary.
/// Caps the bounce-buffer work `copy_from_user`/`copy_to_user` can be made
/// to do by one call.
pub const SSIZE_MAX: usize = 0x7FFF_F000;
