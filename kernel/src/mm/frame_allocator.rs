//! Bitmap-backed physical frame allocator.
//!
//! One bit per 4 KiB frame across the fixed RAM window
//! `[RAM_BASE, RAM_END)`. A single spinlock serializes bitmap mutation; the
//! scan is first-fit, low-to-high, and skips fully-allocated slots by
//! comparing against `u64::MAX` before looking at individual bits.

use spin::Mutex;

use super::{AllocFlags, PhysAddr};
use crate::{
    config::{MAX_PAGES, NUM_SLOTS, PAGES_PER_SLOT, PAGE_SIZE, RAM_BASE, RAM_END},
    error::{KernelError, KernelResult},
};

struct Bitmap {
    slots: [u64; NUM_SLOTS],
}

impl Bitmap {
    const fn new() -> Self {
        Self { slots: [0; NUM_SLOTS] }
    }

    /// First free frame index, low-to-high, or `None` if the bitmap is full.
    fn scan_free(&self) -> Option<usize> {
        for (slot_idx, &slot) in self.slots.iter().enumerate() {
            if slot == u64::MAX {
                continue;
            }
            for bit in 0..PAGES_PER_SLOT {
                if slot & (1 << bit) == 0 {
                    return Some(slot_idx * PAGES_PER_SLOT + bit);
                }
            }
        }
        None
    }

    fn is_set(&self, frame: usize) -> bool {
        self.slots[frame / PAGES_PER_SLOT] & (1 << (frame % PAGES_PER_SLOT)) != 0
    }

    fn set(&mut self, frame: usize) {
        self.slots[frame / PAGES_PER_SLOT] |= 1 << (frame % PAGES_PER_SLOT);
    }

    fn clear(&mut self, frame: usize) {
        self.slots[frame / PAGES_PER_SLOT] &= !(1 << (frame % PAGES_PER_SLOT));
    }
}

/// The global frame allocator. One coarse spinlock, per §5 of the shared
/// resource policy.
pub static FRAME_ALLOCATOR: Mutex<Bitmap> = Mutex::new(Bitmap::new());

fn frame_to_addr(frame: usize) -> PhysAddr {
    PhysAddr::new(RAM_BASE + (frame as u64) * PAGE_SIZE)
}

fn addr_to_frame(addr: PhysAddr) -> usize {
    ((addr.as_u64() - RAM_BASE) / PAGE_SIZE) as usize
}

/// Allocate a single 4 KiB frame.
///
/// Non-waiting callers get `WouldBlock` if the lock is contended or
/// `OutOfMemory` if the bitmap is full. Waiting callers retry, optionally
/// yielding the CPU between attempts.
pub fn alloc(flags: AllocFlags) -> KernelResult<PhysAddr> {
    alloc_from(&FRAME_ALLOCATOR, flags)
}

fn alloc_from(allocator: &Mutex<Bitmap>, flags: AllocFlags) -> KernelResult<PhysAddr> {
    loop {
        match allocator.try_lock() {
            Some(mut bitmap) => {
                if let Some(frame) = bitmap.scan_free() {
                    bitmap.set(frame);
                    drop(bitmap);
                    let addr = frame_to_addr(frame);
                    if flags.contains(AllocFlags::DEBUG) {
                        log::debug!("page_alloc: frame {frame} -> {:#x}", addr.as_u64());
                    }
                    return Ok(addr);
                }
                drop(bitmap);
                if !flags.contains(AllocFlags::WAIT) {
                    return Err(KernelError::OutOfMemory);
                }
            }
            None => {
                if !flags.contains(AllocFlags::WAIT) {
                    return Err(KernelError::WouldBlock);
                }
            }
        }

        if flags.contains(AllocFlags::YIELD) {
            crate::sched::thread_yield();
        } else {
            core::hint::spin_loop();
        }
    }
}

/// Allocate or panic. For early-boot call sites that cannot propagate a
/// failure.
pub fn must_alloc(flags: AllocFlags) -> PhysAddr {
    alloc(flags).unwrap_or_else(|e| panic!("must_alloc: {e}"))
}

/// Mark every frame in `[start, end)` as already allocated. Called exactly
/// once at boot, before any other code reaches [`alloc`], to keep the
/// bitmap from handing out pages the kernel image or its boot stack
/// already occupies.
pub fn reserve_range(start: PhysAddr, end: PhysAddr) {
    let start = start.align_down();
    let end = end.align_up();
    let mut bitmap = FRAME_ALLOCATOR.lock();
    let mut addr = start.as_u64();
    while addr < end.as_u64() {
        bitmap.set(addr_to_frame(PhysAddr::new(addr)));
        addr += PAGE_SIZE;
    }
}

/// Release a frame back to the pool.
///
/// Infallible by contract: an invalid address or a double-free is a kernel
/// bug and panics rather than returning an error.
pub fn free(addr: PhysAddr, _flags: AllocFlags) {
    free_from(&FRAME_ALLOCATOR, addr)
}

fn free_from(allocator: &Mutex<Bitmap>, addr: PhysAddr) {
    assert!(addr.is_page_aligned(), "page_free: {:#x} is not page-aligned", addr.as_u64());
    assert!(
        addr.as_u64() >= RAM_BASE && addr.as_u64() < RAM_END,
        "page_free: {:#x} is outside the RAM window",
        addr.as_u64()
    );
    let frame = addr_to_frame(addr);
    let mut bitmap = allocator.lock();
    assert!(bitmap.is_set(frame), "page_free: double free of {:#x}", addr.as_u64());
    bitmap.clear(frame);
}

/// Diagnostic dump of bitmap slots at debug level.
pub fn debug_print() {
    let bitmap = FRAME_ALLOCATOR.lock();
    log::debug!("page allocator: {MAX_PAGES} frames, {NUM_SLOTS} slots");
    for (i, slot) in bitmap.slots.iter().enumerate() {
        if *slot != 0 {
            log::debug!("  slot {i}: {slot:#018x}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_lowest_free_frame_in_window() {
        let mut bitmap = Bitmap::new();
        let frame = bitmap.scan_free().unwrap();
        assert_eq!(frame, 0);
        bitmap.set(frame);
        assert_eq!(bitmap.scan_free(), Some(1));
    }

    #[test]
    fn free_then_alloc_reuses_lowest_address() {
        let allocator = Mutex::new(Bitmap::new());
        let addr = alloc_from(&allocator, AllocFlags::empty()).expect("alloc");
        assert!(addr.as_u64() >= RAM_BASE && addr.as_u64() < RAM_END);
        assert_eq!(addr.as_u64() % PAGE_SIZE, 0);
        free_from(&allocator, addr);
        let addr2 = alloc_from(&allocator, AllocFlags::empty()).expect("alloc");
        assert_eq!(addr, addr2);
        free_from(&allocator, addr2);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let allocator = Mutex::new(Bitmap::new());
        let addr = alloc_from(&allocator, AllocFlags::empty()).expect("alloc");
        free_from(&allocator, addr);
        free_from(&allocator, addr);
    }

    #[test]
    fn exhaustion_without_wait_is_out_of_memory() {
        let mut bitmap = Bitmap::new();
        for slot in bitmap.slots.iter_mut() {
            *slot = u64::MAX;
        }
        assert!(bitmap.scan_free().is_none());
    }
}
