//! Kernel heap.
//!
//! A single static arena handed to `linked_list_allocator`. No slabs, no
//! per-size-class pools — one free-list allocator backing every `alloc::`
//! collection the kernel uses. The arena lives in the kernel's own `.bss`,
//! so it comes up already mapped by [`super::vmm::Vmm::map_kernel_memory`].

use linked_list_allocator::LockedHeap;

/// Heap arena size. Generous for a single-CPU core with no user processes
/// of its own yet (see Non-goals) — the scheduler's thread table and page
/// tables are the only heap-backed structures today.
pub const HEAP_SIZE: usize = 1024 * 1024;

static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// The kernel's global allocator. Only wired in as `#[global_allocator]` on
/// the bare-metal target; `cargo test --lib` runs on the host and uses its
/// own allocator instead.
#[cfg_attr(target_os = "none", global_allocator)]
pub static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hand the arena to the allocator. Must run exactly once, after the
/// kernel's own image is mapped and before the first `alloc::` use.
pub fn init() {
    // SAFETY: `HEAP_MEMORY` is only ever touched through `ALLOCATOR` after
    // this point, and `init` runs once from `kernel_main` before any other
    // code can reach the allocator.
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP_MEMORY) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
    log::info!("heap: {} KiB arena ready", HEAP_SIZE / 1024);
}

/// Exercised only on the host test target, where `cargo test --lib` links
/// against the standard allocator rather than `ALLOCATOR` — this checks the
/// arena math, not the global-allocator wiring.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_accepts_the_full_static_arena() {
        let allocator = LockedHeap::empty();
        let mut arena = [0u8; HEAP_SIZE];
        // SAFETY: `arena` is a local, exclusively-owned buffer for the
        // duration of this test.
        unsafe {
            allocator.lock().init(arena.as_mut_ptr(), arena.len());
        }
        assert!(allocator.lock().free() >= HEAP_SIZE - 64);
    }
}
