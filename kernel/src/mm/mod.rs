//! Memory management: physical frames, page tables, and the kernel heap.
//!
//! Module layout mirrors the dependency order in which these pieces come up
//! during boot: [`frame_allocator`] has no dependencies, [`page_table`] and
//! [`vmm`] depend on it for the pages that back page-table levels, and
//! [`heap`] depends on the VM manager having already mapped the region it
//! hands to the allocator.

use bitflags::bitflags;

use crate::config::PAGE_SIZE;

pub mod frame_allocator;
pub mod heap;
pub mod page_table;
pub mod vmm;

pub use frame_allocator::FRAME_ALLOCATOR;
pub use vmm::KERNEL_VMM;

extern "C" {
    /// Start of the region the page allocator may hand out; everything
    /// below it is the kernel image and its boot stack.
    static __free_ram: u8;
}

/// Reserve the kernel image's own frames, build the kernel address space,
/// switch the MMU on, and stand up the kernel heap. Must run exactly once,
/// early in boot, before any other code calls `frame_allocator::alloc` or
/// touches `alloc::`.
pub fn init() -> crate::error::KernelResult<()> {
    // SAFETY: `__free_ram` is provided by the linker script and marks a
    // page-aligned boundary within the mapped RAM window.
    let free_ram_start = unsafe { &__free_ram as *const u8 as u64 };
    frame_allocator::reserve_range(PhysAddr::new(crate::config::RAM_BASE), PhysAddr::new(free_ram_start));
    vmm::init()?;
    heap::init();
    Ok(())
}

/// A physical address. Carries no validity guarantee beyond "a 64-bit
/// number"; callers that need page alignment assert it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PhysAddr(u64);

/// A virtual address, same representation and caveats as [`PhysAddr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VirtAddr(u64);

macro_rules! addr_impl {
    ($ty:ident) => {
        impl $ty {
            pub const fn new(addr: u64) -> Self {
                Self(addr)
            }

            pub const fn as_u64(self) -> u64 {
                self.0
            }

            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }

            pub const fn is_page_aligned(self) -> bool {
                self.0 % PAGE_SIZE == 0
            }

            pub const fn align_down(self) -> Self {
                Self(self.0 & !(PAGE_SIZE - 1))
            }

            pub const fn align_up(self) -> Self {
                Self((self.0 + PAGE_SIZE - 1) & !(PAGE_SIZE - 1))
            }

            pub const fn page_offset(self) -> u64 {
                self.0 & (PAGE_SIZE - 1)
            }
        }
    };
}

addr_impl!(PhysAddr);
addr_impl!(VirtAddr);

bitflags! {
    /// Leaf mapping flags. `USER` never implies kernel-executable; the
    /// combination `WRITE | EXEC` is logged as a W^X warning but not
    /// rejected; `DEVICE` is always installed non-executable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        const WRITE = 1 << 0;
        const EXEC  = 1 << 1;
        const USER  = 1 << 2;
        const DEVICE = 1 << 3;
        const DEBUG = 1 << 4;
    }
}

bitflags! {
    /// Flags accepted by [`frame_allocator::alloc`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Retry on contention or exhaustion instead of failing immediately.
        const WAIT = 1 << 0;
        /// When waiting, yield the CPU between retries.
        const YIELD = 1 << 1;
        /// Trace the attempt through the logger.
        const DEBUG = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virt_addr_alignment() {
        let v = VirtAddr::new(0x1001);
        assert!(!v.is_page_aligned());
        assert_eq!(v.align_down(), VirtAddr::new(0x1000));
        assert_eq!(v.align_up(), VirtAddr::new(0x2000));
        assert_eq!(v.page_offset(), 1);
    }

    #[test]
    fn phys_addr_roundtrip() {
        let p = PhysAddr::new(0x4000_1000);
        assert_eq!(p.as_u64(), 0x4000_1000);
        assert!(p.is_page_aligned());
    }
}
