//! Virtual memory manager: kernel address space setup and the EL1→MMU-on
//! transition.
//!
//! The kernel commits to `direct_map(phys) == phys` for the lifetime of the
//! system: every physical page this core ever touches (page-table levels,
//! the frame bitmap's own backing, MMIO) is also identity-mapped, so a
//! physical address can always be dereferenced directly as a pointer both
//! before and after the MMU is enabled. There is no separate "physmap"
//! offset to translate through.

use core::arch::asm;

use spin::Mutex;

use super::{
    frame_allocator,
    page_table::{self, MAIR_IDX_DEVICE, MAIR_IDX_NORMAL},
    AllocFlags, MapFlags, PhysAddr, VirtAddr,
};
use crate::{
    config::{GICC_BASE, GICD_BASE, PAGE_SIZE, UART0_BASE},
    error::{KernelError, KernelResult},
    sync::GlobalState,
};

extern "C" {
    static __text_start: u8;
    static __text_end: u8;
    static __rodata_start: u8;
    static __rodata_end: u8;
    static __data_start: u8;
    static __bss_end: u8;
    static __free_ram: u8;
    static __free_ram_end: u8;
}

/// A process's (or the kernel's) page table root plus the bookkeeping needed
/// to install it.
pub struct Vmm {
    root: PhysAddr,
}

/// The kernel's own address space. Every process's page tables borrow the
/// kernel's upper half by sharing the same root during this core's lifetime
/// (there is no separate user/kernel split yet — see Non-goals).
pub static KERNEL_VMM: GlobalState<Mutex<Vmm>> = GlobalState::new();

/// Identity mapping: the one and only address translation this core ever
/// performs at the physical-to-virtual boundary.
pub const fn direct_map(phys: PhysAddr) -> VirtAddr {
    VirtAddr::new(phys.as_u64())
}

impl Vmm {
    fn new() -> KernelResult<Self> {
        let root = frame_allocator::alloc(AllocFlags::empty())?;
        // SAFETY: `root` was just allocated and is identity-mapped; no other
        // reference to it exists yet.
        unsafe {
            (direct_map(root).as_usize() as *mut page_table::PageTable)
                .write(page_table::PageTable::empty());
        }
        Ok(Self { root })
    }

    /// Build a fresh root for a user process, pre-populated with the
    /// kernel's top-level entries so a trap taken in user space can
    /// immediately address kernel memory without a root switch.
    pub fn new_user(kernel_root: PhysAddr) -> KernelResult<Self> {
        let vmm = Self::new()?;
        // SAFETY: `kernel_root` names the live kernel L1 table, identity-
        // mapped like every other table page; `vmm.root` was just
        // allocated and zeroed above and is not yet visible to anyone else.
        unsafe {
            let kernel_entries = &(*(direct_map(kernel_root).as_usize() as *const page_table::PageTable)).entries;
            let user_entries = &mut (*(direct_map(vmm.root).as_usize() as *mut page_table::PageTable)).entries;
            user_entries.copy_from_slice(kernel_entries);
        }
        Ok(vmm)
    }

    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Install a single 4 KiB leaf mapping.
    pub fn map_explicit(&mut self, va: VirtAddr, phys: PhysAddr, flags: MapFlags) -> KernelResult<()> {
        if flags.contains(MapFlags::WRITE) && flags.contains(MapFlags::EXEC) {
            log::warn!("vmm: mapping {:#x} both writable and executable", va.as_u64());
        }
        // SAFETY: `self.root` is a valid L1 table allocated by `Vmm::new`.
        let entry = unsafe { page_table::walk_alloc(self.root, va)? };
        assert!(
            !page_table::desc_is_valid(*entry),
            "vmm: double-map over a live leaf at {:#x}",
            va.as_u64()
        );
        *entry = page_table::leaf_descriptor(phys, flags);
        if flags.contains(MapFlags::DEBUG) {
            log::debug!("vmm: map {:#x} -> {:#x} ({:?})", va.as_u64(), phys.as_u64(), flags);
        }
        Ok(())
    }

    /// Identity-map `[base, base + len)`, rounded outward to page boundaries.
    pub fn map_range_identity(&mut self, base: PhysAddr, len: u64, flags: MapFlags) -> KernelResult<()> {
        let start = base.align_down();
        let end = PhysAddr::new(base.as_u64() + len).align_up();
        let mut addr = start.as_u64();
        while addr < end.as_u64() {
            let phys = PhysAddr::new(addr);
            self.map_explicit(VirtAddr::new(addr), phys, flags)?;
            addr += PAGE_SIZE;
        }
        Ok(())
    }

    /// Map the kernel's own image with per-section permissions: text
    /// read+execute, rodata read-only, data/bss read+write, all identity and
    /// never user-accessible.
    pub fn map_kernel_memory(&mut self) -> KernelResult<()> {
        // SAFETY: these symbols are provided by the linker script and denote
        // valid, non-overlapping section boundaries within the kernel image.
        let (text_start, text_end, rodata_start, rodata_end, data_start, bss_end) = unsafe {
            (
                &__text_start as *const u8 as u64,
                &__text_end as *const u8 as u64,
                &__rodata_start as *const u8 as u64,
                &__rodata_end as *const u8 as u64,
                &__data_start as *const u8 as u64,
                &__bss_end as *const u8 as u64,
            )
        };

        self.map_range_identity(
            PhysAddr::new(text_start),
            text_end - text_start,
            MapFlags::EXEC,
        )?;
        self.map_range_identity(
            PhysAddr::new(rodata_start),
            rodata_end - rodata_start,
            MapFlags::empty(),
        )?;
        self.map_range_identity(
            PhysAddr::new(data_start),
            bss_end - data_start,
            MapFlags::WRITE,
        )?;

        Ok(())
    }

    /// Map the free-RAM window the frame allocator hands frames out of,
    /// read+write and non-executable, so every allocated frame (including
    /// page-table levels) stays directly dereferencable after the MMU is
    /// on. Does not touch `[RAM_BASE, __free_ram)`, which the kernel image
    /// occupies and which `map_kernel_memory` has already mapped with
    /// per-section permissions — remapping that prefix here would silently
    /// overwrite `.text`'s execute-only leaf with a writable, non-executable
    /// one.
    pub fn map_ram_window(&mut self) -> KernelResult<()> {
        // SAFETY: these symbols are provided by the linker script and
        // denote the free-RAM region following the kernel image.
        let (free_ram, free_ram_end) =
            unsafe { (&__free_ram as *const u8 as u64, &__free_ram_end as *const u8 as u64) };
        self.map_range_identity(PhysAddr::new(free_ram), free_ram_end - free_ram, MapFlags::WRITE)
    }

    /// Map the fixed MMIO ranges this core drives: GICD, GICC, PL011 UART.
    pub fn map_devices(&mut self) -> KernelResult<()> {
        const GIC_REGION_SIZE: u64 = 0x1_0000;
        const UART_REGION_SIZE: u64 = 0x1000;

        self.map_range_identity(
            PhysAddr::new(GICD_BASE as u64),
            GIC_REGION_SIZE,
            MapFlags::WRITE | MapFlags::DEVICE,
        )?;
        self.map_range_identity(
            PhysAddr::new(GICC_BASE as u64),
            GIC_REGION_SIZE,
            MapFlags::WRITE | MapFlags::DEVICE,
        )?;
        self.map_range_identity(
            PhysAddr::new(UART0_BASE as u64),
            UART_REGION_SIZE,
            MapFlags::WRITE | MapFlags::DEVICE,
        )?;
        Ok(())
    }

    /// Translate a user-space virtual address to its backing physical
    /// address, carrying the intra-page offset through. Fails closed: an
    /// unmapped page or one lacking the user-accessible bit is always an
    /// error, never a partial translation.
    pub fn user_virt_to_phys(&self, va: VirtAddr) -> KernelResult<PhysAddr> {
        virt_to_phys(self.root, va)
    }

    /// Program MAIR_EL1/TCR_EL1, install this root in TTBR0_EL1, and enable
    /// the MMU. Never returns on failure — a bad translation table setup at
    /// this point is unrecoverable.
    pub fn switch(&self) {
        // MAIR_EL1: index 0 = Normal WB/WA, index 1 = Device-nGnRnE.
        let mair: u64 = (0xFFu64 << (MAIR_IDX_NORMAL * 8)) | (0x00u64 << (MAIR_IDX_DEVICE * 8));

        // TCR_EL1: 39-bit VA (T0SZ=25), 4 KiB granule, inner/outer
        // write-back cacheable, inner shareable, 64-bit IPA.
        let tcr: u64 = 25
            | (0b01 << 8)  // IRGN0 = WBWA
            | (0b01 << 10) // ORGN0 = WBWA
            | (0b11 << 12) // SH0 = inner shareable
            | (0b00 << 14) // TG0 = 4KiB
            | (0b010 << 32); // IPS = 40-bit

        // SAFETY: this core owns exclusive access to these system registers
        // at this point in boot; the root table was fully built by prior
        // `map_*` calls before `switch` is ever called.
        unsafe {
            asm!("msr mair_el1, {}", in(reg) mair, options(nostack, preserves_flags));
            asm!("msr tcr_el1, {}", in(reg) tcr, options(nostack, preserves_flags));
            asm!("msr ttbr0_el1, {}", in(reg) self.root.as_u64(), options(nostack, preserves_flags));
            asm!("isb");

            let mut sctlr: u64;
            asm!("mrs {}, sctlr_el1", out(reg) sctlr);
            sctlr |= 1 << 0; // M: MMU enable
            sctlr |= 1 << 2; // C: data cache enable
            sctlr |= 1 << 12; // I: instruction cache enable
            asm!("msr sctlr_el1, {}", in(reg) sctlr, options(nostack, preserves_flags));
            asm!("isb");
        }
    }
}

/// Translate a user-space virtual address through an arbitrary root, not
/// necessarily one held behind a `Vmm` handle. Used by the syscall layer to
/// walk the current process's page table by root alone.
pub fn virt_to_phys(root: PhysAddr, va: VirtAddr) -> KernelResult<PhysAddr> {
    // SAFETY: `root` names a valid L1 table (the kernel root or a process
    // root built by `Vmm::new`/`Vmm::new_user`).
    let desc = unsafe { page_table::walk(root, va) }.ok_or(KernelError::UnmappedMemory { addr: va.as_u64() })?;
    if !page_table::leaf_is_user_accessible(desc) {
        return Err(KernelError::InvalidAddress { addr: va.as_u64() });
    }
    let base = page_table::leaf_addr(desc);
    Ok(PhysAddr::new(base.as_u64() + va.page_offset()))
}

/// Build the kernel address space (image, RAM window, devices) and switch
/// to it. Called once, early in boot, before any thread runs.
pub fn init() -> KernelResult<()> {
    let mut vmm = Vmm::new()?;
    vmm.map_kernel_memory()?;
    vmm.map_ram_window()?;
    vmm.map_devices()?;
    vmm.switch();

    KERNEL_VMM
        .init(Mutex::new(vmm))
        .map_err(|_| KernelError::InvalidArgument { what: "VMM already initialized" })?;

    log::info!("vmm: kernel address space active");
    Ok(())
}

/// Architecture TLB maintenance, used after remapping a live translation.
pub mod tlb {
    use core::arch::asm;

    use super::VirtAddr;

    pub fn flush_address(addr: VirtAddr) {
        // SAFETY: TLBI/DSB/ISB are always valid at EL1 and affect only
        // cached translations, never memory contents.
        unsafe {
            let page = addr.as_u64() >> 12;
            asm!("tlbi vae1, {}", in(reg) page, options(nostack, preserves_flags));
            asm!("dsb ish");
            asm!("isb");
        }
    }

    pub fn flush_all() {
        // SAFETY: see `flush_address`.
        unsafe {
            asm!("tlbi vmalle1");
            asm!("dsb ish");
            asm!("isb");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_map_is_identity() {
        let phys = PhysAddr::new(0x4001_2000);
        assert_eq!(direct_map(phys).as_u64(), phys.as_u64());
    }
}
