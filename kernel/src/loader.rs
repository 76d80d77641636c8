//! Minimal ELF64 loader: turns a flat embedded image into a
//! [`LoadedProgram`] descriptor that [`crate::sched::process_exec`]
//! consumes.
//!
//! This is glue, not the core's tested surface — it validates just enough
//! of the header to refuse garbage and maps `PT_LOAD` segments with the
//! obvious permission translation. It does not handle dynamic linking,
//! relocations, or any ELF feature the embedded shell doesn't need.

use alloc::vec::Vec;

use crate::{
    error::{KernelError, KernelResult},
    mm::{vmm::Vmm, AllocFlags, MapFlags, PhysAddr, VirtAddr},
};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELF_CLASS_64: u8 = 2;
const ELF_DATA_2LSB: u8 = 1;
const ELF_MACHINE_AARCH64: u16 = 0xB7;

const PT_LOAD: u32 = 1;
const PF_X: u32 = 0x1;
const PF_W: u32 = 0x2;

/// Size of the single-page user stack handed to every loaded program.
const USER_STACK_SIZE: u64 = crate::config::PAGE_SIZE;

/// Top of the user stack's fixed virtual placement, one page below a round
/// address comfortably inside the 39-bit VA space and away from any
/// identity-mapped kernel/device region.
const USER_STACK_TOP: u64 = 0x20_0000_0000;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Header {
    magic: [u8; 4],
    class: u8,
    data: u8,
    version: u8,
    osabi: u8,
    abiversion: u8,
    pad: [u8; 7],
    elf_type: u16,
    machine: u16,
    version2: u32,
    entry: u64,
    phoff: u64,
    shoff: u64,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64ProgramHeader {
    p_type: u32,
    flags: u32,
    offset: u64,
    vaddr: u64,
    paddr: u64,
    filesz: u64,
    memsz: u64,
    align: u64,
}

/// Everything [`crate::sched::process_exec`] needs to synthesize the first
/// user trap frame.
#[derive(Debug, Clone, Copy)]
pub struct LoadedProgram {
    pub entry: u64,
    pub root: PhysAddr,
    pub stack_top: u64,
}

fn read_header(data: &[u8]) -> KernelResult<Elf64Header> {
    if data.len() < core::mem::size_of::<Elf64Header>() {
        return Err(KernelError::InvalidArgument { what: "ELF image too small" });
    }
    // SAFETY: `data` is at least `size_of::<Elf64Header>()` bytes, and
    // `Elf64Header` has no invalid bit patterns for any of its integer
    // fields.
    let header = unsafe { *(data.as_ptr() as *const Elf64Header) };
    if header.magic != ELF_MAGIC {
        return Err(KernelError::InvalidArgument { what: "bad ELF magic" });
    }
    if header.class != ELF_CLASS_64 || header.data != ELF_DATA_2LSB {
        return Err(KernelError::InvalidArgument { what: "not a 64-bit little-endian ELF" });
    }
    if header.machine != ELF_MACHINE_AARCH64 {
        return Err(KernelError::InvalidArgument { what: "not an aarch64 executable" });
    }
    Ok(header)
}

fn program_headers(data: &[u8], header: &Elf64Header) -> KernelResult<Vec<Elf64ProgramHeader>> {
    let mut headers = Vec::new();
    if header.phoff == 0 || header.phnum == 0 {
        return Ok(headers);
    }
    let start = header.phoff as usize;
    let entsize = header.phentsize as usize;
    let count = header.phnum as usize;
    if start.checked_add(entsize.saturating_mul(count)).is_none_or(|end| end > data.len()) {
        return Err(KernelError::InvalidArgument { what: "program headers out of bounds" });
    }
    for i in 0..count {
        // SAFETY: bounds were checked above for the full header table.
        let ph = unsafe { *(data.as_ptr().add(start + i * entsize) as *const Elf64ProgramHeader) };
        headers.push(ph);
    }
    Ok(headers)
}

fn load_segment(vmm: &mut Vmm, data: &[u8], ph: &Elf64ProgramHeader) -> KernelResult<()> {
    if ph.filesz > ph.memsz {
        return Err(KernelError::InvalidArgument { what: "segment filesz exceeds memsz" });
    }
    let offset = ph.offset as usize;
    let filesz = ph.filesz as usize;
    if offset.checked_add(filesz).is_none_or(|end| end > data.len()) {
        return Err(KernelError::InvalidArgument { what: "segment data out of bounds" });
    }

    let mut flags = MapFlags::USER;
    if ph.flags & PF_W != 0 {
        flags |= MapFlags::WRITE;
    }
    if ph.flags & PF_X != 0 {
        flags |= MapFlags::EXEC;
    }

    let page_start = VirtAddr::new(ph.vaddr).align_down();
    let page_end = VirtAddr::new(ph.vaddr + ph.memsz).align_up();
    let mut va = page_start.as_u64();
    while va < page_end.as_u64() {
        let phys = crate::mm::frame_allocator::alloc(AllocFlags::empty())?;
        vmm.map_explicit(VirtAddr::new(va), phys, flags)?;

        // SAFETY: `phys` was just mapped above, identity-mapped per the
        // `direct_map` commitment, so writing through it is valid; the
        // destination page belongs exclusively to this not-yet-running
        // process.
        unsafe {
            let dest = crate::mm::vmm::direct_map(phys).as_usize() as *mut u8;
            core::ptr::write_bytes(dest, 0, crate::config::PAGE_SIZE as usize);

            let page_va_start = va;
            let page_va_end = va + crate::config::PAGE_SIZE;
            let seg_start = ph.vaddr.max(page_va_start);
            let seg_end = (ph.vaddr + filesz as u64).min(page_va_end);
            if seg_end > seg_start {
                let file_off = offset + (seg_start - ph.vaddr) as usize;
                let len = (seg_end - seg_start) as usize;
                let dest_off = (seg_start - page_va_start) as usize;
                dest.add(dest_off).copy_from_nonoverlapping(data[file_off..file_off + len].as_ptr(), len);
            }
        }

        va += crate::config::PAGE_SIZE;
    }
    Ok(())
}

/// Build a fresh process address space from a flat ELF64 image: a new root
/// sharing the kernel's mappings, every `PT_LOAD` segment mapped and
/// populated, and a single-page user stack.
pub fn load_program(data: &[u8]) -> KernelResult<LoadedProgram> {
    let header = read_header(data)?;
    let headers = program_headers(data, &header)?;

    let kernel_root = crate::mm::KERNEL_VMM
        .with(|vmm| vmm.lock().root())
        .ok_or(KernelError::NotImplemented)?;
    let mut vmm = Vmm::new_user(kernel_root)?;

    for ph in &headers {
        if ph.p_type == PT_LOAD {
            load_segment(&mut vmm, data, ph)?;
        }
    }

    let stack_phys = crate::mm::frame_allocator::alloc(AllocFlags::empty())?;
    vmm.map_explicit(
        VirtAddr::new(USER_STACK_TOP - USER_STACK_SIZE),
        stack_phys,
        MapFlags::WRITE | MapFlags::USER,
    )?;

    Ok(LoadedProgram { entry: header.entry, root: vmm.root(), stack_top: USER_STACK_TOP })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        assert!(read_header(&[0u8; 4]).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = [0u8; 64];
        data[0] = 0x7f;
        assert!(read_header(&data).is_err());
    }

    #[test]
    fn accepts_well_formed_header() {
        let mut data = [0u8; 64];
        data[0..4].copy_from_slice(&ELF_MAGIC);
        data[4] = ELF_CLASS_64;
        data[5] = ELF_DATA_2LSB;
        data[18..20].copy_from_slice(&ELF_MACHINE_AARCH64.to_le_bytes());
        assert!(read_header(&data).is_ok());
    }
}
