//! System call dispatch.
//!
//! The ABI matches the trap frame's calling convention: syscall number in
//! `x8`, up to six arguments in `x0..x5`, and the return value (or a
//! negative [`Errno`]) back in `x0`. [`dispatch`] is called once per SVC
//! from [`super::arch::aarch64::trap::trap_ssr`].

use alloc::vec;

use crate::{
    config::SSIZE_MAX,
    error::{Errno, KernelError, KernelResult},
    mm::{vmm, PhysAddr, VirtAddr},
};

const SYS_READ: u64 = 0;
const SYS_WRITE: u64 = 1;

/// Dispatch one syscall. Never panics on a bad syscall number or bad
/// arguments — those become a negative errno, same as any other failure.
pub fn dispatch(num: u64, args: [u64; 6]) -> i64 {
    let result = match num {
        SYS_READ => sys_read(args[0], args[1] as u64, args[2] as usize),
        SYS_WRITE => sys_write(args[0], args[1] as u64, args[2] as usize),
        _ => Err(KernelError::NotImplemented),
    };
    match result {
        Ok(n) => n as i64,
        Err(e) => Errno::from(e).as_retval(),
    }
}

fn current_root() -> KernelResult<PhysAddr> {
    crate::sched::current_user_root().ok_or(KernelError::InvalidArgument { what: "no user address space" })
}

/// Copy `len` bytes starting at user virtual address `va` into `dst`,
/// translating one page at a time so a segment crossing a page boundary
/// works without requiring physically contiguous backing.
fn copy_from_user(va: u64, dst: &mut [u8]) -> KernelResult<()> {
    let root = current_root()?;
    let mut copied = 0;
    while copied < dst.len() {
        let cur_va = VirtAddr::new(va + copied as u64);
        let phys = vmm::virt_to_phys(root, cur_va)?;
        let page_remaining = crate::config::PAGE_SIZE as usize - cur_va.page_offset() as usize;
        let n = (dst.len() - copied).min(page_remaining);
        // SAFETY: `phys` was just validated as a mapped, user-accessible
        // page under `direct_map`'s identity commitment.
        unsafe {
            let src = vmm::direct_map(phys).as_usize() as *const u8;
            core::ptr::copy_nonoverlapping(src, dst[copied..copied + n].as_mut_ptr(), n);
        }
        copied += n;
    }
    Ok(())
}

/// Copy `src` out to user virtual address `va`, same page-at-a-time
/// translation as [`copy_from_user`].
fn copy_to_user(va: u64, src: &[u8]) -> KernelResult<()> {
    let root = current_root()?;
    let mut copied = 0;
    while copied < src.len() {
        let cur_va = VirtAddr::new(va + copied as u64);
        let phys = vmm::virt_to_phys(root, cur_va)?;
        let page_remaining = crate::config::PAGE_SIZE as usize - cur_va.page_offset() as usize;
        let n = (src.len() - copied).min(page_remaining);
        // SAFETY: see `copy_from_user`.
        unsafe {
            let dst = vmm::direct_map(phys).as_usize() as *mut u8;
            core::ptr::copy_nonoverlapping(src[copied..copied + n].as_ptr(), dst, n);
        }
        copied += n;
    }
    Ok(())
}

/// `read(fd, buf, count)`. Only fd 0 (stdin) is backed, by the UART RX
/// ring; it suspends until `count` bytes have arrived.
fn sys_read(fd: u64, buf: u64, count: usize) -> KernelResult<usize> {
    if fd != 0 {
        return Err(KernelError::BadFileDescriptor);
    }
    let count = count.min(SSIZE_MAX);
    let mut bounce = vec![0u8; count];
    let n = crate::arch::aarch64::uart::uart_recv(&mut bounce);
    copy_to_user(buf, &bounce[..n])?;
    Ok(n)
}

/// `write(fd, buf, count)`. fd 1 (stdout) and fd 2 (stderr) both go to the
/// UART TX FIFO.
fn sys_write(fd: u64, buf: u64, count: usize) -> KernelResult<usize> {
    if fd != 1 && fd != 2 {
        return Err(KernelError::BadFileDescriptor);
    }
    let count = count.min(SSIZE_MAX);
    let mut bounce = vec![0u8; count];
    copy_from_user(buf, &mut bounce)?;
    Ok(crate::arch::aarch64::uart::uart_send(&bounce))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_rejects_unknown_syscall() {
        assert_eq!(dispatch(999, [0; 6]), Errno::Enosys.as_retval());
    }

    #[test]
    fn sys_read_rejects_non_stdin_fd() {
        assert_eq!(sys_read(1, 0, 16), Err(KernelError::BadFileDescriptor));
    }

    #[test]
    fn sys_write_rejects_stdin_fd() {
        assert_eq!(sys_write(0, 0, 16), Err(KernelError::BadFileDescriptor));
    }
}
