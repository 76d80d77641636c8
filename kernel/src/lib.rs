//! veridian-kernel: a single-CPU, preemptive AArch64 kernel core.
//!
//! This crate is built two ways. On `aarch64-unknown-none` it is the real
//! kernel: [`kernel_main`] is called from the boot stub in
//! `arch::aarch64::boot` and never returns. On the host target (anything
//! else) it links against the standard library so `cargo test --lib`
//! exercises the allocator-backed unit tests scattered through every
//! module, without needing a QEMU instance.

#![no_std]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(not(target_os = "none"))]
extern crate std;

pub mod arch;
pub mod config;
pub mod error;
mod intrinsics;
pub mod loader;
pub mod mm;
pub mod print;
pub mod sched;
pub mod sync;
mod syscall;
pub mod test_framework;

pub use test_framework::{exit_qemu, test_panic_handler, QemuExitCode};

/// Kernel-mode demonstration thread started by [`kernel_main`].
///
/// A real shell is out of scope for this core (see the loader/process_exec
/// machinery in [`loader`] and [`sched::process_exec`], which are complete
/// and tested but unused by the default boot path for lack of an embedded
/// user binary); this thread exists so the scheduler, UART driver, and
/// timer all have something to exercise once interrupts are live.
fn init_thread(_arg: usize) -> i64 {
    log::info!("init: echo thread running");
    let mut buf = [0u8; 1];
    loop {
        let n = arch::aarch64::uart::uart_recv(&mut buf);
        arch::aarch64::uart::uart_send(&buf[..n]);
    }
}

/// Entry point reached from `arch::aarch64::boot::_start_rust` once `.bss`
/// is zeroed. Brings up logging, interrupts, memory management, and the
/// scheduler, in that order, then falls into [`sched::thread_run`] and
/// never returns.
#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    print::init();
    log::info!("veridian-kernel: starting");

    arch::aarch64::init_early().expect("arch::aarch64::init_early failed");
    mm::init().expect("mm::init failed");

    sched::thread_start(init_thread, 0, sched::ThreadFlags::empty()).expect("kernel_main: init thread slot");

    arch::aarch64::enable_interrupts();
    sched::thread_run()
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("panic: {info}");
    arch::aarch64::halt()
}

/// Heap allocation failure is unrecoverable in a no_std kernel with no
/// overcommit or swap to fall back on.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {layout:?}");
}
