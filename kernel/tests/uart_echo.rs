//! Exercises the PL011 driver's TX path and confirms the RX ring starts
//! empty — the closest this core-only build gets to an echo test without
//! a QEMU chardev wired up to feed it bytes.
#![no_std]
#![no_main]

use core::panic::PanicInfo;

use veridian_kernel::{
    arch::{self, aarch64::uart},
    exit_qemu, mm, sched, serial_println, test_panic_handler, QemuExitCode,
};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    arch::aarch64::init_early().expect("init_early");
    mm::init().expect("mm::init");
    sched::thread_start(run_test, 0, sched::ThreadFlags::empty()).expect("thread_start");
    arch::aarch64::enable_interrupts();
    sched::thread_run()
}

fn run_test(_arg: usize) -> i64 {
    uart::send(b"uart echo test: tx ok\n");
    assert!(uart::recv().is_none(), "RX ring had bytes with no input pending");
    serial_println!("uart: tx path and empty-rx path both ok");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
