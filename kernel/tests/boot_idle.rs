//! Boots the kernel core through early arch/mm init and confirms the
//! scheduler actually takes over: a single thread spins on `jiffies`
//! until the timer ISR has ticked it forward a few times.
#![no_std]
#![no_main]

use core::panic::PanicInfo;

use veridian_kernel::{arch, exit_qemu, mm, sched, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    arch::aarch64::init_early().expect("init_early");
    mm::init().expect("mm::init");
    sched::thread_start(boot_check, 0, sched::ThreadFlags::empty()).expect("thread_start");
    arch::aarch64::enable_interrupts();
    sched::thread_run()
}

fn boot_check(_arg: usize) -> i64 {
    use core::sync::atomic::Ordering;

    let start = sched::jiffies(Ordering::Relaxed);
    while sched::jiffies(Ordering::Relaxed) < start + 5 {
        sched::thread_yield();
    }
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
