//! Two threads each spin and yield; a third watches their counters to
//! confirm round-robin selection keeps them within a bounded gap of each
//! other rather than starving one in favor of the other.
#![no_std]
#![no_main]

use core::{
    panic::PanicInfo,
    sync::atomic::{AtomicUsize, Ordering},
};

use veridian_kernel::{arch, exit_qemu, mm, sched, serial_println, test_panic_handler, QemuExitCode};

static COUNTER_A: AtomicUsize = AtomicUsize::new(0);
static COUNTER_B: AtomicUsize = AtomicUsize::new(0);

const TARGET: usize = 200;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    arch::aarch64::init_early().expect("init_early");
    mm::init().expect("mm::init");
    sched::thread_start(worker_a, 0, sched::ThreadFlags::empty()).expect("thread_start a");
    sched::thread_start(worker_b, 0, sched::ThreadFlags::empty()).expect("thread_start b");
    sched::thread_start(verifier, 0, sched::ThreadFlags::empty()).expect("thread_start verifier");
    arch::aarch64::enable_interrupts();
    sched::thread_run()
}

fn worker_a(_arg: usize) -> i64 {
    loop {
        COUNTER_A.fetch_add(1, Ordering::Relaxed);
        sched::thread_yield();
    }
}

fn worker_b(_arg: usize) -> i64 {
    loop {
        COUNTER_B.fetch_add(1, Ordering::Relaxed);
        sched::thread_yield();
    }
}

fn verifier(_arg: usize) -> i64 {
    while COUNTER_A.load(Ordering::Relaxed) < TARGET || COUNTER_B.load(Ordering::Relaxed) < TARGET {
        sched::thread_yield();
    }
    let a = COUNTER_A.load(Ordering::Relaxed);
    let b = COUNTER_B.load(Ordering::Relaxed);
    let diff = a.abs_diff(b);
    serial_println!("round robin: a={a} b={b} diff={diff}");
    assert!(diff < TARGET / 2, "round robin fairness violated: a={a} b={b}");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
