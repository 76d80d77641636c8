//! Exercises the bitmap frame allocator end to end against real mapped RAM:
//! distinct frames, page alignment, and lowest-address reuse after a free.
#![no_std]
#![no_main]

use core::panic::PanicInfo;

use veridian_kernel::{
    arch, exit_qemu,
    mm::{self, frame_allocator, AllocFlags},
    sched, serial_println, test_panic_handler, QemuExitCode,
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
    let a = frame_allocator::alloc(AllocFlags::empty()).expect("alloc a");
    let b = frame_allocator::alloc(AllocFlags::empty()).expect("alloc b");
    assert_ne!(a, b, "two allocations returned the same frame");
    assert!(a.is_page_aligned() && b.is_page_aligned());

    frame_allocator::free(b, AllocFlags::empty());
    let c = frame_allocator::alloc(AllocFlags::empty()).expect("alloc c");
    assert_eq!(b, c, "freed frame was not reused by the next lowest-address allocation");

    frame_allocator::free(a, AllocFlags::empty());
    frame_allocator::free(c, AllocFlags::empty());

    serial_println!("page allocator: alloc/free/reuse all ok");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
