//! Rust side of the boot handoff. The assembly in `boot.S` sets up the
//! initial stack and falls straight into [`_start_rust`]; everything from
//! here on is ordinary (if very early) Rust.

use core::arch::global_asm;

global_asm!(include_str!("boot.S"));

extern "C" {
    static mut __bss_start: u8;
    static mut __bss_end: u8;
}

#[no_mangle]
#[link_section = ".text.boot"]
pub extern "C" fn _start_rust() -> ! {
    // SAFETY: `__bss_start`/`__bss_end` bound the `.bss` section the linker
    // script defines; nothing has run yet that could hold a reference into
    // it, so a raw zeroing pass is sound.
    unsafe {
        let bss_start = &raw mut __bss_start;
        let bss_end = &raw mut __bss_end;
        let bss_size = bss_end as usize - bss_start as usize;
        core::ptr::write_bytes(bss_start, 0, bss_size);
    }

    super::direct_uart::uart_write_str("veridian-kernel: boot\n");

    crate::kernel_main()
}
