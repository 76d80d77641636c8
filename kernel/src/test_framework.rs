//! QEMU-facing test support: the `serial_print!`/`serial_println!` macros
//! integration tests use to report progress, and the PSCI shutdown used to
//! hand a pass/fail code back to the harness.
//!
//! Separate from [`crate::print`]'s `log` backend on purpose — integration
//! test binaries (`tests/*.rs`) are tiny freestanding programs with their
//! own `_start`, and want to report results before (or regardless of)
//! whatever subsystems the test itself is exercising.

use core::panic::PanicInfo;

use crate::arch::aarch64::direct_uart;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Power the machine off via PSCI `SYSTEM_OFF`, the only way a test binary
/// hands a result back to the runner on this target — QEMU's `virt` machine
/// has no `isa-debug-exit`-style port the way the x86_64 target does.
/// `exit_code` is accepted for API symmetry with that target but otherwise
/// unused: PSCI shutdown carries no payload, so pass/fail is read from the
/// serial transcript instead.
pub fn exit_qemu(_exit_code: QemuExitCode) -> ! {
    const PSCI_SYSTEM_OFF: u32 = 0x8400_0008;
    // SAFETY: `hvc #0` with the PSCI SYSTEM_OFF function id is the
    // documented call to power off a QEMU `virt` guest; this core never
    // returns from it.
    unsafe {
        core::arch::asm!(
            "mov w0, {psci_off:w}",
            "hvc #0",
            psci_off = in(reg) PSCI_SYSTEM_OFF,
            options(noreturn)
        );
    }
}

/// Panic handler for integration test binaries: report the panic over the
/// raw UART channel, then shut the machine down as a failure.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]");
    serial_println!("{info}");
    exit_qemu(QemuExitCode::Failed)
}

/// Write formatted text directly to the UART, bypassing the ring-buffered
/// driver and the `log` backend — safe to call before either exists.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::test_framework::_serial_print(format_args!($($arg)*))
    };
}

/// Same as [`serial_print!`] with a trailing newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(concat!($fmt, "\n"), $($arg)*));
}

#[doc(hidden)]
pub fn _serial_print(args: core::fmt::Arguments) {
    use core::fmt::Write;
    let mut writer = direct_uart::writer();
    let _ = writer.write_fmt(args);
}
