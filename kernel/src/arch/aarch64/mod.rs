//! AArch64 architecture support: boot handoff, the exception vector table,
//! context switching, and the device drivers this core depends on (GICv2,
//! PL011, the generic timer).

pub mod boot;
pub mod context;
pub mod direct_uart;
pub mod gic;
pub mod timer;
pub mod trap;
pub mod uart;
pub mod vectors;

use crate::{config::IRQ_TIMER_PPI, error::KernelResult};

/// Bring up everything a running thread needs before interrupts are safe to
/// unmask: the vector table, the interrupt controller, the UART, and the
/// timer. Called once from `kernel_main`, before `mm::init` and before the
/// scheduler creates its first thread.
pub fn init_early() -> KernelResult<()> {
    vectors::init();
    context::init_fpu();

    gic::init()?;
    uart::init();

    gic::enable_irq(IRQ_TIMER_PPI)?;
    gic::enable_irq(crate::config::IRQ_UART_SPI)?;

    timer::clock_init_irq();

    log::info!("arch: aarch64 early init complete (EL{})", context::current_el());
    Ok(())
}

/// Unmask IRQs on this core. Called once, right before falling into the
/// scheduler, so nothing runs with interrupts enabled before the vector
/// table and the first thread both exist.
pub fn enable_interrupts() {
    trap::local_irq_enable();
}

/// Halt the core. Used by the panic handler: there is nowhere else to go.
pub fn halt() -> ! {
    trap::local_irq_disable();
    loop {
        // SAFETY: WFE only waits for an event/interrupt; harmless with
        // interrupts masked, it just parks the core.
        unsafe { core::arch::asm!("wfe", options(nomem, nostack, preserves_flags)) };
    }
}
