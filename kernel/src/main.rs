//! Binary entry point.
//!
//! Everything that matters — the boot stub's `global_asm!` in
//! `arch::aarch64::boot`, `kernel_main`, the panic handler, and the global
//! allocator — lives in the library crate. This binary exists only so
//! Cargo produces a linked, runnable image; the linker script's
//! `ENTRY(_start)` is satisfied by the assembly label the library defines.
#![no_std]
#![no_main]

extern crate veridian_kernel;
