//! The `log::Log` backend. Installed once during early boot, before any
//! other subsystem logs; everything after that point goes through
//! `log::{trace, debug, info, warn, error}` rather than ad-hoc `print!`s.
//!
//! The very first bytes this kernel ever writes (the boot banner in
//! `arch::aarch64::boot`) go out through `arch::aarch64::direct_uart`
//! instead, because they happen before this logger — and the heap it would
//! need to format with — exists.

use core::fmt::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::arch::aarch64::direct_uart;

struct UartLogger;

static LOGGER: UartLogger = UartLogger;

impl Log for UartLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let mut writer = direct_uart::writer();
        let _ = write!(writer, "[{level}] {}\n", record.args());
    }

    fn flush(&self) {}
}

/// Install the logger and set the max level. Idempotent only in the sense
/// that `log::set_logger` itself refuses a second caller; called exactly
/// once from `kernel_main`.
pub fn init() {
    log::set_logger(&LOGGER).expect("print: logger already installed");
    log::set_max_level(if cfg!(debug_assertions) { LevelFilter::Debug } else { LevelFilter::Info });
}
