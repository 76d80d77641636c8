//! Architecture support. AArch64-only — see the Non-goals on SMP/other ISAs.

pub mod aarch64;
pub use aarch64::*;
