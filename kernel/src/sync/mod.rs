//! Synchronization primitives.
//!
//! Safe global state management layered on `spin::Mutex`.

pub mod once_lock;

pub use once_lock::GlobalState;
