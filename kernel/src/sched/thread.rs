//! The thread control block and its event-channel vocabulary.

use core::mem::offset_of;

use bitflags::bitflags;

use crate::{arch::aarch64::trap::TrapFrame, config::THREAD_STACK_SIZE, mm::PhysAddr};

pub type Tid = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Unused,
    Runnable,
    Blocked,
    Exited,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadFlags: u32 {
        /// Do not auto-reap on exit; a joiner must collect the return value.
        const JOINABLE = 1 << 0;
        /// This thread backs a user process (carries a `user_root`).
        const PROCESS = 1 << 1;
    }
}

bitflags! {
    /// Wakeup sources a thread can suspend on. Any bit overlap between a
    /// blocked thread's mask and the pending-events bitset wakes it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u64 {
        const TIMER         = 1 << 0;
        const UART_READABLE = 1 << 1;
        const UART_WRITABLE = 1 << 2;
        const THREAD_TERM   = 1 << 3;
    }
}

/// A schedulable thread of control.
///
/// `sp` is read and written only by the assembly switch routine in
/// [`super::context`] and must stay at field offset zero — asserted below
/// rather than merely documented, since the assembly has no way to notice
/// a reordering here.
#[repr(C, align(16))]
pub struct Thread {
    pub sp: u64,
    pub state: ThreadState,
    pub flags: ThreadFlags,
    pub retval: i64,
    pub entry: usize,
    pub arg: usize,
    pub blocked_on: EventMask,
    /// Incremented every time this slot is reused for a new thread; lets
    /// `thread_join` detect that the thread it sampled is gone even though
    /// the slot has since been recycled.
    pub epoch: u64,
    /// Set by `return_to_user`/`process_exec`; null for kernel-only
    /// threads.
    pub trapframe: *mut TrapFrame,
    /// Root page table for a `PROCESS` thread; stands in for the "process
    /// record" back-pointer, since full process objects are out of scope.
    pub user_root: Option<PhysAddr>,
    pub stack: [u8; THREAD_STACK_SIZE],
}

const _: () = assert!(offset_of!(Thread, sp) == 0);

impl Thread {
    pub const fn unused() -> Self {
        Self {
            sp: 0,
            state: ThreadState::Unused,
            flags: ThreadFlags::empty(),
            retval: 0,
            entry: 0,
            arg: 0,
            blocked_on: EventMask::empty(),
            epoch: 0,
            trapframe: core::ptr::null_mut(),
            user_root: None,
            stack: [0; THREAD_STACK_SIZE],
        }
    }

    pub fn stack_top(&self) -> u64 {
        self.stack.as_ptr() as u64 + THREAD_STACK_SIZE as u64
    }
}

// SAFETY: the scheduler's single coarse lock serializes every access to a
// `Thread`; the raw `trapframe` pointer is only ever dereferenced at EL1
// with interrupts disabled, never concurrently.
unsafe impl Send for Thread {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_thread_is_unused() {
        let t = Thread::unused();
        assert_eq!(t.state, ThreadState::Unused);
        assert_eq!(t.sp, 0);
    }

    #[test]
    fn stack_top_is_past_the_stack_base() {
        let t = Thread::unused();
        assert_eq!(t.stack_top(), t.stack.as_ptr() as u64 + THREAD_STACK_SIZE as u64);
    }
}
