//! Thread and process scheduler: a fixed-size thread table, round-robin
//! selection with event-channel blocking, and the user-return path.
//!
//! Everything here runs on a single CPU. The scheduler lock ([`SCHED`])
//! guards the thread table, the pending-events bitset, and the round-robin
//! cursor together; interrupts are disabled across the
//! `select_runnable` → context-switch window so a timer tick can never
//! observe the table mid-transition.

pub mod thread;

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

pub use thread::{EventMask, ThreadFlags, ThreadState, Tid};
use thread::Thread;

use crate::{
    arch::aarch64::{context, trap},
    config::MAX_THREADS,
    error::{KernelError, KernelResult},
    loader::LoadedProgram,
};

/// A kernel thread's entry point. Its return value becomes the argument to
/// the implicit `thread_exit` the trampoline performs when `entry` returns.
pub type ThreadEntry = fn(usize) -> i64;

struct SchedState {
    threads: [Thread; MAX_THREADS],
    /// Wakeup sources OR'd in since the last `select_runnable` pass.
    pending_events: u64,
    /// Round-robin cursor; persists across calls so threads are visited in
    /// rotation rather than always starting from slot zero.
    fair_id: usize,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            threads: [const { Thread::unused() }; MAX_THREADS],
            pending_events: 0,
            fair_id: 0,
        }
    }
}

static SCHED: Mutex<SchedState> = Mutex::new(SchedState::new());

/// Index of the currently running thread.
static CURRENT: AtomicUsize = AtomicUsize::new(0);

/// Index of the idle thread, once `thread_run` has created it. `usize::MAX`
/// before that point, so `select_runnable` treats every slot as "non-idle"
/// during early boot.
static IDLE_TID: AtomicUsize = AtomicUsize::new(usize::MAX);

static JIFFIES: AtomicU64 = AtomicU64::new(0);

/// Set by `clock_isr`, cleared by whoever next checks it. The cooperative
/// synchronization point threads call through `thread_maybe_yield`.
static NEEDS_RESCHED: AtomicBool = AtomicBool::new(false);

/// Monotonic tick counter, incremented once per timer interrupt.
pub fn jiffies(order: Ordering) -> u64 {
    JIFFIES.load(order)
}

/// Atomic test-and-clear of the "a tick wants a reschedule" flag.
pub fn should_reschedule() -> bool {
    NEEDS_RESCHED.swap(false, Ordering::AcqRel)
}

/// Id of the currently running thread.
pub fn current_tid() -> Tid {
    CURRENT.load(Ordering::Relaxed)
}

/// Root page table of the process backing the current thread, if any.
/// `None` for a kernel-only thread that has never `process_exec`'d.
pub fn current_user_root() -> Option<crate::mm::PhysAddr> {
    let cur = CURRENT.load(Ordering::Relaxed);
    SCHED.lock().threads[cur].user_root
}

/// Create a new thread. Fails with `ThreadTableFull` if every slot is in
/// use.
pub fn thread_start(entry: ThreadEntry, arg: usize, flags: ThreadFlags) -> KernelResult<Tid> {
    let mut state = SCHED.lock();
    let idx = state
        .threads
        .iter()
        .position(|t| t.state == ThreadState::Unused)
        .ok_or(KernelError::ThreadTableFull)?;

    let t = &mut state.threads[idx];
    let stack_top = t.stack_top();
    let entry_addr = entry as usize;
    t.sp = context::build_switch_frame(stack_top, entry_addr, arg);
    t.state = ThreadState::Runnable;
    t.flags = flags;
    t.retval = 0;
    t.entry = entry_addr;
    t.arg = arg;
    t.blocked_on = EventMask::empty();
    // A slot reuse always bumps the epoch, so a joiner sampling the epoch
    // before this thread exited can tell the slot has since been recycled.
    t.epoch = t.epoch.wrapping_add(1);
    t.trapframe = core::ptr::null_mut();
    t.user_root = None;

    Ok(idx)
}

/// Selection algorithm, called with the scheduler lock held: rotate from
/// `fair_id`, waking any blocked non-idle thread whose mask overlaps
/// `events`, and return the first runnable non-idle thread found. Falls
/// back to the idle thread if none is runnable.
fn select_runnable(state: &mut SchedState) -> Tid {
    let events = core::mem::replace(&mut state.pending_events, 0);
    let idle = IDLE_TID.load(Ordering::Relaxed);

    let mut idx = state.fair_id;
    for _ in 0..MAX_THREADS {
        if idx != idle {
            let t = &mut state.threads[idx];
            if t.state == ThreadState::Blocked && t.blocked_on.bits() & events != 0 {
                t.state = ThreadState::Runnable;
                t.blocked_on = EventMask::empty();
            }
            if t.state == ThreadState::Runnable {
                state.fair_id = (idx + 1) % MAX_THREADS;
                return idx;
            }
        }
        idx = (idx + 1) % MAX_THREADS;
    }
    idle
}

/// Switch from the current thread to `next`. Interrupts must already be
/// disabled; re-enabling is the caller's responsibility.
fn switch_to(next: Tid) {
    let prev = CURRENT.load(Ordering::Relaxed);
    if prev == next {
        return;
    }

    let (prev_ptr, next_ptr): (*mut Thread, *mut Thread) = {
        let mut state = SCHED.lock();
        let base = state.threads.as_mut_ptr();
        // SAFETY: `prev` and `next` are distinct valid indices into the
        // table. The lock is released immediately after this block; the
        // pointers remain valid because interrupts stay disabled and this
        // core never runs concurrent scheduler code, so nothing else can
        // touch the table before `context::switch` below reclaims control.
        unsafe { (base.add(prev), base.add(next)) }
    };

    CURRENT.store(next, Ordering::Relaxed);
    // SAFETY: `prev_ptr`/`next_ptr` name distinct, live thread slots, per
    // the block above.
    unsafe { context::switch(&mut *prev_ptr, &*next_ptr) };
}

/// Give up the CPU voluntarily. Returns once this thread is scheduled
/// again.
pub fn thread_yield() {
    trap::local_irq_disable();
    let next = select_runnable(&mut SCHED.lock());
    switch_to(next);
    trap::local_irq_enable();
}

/// Block the current thread on `channels` and yield. Returns once some bit
/// in `channels` has been published via `thread_resume_all`.
pub fn thread_suspend(channels: EventMask) {
    trap::local_irq_disable();
    let next = {
        let mut state = SCHED.lock();
        let cur = CURRENT.load(Ordering::Relaxed);
        state.threads[cur].state = ThreadState::Blocked;
        state.threads[cur].blocked_on = channels;
        select_runnable(&mut state)
    };
    switch_to(next);
    trap::local_irq_enable();
}

/// Publish a wakeup on `channels`. Actual transitions happen lazily, the
/// next time `select_runnable` runs.
pub fn thread_resume_all(channels: EventMask) {
    SCHED.lock().pending_events |= channels.bits();
}

/// If a timer tick set the reschedule flag since the last check, yield.
/// Kernel threads must call this at points where preemption is safe;
/// interrupt handlers must never call it.
pub fn thread_maybe_yield() {
    if should_reschedule() {
        thread_yield();
    }
}

/// Terminate the current thread. Never returns.
pub fn thread_exit(retval: i64) -> ! {
    trap::local_irq_disable();
    let next = {
        let mut state = SCHED.lock();
        let cur = CURRENT.load(Ordering::Relaxed);
        state.threads[cur].retval = retval;
        if state.threads[cur].flags.contains(ThreadFlags::JOINABLE) {
            state.threads[cur].state = ThreadState::Exited;
            state.pending_events |= EventMask::THREAD_TERM.bits();
        } else {
            state.threads[cur].state = ThreadState::Unused;
        }
        select_runnable(&mut state)
    };
    switch_to(next);
    unreachable!("thread_exit: scheduled back into an exited thread");
}

/// Wait for `tid` to exit and collect its return value. `tid` must name a
/// live `JOINABLE` thread other than the caller.
pub fn thread_join(tid: Tid) -> KernelResult<i64> {
    let cur = CURRENT.load(Ordering::Relaxed);
    if tid == cur || tid >= MAX_THREADS {
        return Err(KernelError::InvalidThread);
    }

    let sampled_epoch = {
        let state = SCHED.lock();
        if !state.threads[tid].flags.contains(ThreadFlags::JOINABLE) {
            return Err(KernelError::InvalidThread);
        }
        state.threads[tid].epoch
    };

    loop {
        let outcome = {
            let mut state = SCHED.lock();
            if state.threads[tid].epoch != sampled_epoch {
                Some(Err(KernelError::InvalidThread))
            } else if state.threads[tid].state == ThreadState::Exited {
                let retval = state.threads[tid].retval;
                state.threads[tid].state = ThreadState::Unused;
                Some(Ok(retval))
            } else {
                None
            }
        };
        if let Some(result) = outcome {
            return result;
        }
        thread_suspend(EventMask::THREAD_TERM);
    }
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Suspend until at least `n` jiffies have passed, re-checking on every
/// `TIMER` wake in case of a spurious wake from another thread's sleep.
pub fn thread_sleep_jiffies(n: u64) {
    let target = jiffies(Ordering::Relaxed).wrapping_add(n);
    while jiffies(Ordering::Relaxed) < target {
        thread_suspend(EventMask::TIMER);
    }
}

pub fn thread_sleep_ns(ns: u64) {
    thread_sleep_jiffies(ceil_div(ns.saturating_mul(crate::config::HZ), 1_000_000_000))
}

pub fn thread_sleep_ms(ms: u64) {
    thread_sleep_jiffies(ceil_div(ms.saturating_mul(crate::config::HZ), 1_000))
}

pub fn thread_sleep_s(s: u64) {
    thread_sleep_jiffies(s.saturating_mul(crate::config::HZ))
}

fn wait_for_interrupt() {
    // SAFETY: WFI is valid at any exception level and simply halts the
    // core until the next interrupt; it has no memory effects.
    unsafe { core::arch::asm!("wfi", options(nomem, nostack, preserves_flags)) };
}

fn idle_entry(_arg: usize) -> i64 {
    loop {
        thread_yield();
        wait_for_interrupt();
    }
}

/// Create the idle thread, switch into it, and never return. Called
/// exactly once at boot, before interrupts are enabled — any thread
/// created earlier (the init thread) is therefore picked by idle's first
/// `thread_yield` rather than by this function itself.
pub fn thread_run() -> ! {
    let idle = thread_start(idle_entry, 0, ThreadFlags::empty()).expect("thread_run: idle thread slot");
    IDLE_TID.store(idle, Ordering::Relaxed);
    CURRENT.store(idle, Ordering::Relaxed);

    let next_ptr: *const Thread = {
        let state = SCHED.lock();
        &state.threads[idle] as *const Thread
    };
    let mut bootstrap = Thread::unused();
    // SAFETY: `bootstrap` stands in for the boot stack's own stack pointer,
    // which this switch discards; `next_ptr` names the just-created, live
    // idle thread.
    unsafe { context::switch(&mut bootstrap, &*next_ptr) };
    unreachable!("thread_run: returned from the initial switch into idle");
}

/// Called from the timer ISR: bump `jiffies`, publish a `TIMER` wakeup,
/// rearm the comparator, and flag that a reschedule is due.
pub fn clock_isr() {
    JIFFIES.fetch_add(1, Ordering::AcqRel);
    thread_resume_all(EventMask::TIMER);
    crate::arch::aarch64::timer::rearm();
    NEEDS_RESCHED.store(true, Ordering::Release);
}

/// Mark the current thread as backing a user process and enter it: build a
/// trap frame pointed at `program.entry`/`program.stack_top` under
/// `program.root`, and fall into [`return_to_user`]. Never returns.
pub fn process_exec(program: LoadedProgram) -> ! {
    let cur = CURRENT.load(Ordering::Relaxed);
    {
        let mut state = SCHED.lock();
        state.threads[cur].flags |= ThreadFlags::PROCESS;
        state.threads[cur].user_root = Some(program.root);
    }

    let mut frame = trap::TrapFrame::zeroed();
    frame.elr_el1 = program.entry;
    frame.sp_el0 = program.stack_top;
    frame.spsr_el1 = 0; // EL0t, all exceptions unmasked.
    frame.ttbr0_el1 = program.root.as_u64();

    return_to_user(&mut frame as *mut trap::TrapFrame)
}

/// Record `frame_ptr` as the current thread's live trap frame, give a
/// pending reschedule a chance to run, then restore whichever frame ends
/// up current and ERET. Every path back to user space funnels through
/// here (called directly from `vectors.S`) so preemption can land on any
/// user-space boundary.
#[no_mangle]
pub extern "C" fn return_to_user(frame_ptr: *mut trap::TrapFrame) -> ! {
    {
        let cur = CURRENT.load(Ordering::Relaxed);
        SCHED.lock().threads[cur].trapframe = frame_ptr;
    }

    thread_maybe_yield();

    let frame = {
        let cur = CURRENT.load(Ordering::Relaxed);
        SCHED.lock().threads[cur].trapframe
    };
    // SAFETY: `frame` was set above for this thread (or by a previous
    // `process_exec`/`return_to_user` call for the same thread, if a
    // reschedule switched away and back) and points at a fully populated,
    // live trap frame on this thread's own stack.
    unsafe { trap::trap_restore_user_and_eret(frame) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(10, 3), 4);
        assert_eq!(ceil_div(9, 3), 3);
        assert_eq!(ceil_div(0, 3), 0);
    }

    #[test]
    fn select_runnable_wakes_overlapping_blocked_thread() {
        let mut state = SchedState::new();
        state.threads[1].state = ThreadState::Blocked;
        state.threads[1].blocked_on = EventMask::UART_READABLE;
        state.pending_events = EventMask::UART_READABLE.bits();
        IDLE_TID.store(usize::MAX, Ordering::Relaxed);

        let picked = select_runnable(&mut state);
        assert_eq!(picked, 1);
        assert_eq!(state.threads[1].state, ThreadState::Runnable);
        assert!(state.threads[1].blocked_on.is_empty());
    }

    #[test]
    fn select_runnable_falls_back_to_idle_when_nothing_runnable() {
        let mut state = SchedState::new();
        IDLE_TID.store(3, Ordering::Relaxed);
        state.threads[3].state = ThreadState::Runnable;

        assert_eq!(select_runnable(&mut state), 3);
    }

    #[test]
    fn select_runnable_skips_non_overlapping_blocked_thread() {
        let mut state = SchedState::new();
        state.threads[2].state = ThreadState::Blocked;
        state.threads[2].blocked_on = EventMask::UART_WRITABLE;
        state.pending_events = EventMask::TIMER.bits();
        IDLE_TID.store(5, Ordering::Relaxed);
        state.threads[5].state = ThreadState::Runnable;

        assert_eq!(select_runnable(&mut state), 5);
        assert_eq!(state.threads[2].state, ThreadState::Blocked);
    }
}
