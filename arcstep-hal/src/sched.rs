//! Cooperative timer/task scheduler contract
//!
//! The board layer owns a min-heap of timers ordered by absolute wake
//! time and a cooperative task loop. The motion core registers its
//! timers here and reports, from each timer callback, whether the timer
//! should be re-inserted. Timer callbacks run in interrupt context and
//! must complete without suspending; tasks run in the cooperative loop
//! and may be preempted by timer callbacks but never by other tasks.

/// The per-stepper timers the core can register.
///
/// A stepper owns at most one timer per slot; the pair `(oid, slot)`
/// identifies it to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerSlot {
    /// Host-mode pulse scheduler (step/unstep edges)
    Pulse,
    /// Realtime control tick (wakes the control task)
    RtControl,
    /// Realtime step timer (emits pulses at the commanded period)
    RtStep,
    /// Scheduled host/realtime mode switch
    ModeSwitch,
}

/// The wakeable tasks the core contributes to the cooperative loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskWake {
    /// Run the realtime control loop over every realtime stepper
    RtControl,
    /// Execute pending mode transitions
    ModeSwitch,
}

/// Verdict returned by a timer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerAction {
    /// Re-insert the timer at the given absolute clock value
    Reschedule(u32),
    /// The timer is finished; drop it from the heap
    Done,
}

/// Scheduler operations available to the core.
///
/// Contract notes:
///
/// - `add_timer` on an `(oid, slot)` pair that is already registered
///   replaces the previous wake time.
/// - `del_timer` on a timer that is not registered is a no-op.
/// - `wake_task` is level-triggered and coalescing: waking an
///   already-pending task has no additional effect. It is callable
///   from timer-interrupt context.
/// - `read_time` returns the free-running MCU clock; tick values wrap
///   and must be compared with [`wrap-aware ordering`](crate::sched).
pub trait Scheduler {
    /// Current MCU clock in ticks
    fn read_time(&self) -> u32;

    /// Register (or move) a timer at an absolute wake time
    fn add_timer(&mut self, oid: u8, slot: TimerSlot, waketime: u32);

    /// Remove a timer if registered
    fn del_timer(&mut self, oid: u8, slot: TimerSlot);

    /// Request a cooperative task run
    fn wake_task(&mut self, task: TaskWake);
}
