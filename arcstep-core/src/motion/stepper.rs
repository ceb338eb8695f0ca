//! The per-motor stepper object and its pulse scheduler
//!
//! A `Stepper` executes host-queued ramps by toggling its step line
//! from a timer callback, with the k-th edge of a ramp landing at
//! `t0 + sum(interval + j*add)`. The same object carries the realtime
//! controller state; which subsystem owns the timers and the dir line
//! is decided by [`Mode`].

use arcstep_hal::{OutputPin, Scheduler, TaskWake, TimerAction, TimerSlot};

#[cfg(feature = "step-delay")]
use crate::clock;
use crate::motion::move_queue::{Move, MoveQueue, MF_DIR};
use crate::motion::position::{BiasedPosition, POSITION_BIAS};
use crate::realtime::{RtConfig, RtData};
use crate::shutdown::Shutdown;
use crate::traits::ArcVoltageSensor;

// Stepper flag bits
pub(crate) const SF_LAST_DIR: u8 = 1 << 0;
pub(crate) const SF_NEXT_DIR: u8 = 1 << 1;
pub(crate) const SF_LAST_RESET: u8 = 1 << 2;
pub(crate) const SF_NO_NEXT_CHECK: u8 = 1 << 3;
pub(crate) const SF_NEED_RESET: u8 = 1 << 4;

/// Who owns the step timing and the dir line right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Pulse timing dictated by host-queued ramps
    Host,
    /// Pulse timing computed on-MCU from arc-voltage feedback
    Realtime,
}

/// One stepper motor channel
pub struct Stepper<S, D, V> {
    pub(crate) oid: u8,
    pub(crate) step_pin: S,
    pub(crate) dir_pin: D,
    invert_step: bool,
    min_stop_interval: u32,

    // Pulse-scheduler state. `count` holds half-events (step then
    // unstep) under the step-delay feature, whole pulses otherwise.
    interval: u32,
    add: i16,
    count: u32,
    next_step_time: u32,
    pub(crate) position: BiasedPosition,
    pub(crate) flags: u8,
    queue: MoveQueue,

    pub(crate) mode: Mode,
    pub(crate) toggle_pending: bool,
    pub(crate) mode_switch_armed: bool,
    pub(crate) rt: Option<RtData<V>>,
}

impl<S: OutputPin, D: OutputPin, V: ArcVoltageSensor> Stepper<S, D, V> {
    /// Configure a stepper channel. The step line idles at the
    /// inverted level; the dir line idles low.
    pub fn new(oid: u8, step_pin: S, dir_pin: D, min_stop_interval: u32, invert_step: bool) -> Self {
        let mut s = Self {
            oid,
            step_pin,
            dir_pin,
            invert_step,
            min_stop_interval,
            interval: 0,
            add: 0,
            count: 0,
            next_step_time: 0,
            position: BiasedPosition::origin(),
            flags: 0,
            queue: MoveQueue::new(),
            mode: Mode::Host,
            toggle_pending: false,
            mode_switch_armed: false,
            rt: None,
        };
        s.step_pin.set_state(invert_step);
        s.dir_pin.set_low();
        s
    }

    /// Install the realtime parameter block and its sensor.
    pub fn config_rt_mode(&mut self, config: RtConfig, sensor: V) -> Result<(), Shutdown> {
        config.validate()?;
        self.rt = Some(RtData::new(config, sensor));
        Ok(())
    }

    pub fn oid(&self) -> u8 {
        self.oid
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Realtime step count, if the realtime block is configured
    pub fn rt_count(&self) -> Option<i32> {
        self.rt.as_ref().map(|rt| rt.count)
    }

    /// Realtime commanded speed in steps/s (signed)
    pub fn rt_current_speed(&self) -> Option<i32> {
        self.rt.as_ref().map(|rt| rt.current_speed)
    }

    /// Realtime step period in ticks (0 = idle)
    pub fn rt_current_period(&self) -> Option<u32> {
        self.rt.as_ref().map(|rt| rt.current_period)
    }

    pub(crate) fn rt_mut(&mut self) -> Result<&mut RtData<V>, Shutdown> {
        self.rt.as_mut().ok_or(Shutdown::RealtimeNotConfigured)
    }

    /// Steps of the current ramp not yet emitted
    fn pending_steps(&self) -> u32 {
        if cfg!(feature = "step-delay") {
            // half-events: a step and its unstep are separate events
            self.count / 2
        } else {
            self.count
        }
    }

    /// Biased position including mid-move correction
    pub(crate) fn position_biased(&self) -> u32 {
        self.position.resolve(self.pending_steps())
    }

    /// Signed position as reported on the wire
    pub fn reported_position(&self) -> i32 {
        self.position_biased().wrapping_sub(POSITION_BIAS) as i32
    }

    /// Set the direction the next queued ramp will step in.
    pub fn set_next_step_dir(&mut self, dir: bool) {
        let next = if dir { SF_NEXT_DIR } else { 0 };
        self.flags = (self.flags & !SF_NEXT_DIR) | next;
    }

    /// Set the absolute clock the next ramp is timed against.
    pub fn reset_step_clock(&mut self, waketime: u32) -> Result<(), Shutdown> {
        if self.count != 0 {
            return Err(Shutdown::ResetWhileActive);
        }
        self.next_step_time = waketime;
        self.flags = (self.flags & !SF_NEED_RESET) | SF_LAST_RESET;
        Ok(())
    }

    /// Enqueue one ramp and start the pulse timer if the stepper was
    /// idle. Must be called atomically with respect to the pulse
    /// callback.
    pub fn queue_step(
        &mut self,
        interval: u32,
        count: u16,
        add: i16,
        sched: &mut impl Scheduler,
    ) -> Result<(), Shutdown> {
        if count == 0 {
            return Err(Shutdown::InvalidCount);
        }
        let mut m = Move { interval, add, count, flags: 0 };

        let mut flags = self.flags;
        if (flags & SF_LAST_DIR != 0) != (flags & SF_NEXT_DIR != 0) {
            flags ^= SF_LAST_DIR;
            m.flags |= MF_DIR;
        }
        flags &= !SF_NO_NEXT_CHECK;
        if m.count == 1 && (m.flags != 0 || flags & SF_LAST_RESET != 0) {
            // count=1 moves after a reset or dir change can have small
            // intervals without risking the tail-speed check
            flags |= SF_NO_NEXT_CHECK;
        }
        flags &= !SF_LAST_RESET;

        if self.count != 0 {
            // Already stepping: append behind the active ramp
            self.flags = flags;
            self.queue.push(m)?;
        } else if flags & SF_NEED_RESET != 0 {
            // Emergency stop pending: drop the move until the host
            // resets the step clock
        } else {
            self.flags = flags;
            let first_interval = m.interval;
            self.queue.push(m)?;
            let min_next_time = self.next_step_time.wrapping_add(first_interval);
            if let TimerAction::Reschedule(waketime) = self.load_next(min_next_time)? {
                sched.add_timer(self.oid, TimerSlot::Pulse, waketime);
            }
        }
        Ok(())
    }

    /// Prime the scheduler state from the next queued ramp.
    fn load_next(&mut self, min_next_time: u32) -> Result<TimerAction, Shutdown> {
        let Some(m) = self.queue.pop() else {
            // Queue drained; the tail must still be slow enough to
            // stop from, unless this ramp was exempted at enqueue.
            if self.interval.wrapping_sub(self.add as i32 as u32) < self.min_stop_interval
                && self.flags & SF_NO_NEXT_CHECK == 0
            {
                return Err(Shutdown::NoNextStep);
            }
            self.count = 0;
            return Ok(TimerAction::Done);
        };

        self.next_step_time = self.next_step_time.wrapping_add(m.interval);
        self.add = m.add;
        self.interval = m.interval.wrapping_add(m.add as i32 as u32);

        #[cfg(feature = "step-delay")]
        let waketime = {
            // Unstep edges are scheduled separately, so there are
            // twice as many timer events. The first step must also
            // clear the previous unstep by the pulse width.
            self.count = m.count as u32 * 2;
            if clock::is_before(self.next_step_time, min_next_time) {
                if (self.next_step_time.wrapping_sub(min_next_time) as i32)
                    < -(clock::from_us(1000) as i32)
                {
                    return Err(Shutdown::StepperTooFarInPast);
                }
                min_next_time
            } else {
                self.next_step_time
            }
        };
        #[cfg(not(feature = "step-delay"))]
        let waketime = {
            let _ = min_next_time;
            self.count = m.count as u32;
            self.next_step_time
        };

        // Fold the whole ramp into the position accumulator so
        // mid-move reads can subtract the steps not yet taken.
        if m.flags & MF_DIR != 0 {
            self.position.reverse_then_advance(m.count);
            match self.mode {
                Mode::Host => self.dir_pin.toggle(),
                Mode::Realtime => {
                    // Realtime owns the dir line; only flip the saved
                    // state the transition restores later.
                    if let Some(rt) = self.rt.as_mut() {
                        rt.dir_save = !rt.dir_save;
                    }
                }
            }
        } else {
            self.position.advance(m.count);
        }

        Ok(TimerAction::Reschedule(waketime))
    }

    /// Pulse timer callback (step-delay variant): emits one edge per
    /// invocation and schedules the matching unstep.
    #[cfg(feature = "step-delay")]
    fn pulse_event(&mut self, sched: &mut impl Scheduler) -> Result<TimerAction, Shutdown> {
        self.step_pin.toggle();
        let min_next_time = sched.read_time().wrapping_add(clock::STEP_DELAY_TICKS);
        self.count -= 1;
        if self.count & 1 != 0 {
            // That was the step edge; the unstep follows after the
            // minimum pulse width.
            return Ok(TimerAction::Reschedule(min_next_time));
        }
        if self.count != 0 {
            self.next_step_time = self.next_step_time.wrapping_add(self.interval);
            self.interval = self.interval.wrapping_add(self.add as i32 as u32);
            if clock::is_before(self.next_step_time, min_next_time) {
                // Timer latency ate into the schedule; push the next
                // step back just far enough.
                return Ok(TimerAction::Reschedule(min_next_time));
            }
            return Ok(TimerAction::Reschedule(self.next_step_time));
        }
        self.load_next(min_next_time)
    }

    /// Pulse timer callback (single-callback variant): both edges of
    /// the pulse happen within one invocation.
    #[cfg(not(feature = "step-delay"))]
    fn pulse_event(&mut self, _sched: &mut impl Scheduler) -> Result<TimerAction, Shutdown> {
        self.step_pin.toggle();
        self.count -= 1;
        if self.count != 0 {
            self.next_step_time = self.next_step_time.wrapping_add(self.interval);
            self.interval = self.interval.wrapping_add(self.add as i32 as u32);
            self.step_pin.toggle();
            return Ok(TimerAction::Reschedule(self.next_step_time));
        }
        let action = self.load_next(0)?;
        self.step_pin.toggle();
        Ok(action)
    }

    /// Dispatch a scheduler timer to the owning subsystem.
    pub fn on_timer(
        &mut self,
        slot: TimerSlot,
        waketime: u32,
        sched: &mut impl Scheduler,
    ) -> Result<TimerAction, Shutdown> {
        match slot {
            TimerSlot::Pulse => self.pulse_event(sched),
            TimerSlot::RtStep => self.rt_step_event(waketime),
            TimerSlot::RtControl => {
                sched.wake_task(TaskWake::RtControl);
                let control_period = self.rt_mut()?.control_period;
                Ok(TimerAction::Reschedule(waketime.wrapping_add(control_period)))
            }
            TimerSlot::ModeSwitch => {
                self.mode_switch_armed = false;
                self.toggle_pending = true;
                sched.wake_task(TaskWake::ModeSwitch);
                Ok(TimerAction::Done)
            }
        }
    }

    /// Abort all motion (endstop homing / system shutdown).
    ///
    /// Clears the queue and forces a `reset_step_clock` before any new
    /// move is accepted; the position survives the stop.
    pub fn stop(&mut self, sched: &mut impl Scheduler) {
        sched.del_timer(self.oid, TimerSlot::Pulse);
        self.next_step_time = 0;
        self.position.negate_resolved(self.pending_steps());
        self.count = 0;
        self.flags = SF_NEED_RESET;
        self.dir_pin.set_low();
        self.step_pin.set_state(self.invert_step);
        self.queue.clear();
    }

    /// Pending ramps (active ramp excluded)
    pub fn queued_moves(&self) -> usize {
        self.queue.len()
    }

    /// Whether the pulse scheduler is mid-ramp
    pub fn is_stepping(&self) -> bool {
        self.count != 0
    }
}
