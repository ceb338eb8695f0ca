//! Host/realtime mode transitions
//!
//! Switches are scheduled on absolute clock values. Entering realtime
//! mode happens at the scheduled instant (the host guarantees zero
//! velocity there); leaving it is preceded by an acceleration-limited
//! slowdown so the host reclaims the stepper at a known zero-velocity
//! state at the clock it named.

use arcstep_hal::{OutputPin, Scheduler, TimerSlot};

use crate::clock;
use crate::motion::position::POSITION_BIAS;
use crate::motion::stepper::{Mode, Stepper, SF_LAST_DIR};
use crate::shutdown::Shutdown;
use crate::traits::ArcVoltageSensor;

impl<S: OutputPin, D: OutputPin, V: ArcVoltageSensor> Stepper<S, D, V> {
    /// Schedule a host-to-realtime switch at `clock` with the given
    /// soft position window. Only one transition may be pending.
    pub fn set_realtime_mode(
        &mut self,
        clock: u32,
        min_pos: i32,
        max_pos: i32,
        sched: &mut impl Scheduler,
    ) -> Result<(), Shutdown> {
        if self.mode != Mode::Host || self.mode_switch_armed {
            return Err(Shutdown::RealtimeModeTwice);
        }
        let oid = self.oid;
        let rt = self.rt_mut()?;
        rt.min_pos = min_pos;
        rt.max_pos = max_pos;
        sched.del_timer(oid, TimerSlot::ModeSwitch);
        sched.add_timer(oid, TimerSlot::ModeSwitch, clock);
        self.mode_switch_armed = true;
        Ok(())
    }

    /// Schedule a realtime-to-host switch landing at `clock` (the
    /// absolute time velocity must reach zero).
    ///
    /// If the switch to realtime mode is itself still pending, the
    /// request is stashed and chained when realtime mode is entered.
    pub fn set_host_mode(&mut self, clock: u32, sched: &mut impl Scheduler) -> Result<(), Shutdown> {
        if self.mode == Mode::Realtime {
            self.schedule_slowdown(clock, sched)
        } else {
            let rt = self.rt_mut()?;
            rt.slowdown_pending = true;
            rt.slowdown_clock = clock;
            Ok(())
        }
    }

    /// Start the slowdown so the velocity ramp lands exactly at
    /// `clock`: immediately if the worst-case horizon already reaches
    /// past now, otherwise via the mode-switch timer.
    pub(crate) fn schedule_slowdown(
        &mut self,
        clock: u32,
        sched: &mut impl Scheduler,
    ) -> Result<(), Shutdown> {
        let oid = self.oid;
        let now = sched.read_time();
        let rt = self.rt_mut()?;
        // Worst-case deceleration horizon from max_freq
        let slowdown_time = rt.control_period * (rt.cfg.max_freq / rt.max_delta_freq as u32);
        if clock::is_before(clock.wrapping_sub(slowdown_time), now) {
            let rest_time = clock.wrapping_sub(now);
            rt.freq_limiter =
                ((rt.max_delta_freq as u64 * rest_time as u64) / rt.control_period as u64) as i32;
            rt.slowdown = true;
        } else {
            sched.del_timer(oid, TimerSlot::ModeSwitch);
            sched.add_timer(oid, TimerSlot::ModeSwitch, clock.wrapping_sub(slowdown_time));
            self.mode_switch_armed = true;
        }
        Ok(())
    }

    /// Take ownership of the dir line and position accounting from the
    /// pulse scheduler and start the realtime timers.
    pub(crate) fn host_to_realtime(&mut self, sched: &mut impl Scheduler) -> Result<(), Shutdown> {
        let last_dir = self.flags & SF_LAST_DIR != 0;
        if !last_dir {
            // Realtime steps positive with the dir line raised; record
            // that the line must be put back on exit.
            self.dir_pin.toggle();
        }
        let biased = self.position_biased();
        let oid = self.oid;
        let now = sched.read_time();
        let rt = self.rt.as_mut().ok_or(Shutdown::RealtimeNotConfigured)?;
        rt.dir_save = !last_dir;
        rt.count = biased.wrapping_sub(POSITION_BIAS) as i32;
        rt.current_dir = false;
        rt.slowdown = false;
        rt.current_period = 0;
        rt.current_speed = 0;
        rt.cycle_count = 0;
        rt.last_step = 0;

        // The first control tick precedes the first step window
        sched.add_timer(oid, TimerSlot::RtControl, now.wrapping_add(clock::CLOCK_FREQ / 10_000));
        sched.add_timer(oid, TimerSlot::RtStep, now.wrapping_add(clock::CLOCK_FREQ / 5_000));
        self.mode = Mode::Realtime;

        // A set_host_mode that raced the switch was stashed; chain it.
        let stashed = if rt.slowdown_pending {
            rt.slowdown_pending = false;
            Some(rt.slowdown_clock)
        } else {
            None
        };
        if let Some(clock) = stashed {
            self.schedule_slowdown(clock, sched)?;
        }
        Ok(())
    }

    /// Begin leaving realtime mode; the control loop finishes the
    /// switch once the slowdown ramp lands.
    pub(crate) fn realtime_to_host(&mut self) -> Result<(), Shutdown> {
        let rt = self.rt_mut()?;
        rt.freq_limiter = rt.cfg.max_freq as i32;
        rt.slowdown = true;
        Ok(())
    }
}
