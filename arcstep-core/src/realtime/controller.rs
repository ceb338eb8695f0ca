//! The realtime control loop and step timer
//!
//! The control loop runs in task context at `control_freq`; the step
//! timer runs in interrupt context. They share `current_period` and
//! `current_dir`, which the embedding keeps atomic by bracketing the
//! control task in an interrupt-disabled section (here: `&mut` access).

use arcstep_hal::{OutputPin, Scheduler, TimerAction, TimerSlot};
use libm::sqrtf;

use crate::clock;
use crate::motion::stepper::{Mode, Stepper};
use crate::realtime::RtLog;
use crate::shutdown::Shutdown;
use crate::traits::ArcVoltageSensor;

impl<S: OutputPin, D: OutputPin, V: ArcVoltageSensor> Stepper<S, D, V> {
    /// One control tick.
    ///
    /// Returns the telemetry frame when this tick sampled the sensor.
    /// Completing a slowdown switches the stepper back to host mode as
    /// a side effect.
    pub(crate) fn rt_control_run(
        &mut self,
        sched: &mut impl Scheduler,
    ) -> Result<Option<RtLog>, Shutdown> {
        let oid = self.oid;
        let Some(rt) = self.rt.as_mut() else {
            return Err(Shutdown::RealtimeNotConfigured);
        };

        let mut log = None;
        if rt.cycle_count == 0 {
            let sample = rt.sensor.read_sample().map_err(|_| Shutdown::SensorFault)?;
            rt.low_pass = (rt.low_pass + sample) / 2;
            log = Some(RtLog { pos: rt.count, error: rt.low_pass });
            let max_freq = rt.cfg.max_freq as i32;
            rt.target_speed = rt
                .low_pass
                .saturating_mul(rt.cfg.input_factor)
                .clamp(-max_freq, max_freq);
        }

        // Soft position window: clamp the target so a worst-case stop
        // still lands inside [min_pos, max_pos].
        let dist_to_min = (rt.count - (rt.min_pos + 1)).max(0) as u64;
        let dist_to_max = ((rt.max_pos - 1) - rt.count).max(0) as u64;
        let max_freq = rt.cfg.max_freq as u64;
        let steps_to_stop = max_freq * max_freq / (2 * rt.cfg.max_acc as u64)
            + 2 * max_freq / rt.cfg.control_freq as u64;
        if dist_to_min <= steps_to_stop {
            let limit = (sqrtf(rt.cfg.max_acc as f32 * dist_to_min as f32) as i32).max(0);
            rt.target_speed = rt.target_speed.max(-limit);
        }
        if dist_to_max <= steps_to_stop {
            let limit = (sqrtf(rt.cfg.max_acc as f32 * dist_to_max as f32) as i32).max(0);
            rt.target_speed = rt.target_speed.min(limit);
        }

        // Time-based limiter: the slowdown envelope toward a scheduled
        // host-mode entry.
        if rt.slowdown {
            if rt.freq_limiter < rt.max_delta_freq {
                // Ramp landed. Hand the dir line and the position
                // accounting back to the pulse scheduler.
                sched.del_timer(oid, TimerSlot::RtStep);
                sched.del_timer(oid, TimerSlot::RtControl);
                if rt.current_dir != rt.dir_save {
                    self.dir_pin.toggle();
                }
                let count = rt.count;
                self.position.restore(count);
                self.mode = Mode::Host;
                return Ok(log);
            }
            rt.freq_limiter -= rt.max_delta_freq;
            rt.target_speed = rt.target_speed.clamp(-rt.freq_limiter, rt.freq_limiter);
        }

        // Reachable speed under the acceleration limit
        let delta = rt.target_speed - rt.current_speed;
        rt.current_speed += delta.clamp(-rt.max_delta_freq, rt.max_delta_freq);

        // Speed is either above the startable minimum, or zero
        if rt.current_speed.unsigned_abs() < rt.min_freq {
            rt.current_speed = 0;
        }

        let reverse = rt.current_speed < 0;

        // Period of zero means no stepping
        rt.current_period = if rt.current_speed != 0 {
            clock::CLOCK_FREQ / rt.current_speed.unsigned_abs()
        } else {
            0
        };

        // Direction changes take effect on a tick with no step edge;
        // the step timer reads current_dir and current_period together.
        if reverse != rt.current_dir {
            self.dir_pin.toggle();
            rt.current_dir = !rt.current_dir;
        }

        rt.cycle_count = (rt.cycle_count + 1) % rt.cfg.input_cycle;
        Ok(log)
    }

    /// Realtime step timer callback.
    pub(crate) fn rt_step_event(&mut self, waketime: u32) -> Result<TimerAction, Shutdown> {
        let Some(rt) = self.rt.as_mut() else {
            return Err(Shutdown::RealtimeNotConfigured);
        };
        if rt.current_period == 0 {
            // Idle pacing: bounded wake latency keeps mode exits
            // responsive without emitting edges.
            return Ok(TimerAction::Reschedule(
                waketime.wrapping_add(rt.control_period),
            ));
        }
        self.step_pin.toggle();
        rt.last_step = waketime;
        rt.count += if rt.current_dir { -1 } else { 1 };
        self.step_pin.toggle();
        Ok(TimerAction::Reschedule(
            waketime.wrapping_add(rt.current_period),
        ))
    }
}
