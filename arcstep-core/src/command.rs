//! Typed command surface and per-oid stepper registry
//!
//! The serial transport and argument parsing live outside the core;
//! commands arrive here as typed values and replies leave as typed
//! values. Dispatch must run with interrupts disabled relative to the
//! timer callbacks of the stepper it touches.

use arcstep_hal::{OutputPin, Scheduler, TimerAction, TimerSlot};
use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::motion::stepper::{Mode, Stepper};
use crate::realtime::{RtConfig, RtLog};
use crate::shutdown::Shutdown;
use crate::traits::ArcVoltageSensor;

/// Steppers one MCU can drive
pub const MAX_STEPPERS: usize = 8;

/// Runtime commands addressed to a configured stepper.
///
/// Configuration commands (`config_stepper`, `config_stepper_rt_mode`)
/// carry hardware resources and are methods on [`StepperBank`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Command {
    /// Enqueue one `(interval, count, add)` ramp
    QueueStep { oid: u8, interval: u32, count: u16, add: i16 },
    /// Set the direction of the next queued ramp
    SetNextStepDir { oid: u8, dir: bool },
    /// Set the absolute clock the next ramp is timed against
    ResetStepClock { oid: u8, clock: u32 },
    /// Ask for the current position
    StepperGetPosition { oid: u8 },
    /// Schedule a host-to-realtime switch
    SetRealtimeMode { oid: u8, clock: u32, min_pos: i32, max_pos: i32 },
    /// Schedule a realtime-to-host switch landing at `clock`
    SetHostMode { oid: u8, clock: u32 },
}

/// Replies produced by command dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Response {
    /// Answer to [`Command::StepperGetPosition`]
    StepperPosition { oid: u8, pos: i32 },
}

/// Every stepper the MCU drives, addressed by oid.
pub struct StepperBank<S, D, V> {
    steppers: Vec<Stepper<S, D, V>, MAX_STEPPERS>,
}

impl<S, D, V> Default for StepperBank<S, D, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D, V> StepperBank<S, D, V> {
    pub const fn new() -> Self {
        Self { steppers: Vec::new() }
    }
}

impl<S: OutputPin, D: OutputPin, V: ArcVoltageSensor> StepperBank<S, D, V> {
    /// `config_stepper`: create a stepper channel on `oid`.
    pub fn config_stepper(
        &mut self,
        oid: u8,
        step_pin: S,
        dir_pin: D,
        min_stop_interval: u32,
        invert_step: bool,
    ) -> Result<(), Shutdown> {
        if self.steppers.iter().any(|s| s.oid() == oid) {
            return Err(Shutdown::OidInUse);
        }
        let stepper = Stepper::new(oid, step_pin, dir_pin, min_stop_interval, invert_step);
        self.steppers
            .push(stepper)
            .map_err(|_| Shutdown::TooManySteppers)?;
        Ok(())
    }

    /// `config_stepper_rt_mode`: install realtime parameters and the
    /// arc-voltage sensor (already brought up on the bus).
    pub fn config_stepper_rt_mode(
        &mut self,
        oid: u8,
        config: RtConfig,
        sensor: V,
    ) -> Result<(), Shutdown> {
        self.stepper_mut(oid)?.config_rt_mode(config, sensor)
    }

    pub fn stepper(&self, oid: u8) -> Result<&Stepper<S, D, V>, Shutdown> {
        self.steppers
            .iter()
            .find(|s| s.oid() == oid)
            .ok_or(Shutdown::UnknownOid)
    }

    pub fn stepper_mut(&mut self, oid: u8) -> Result<&mut Stepper<S, D, V>, Shutdown> {
        self.steppers
            .iter_mut()
            .find(|s| s.oid() == oid)
            .ok_or(Shutdown::UnknownOid)
    }

    /// Apply one host command.
    pub fn dispatch(
        &mut self,
        command: Command,
        sched: &mut impl Scheduler,
    ) -> Result<Option<Response>, Shutdown> {
        match command {
            Command::QueueStep { oid, interval, count, add } => {
                self.stepper_mut(oid)?.queue_step(interval, count, add, sched)?;
                Ok(None)
            }
            Command::SetNextStepDir { oid, dir } => {
                self.stepper_mut(oid)?.set_next_step_dir(dir);
                Ok(None)
            }
            Command::ResetStepClock { oid, clock } => {
                self.stepper_mut(oid)?.reset_step_clock(clock)?;
                Ok(None)
            }
            Command::StepperGetPosition { oid } => {
                let pos = self.stepper(oid)?.reported_position();
                Ok(Some(Response::StepperPosition { oid, pos }))
            }
            Command::SetRealtimeMode { oid, clock, min_pos, max_pos } => {
                self.stepper_mut(oid)?
                    .set_realtime_mode(clock, min_pos, max_pos, sched)?;
                Ok(None)
            }
            Command::SetHostMode { oid, clock } => {
                self.stepper_mut(oid)?.set_host_mode(clock, sched)?;
                Ok(None)
            }
        }
    }

    /// Timer-interrupt entry point: route a fired timer to its stepper.
    pub fn on_timer(
        &mut self,
        oid: u8,
        slot: TimerSlot,
        waketime: u32,
        sched: &mut impl Scheduler,
    ) -> Result<TimerAction, Shutdown> {
        self.stepper_mut(oid)?.on_timer(slot, waketime, sched)
    }

    /// Cooperative task: execute pending mode transitions.
    ///
    /// Run when the scheduler delivers `TaskWake::ModeSwitch`.
    pub fn toggle_mode_task(&mut self, sched: &mut impl Scheduler) -> Result<(), Shutdown> {
        for stepper in self.steppers.iter_mut() {
            if stepper.toggle_pending {
                match stepper.mode() {
                    Mode::Host => stepper.host_to_realtime(sched)?,
                    Mode::Realtime => stepper.realtime_to_host()?,
                }
                stepper.toggle_pending = false;
            }
        }
        Ok(())
    }

    /// Cooperative task: run the control loop over every realtime
    /// stepper, collecting the telemetry frames to send.
    ///
    /// Run when the scheduler delivers `TaskWake::RtControl`.
    pub fn rt_control_task(
        &mut self,
        sched: &mut impl Scheduler,
    ) -> Result<Vec<RtLog, MAX_STEPPERS>, Shutdown> {
        let mut logs = Vec::new();
        for stepper in self.steppers.iter_mut() {
            if stepper.mode() == Mode::Realtime {
                if let Some(log) = stepper.rt_control_run(sched)? {
                    // capacity matches the stepper count
                    let _ = logs.push(log);
                }
            }
        }
        Ok(logs)
    }

    /// `stepper_stop` for one channel (endstop homing).
    pub fn stepper_stop(&mut self, oid: u8, sched: &mut impl Scheduler) -> Result<(), Shutdown> {
        self.stepper_mut(oid)?.stop(sched);
        Ok(())
    }

    /// System-wide shutdown hook: flush every queue and stop every
    /// stepper.
    pub fn shutdown(&mut self, sched: &mut impl Scheduler) {
        for stepper in self.steppers.iter_mut() {
            stepper.stop(sched);
        }
    }
}
