//! Simulation harness for the motion core
//!
//! Drives the core on a virtual MCU clock: a software timer heap
//! standing in for the cooperative scheduler, edge-recording pins, and
//! a scripted arc-voltage sensor. Tests enqueue commands, advance the
//! clock, and assert on the recorded GPIO edge trace.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use arcstep_core::traits::{ArcVoltageSensor, SensorError};
use arcstep_core::{Command, Response, RtConfig, RtLog, Shutdown, StepperBank};
use arcstep_hal::{OutputPin, Scheduler, TaskWake, TimerAction, TimerSlot};

/// Recorded level transitions of one GPIO line
#[derive(Default)]
pub struct PinTrace {
    pub edges: Vec<(u32, bool)>,
}

/// Output pin that records every transition against the virtual clock
#[derive(Clone)]
pub struct TracePin {
    clock: Rc<Cell<u32>>,
    level: Rc<Cell<bool>>,
    trace: Rc<RefCell<PinTrace>>,
}

impl TracePin {
    fn new(clock: Rc<Cell<u32>>) -> Self {
        Self {
            clock,
            level: Rc::new(Cell::new(false)),
            trace: Rc::new(RefCell::new(PinTrace::default())),
        }
    }

    fn record(&self, level: bool) {
        self.trace.borrow_mut().edges.push((self.clock.get(), level));
    }
}

impl OutputPin for TracePin {
    fn set_high(&mut self) {
        if !self.level.get() {
            self.level.set(true);
            self.record(true);
        }
    }

    fn set_low(&mut self) {
        if self.level.get() {
            self.level.set(false);
            self.record(false);
        }
    }

    fn toggle(&mut self) {
        let level = !self.level.get();
        self.level.set(level);
        self.record(level);
    }

    fn is_set_high(&self) -> bool {
        self.level.get()
    }
}

/// Sensor returning a scripted sample, with an optional injected fault
#[derive(Clone)]
pub struct ScriptSensor {
    pub value: Rc<Cell<i32>>,
    pub fail: Rc<Cell<bool>>,
}

impl ArcVoltageSensor for ScriptSensor {
    fn read_sample(&mut self) -> Result<i32, SensorError> {
        if self.fail.get() {
            return Err(SensorError::Bus);
        }
        Ok(self.value.get())
    }
}

fn slot_rank(slot: TimerSlot) -> u8 {
    match slot {
        TimerSlot::Pulse => 0,
        TimerSlot::RtControl => 1,
        TimerSlot::RtStep => 2,
        TimerSlot::ModeSwitch => 3,
    }
}

/// Min-heap scheduler over absolute wake times
pub struct SimScheduler {
    pub clock: Rc<Cell<u32>>,
    timers: Vec<(u8, TimerSlot, u32)>,
    pub woken: Vec<TaskWake>,
}

impl SimScheduler {
    fn new(clock: Rc<Cell<u32>>) -> Self {
        Self { clock, timers: Vec::new(), woken: Vec::new() }
    }

    /// Pop the earliest timer due at or before `t_end`
    fn pop_due(&mut self, t_end: u32) -> Option<(u8, TimerSlot, u32)> {
        let idx = self
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.2, slot_rank(t.1), t.0))
            .map(|(i, _)| i)?;
        if self.timers[idx].2 > t_end {
            return None;
        }
        Some(self.timers.swap_remove(idx))
    }

    pub fn has_timer(&self, oid: u8, slot: TimerSlot) -> bool {
        self.timers.iter().any(|t| t.0 == oid && t.1 == slot)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }
}

impl Scheduler for SimScheduler {
    fn read_time(&self) -> u32 {
        self.clock.get()
    }

    fn add_timer(&mut self, oid: u8, slot: TimerSlot, waketime: u32) {
        self.del_timer(oid, slot);
        self.timers.push((oid, slot, waketime));
    }

    fn del_timer(&mut self, oid: u8, slot: TimerSlot) {
        self.timers.retain(|t| !(t.0 == oid && t.1 == slot));
    }

    fn wake_task(&mut self, task: TaskWake) {
        if !self.woken.contains(&task) {
            self.woken.push(task);
        }
    }
}

/// One stepper under simulation
pub struct Sim {
    pub clock: Rc<Cell<u32>>,
    pub sched: SimScheduler,
    pub bank: StepperBank<TracePin, TracePin, ScriptSensor>,
    pub step: TracePin,
    pub dir: TracePin,
    pub sensor_value: Rc<Cell<i32>>,
    pub sensor_fail: Rc<Cell<bool>>,
    pub logs: Vec<RtLog>,
}

impl Sim {
    pub fn new() -> Self {
        Self::with_min_stop_interval(0)
    }

    pub fn with_min_stop_interval(min_stop_interval: u32) -> Self {
        let clock = Rc::new(Cell::new(0u32));
        let step = TracePin::new(clock.clone());
        let dir = TracePin::new(clock.clone());
        let mut bank = StepperBank::new();
        bank.config_stepper(0, step.clone(), dir.clone(), min_stop_interval, false)
            .unwrap();
        Self {
            sched: SimScheduler::new(clock.clone()),
            clock,
            bank,
            step,
            dir,
            sensor_value: Rc::new(Cell::new(0)),
            sensor_fail: Rc::new(Cell::new(false)),
            logs: Vec::new(),
        }
    }

    /// Install the reference realtime parameters used by the scenarios:
    /// 100 Hz control, sensor read every 4 ticks, max 1000 steps/s,
    /// 5000 steps/s^2.
    pub fn config_rt(&mut self) {
        let sensor = ScriptSensor {
            value: self.sensor_value.clone(),
            fail: self.sensor_fail.clone(),
        };
        let config = RtConfig {
            control_freq: 100,
            input_cycle: 4,
            input_factor: 100,
            max_freq: 1000,
            max_acc: 5000,
        };
        self.bank.config_stepper_rt_mode(0, config, sensor).unwrap();
    }

    pub fn dispatch(&mut self, command: Command) -> Result<Option<Response>, Shutdown> {
        self.bank.dispatch(command, &mut self.sched)
    }

    /// Run every timer due up to `t_end`, servicing task wakes in
    /// between, and leave the clock at `t_end`.
    pub fn run_until(&mut self, t_end: u32) -> Result<(), Shutdown> {
        while let Some((oid, slot, waketime)) = self.sched.pop_due(t_end) {
            // A timer can be armed behind the current clock (late
            // enqueue); it fires immediately without rewinding time.
            self.clock.set(self.clock.get().max(waketime));
            match self.bank.on_timer(oid, slot, waketime, &mut self.sched)? {
                TimerAction::Reschedule(next) => self.sched.add_timer(oid, slot, next),
                TimerAction::Done => {}
            }
            self.service_tasks()?;
        }
        self.clock.set(t_end);
        Ok(())
    }

    fn service_tasks(&mut self) -> Result<(), Shutdown> {
        while let Some(task) = self.sched.woken.pop() {
            match task {
                TaskWake::RtControl => {
                    let logs = self.bank.rt_control_task(&mut self.sched)?;
                    self.logs.extend(logs.iter().copied());
                }
                TaskWake::ModeSwitch => self.bank.toggle_mode_task(&mut self.sched)?,
            }
        }
        Ok(())
    }

    pub fn reported_position(&mut self) -> i32 {
        match self.dispatch(Command::StepperGetPosition { oid: 0 }) {
            Ok(Some(Response::StepperPosition { pos, .. })) => pos,
            other => panic!("unexpected position reply: {:?}", other),
        }
    }

    /// Times of the step line's rising edges
    pub fn rising_step_edges(&self) -> Vec<u32> {
        self.step
            .trace
            .borrow()
            .edges
            .iter()
            .filter(|(_, level)| *level)
            .map(|(t, _)| *t)
            .collect()
    }

    /// Full (time, level) step-line trace
    pub fn step_edges(&self) -> Vec<(u32, bool)> {
        self.step.trace.borrow().edges.clone()
    }

    pub fn rt_speed(&self) -> i32 {
        self.bank.stepper(0).unwrap().rt_current_speed().unwrap()
    }

    pub fn rt_count(&self) -> i32 {
        self.bank.stepper(0).unwrap().rt_count().unwrap()
    }

    pub fn mode(&self) -> arcstep_core::Mode {
        self.bank.stepper(0).unwrap().mode()
    }
}
