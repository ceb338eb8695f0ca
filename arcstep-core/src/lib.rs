//! Board-agnostic stepper motion core for a plasma-cutter controller
//!
//! This crate contains the per-motor motion logic that does not depend
//! on a specific chip:
//!
//! - Move queue and pulse scheduler (host-queued ramps)
//! - Realtime torch-height controller (arc-voltage servo)
//! - Realtime step timer
//! - Host/realtime mode-transition coordinator
//! - Typed command surface and per-oid stepper registry
//!
//! Hardware is reached only through the `arcstep-hal` contracts, so the
//! whole crate runs under a simulated scheduler on a host machine.
//!
//! # Concurrency contract
//!
//! Timer callbacks ([`command::StepperBank::on_timer`]) execute in
//! interrupt context; command dispatch and the two tasks execute in the
//! cooperative loop. The embedding must bracket task-context calls that
//! share a stepper with its timer callbacks in an interrupt-disabled
//! section - within this crate that discipline is expressed by `&mut`
//! access, which makes each entry point atomic with respect to the
//! others.

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod command;
pub mod motion;
pub mod realtime;
pub mod shutdown;
pub mod traits;

pub use command::{Command, Response, StepperBank, MAX_STEPPERS};
pub use motion::stepper::{Mode, Stepper};
pub use realtime::{RtConfig, RtLog};
pub use shutdown::Shutdown;
