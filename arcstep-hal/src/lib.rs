//! Arcstep hardware abstraction layer
//!
//! This crate defines the contracts the motion core consumes from the
//! board support layer. The core never talks to registers; it drives
//! GPIO lines, reads the arc-voltage ADC, and arms timers exclusively
//! through these traits, which keeps it buildable and testable on a
//! host machine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Firmware binary (board crate, ISRs)    │
//! └─────────────────────────────────────────┘
//!                     │ implements
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  arcstep-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     ▲ consumes
//!                     │
//! ┌─────────────────────────────────────────┐
//! │  arcstep-core (motion core)             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`] - step/dir line control
//! - [`i2c::I2cBus`] - I2C master operations for the arc-voltage ADC
//! - [`sched::Scheduler`] - the cooperative timer/task scheduler contract

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod i2c;
pub mod sched;

// Re-export key traits at crate root for convenience
pub use gpio::OutputPin;
pub use i2c::{I2cBus, I2cConfig};
pub use sched::{Scheduler, TaskWake, TimerAction, TimerSlot};
