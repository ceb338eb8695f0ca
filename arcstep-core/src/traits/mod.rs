//! Capability traits implemented by the drivers crate

mod sensor;

pub use sensor::{ArcVoltageSensor, SensorError};
