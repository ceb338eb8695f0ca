//! Peripheral drivers for the arcstep motion core
//!
//! Drivers implement the capability traits defined in `arcstep-core`
//! against the bus contracts of `arcstep-hal`, so the core never
//! depends on a concrete part number.

#![no_std]
#![deny(unsafe_code)]

pub mod sensor;

pub use sensor::Ads1015;
