//! Realtime (torch-height) control
//!
//! In realtime mode the MCU closes a loop on the plasma arc voltage:
//! the control task turns sensor samples into a speed target bounded
//! by acceleration, absolute speed, and a soft position window, and an
//! independent step timer emits pulses at the derived period.

pub mod controller;
pub mod transition;

use crate::clock;
use crate::shutdown::Shutdown;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Host-supplied realtime parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RtConfig {
    /// Control-loop rate in Hz
    pub control_freq: u16,
    /// Control ticks between sensor reads
    pub input_cycle: u16,
    /// Gain from filtered sensor error to target speed (steps/s per count)
    pub input_factor: i32,
    /// Absolute speed bound in steps/s
    pub max_freq: u32,
    /// Acceleration bound in steps/s^2
    pub max_acc: u32,
}

impl RtConfig {
    /// Reject parameter sets the control math cannot run on.
    pub fn validate(&self) -> Result<(), Shutdown> {
        if self.control_freq == 0 || self.input_cycle == 0 || self.max_freq == 0 {
            return Err(Shutdown::InvalidRtConfig);
        }
        if self.max_freq > i32::MAX as u32 {
            return Err(Shutdown::InvalidRtConfig);
        }
        // One control tick must be able to change speed by at least a
        // step/s, or the stepper could never start or finish a slowdown.
        if self.max_acc < self.control_freq as u32 {
            return Err(Shutdown::InvalidRtConfig);
        }
        Ok(())
    }
}

/// Telemetry frame emitted once per `input_cycle` control ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RtLog {
    /// Realtime step position at the time of the read
    pub pos: i32,
    /// Filtered arc-voltage error
    pub error: i32,
}

/// Realtime state block, installed by `config_stepper_rt_mode`
pub struct RtData<V> {
    pub(crate) sensor: V,
    pub(crate) cfg: RtConfig,

    // Derived once at configuration
    pub(crate) control_period: u32,
    pub(crate) max_delta_freq: i32,
    pub(crate) min_freq: u32,

    // Soft position window, set at each realtime-mode entry
    pub(crate) min_pos: i32,
    pub(crate) max_pos: i32,

    // Servo state
    pub(crate) count: i32,
    pub(crate) current_speed: i32,
    pub(crate) target_speed: i32,
    pub(crate) current_period: u32,
    pub(crate) current_dir: bool,
    pub(crate) dir_save: bool,
    pub(crate) cycle_count: u16,
    pub(crate) last_step: u32,
    pub(crate) low_pass: i32,

    // Slowdown bookkeeping
    pub(crate) slowdown: bool,
    pub(crate) freq_limiter: i32,
    pub(crate) slowdown_pending: bool,
    pub(crate) slowdown_clock: u32,
}

impl<V> RtData<V> {
    pub(crate) fn new(cfg: RtConfig, sensor: V) -> Self {
        let control_period = clock::CLOCK_FREQ / cfg.control_freq as u32;
        let max_delta_freq = (cfg.max_acc / cfg.control_freq as u32) as i32;
        // To ensure start-off is possible, min_freq is never above
        // max_delta_freq.
        let min_freq = 100u32.min(max_delta_freq as u32);
        Self {
            sensor,
            cfg,
            control_period,
            max_delta_freq,
            min_freq,
            min_pos: 0,
            max_pos: 0,
            count: 0,
            current_speed: 0,
            target_speed: 0,
            current_period: 0,
            current_dir: false,
            dir_save: false,
            cycle_count: 0,
            last_step: 0,
            low_pass: 0,
            slowdown: false,
            freq_limiter: 0,
            slowdown_pending: false,
            slowdown_clock: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RtConfig {
        RtConfig {
            control_freq: 100,
            input_cycle: 4,
            input_factor: 100,
            max_freq: 1000,
            max_acc: 5000,
        }
    }

    #[test]
    fn test_derived_parameters() {
        let rt = RtData::new(config(), ());
        assert_eq!(rt.control_period, clock::CLOCK_FREQ / 100);
        assert_eq!(rt.max_delta_freq, 50);
        // min_freq is capped by max_delta_freq
        assert_eq!(rt.min_freq, 50);
    }

    #[test]
    fn test_min_freq_default_cap() {
        let mut cfg = config();
        cfg.max_acc = 50_000;
        let rt = RtData::new(cfg, ());
        assert_eq!(rt.max_delta_freq, 500);
        assert_eq!(rt.min_freq, 100);
    }

    #[test]
    fn test_validate_rejects_zero_rates() {
        let mut cfg = config();
        cfg.control_freq = 0;
        assert_eq!(cfg.validate(), Err(Shutdown::InvalidRtConfig));

        let mut cfg = config();
        cfg.input_cycle = 0;
        assert_eq!(cfg.validate(), Err(Shutdown::InvalidRtConfig));

        let mut cfg = config();
        cfg.max_freq = 0;
        assert_eq!(cfg.validate(), Err(Shutdown::InvalidRtConfig));
    }

    #[test]
    fn test_validate_rejects_zero_delta_freq() {
        let mut cfg = config();
        cfg.max_acc = 99; // below control_freq
        assert_eq!(cfg.validate(), Err(Shutdown::InvalidRtConfig));
    }

    #[test]
    fn test_validate_accepts_reference_parameters() {
        assert_eq!(config().validate(), Ok(()));
    }
}
