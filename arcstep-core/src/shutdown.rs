//! Fatal error taxonomy
//!
//! Any invariant violation that could produce invalid physical motion
//! halts every stepper: the error propagates out of the core entry
//! point that detected it and the embedding is expected to run the
//! system shutdown hook and report to the host. There is no local
//! recovery; the host must reset the MCU.

use core::fmt;

/// A condition requiring system-wide shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Shutdown {
    /// A ramp drained with its tail still faster than `min_stop_interval`
    NoNextStep,
    /// Timer-latency catch-up would require more than 1 ms of
    /// retroactive movement
    StepperTooFarInPast,
    /// `queue_step` with a zero step count
    InvalidCount,
    /// `reset_step_clock` while the pulse scheduler is mid-ramp
    ResetWhileActive,
    /// Realtime mode enabled while a transition is pending or already
    /// active
    RealtimeModeTwice,
    /// The per-stepper move queue is exhausted
    MoveQueueOverflow,
    /// Command referenced an oid that was never configured
    UnknownOid,
    /// `config_stepper` on an oid that is already configured
    OidInUse,
    /// No room for another stepper in the registry
    TooManySteppers,
    /// A realtime operation before `config_stepper_rt_mode`
    RealtimeNotConfigured,
    /// Rejected realtime parameters (zero rates, or an acceleration
    /// too small to yield a nonzero per-tick speed delta)
    InvalidRtConfig,
    /// The arc-voltage sensor failed to answer on the bus
    SensorFault,
}

impl Shutdown {
    /// The message reported to the host, matching the wire strings the
    /// host toolchain already knows.
    pub fn message(self) -> &'static str {
        match self {
            Shutdown::NoNextStep => "No next step",
            Shutdown::StepperTooFarInPast => "Stepper too far in past",
            Shutdown::InvalidCount => "Invalid count parameter",
            Shutdown::ResetWhileActive => "Can't reset time when stepper active",
            Shutdown::RealtimeModeTwice => "Prevent stepper realtime mode enable twice.",
            Shutdown::MoveQueueOverflow => "Move queue overflow",
            Shutdown::UnknownOid => "Invalid oid",
            Shutdown::OidInUse => "Oid already configured",
            Shutdown::TooManySteppers => "Too many steppers",
            Shutdown::RealtimeNotConfigured => "Realtime mode not configured",
            Shutdown::InvalidRtConfig => "Invalid realtime config",
            Shutdown::SensorFault => "Arc voltage sensor fault",
        }
    }
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
