//! MCU tick arithmetic
//!
//! The scheduler hands out a free-running 32-bit tick counter. It wraps
//! after a few minutes, so absolute times are compared through signed
//! wrap-aware subtraction rather than `<`.

/// MCU clock rate in ticks per second
pub const CLOCK_FREQ: u32 = 20_000_000;

/// Minimum step-pulse width, in microseconds
#[cfg(feature = "step-delay")]
pub const STEP_DELAY_US: u32 = 2;

/// Minimum step-pulse width, in ticks
#[cfg(feature = "step-delay")]
pub const STEP_DELAY_TICKS: u32 = from_us(STEP_DELAY_US);

/// Convert a duration in microseconds to ticks
pub const fn from_us(us: u32) -> u32 {
    (CLOCK_FREQ / 1_000_000) * us
}

/// Wrap-aware ordering of absolute tick values
///
/// Returns true when `a` precedes `b` on the wrapping clock. Valid as
/// long as the two times are within half the clock period of each
/// other, which every scheduled wake in this crate is.
#[inline]
pub fn is_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_before_plain() {
        assert!(is_before(100, 200));
        assert!(!is_before(200, 100));
        assert!(!is_before(150, 150));
    }

    #[test]
    fn test_is_before_across_wrap() {
        // 0xFFFF_FF00 is "just before" 0x100 once the counter wraps
        assert!(is_before(0xFFFF_FF00, 0x100));
        assert!(!is_before(0x100, 0xFFFF_FF00));
    }

    #[test]
    fn test_from_us() {
        assert_eq!(from_us(1), CLOCK_FREQ / 1_000_000);
        assert_eq!(from_us(1000), CLOCK_FREQ / 1000);
    }
}
