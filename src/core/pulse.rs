//! Pulse encoders: turn a static input magnitude into a spike train.
//!
//! Every encoder is a pure function of `(window, step, magnitude)`. Feeding the
//! same input at the same sample step always yields the same decision, so
//! injected stimulus is reproducible across runs and across workers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cortex::TicksCount;

/// Duty-cycle coding used to map an input magnitude to spikes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PulseMapping {
    /// Evenly spaced spikes with period `window - magnitude`.
    #[default]
    Linear,
    /// Two-sided density code with floored periods.
    FlooredProportional,
    /// Two-sided density code with periods rounded to the nearest tick.
    RoundedProportional,
    /// Reserved. No spike rule is defined for it yet, it never fires.
    DoubleFlooredProportional,
}

impl PulseMapping {
    /// Whether this mapping has a spike rule.
    pub fn is_defined(self) -> bool {
        !matches!(self, PulseMapping::DoubleFlooredProportional)
    }

    /// Stable numeric code, used in cortex images.
    pub fn code(self) -> u32 {
        match self {
            PulseMapping::Linear => 0x10000,
            PulseMapping::FlooredProportional => 0x10001,
            PulseMapping::RoundedProportional => 0x10002,
            PulseMapping::DoubleFlooredProportional => 0x10003,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x10000 => Some(PulseMapping::Linear),
            0x10001 => Some(PulseMapping::FlooredProportional),
            0x10002 => Some(PulseMapping::RoundedProportional),
            0x10003 => Some(PulseMapping::DoubleFlooredProportional),
            _ => None,
        }
    }

    #[inline]
    pub fn encode(self, window: TicksCount, step: TicksCount, magnitude: TicksCount) -> bool {
        pulse_map(window, step, magnitude, self)
    }
}

/// Decide whether `magnitude` spikes at `step` of a sample window.
///
/// Magnitudes outside `[0, window)` are rejected and never spike.
pub fn pulse_map(
    window: TicksCount,
    step: TicksCount,
    magnitude: TicksCount,
    mapping: PulseMapping,
) -> bool {
    if magnitude >= window {
        return false;
    }

    match mapping {
        PulseMapping::Linear => pulse_map_linear(window, step, magnitude),
        PulseMapping::FlooredProportional => pulse_map_fprop(window, step, magnitude),
        PulseMapping::RoundedProportional => pulse_map_rprop(window, step, magnitude),
        PulseMapping::DoubleFlooredProportional => false,
    }
}

// window = 10:
// |@| | | | | | | | | | -> x = 0
// |@| | | | | | | | |@| -> x = 1
// |@| | | | | | |@| | | -> x = 3
// |@| | | |@| | | |@| | -> x = 6
// |@|@|@|@|@|@|@|@|@|@| -> x = 9
fn pulse_map_linear(window: TicksCount, step: TicksCount, magnitude: TicksCount) -> bool {
    step % (window - magnitude) == 0
}

// window = 10, upper = 9:
// |@| | | | | | | | | | -> x = 0
// |@| | | |@| | | |@| | -> x = 2
// |@| |@| |@| |@| |@| | -> x = 4
// | |@| |@| |@| |@| |@| -> x = 5
// | |@|@|@| |@|@|@| |@| -> x = 7
// | |@|@|@|@|@|@|@|@|@| -> x = 9
fn pulse_map_fprop(window: TicksCount, step: TicksCount, magnitude: TicksCount) -> bool {
    let upper = window - 1;

    if magnitude < window / 2 {
        step == 0 || (magnitude > 0 && step % (upper / magnitude) == 0)
    } else {
        magnitude >= upper || step % (upper / (upper - magnitude)) != 0
    }
}

// window = 10, upper = 9:
// |@| | | | |@| | | | | -> x = 2
// | |@|@|@|@| |@|@|@|@| -> x = 7
fn pulse_map_rprop(window: TicksCount, step: TicksCount, magnitude: TicksCount) -> bool {
    let upper = window - 1;

    if 2 * u64::from(magnitude) < u64::from(window) {
        step == 0 || (magnitude > 0 && step % rounded_div(upper, magnitude) == 0)
    } else {
        magnitude >= upper || step % rounded_div(upper, upper - magnitude) != 0
    }
}

/// `round(a / b)` for positive integers, halves rounded up.
#[inline]
fn rounded_div(a: TicksCount, b: TicksCount) -> TicksCount {
    ((2 * u64::from(a) + u64::from(b)) / (2 * u64::from(b))) as TicksCount
}
