use thiserror::Error;

use crate::cortex::NhRadius;

/// Failures of cortex and input construction.
///
/// Parameter setters never return these: an out-of-range value leaves the
/// cortex untouched and is only reported through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CortexError {
    /// The neighborhood would have more slots than a synapse mask has bits.
    #[error("neighborhood radius {radius} needs {slots} synapse slots, masks hold {max}")]
    RadiusTooBig {
        radius: NhRadius,
        slots: usize,
        max: usize,
    },

    #[error("invalid cortex config: {0}")]
    InvalidConfig(&'static str),

    #[error("invalid input bounds ({x0}, {y0})..({x1}, {y1})")]
    InvalidBounds { x0: u32, y0: u32, x1: u32, y1: u32 },

    #[error("pulse mapping {0:?} has no defined spike rule")]
    UndefinedPulseMapping(crate::pulse::PulseMapping),
}
