//! # cortex2d
//!
//! A 2D cellular-automaton cortex of spiking, plastic neurons.
//!
//! Every neuron keeps bit-packed synapses to the cells of a square
//! neighborhood around it. Each tick sums the influence of firing neighbors,
//! decays and resets neuron values, and every few ticks rewires and reweights
//! synapses from recent spike history. External stimulus is injected through
//! pulse encoders that turn static magnitudes into spike trains.
//!
//! ## Quick Start
//!
//! ```
//! use cortex2d::prelude::*;
//!
//! let cortex = Cortex::new(64, 32, 2).unwrap();
//!
//! let mut input = Input2d::new(0, 0, 8, 1, DEFAULT_EXC_VALUE * 8, PulseMapping::Linear).unwrap();
//! input.set_values(SAMPLE_WINDOW_SMALL - 1);
//!
//! let mut pair = CortexPair::new(cortex);
//! pair.run(100, Some(&input));
//! assert_eq!(pair.ticks(), 100);
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Standard library support, cortex images
//! - `serde` (default): Enable serialization/deserialization
//! - `parallel`: Enable multi-threaded ticks via rayon
//! - `cli`: Build the `cortex2d` driver binary
//!
//! ## no_std Support
//!
//! Disable default features for `no_std` environments:
//! ```toml
//! cortex2d = { version = "0.1", default-features = false }
//! ```
//!
//! ## Modules
//!
//! - [`cortex`]: Grid, parameters and lifecycle
//! - [`tick`]: Tick engine
//! - [`input`]: Stimulus injection
//! - [`pulse`]: Pulse encoders
//! - [`observer`]: Read-only observation adapters

// no_std support
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[path = "core/cortex.rs"]
pub mod cortex;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/input.rs"]
pub mod input;

#[path = "core/neuron.rs"]
pub mod neuron;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/pulse.rs"]
pub mod pulse;

#[path = "core/tick.rs"]
pub mod tick;

#[cfg(feature = "std")]
#[path = "core/storage.rs"]
pub mod storage;

#[cfg(feature = "std")]
pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use cortex2d::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cortex::*;
    pub use crate::error::CortexError;
    pub use crate::input::Input2d;
    pub use crate::neuron::Neuron;
    pub use crate::pulse::{pulse_map, PulseMapping};
    pub use crate::tick::{tick, CortexPair, ExecutionTier};
}
