//! Stimulus injection: adds external input to a cortex before a tick.
//!
//! Feeds only touch neuron values and never the synapse topology. Every feed
//! is a no-op when the requested range does not fit the cortex, and all
//! additions saturate.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tracing::debug;

use crate::cortex::{Cortex, CortexSize, NeuronValue, TicksCount};
use crate::error::CortexError;
use crate::pulse::{pulse_map, PulseMapping};

/// Rectangular input region `[x0, x1) × [y0, y1)`.
///
/// Holds one magnitude per cell, row-major. Magnitudes are turned into
/// spikes by the region's pulse mapping over the cortex' sample window, so
/// only magnitudes below the sample window ever fire.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Input2d {
    x0: CortexSize,
    y0: CortexSize,
    x1: CortexSize,
    y1: CortexSize,
    exc_value: NeuronValue,
    pulse_mapping: PulseMapping,
    values: Vec<TicksCount>,
}

impl Input2d {
    pub fn new(
        x0: CortexSize,
        y0: CortexSize,
        x1: CortexSize,
        y1: CortexSize,
        exc_value: NeuronValue,
        pulse_mapping: PulseMapping,
    ) -> Result<Self, CortexError> {
        if x1 < x0 || y1 < y0 {
            return Err(CortexError::InvalidBounds { x0, y0, x1, y1 });
        }
        if !pulse_mapping.is_defined() {
            return Err(CortexError::UndefinedPulseMapping(pulse_mapping));
        }

        let len = (x1 - x0) as usize * (y1 - y0) as usize;
        Ok(Self {
            x0,
            y0,
            x1,
            y1,
            exc_value,
            pulse_mapping,
            values: vec![0; len],
        })
    }

    #[inline]
    pub fn bounds(&self) -> (CortexSize, CortexSize, CortexSize, CortexSize) {
        (self.x0, self.y0, self.x1, self.y1)
    }

    #[inline]
    pub fn width(&self) -> CortexSize {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> CortexSize {
        self.y1 - self.y0
    }

    #[inline]
    pub fn exc_value(&self) -> NeuronValue {
        self.exc_value
    }

    #[inline]
    pub fn pulse_mapping(&self) -> PulseMapping {
        self.pulse_mapping
    }

    #[inline]
    pub fn values(&self) -> &[TicksCount] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [TicksCount] {
        &mut self.values
    }

    /// Set every magnitude of the region to `value`.
    pub fn set_values(&mut self, value: TicksCount) {
        self.values.fill(value);
    }
}

impl Cortex {
    /// Add `values[i]` to neuron `start + i`.
    pub fn feed(&mut self, start: usize, values: &[NeuronValue]) {
        let Some(range) = self.feed_range(start, values.len()) else {
            return;
        };
        for (n, &v) in self.neurons_mut()[range].iter_mut().zip(values) {
            n.add_value(v);
        }
    }

    /// Add `value` to `count` neurons starting at `start`.
    pub fn dfeed(&mut self, start: usize, count: usize, value: NeuronValue) {
        let Some(range) = self.feed_range(start, count) else {
            return;
        };
        for n in &mut self.neurons_mut()[range] {
            n.add_value(value);
        }
    }

    /// Add a random value in `[0, max_value)` to `count` neurons starting at `start`.
    pub fn rfeed(&mut self, start: usize, count: usize, max_value: NeuronValue) {
        if max_value <= 0 {
            debug!(max_value, "rfeed max value rejected");
            return;
        }
        let Some(range) = self.feed_range(start, count) else {
            return;
        };
        for i in range {
            let v = random_below(self, max_value);
            self.neurons_mut()[i].add_value(v);
        }
    }

    /// Add `value` to neurons `start * spread, (start + 1) * spread, ...`,
    /// `count` of them.
    pub fn sfeed(&mut self, start: usize, count: usize, value: NeuronValue, spread: usize) {
        if !self.spread_fits(start, count, spread) {
            return;
        }
        for i in start..start + count {
            self.neurons_mut()[i * spread].add_value(value);
        }
    }

    /// Spread version of [`Cortex::rfeed`].
    pub fn rsfeed(&mut self, start: usize, count: usize, max_value: NeuronValue, spread: usize) {
        if max_value <= 0 {
            debug!(max_value, "rsfeed max value rejected");
            return;
        }
        if !self.spread_fits(start, count, spread) {
            return;
        }
        for i in start..start + count {
            let v = random_below(self, max_value);
            self.neurons_mut()[i * spread].add_value(v);
        }
    }

    /// Add `value` to every neuron of `[x0, x1) × [y0, y1)`.
    pub fn sqfeed(
        &mut self,
        x0: CortexSize,
        y0: CortexSize,
        x1: CortexSize,
        y1: CortexSize,
        value: NeuronValue,
    ) {
        if !self.contains_rect(x0, y0, x1, y1) {
            debug!(x0, y0, x1, y1, "sqfeed bounds rejected");
            return;
        }
        for y in y0..y1 {
            for x in x0..x1 {
                let i = self.index(x, y);
                self.neurons_mut()[i].add_value(value);
            }
        }
    }

    /// Add `value` to the neurons of `[x0, x1) × [y0, y1)` whose input spikes
    /// at `sample_step` under the cortex' pulse mapping.
    ///
    /// `inputs` holds one magnitude per cell of the rectangle, row-major.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_sqfeed(
        &mut self,
        x0: CortexSize,
        y0: CortexSize,
        x1: CortexSize,
        y1: CortexSize,
        sample_step: TicksCount,
        inputs: &[TicksCount],
        value: NeuronValue,
    ) {
        let mapping = self.config().pulse_mapping;
        self.sample_rect(x0, y0, x1, y1, sample_step, inputs, value, mapping);
    }

    /// Feed an input region at the current step of the sample window.
    pub fn feed2d(&mut self, input: &Input2d) {
        let step = self.ticks_count() % self.config().sample_window;
        self.sample_rect(
            input.x0,
            input.y0,
            input.x1,
            input.y1,
            step,
            &input.values,
            input.exc_value,
            input.pulse_mapping,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn sample_rect(
        &mut self,
        x0: CortexSize,
        y0: CortexSize,
        x1: CortexSize,
        y1: CortexSize,
        sample_step: TicksCount,
        inputs: &[TicksCount],
        value: NeuronValue,
        mapping: PulseMapping,
    ) {
        if !self.contains_rect(x0, y0, x1, y1) {
            debug!(x0, y0, x1, y1, "sample feed bounds rejected");
            return;
        }
        let rect_width = (x1 - x0) as usize;
        if inputs.len() != rect_width * (y1 - y0) as usize {
            debug!(len = inputs.len(), "sample feed inputs rejected");
            return;
        }

        let window = self.config().sample_window;
        for y in y0..y1 {
            for x in x0..x1 {
                let magnitude = inputs[(y - y0) as usize * rect_width + (x - x0) as usize];
                if pulse_map(window, sample_step, magnitude, mapping) {
                    let i = self.index(x, y);
                    self.neurons_mut()[i].add_value(value);
                }
            }
        }
    }

    fn feed_range(&self, start: usize, count: usize) -> Option<core::ops::Range<usize>> {
        match start.checked_add(count) {
            Some(end) if end <= self.neurons().len() => Some(start..end),
            _ => {
                debug!(start, count, "feed range rejected");
                None
            }
        }
    }

    fn spread_fits(&self, start: usize, count: usize, spread: usize) -> bool {
        if count == 0 {
            return true;
        }
        let last = start
            .checked_add(count - 1)
            .and_then(|i| i.checked_mul(spread));
        let fits = spread > 0 && matches!(last, Some(last) if last < self.neurons().len());
        if !fits {
            debug!(start, count, spread, "spread feed rejected");
        }
        fits
    }
}

fn random_below(cortex: &mut Cortex, max_value: NeuronValue) -> NeuronValue {
    (cortex.rng_mut().next_u32() % max_value as u32) as NeuronValue
}
