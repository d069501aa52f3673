#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

#[cfg(feature = "std")]
use std::io::{self, Read, Write};

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tracing::debug;

use crate::error::CortexError;
use crate::neuron::Neuron;
use crate::prng::Prng;
use crate::pulse::PulseMapping;
#[cfg(feature = "std")]
use crate::storage;
use crate::tick::ExecutionTier;

pub type NeuronValue = i16;

/// Synapse mask: one bit per neighborhood slot.
pub type NhMask = u64;
pub type NhRadius = u8;
pub type SynCount = u8;
pub type SynStrength = u8;
pub type TicksCount = u32;
pub type EvolStep = u32;
pub type PulseMask = u64;
pub type PulsesCount = u8;
pub type Chance = u32;
pub type CortexSize = u32;

/// Number of neighborhood slots a synapse mask can address.
pub const NH_MASK_BITS: usize = NhMask::BITS as usize;

/// Evolution step meaning "never evolve".
pub const EVOL_STEP_NEVER: EvolStep = 0x0000_FFFF;

pub const PULSE_WINDOW_LARGE: PulsesCount = 0x3F;
pub const PULSE_WINDOW_MID: PulsesCount = 0x1F;
pub const PULSE_WINDOW_SMALL: PulsesCount = 0x0A;
/// Widest pulse window a history mask can hold.
pub const MAX_PULSE_WINDOW: PulsesCount = (PulseMask::BITS - 1) as PulsesCount;

pub const SAMPLE_WINDOW_LARGE: TicksCount = 0x40;
pub const SAMPLE_WINDOW_MID: TicksCount = 0x20;
pub const SAMPLE_WINDOW_SMALL: TicksCount = 0x10;

pub const MAX_SYN_STRENGTH: SynStrength = 0x07;
pub const MAX_CHANCE: Chance = 0xFFFF;

// Arbitrary values giving an acceptable cortex right away.
pub const DEFAULT_NH_RADIUS: NhRadius = 0x02;
pub const DEFAULT_THRESHOLD: NeuronValue = 0x88;
pub const DEFAULT_STARTING_VALUE: NeuronValue = 0x00;
pub const DEFAULT_RECOVERY_VALUE: NeuronValue = -0x2A;
pub const DEFAULT_MAX_TOUCH: f32 = 0.25;
pub const DEFAULT_EXC_VALUE: NeuronValue = 0x20;
pub const DEFAULT_INH_VALUE: NeuronValue = -0x40;
pub const DEFAULT_DECAY_RATE: NeuronValue = 0x01;
pub const DEFAULT_PULSE_WINDOW: PulsesCount = PULSE_WINDOW_LARGE;
pub const DEFAULT_EVOL_STEP: EvolStep = 0x0000_000A;
pub const DEFAULT_INHEXC_RANGE: Chance = 0x64;
pub const DEFAULT_INHEXC_RATIO: Chance = 0x06;
pub const DEFAULT_SAMPLE_WINDOW: TicksCount = SAMPLE_WINDOW_SMALL;
pub const DEFAULT_MAX_TOT_STRENGTH: SynStrength = 0x20;
pub const DEFAULT_SYNGEN_CHANCE: Chance = 0x02A0;
pub const DEFAULT_SYNDEL_CHANCE: Chance = 0x0050;
pub const DEFAULT_SYNSTR_CHANCE: Chance = 0x00A0;
pub const DEFAULT_SYNWK_CHANCE: Chance = 0x0040;

/// Diameter of the square neighborhood of radius `r`.
#[inline]
pub const fn nh_diameter(radius: NhRadius) -> usize {
    2 * radius as usize + 1
}

/// Neighbor slots in the square neighborhood of radius `r` (center excluded).
#[inline]
pub const fn nh_count(radius: NhRadius) -> usize {
    let d = nh_diameter(radius);
    d * d - 1
}

fn check_radius(radius: NhRadius) -> Result<usize, CortexError> {
    let slots = nh_count(radius);
    if slots > NH_MASK_BITS {
        return Err(CortexError::RadiusTooBig {
            radius,
            slots,
            max: NH_MASK_BITS,
        });
    }
    Ok(slots)
}

/// Synapse cap for a touch fraction (synapses over neighbor slots).
fn touch_syn_count(touch: f32, radius: NhRadius) -> SynCount {
    (touch * nh_count(radius) as f32) as SynCount
}

/// Simulation parameters shared by every neuron of a cortex.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CortexConfig {
    /// Neighborhood radius. `(2r+1)² - 1` must fit a synapse mask.
    pub nh_radius: NhRadius,

    /// Ticks between evolutions, minus one. [`EVOL_STEP_NEVER`] disables evolution.
    pub evol_step: EvolStep,
    /// Width of the pulse histories, in ticks.
    pub pulse_window: PulsesCount,

    pub fire_threshold: NeuronValue,
    pub recovery_value: NeuronValue,
    pub exc_value: NeuronValue,
    pub inh_value: NeuronValue,
    pub decay_value: NeuronValue,

    // Chances (out of MAX_CHANCE) of structural plasticity.
    pub syngen_chance: Chance,
    pub syndel_chance: Chance,
    // Chances (out of MAX_CHANCE) of functional plasticity.
    pub synstr_chance: Chance,
    pub synwk_chance: Chance,

    /// Cap on the summed strength of the synapses reaching one neuron.
    pub max_tot_strength: SynStrength,
    /// Cap on the synapses reaching one neuron.
    pub max_syn_count: SynCount,
    /// Range of the per-neuron inhibitory ratio. 0 means all excitatory,
    /// `inhexc_range` means all inhibitory.
    pub inhexc_range: Chance,
    /// Inhibitory ratio given to every neuron on creation.
    pub inhexc_ratio: Chance,

    /// Length of the window used to sample inputs.
    pub sample_window: TicksCount,
    pub pulse_mapping: PulseMapping,

    /// If set, makes the plasticity draws reproducible across cortices.
    pub seed: Option<u64>,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            nh_radius: DEFAULT_NH_RADIUS,
            evol_step: DEFAULT_EVOL_STEP,
            pulse_window: DEFAULT_PULSE_WINDOW,
            fire_threshold: DEFAULT_THRESHOLD,
            recovery_value: DEFAULT_RECOVERY_VALUE,
            exc_value: DEFAULT_EXC_VALUE,
            inh_value: DEFAULT_INH_VALUE,
            decay_value: DEFAULT_DECAY_RATE,
            syngen_chance: DEFAULT_SYNGEN_CHANCE,
            syndel_chance: DEFAULT_SYNDEL_CHANCE,
            synstr_chance: DEFAULT_SYNSTR_CHANCE,
            synwk_chance: DEFAULT_SYNWK_CHANCE,
            max_tot_strength: DEFAULT_MAX_TOT_STRENGTH,
            max_syn_count: touch_syn_count(DEFAULT_MAX_TOUCH, DEFAULT_NH_RADIUS),
            inhexc_range: DEFAULT_INHEXC_RANGE,
            inhexc_ratio: DEFAULT_INHEXC_RATIO,
            sample_window: DEFAULT_SAMPLE_WINDOW,
            pulse_mapping: PulseMapping::Linear,
            seed: None,
        }
    }
}

impl CortexConfig {
    /// Default config for the given radius, with the default touch.
    pub fn with_radius(radius: NhRadius) -> Self {
        Self {
            nh_radius: radius,
            max_syn_count: touch_syn_count(DEFAULT_MAX_TOUCH, radius),
            ..Default::default()
        }
    }

    /// Number of neighbor slots for this config's radius.
    pub fn nh_slots(&self) -> usize {
        nh_count(self.nh_radius)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CortexError> {
        let slots = check_radius(self.nh_radius)?;

        if self.pulse_window == 0 || self.pulse_window > MAX_PULSE_WINDOW {
            return Err(CortexError::InvalidConfig("pulse_window must be in [1, 63]"));
        }
        if self.max_syn_count as usize > slots {
            return Err(CortexError::InvalidConfig(
                "max_syn_count must be <= neighborhood slots",
            ));
        }
        if self.decay_value < 0 {
            return Err(CortexError::InvalidConfig("decay_value must be >= 0"));
        }
        if self.inhexc_range == 0 {
            return Err(CortexError::InvalidConfig("inhexc_range must be >= 1"));
        }
        if self.inhexc_ratio > self.inhexc_range {
            return Err(CortexError::InvalidConfig(
                "inhexc_ratio must be <= inhexc_range",
            ));
        }
        if self.sample_window == 0 {
            return Err(CortexError::InvalidConfig("sample_window must be >= 1"));
        }
        if !self.pulse_mapping.is_defined() {
            return Err(CortexError::InvalidConfig("pulse_mapping has no spike rule"));
        }
        Ok(())
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_evol_step(mut self, evol_step: EvolStep) -> Self {
        self.evol_step = evol_step;
        self
    }

    pub fn with_pulse_mapping(mut self, pulse_mapping: PulseMapping) -> Self {
        self.pulse_mapping = pulse_mapping;
        self
    }

    /// Set the synapse cap as a fraction of the neighbor slots.
    pub fn with_max_touch(mut self, touch: f32) -> Self {
        if (0.0..=1.0).contains(&touch) {
            self.max_syn_count = touch_syn_count(touch, self.nh_radius);
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    pub neuron_count: usize,
    pub synapse_count: usize,
    pub total_strength: usize,
    /// Neurons whose latest recorded tick was a spike.
    pub firing_count: usize,
    pub avg_value: f32,
    pub avg_tick_pulse: f32,
}

/// 2D cortex of neurons.
///
/// Neurons are stored row-major. A tick reads one cortex and writes another
/// (see [`crate::tick::tick`]), so callers keep two of them and swap roles
/// every tick.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cortex {
    width: CortexSize,
    height: CortexSize,
    // Ticks performed since creation.
    ticks_count: TicksCount,
    // Evolution ticks performed since creation.
    evols_count: TicksCount,

    cfg: CortexConfig,

    // Key of the per-cell plasticity streams.
    seed: u64,
    // Serial stream for the random feed helpers. Never used inside a tick.
    rng: Prng,

    #[cfg_attr(feature = "serde", serde(skip))]
    tier: ExecutionTier,

    neurons: Vec<Neuron>,
}

impl Cortex {
    /// Create a cortex with default parameters for the given radius.
    ///
    /// Fails with [`CortexError::RadiusTooBig`] if the neighborhood does not
    /// fit a synapse mask; nothing is allocated in that case.
    pub fn new(
        width: CortexSize,
        height: CortexSize,
        radius: NhRadius,
    ) -> Result<Self, CortexError> {
        check_radius(radius)?;
        Self::with_config(width, height, CortexConfig::with_radius(radius))
    }

    pub fn with_config(
        width: CortexSize,
        height: CortexSize,
        cfg: CortexConfig,
    ) -> Result<Self, CortexError> {
        cfg.validate()?;

        let seed = cfg.seed.unwrap_or(1);
        let cell_count = width as usize * height as usize;
        let neurons = vec![
            Neuron::new(DEFAULT_STARTING_VALUE, cfg.max_syn_count, cfg.inhexc_ratio);
            cell_count
        ];

        debug!(
            width,
            height,
            nh_radius = cfg.nh_radius,
            max_syn_count = cfg.max_syn_count,
            "cortex created"
        );

        Ok(Self {
            width,
            height,
            ticks_count: 0,
            evols_count: 0,
            cfg,
            seed,
            rng: Prng::new(seed),
            tier: ExecutionTier::default(),
            neurons,
        })
    }

    /// Make this cortex an exact, independent copy of `src`.
    ///
    /// Neuron storage is resized to `src`'s dimensions and reused when possible.
    pub fn copy_from(&mut self, src: &Cortex) {
        self.width = src.width;
        self.height = src.height;
        self.ticks_count = src.ticks_count;
        self.evols_count = src.evols_count;
        self.cfg = src.cfg;
        self.seed = src.seed;
        self.rng = src.rng.clone();
        self.tier = src.tier;
        self.neurons.clone_from(&src.neurons);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn width(&self) -> CortexSize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> CortexSize {
        self.height
    }

    #[inline]
    pub fn ticks_count(&self) -> TicksCount {
        self.ticks_count
    }

    #[inline]
    pub fn evols_count(&self) -> TicksCount {
        self.evols_count
    }

    #[inline]
    pub fn config(&self) -> &CortexConfig {
        &self.cfg
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub fn nh_slots(&self) -> usize {
        self.cfg.nh_slots()
    }

    #[inline]
    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    #[inline]
    pub fn index(&self, x: CortexSize, y: CortexSize) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn neuron(&self, x: CortexSize, y: CortexSize) -> Option<&Neuron> {
        if x < self.width && y < self.height {
            self.neurons.get(self.index(x, y))
        } else {
            None
        }
    }

    /// Whether the tick computed from this cortex runs the plasticity rules.
    pub fn evolves(&self) -> bool {
        self.cfg.evol_step != EVOL_STEP_NEVER
            && u64::from(self.ticks_count) % (u64::from(self.cfg.evol_step) + 1) == 0
    }

    pub fn set_execution_tier(&mut self, tier: ExecutionTier) {
        self.tier = tier;
    }

    pub fn execution_tier(&self) -> ExecutionTier {
        self.tier
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let neuron_count = self.neurons.len();
        let mut synapse_count = 0usize;
        let mut total_strength = 0usize;
        let mut firing_count = 0usize;
        let mut value_sum = 0i64;
        let mut pulse_sum = 0u64;

        for n in &self.neurons {
            synapse_count += n.syn_count as usize;
            total_strength += n.tot_syn_strength as usize;
            firing_count += n.fired(0) as usize;
            value_sum += i64::from(n.value);
            pulse_sum += u64::from(n.tick_pulse);
        }

        let denom = neuron_count.max(1) as f32;
        Diagnostics {
            neuron_count,
            synapse_count,
            total_strength,
            firing_count,
            avg_value: value_sum as f32 / denom,
            avg_tick_pulse: pulse_sum as f32 / denom,
        }
    }

    // =========================================================================
    // Crate internals used by the tick engine and the feed helpers
    // =========================================================================

    #[inline]
    pub(crate) fn neurons_mut(&mut self) -> &mut [Neuron] {
        &mut self.neurons
    }

    #[inline]
    pub(crate) fn rng_mut(&mut self) -> &mut Prng {
        &mut self.rng
    }

    /// Take over `prev`'s dimensions and parameters before a tick overwrites
    /// every neuron.
    pub(crate) fn prepare_next(&mut self, prev: &Cortex) {
        self.width = prev.width;
        self.height = prev.height;
        self.ticks_count = prev.ticks_count;
        self.evols_count = prev.evols_count;
        self.cfg = prev.cfg;
        self.seed = prev.seed;
        self.rng = prev.rng.clone();
        self.tier = prev.tier;
        self.neurons.resize(prev.neurons.len(), Neuron::default());
    }

    pub(crate) fn finish_tick(&mut self, evolved: bool) {
        self.ticks_count = self.ticks_count.wrapping_add(1);
        if evolved {
            self.evols_count = self.evols_count.wrapping_add(1);
        }
    }

    // =========================================================================
    // Setters
    //
    // Out-of-range values are ignored: the cortex is left untouched and the
    // rejection is logged at debug level.
    // =========================================================================

    /// Change the neighborhood radius.
    ///
    /// Slot numbering depends on the diameter, so an actual change clears the
    /// synapses of every neuron and clamps the synapse caps to the new slot
    /// count.
    pub fn set_radius(&mut self, radius: NhRadius) -> Result<(), CortexError> {
        let slots = check_radius(radius)?;
        if radius == self.cfg.nh_radius {
            return Ok(());
        }

        let cap = slots.min(SynCount::MAX as usize) as SynCount;
        self.cfg.nh_radius = radius;
        self.cfg.max_syn_count = self.cfg.max_syn_count.min(cap);
        for n in &mut self.neurons {
            n.clear_synapses();
            n.max_syn_count = n.max_syn_count.min(cap);
        }
        Ok(())
    }

    pub fn set_evol_step(&mut self, evol_step: EvolStep) {
        self.cfg.evol_step = evol_step;
    }

    /// Set the pulse window width, in `[1, 63]`.
    pub fn set_pulse_window(&mut self, window: PulsesCount) {
        if window == 0 || window > MAX_PULSE_WINDOW {
            debug!(window, "pulse window rejected");
            return;
        }
        self.cfg.pulse_window = window;
        for n in &mut self.neurons {
            n.recount_pulses(window);
        }
    }

    pub fn set_sample_window(&mut self, sample_window: TicksCount) {
        if sample_window == 0 {
            debug!(sample_window, "sample window rejected");
            return;
        }
        self.cfg.sample_window = sample_window;
    }

    pub fn set_fire_threshold(&mut self, threshold: NeuronValue) {
        self.cfg.fire_threshold = threshold;
    }

    pub fn set_recovery_value(&mut self, recovery_value: NeuronValue) {
        self.cfg.recovery_value = recovery_value;
    }

    pub fn set_exc_value(&mut self, exc_value: NeuronValue) {
        self.cfg.exc_value = exc_value;
    }

    pub fn set_inh_value(&mut self, inh_value: NeuronValue) {
        self.cfg.inh_value = inh_value;
    }

    pub fn set_decay_value(&mut self, decay_value: NeuronValue) {
        if decay_value < 0 {
            debug!(decay_value, "decay value rejected");
            return;
        }
        self.cfg.decay_value = decay_value;
    }

    pub fn set_syngen_chance(&mut self, chance: Chance) {
        self.cfg.syngen_chance = chance;
    }

    pub fn set_syndel_chance(&mut self, chance: Chance) {
        self.cfg.syndel_chance = chance;
    }

    pub fn set_synstr_chance(&mut self, chance: Chance) {
        self.cfg.synstr_chance = chance;
    }

    pub fn set_synwk_chance(&mut self, chance: Chance) {
        self.cfg.synwk_chance = chance;
    }

    /// Cap the summed synapse strength per neuron. Neurons above the new cap
    /// have their strongest synapses weakened until they fit.
    pub fn set_max_tot_strength(&mut self, max_tot_strength: SynStrength) {
        self.cfg.max_tot_strength = max_tot_strength;
        for n in &mut self.neurons {
            n.trim_strength(max_tot_strength);
        }
    }

    /// Set the synapse cap of the cortex and of every neuron.
    ///
    /// Neurons above the new cap lose their weakest synapses.
    pub fn set_max_syn_count(&mut self, syn_count: SynCount) {
        if syn_count as usize > self.nh_slots() {
            debug!(syn_count, slots = self.nh_slots(), "max syn count rejected");
            return;
        }
        self.cfg.max_syn_count = syn_count;
        for n in &mut self.neurons {
            n.max_syn_count = syn_count;
            n.trim_synapses(syn_count);
        }
    }

    /// Set the synapse cap as a fraction of the neighbor slots. Only values in
    /// `[0, 1]` are accepted.
    pub fn set_max_touch(&mut self, touch: f32) {
        if !(0.0..=1.0).contains(&touch) {
            debug!(touch, "max touch rejected");
            return;
        }
        self.set_max_syn_count(touch_syn_count(touch, self.cfg.nh_radius));
    }

    pub fn set_pulse_mapping(&mut self, pulse_mapping: PulseMapping) {
        if !pulse_mapping.is_defined() {
            debug!(?pulse_mapping, "pulse mapping rejected");
            return;
        }
        self.cfg.pulse_mapping = pulse_mapping;
    }

    pub fn set_inhexc_range(&mut self, inhexc_range: Chance) {
        if inhexc_range == 0 {
            debug!(inhexc_range, "inhexc range rejected");
            return;
        }
        self.cfg.inhexc_range = inhexc_range;
    }

    /// Set the inhibitory ratio of every neuron. Must not exceed the range.
    pub fn set_inhexc_ratio(&mut self, inhexc_ratio: Chance) {
        if inhexc_ratio > self.cfg.inhexc_range {
            debug!(inhexc_ratio, range = self.cfg.inhexc_range, "inhexc ratio rejected");
            return;
        }
        self.cfg.inhexc_ratio = inhexc_ratio;
        for n in &mut self.neurons {
            n.inhexc_ratio = inhexc_ratio;
        }
    }

    /// Disable synapses for the neurons in `[x0, x1) × [y0, y1)`: their cap
    /// drops to zero and existing synapses are deleted.
    pub fn syn_disable(&mut self, x0: CortexSize, y0: CortexSize, x1: CortexSize, y1: CortexSize) {
        if !self.contains_rect(x0, y0, x1, y1) {
            debug!(x0, y0, x1, y1, "syn disable bounds rejected");
            return;
        }
        for y in y0..y1 {
            for x in x0..x1 {
                let i = self.index(x, y);
                let n = &mut self.neurons[i];
                n.max_syn_count = 0;
                n.trim_synapses(0);
            }
        }
    }

    /// Per-neuron synapse caps from a map of touch fractions, row-major.
    ///
    /// The map must cover the whole cortex and hold values in `[0, 1]`.
    pub fn set_touch_map(&mut self, touches: &[f32]) {
        if touches.len() != self.neurons.len()
            || touches.iter().any(|t| !(0.0..=1.0).contains(t))
        {
            debug!(len = touches.len(), "touch map rejected");
            return;
        }
        let radius = self.cfg.nh_radius;
        for (n, &touch) in self.neurons.iter_mut().zip(touches) {
            n.max_syn_count = touch_syn_count(touch, radius);
            n.trim_synapses(n.max_syn_count);
        }
    }

    /// Give every neuron the same set of active synapses.
    ///
    /// Bits past the neighborhood are dropped. Synapses outside the mask are
    /// deleted and new ones start at strength 0. A mask with more synapses
    /// than some neuron's cap is rejected.
    pub fn set_nhmask(&mut self, mask: NhMask) {
        let slots = self.nh_slots();
        let mask = if slots >= NH_MASK_BITS {
            mask
        } else {
            mask & ((1 as NhMask) << slots).wrapping_sub(1)
        };
        let count = mask.count_ones();
        if self.neurons.iter().any(|n| count > u32::from(n.max_syn_count)) {
            debug!(mask, count, "nh mask exceeds synapse cap");
            return;
        }
        for n in &mut self.neurons {
            n.set_synapse_mask(mask);
        }
    }

    /// Per-neuron inhibitory ratios, row-major.
    ///
    /// The map must cover the whole cortex and stay within the inhexc range.
    pub fn set_inhexc_map(&mut self, ratios: &[Chance]) {
        let range = self.cfg.inhexc_range;
        if ratios.len() != self.neurons.len() || ratios.iter().any(|&r| r > range) {
            debug!(len = ratios.len(), "inhexc map rejected");
            return;
        }
        for (n, &ratio) in self.neurons.iter_mut().zip(ratios) {
            n.inhexc_ratio = ratio;
        }
    }

    #[inline]
    pub(crate) fn contains_rect(
        &self,
        x0: CortexSize,
        y0: CortexSize,
        x1: CortexSize,
        y1: CortexSize,
    ) -> bool {
        x0 <= x1 && y0 <= y1 && x1 <= self.width && y1 <= self.height
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Serialize a versioned, chunked cortex image.
    ///
    /// The image holds every parameter, the counters, the random state and
    /// every neuron, so loading it yields an equal cortex.
    #[cfg(feature = "std")]
    pub fn save_image_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(storage::MAGIC)?;
        storage::write_u32_le(w, storage::VERSION_CURRENT)?;

        self.write_cfg_chunk(w)?;
        self.write_stat_chunk(w)?;
        self.write_neuron_chunk(w)?;
        Ok(())
    }

    /// Load a versioned, chunked cortex image.
    ///
    /// Unknown chunks are skipped for forward-compatibility.
    #[cfg(feature = "std")]
    pub fn load_image_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let magic = storage::read_exact::<8, _>(r)?;
        if &magic != storage::MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad cortex image magic",
            ));
        }

        let version = storage::read_u32_le(r)?;
        if version != storage::VERSION_CURRENT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported cortex image version",
            ));
        }

        let mut cfg: Option<CortexConfig> = None;
        let mut stat: Option<ImageStat> = None;
        let mut neurons: Option<Vec<Neuron>> = None;

        loop {
            let (tag, len) = match storage::read_chunk_header(r) {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };

            let payload = storage::read_chunk_payload(r, len)?;
            let mut cursor = io::Cursor::new(payload);
            match &tag {
                b"CFG0" => cfg = Some(Self::read_cfg_payload(&mut cursor)?),
                b"STAT" => stat = Some(ImageStat::read(&mut cursor)?),
                b"NRNS" => neurons = Some(Self::read_neuron_payload(&mut cursor)?),
                _ => {
                    // Unknown chunk: skipped.
                }
            }
        }

        let cfg = cfg.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing CFG0"))?;
        let stat =
            stat.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing STAT"))?;
        let neurons =
            neurons.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing NRNS"))?;

        cfg.validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if neurons.len() != stat.width as usize * stat.height as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "NRNS count does not match STAT dimensions",
            ));
        }

        Ok(Self {
            width: stat.width,
            height: stat.height,
            ticks_count: stat.ticks_count,
            evols_count: stat.evols_count,
            cfg,
            seed: stat.seed,
            rng: Prng::from_state(stat.rng_state),
            tier: ExecutionTier::default(),
            neurons,
        })
    }

    /// Size in bytes of the image `save_image_to` would write.
    #[cfg(feature = "std")]
    pub fn image_size_bytes(&self) -> io::Result<usize> {
        let mut counter = storage::CountingWriter::new();
        self.save_image_to(&mut counter)?;
        Ok(counter.written())
    }

    #[cfg(feature = "std")]
    pub fn save_image_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save_image_to(&mut out)?;
        Ok(out)
    }

    #[cfg(feature = "std")]
    pub fn load_image_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = io::Cursor::new(bytes);
        Self::load_image_from(&mut cursor)
    }

    #[cfg(feature = "std")]
    fn write_cfg_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let c = &self.cfg;
        let mut payload: Vec<u8> = Vec::with_capacity(64);
        storage::write_u8(&mut payload, c.nh_radius)?;
        storage::write_u32_le(&mut payload, c.evol_step)?;
        storage::write_u8(&mut payload, c.pulse_window)?;
        storage::write_i16_le(&mut payload, c.fire_threshold)?;
        storage::write_i16_le(&mut payload, c.recovery_value)?;
        storage::write_i16_le(&mut payload, c.exc_value)?;
        storage::write_i16_le(&mut payload, c.inh_value)?;
        storage::write_i16_le(&mut payload, c.decay_value)?;
        storage::write_u32_le(&mut payload, c.syngen_chance)?;
        storage::write_u32_le(&mut payload, c.syndel_chance)?;
        storage::write_u32_le(&mut payload, c.synstr_chance)?;
        storage::write_u32_le(&mut payload, c.synwk_chance)?;
        storage::write_u8(&mut payload, c.max_tot_strength)?;
        storage::write_u8(&mut payload, c.max_syn_count)?;
        storage::write_u32_le(&mut payload, c.inhexc_range)?;
        storage::write_u32_le(&mut payload, c.inhexc_ratio)?;
        storage::write_u32_le(&mut payload, c.sample_window)?;
        storage::write_u32_le(&mut payload, c.pulse_mapping.code())?;
        match c.seed {
            Some(seed) => {
                storage::write_u8(&mut payload, 1)?;
                storage::write_u64_le(&mut payload, seed)?;
            }
            None => {
                storage::write_u8(&mut payload, 0)?;
                storage::write_u64_le(&mut payload, 0)?;
            }
        }
        storage::write_chunk_lz4(w, *b"CFG0", &payload)
    }

    #[cfg(feature = "std")]
    fn read_cfg_payload<R: Read>(r: &mut R) -> io::Result<CortexConfig> {
        let nh_radius = storage::read_u8(r)?;
        let evol_step = storage::read_u32_le(r)?;
        let pulse_window = storage::read_u8(r)?;
        let fire_threshold = storage::read_i16_le(r)?;
        let recovery_value = storage::read_i16_le(r)?;
        let exc_value = storage::read_i16_le(r)?;
        let inh_value = storage::read_i16_le(r)?;
        let decay_value = storage::read_i16_le(r)?;
        let syngen_chance = storage::read_u32_le(r)?;
        let syndel_chance = storage::read_u32_le(r)?;
        let synstr_chance = storage::read_u32_le(r)?;
        let synwk_chance = storage::read_u32_le(r)?;
        let max_tot_strength = storage::read_u8(r)?;
        let max_syn_count = storage::read_u8(r)?;
        let inhexc_range = storage::read_u32_le(r)?;
        let inhexc_ratio = storage::read_u32_le(r)?;
        let sample_window = storage::read_u32_le(r)?;
        let pulse_mapping = PulseMapping::from_code(storage::read_u32_le(r)?).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "unknown pulse mapping code")
        })?;
        let has_seed = storage::read_u8(r)? != 0;
        let seed = storage::read_u64_le(r)?;

        Ok(CortexConfig {
            nh_radius,
            evol_step,
            pulse_window,
            fire_threshold,
            recovery_value,
            exc_value,
            inh_value,
            decay_value,
            syngen_chance,
            syndel_chance,
            synstr_chance,
            synwk_chance,
            max_tot_strength,
            max_syn_count,
            inhexc_range,
            inhexc_ratio,
            sample_window,
            pulse_mapping,
            seed: has_seed.then_some(seed),
        })
    }

    #[cfg(feature = "std")]
    fn write_stat_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut payload: Vec<u8> = Vec::with_capacity(32);
        storage::write_u32_le(&mut payload, self.width)?;
        storage::write_u32_le(&mut payload, self.height)?;
        storage::write_u32_le(&mut payload, self.ticks_count)?;
        storage::write_u32_le(&mut payload, self.evols_count)?;
        storage::write_u64_le(&mut payload, self.seed)?;
        storage::write_u64_le(&mut payload, self.rng.state())?;
        storage::write_chunk_lz4(w, *b"STAT", &payload)
    }

    #[cfg(feature = "std")]
    fn write_neuron_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let count = u32::try_from(self.neurons.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "NRNS chunk too large"))?;
        let mut payload: Vec<u8> =
            Vec::with_capacity(4 + self.neurons.len() * storage::NEURON_RECORD_BYTES);

        storage::write_u32_le(&mut payload, count)?;
        for n in &self.neurons {
            storage::write_u64_le(&mut payload, n.synac_mask)?;
            storage::write_u64_le(&mut payload, n.synex_mask)?;
            for plane in n.synstr_mask {
                storage::write_u64_le(&mut payload, plane)?;
            }
            storage::write_u64_le(&mut payload, n.tick_pulse_mask)?;
            storage::write_u8(&mut payload, n.tick_pulse)?;
            storage::write_u64_le(&mut payload, n.evol_pulse_mask)?;
            storage::write_u8(&mut payload, n.evol_pulse)?;
            storage::write_i16_le(&mut payload, n.value)?;
            storage::write_u8(&mut payload, n.max_syn_count)?;
            storage::write_u8(&mut payload, n.syn_count)?;
            storage::write_u8(&mut payload, n.tot_syn_strength)?;
            storage::write_u32_le(&mut payload, n.inhexc_ratio)?;
        }

        storage::write_chunk_lz4(w, *b"NRNS", &payload)
    }

    #[cfg(feature = "std")]
    fn read_neuron_payload<R: Read>(r: &mut R) -> io::Result<Vec<Neuron>> {
        let count = storage::read_u32_le(r)? as usize;
        let mut neurons = Vec::with_capacity(count);
        for _ in 0..count {
            let synac_mask = storage::read_u64_le(r)?;
            let synex_mask = storage::read_u64_le(r)?;
            let synstr_mask = [
                storage::read_u64_le(r)?,
                storage::read_u64_le(r)?,
                storage::read_u64_le(r)?,
            ];
            let tick_pulse_mask = storage::read_u64_le(r)?;
            let tick_pulse = storage::read_u8(r)?;
            let evol_pulse_mask = storage::read_u64_le(r)?;
            let evol_pulse = storage::read_u8(r)?;
            let value = storage::read_i16_le(r)?;
            let max_syn_count = storage::read_u8(r)?;
            let syn_count = storage::read_u8(r)?;
            let tot_syn_strength = storage::read_u8(r)?;
            let inhexc_ratio = storage::read_u32_le(r)?;

            neurons.push(Neuron {
                synac_mask,
                synex_mask,
                synstr_mask,
                tick_pulse_mask,
                tick_pulse,
                evol_pulse_mask,
                evol_pulse,
                value,
                max_syn_count,
                syn_count,
                tot_syn_strength,
                inhexc_ratio,
            });
        }
        Ok(neurons)
    }
}

#[cfg(feature = "std")]
struct ImageStat {
    width: CortexSize,
    height: CortexSize,
    ticks_count: TicksCount,
    evols_count: TicksCount,
    seed: u64,
    rng_state: u64,
}

#[cfg(feature = "std")]
impl ImageStat {
    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            width: storage::read_u32_le(r)?,
            height: storage::read_u32_le(r)?,
            ticks_count: storage::read_u32_le(r)?,
            evols_count: storage::read_u32_le(r)?,
            seed: storage::read_u64_le(r)?,
            rng_state: storage::read_u64_le(r)?,
        })
    }
}

impl fmt::Display for Cortex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cortex(")?;
        writeln!(f, "\twidth: {}", self.width)?;
        writeln!(f, "\theight: {}", self.height)?;
        writeln!(f, "\tnh_radius: {}", self.cfg.nh_radius)?;
        writeln!(f, "\tpulse_window: {}", self.cfg.pulse_window)?;
        writeln!(f, "\tsample_window: {}", self.cfg.sample_window)?;
        writeln!(f, "\tticks: {}", self.ticks_count)?;
        writeln!(f, "\tevols: {}", self.evols_count)?;
        write!(f, ")")
    }
}
