//! Tick engine: computes the next state of a cortex from the previous one.
//!
//! `next` is fully derived from `prev`: every neuron is written from a
//! read-only view of `prev`, and the random draws of each cell come from a
//! stream keyed by `(seed, tick, cell)`. The result does not depend on the
//! execution tier or on how rows are spread over workers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use core::cmp::Ordering;

use tracing::trace;

use crate::cortex::{
    nh_diameter, Cortex, CortexConfig, NeuronValue, TicksCount, MAX_SYN_STRENGTH,
};
use crate::input::Input2d;
use crate::neuron::Neuron;
use crate::prng::Prng;

/// Execution tier for the tick engine.
///
/// - `Scalar`: single-threaded, works everywhere (MCU, WASM, desktop)
/// - `Parallel`: rows spread over the rayon pool (requires `parallel` feature)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionTier {
    /// Single-threaded scalar execution (default, works everywhere).
    #[default]
    Scalar,
    /// Multi-threaded parallel execution (requires `parallel` feature).
    Parallel,
}

impl Cortex {
    /// Returns the effective execution tier that will actually be used.
    ///
    /// This accounts for the `parallel` feature gate.
    pub fn effective_execution_tier(&self) -> ExecutionTier {
        match self.execution_tier() {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    ExecutionTier::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }

    /// Compute the tick following `self` into `next`. See [`tick`].
    pub fn tick_into(&self, next: &mut Cortex) {
        tick(self, next);
    }
}

/// Compute one tick of `prev` into `next`.
///
/// `next` takes `prev`'s dimensions and parameters, then every neuron of
/// `next` is overwritten. Influences are summed over the synapses of `prev`.
/// On evolution ticks (see [`Cortex::evolves`]) the structural and functional
/// plasticity rules then rewrite the synapses of `next`, which only carry
/// current from the following tick on.
pub fn tick(prev: &Cortex, next: &mut Cortex) {
    next.prepare_next(prev);

    let evolve = prev.evolves();
    let ctx = TickContext::new(prev, evolve);

    match prev.effective_execution_tier() {
        ExecutionTier::Scalar => tick_scalar(&ctx, next.neurons_mut()),
        ExecutionTier::Parallel => tick_parallel(&ctx, next.neurons_mut()),
    }

    next.finish_tick(evolve);
    trace!(ticks = next.ticks_count(), evolve, "tick");
}

/// Read-only view of `prev` shared by every cell of a tick.
struct TickContext<'a> {
    neurons: &'a [Neuron],
    width: i64,
    height: i64,
    radius: i64,
    cfg: CortexConfig,
    seed: u64,
    ticks: TicksCount,
    evolve: bool,
}

impl<'a> TickContext<'a> {
    fn new(prev: &'a Cortex, evolve: bool) -> Self {
        Self {
            neurons: prev.neurons(),
            width: i64::from(prev.width()),
            height: i64::from(prev.height()),
            radius: i64::from(prev.config().nh_radius),
            cfg: *prev.config(),
            seed: prev.seed(),
            ticks: prev.ticks_count(),
            evolve,
        }
    }
}

fn tick_scalar(ctx: &TickContext<'_>, out: &mut [Neuron]) {
    for (index, n) in out.iter_mut().enumerate() {
        *n = tick_cell(ctx, index);
    }
}

#[cfg(feature = "parallel")]
fn tick_parallel(ctx: &TickContext<'_>, out: &mut [Neuron]) {
    let width = ctx.width as usize;
    if width == 0 {
        return;
    }

    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, n) in row.iter_mut().enumerate() {
                *n = tick_cell(ctx, y * width + x);
            }
        });
}

// Without the `parallel` feature, fall back to the scalar path.
#[cfg(not(feature = "parallel"))]
fn tick_parallel(ctx: &TickContext<'_>, out: &mut [Neuron]) {
    tick_scalar(ctx, out);
}

fn tick_cell(ctx: &TickContext<'_>, index: usize) -> Neuron {
    let cfg = &ctx.cfg;
    let this = &ctx.neurons[index];
    let mut next = *this;
    let mut value = i32::from(this.value);
    let mut rng = Prng::for_cell(ctx.seed, ctx.ticks, index);

    let x = index as i64 % ctx.width;
    let y = index as i64 / ctx.width;
    let d = nh_diameter(cfg.nh_radius) as i64;

    let mut slot = 0usize;
    for j in 0..d {
        for i in 0..d {
            // The center is not a neighbor and has no slot.
            if i == ctx.radius && j == ctx.radius {
                continue;
            }
            let s = slot;
            slot += 1;

            let nx = x + i - ctx.radius;
            let ny = y + j - ctx.radius;
            if nx < 0 || ny < 0 || nx >= ctx.width || ny >= ctx.height {
                continue;
            }
            let nb = &ctx.neurons[(ny * ctx.width + nx) as usize];

            // Influence flows through the synapses of `prev`.
            if this.is_active(s) && nb.value > cfg.fire_threshold {
                value = apply_influence(cfg, this, s, value);
            }

            let draw = rng.next_chance();
            if ctx.evolve {
                evolve_synapse(cfg, this, nb, &mut next, s, draw, &mut rng);
            }
        }
    }

    value = decay_toward_rest(this.value, value, cfg.decay_value);

    let fired = this.value > cfg.fire_threshold;
    if fired {
        value = i32::from(cfg.recovery_value);
    }

    next.value = value.clamp(i32::from(NeuronValue::MIN), i32::from(NeuronValue::MAX)) as NeuronValue;
    next.push_tick_pulse(fired, cfg.pulse_window);

    if ctx.evolve {
        let active = u32::from(this.tick_pulse) * 10 > u32::from(cfg.pulse_window);
        next.push_evol_pulse(active, cfg.pulse_window);
    }

    next
}

/// Plasticity rules for one synapse slot.
///
/// `this` is the neuron's state in `prev` and `next` the record being built,
/// whose running counts enforce the caps within the tick.
fn evolve_synapse(
    cfg: &CortexConfig,
    this: &Neuron,
    nb: &Neuron,
    next: &mut Neuron,
    s: usize,
    draw: u32,
    rng: &mut Prng,
) {
    let was_active = this.is_active(s);
    let nb_pulse = u32::from(nb.tick_pulse);

    // Structural plasticity.
    if was_active
        && this.strength(s) == 0
        && draw < cfg.syndel_chance / (nb_pulse + 1)
    {
        next.disconnect(s);
    } else if !was_active
        && next.syn_count < next.max_syn_count
        && draw < cfg.syngen_chance.saturating_mul(nb_pulse)
    {
        let inhibitory = rng.next_u32() % cfg.inhexc_range < this.inhexc_ratio;
        next.connect(s, !inhibitory);
    }

    // Functional plasticity, on synapses that survived the step above.
    if was_active && next.is_active(s) {
        let strength = next.strength(s);
        let factor = u32::from(strength)
            + 1
            + u32::from(nb.evol_pulse)
            + u32::from(this.evol_pulse);

        // Neighbor spiked right before this neuron: causal, strengthen.
        let causal = this.fired(0) && nb.fired(1);
        // This neuron spiked right before the neighbor: anti-causal, weaken.
        let anti_causal = this.fired(1) && nb.fired(0);

        if strength < MAX_SYN_STRENGTH
            && next.tot_syn_strength < cfg.max_tot_strength
            && (causal || draw < cfg.synstr_chance.saturating_mul(factor))
        {
            next.strengthen(s);
        } else if strength > 0 && (anti_causal || draw < cfg.synwk_chance / factor) {
            next.weaken(s);
        }
    }
}

fn apply_influence(cfg: &CortexConfig, this: &Neuron, s: usize, value: i32) -> i32 {
    let base = if this.is_excitatory(s) {
        cfg.exc_value
    } else {
        cfg.inh_value
    };
    let delta = i32::from(base) * (i32::from(this.strength(s)) / 4 + 1);

    if delta < 0 {
        // Inhibition never pushes below the recovery value.
        let floor = i32::from(cfg.recovery_value).min(value);
        (value + delta).max(floor)
    } else {
        value + delta
    }
}

/// Move `value` one decay step toward zero, in the direction given by the
/// sign of the previous value. The step stops at zero.
fn decay_toward_rest(prev: NeuronValue, value: i32, decay: NeuronValue) -> i32 {
    let decay = i32::from(decay);
    match prev.cmp(&0) {
        Ordering::Greater => value - decay.min(value.max(0)),
        Ordering::Less => value + decay.min((-value).max(0)),
        Ordering::Equal => value,
    }
}

/// Double buffer of cortices stepped in alternation.
///
/// Each step feeds the optional input into the current cortex, ticks it into
/// the other buffer and swaps roles.
#[derive(Debug, Clone)]
pub struct CortexPair {
    cortices: [Cortex; 2],
    current: usize,
}

impl CortexPair {
    pub fn new(cortex: Cortex) -> Self {
        let other = cortex.clone();
        Self {
            cortices: [cortex, other],
            current: 0,
        }
    }

    #[inline]
    pub fn current(&self) -> &Cortex {
        &self.cortices[self.current]
    }

    /// Parameter changes made here are carried into every following tick.
    #[inline]
    pub fn current_mut(&mut self) -> &mut Cortex {
        &mut self.cortices[self.current]
    }

    #[inline]
    pub fn ticks(&self) -> TicksCount {
        self.current().ticks_count()
    }

    pub fn step(&mut self, input: Option<&Input2d>) {
        if let Some(input) = input {
            self.current_mut().feed2d(input);
        }

        let [a, b] = &mut self.cortices;
        if self.current == 0 {
            tick(a, b);
        } else {
            tick(b, a);
        }
        self.current ^= 1;
    }

    pub fn run(&mut self, ticks: TicksCount, input: Option<&Input2d>) {
        for _ in 0..ticks {
            self.step(input);
        }
    }

    pub fn into_current(self) -> Cortex {
        let [a, b] = self.cortices;
        if self.current == 0 {
            a
        } else {
            b
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cortex::{
        nh_count, Chance, CortexConfig, PulseMask, SynStrength, DEFAULT_RECOVERY_VALUE,
        EVOL_STEP_NEVER, MAX_CHANCE,
    };

    fn step(cortex: &mut Cortex, scratch: &mut Cortex) {
        tick(cortex, scratch);
        core::mem::swap(cortex, scratch);
    }

    fn quiet(width: u32, height: u32, radius: u8) -> Cortex {
        let mut c = Cortex::new(width, height, radius).unwrap();
        c.set_evol_step(EVOL_STEP_NEVER);
        c
    }

    fn assert_invariants(c: &Cortex) {
        let cfg = c.config();
        let slots = nh_count(cfg.nh_radius);
        let window = cfg.pulse_window;
        for n in c.neurons() {
            assert!(n.syn_count() <= n.max_syn_count());
            assert_eq!(n.syn_count() as u32, n.synapse_mask().count_ones());
            assert!(n.tot_syn_strength() <= cfg.max_tot_strength);
            assert!(n.tick_pulse() <= window);
            assert_eq!(
                n.tick_pulse() as u32,
                (n.tick_pulse_mask() & ((1 as PulseMask) << window).wrapping_sub(1)).count_ones()
            );
            assert_eq!(n.synapse_mask() >> slots, 0);

            let mut tot = 0u32;
            for s in 0..slots {
                let st = n.strength(s);
                assert!(st <= MAX_SYN_STRENGTH);
                if !n.is_active(s) {
                    assert_eq!(st, 0);
                }
                tot += u32::from(st);
            }
            assert_eq!(tot, u32::from(n.tot_syn_strength()));
        }
    }

    fn excite(c: &mut Cortex, t: u32) {
        let w = c.width();
        for (i, n) in c.neurons_mut().iter_mut().enumerate() {
            let (x, y) = (i as u32 % w, i as u32 / w);
            if (x + 2 * y + t) % 5 == 0 {
                n.value = 300;
            }
        }
    }

    #[test]
    fn invariants_hold_under_activity() {
        let cfg = CortexConfig::with_radius(2).with_seed(1234).with_evol_step(1);
        let mut c = Cortex::with_config(16, 16, cfg).unwrap();
        c.set_syngen_chance(0x2000);
        c.set_inhexc_ratio(30);
        let mut scratch = c.clone();

        for t in 0..200 {
            excite(&mut c, t);
            step(&mut c, &mut scratch);
            assert_invariants(&c);
        }

        assert_eq!(c.ticks_count(), 200);
        assert!(c.diagnostics().synapse_count > 0);
    }

    #[test]
    fn ticks_are_deterministic() {
        let run = || {
            let cfg = CortexConfig::with_radius(1).with_seed(77).with_evol_step(0);
            let mut c = Cortex::with_config(10, 7, cfg).unwrap();
            let mut scratch = c.clone();
            for t in 0..60 {
                excite(&mut c, t);
                step(&mut c, &mut scratch);
            }
            c
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn values_decay_to_zero_and_stay() {
        let mut c = quiet(2, 1, 1);
        c.neurons_mut()[0].value = 10;
        c.neurons_mut()[1].value = -5;
        let mut scratch = c.clone();

        for _ in 0..10 {
            step(&mut c, &mut scratch);
        }
        assert_eq!(c.neurons()[0].value(), 0);
        assert_eq!(c.neurons()[1].value(), 0);

        step(&mut c, &mut scratch);
        assert_eq!(c.neurons()[0].value(), 0);
    }

    #[test]
    fn firing_resets_to_recovery() {
        let mut c = quiet(1, 1, 1);
        c.neurons_mut()[0].value = 200;
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let n = c.neurons()[0];
        assert_eq!(n.value(), DEFAULT_RECOVERY_VALUE);
        assert!(n.fired(0));
        assert_eq!(n.tick_pulse(), 1);

        step(&mut c, &mut scratch);
        let n = c.neurons()[0];
        assert_eq!(n.value(), DEFAULT_RECOVERY_VALUE + 1);
        assert!(!n.fired(0));
        assert!(n.fired(1));
    }

    #[test]
    fn evolution_runs_every_step_plus_one_ticks() {
        let mut c = Cortex::new(2, 2, 1).unwrap();
        c.set_evol_step(10);
        let mut scratch = c.clone();
        for _ in 0..23 {
            step(&mut c, &mut scratch);
        }
        // Ticks 0, 11 and 22 evolve.
        assert_eq!(c.ticks_count(), 23);
        assert_eq!(c.evols_count(), 3);

        let mut c = quiet(2, 2, 1);
        let mut scratch = c.clone();
        for _ in 0..50 {
            step(&mut c, &mut scratch);
        }
        assert_eq!(c.evols_count(), 0);
    }

    // Slots for radius 1: 0 1 2 / 3 x 4 / 5 6 7
    const LEFT: usize = 3;

    #[test]
    fn excitatory_synapse_from_firing_neighbor_adds_exc_value() {
        let mut c = quiet(3, 1, 1);
        c.neurons_mut()[0].value = 200;
        c.neurons_mut()[1].connect(LEFT, true);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        // A neuron at rest does not decay, so the influence lands unchanged.
        assert_eq!(c.neurons()[1].value(), c.config().exc_value);
        // The right neighbor has no synapse and stays quiet.
        assert_eq!(c.neurons()[2].value(), 0);
    }

    #[test]
    fn strength_scales_influence() {
        let mut c = quiet(3, 1, 1);
        c.neurons_mut()[0].value = 200;
        c.neurons_mut()[1].connect(LEFT, true);
        for _ in 0..4 {
            c.neurons_mut()[1].strengthen(LEFT);
        }
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let exc = c.config().exc_value;
        assert_eq!(c.neurons()[1].value(), 2 * exc);
    }

    #[test]
    fn inhibition_stops_at_recovery_value() {
        let mut c = quiet(3, 1, 1);
        c.neurons_mut()[0].value = 200;
        c.neurons_mut()[1].connect(LEFT, false);
        for _ in 0..4 {
            c.neurons_mut()[1].strengthen(LEFT);
        }
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        // -64 * 2 would overshoot; clamped to recovery.
        assert_eq!(c.neurons()[1].value(), DEFAULT_RECOVERY_VALUE);
    }

    // Synapses rewired on an evolution tick only carry current from the next
    // tick on, in both directions.
    fn evolving(width: u32, height: u32) -> Cortex {
        let mut c = Cortex::new(width, height, 1).unwrap();
        c.set_evol_step(0);
        c.set_syngen_chance(0);
        c.set_syndel_chance(0);
        c.set_synstr_chance(0);
        c.set_synwk_chance(0);
        c
    }

    #[test]
    fn generated_synapse_carries_no_current_on_its_first_tick() {
        let mut c = evolving(3, 1);
        c.set_syngen_chance(MAX_CHANCE);
        c.set_inhexc_ratio(0);
        let window = c.config().pulse_window;
        c.neurons_mut()[0].value = 200;
        c.neurons_mut()[0].push_tick_pulse(true, window);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let center = c.neurons()[1];
        assert_eq!(center.synapse_mask(), 1 << LEFT);
        assert_eq!(center.value(), 0);

        // The left neuron is recovering now, so refire it to see the synapse.
        c.neurons_mut()[0].value = 200;
        c.set_syngen_chance(0);
        step(&mut c, &mut scratch);
        assert_eq!(c.neurons()[1].value(), c.config().exc_value);
    }

    #[test]
    fn deleted_synapse_still_carries_current_on_its_last_tick() {
        let mut c = evolving(3, 1);
        c.set_syndel_chance(MAX_CHANCE);
        c.neurons_mut()[0].value = 200;
        c.neurons_mut()[1].connect(LEFT, true);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let center = c.neurons()[1];
        assert_eq!(center.syn_count(), 0);
        assert_eq!(center.value(), c.config().exc_value);
    }

    #[test]
    fn resting_neuron_takes_influence_without_decay() {
        let mut c = quiet(3, 1, 1);
        c.set_decay_value(5);
        c.neurons_mut()[0].value = 200;
        c.neurons_mut()[1].connect(LEFT, true);
        c.neurons_mut()[2].value = -3;
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        assert_eq!(c.neurons()[1].value(), c.config().exc_value);
        // Decay stops at zero.
        assert_eq!(c.neurons()[2].value(), 0);

        step(&mut c, &mut scratch);
        assert_eq!(c.neurons()[1].value(), c.config().exc_value - 5);
    }

    #[test]
    fn causal_timing_strengthens() {
        let mut c = evolving(3, 1);
        let window = c.config().pulse_window;
        c.neurons_mut()[1].connect(LEFT, true);
        // Neighbor fired two ticks back, this neuron one tick back.
        c.neurons_mut()[0].push_tick_pulse(true, window);
        c.neurons_mut()[0].push_tick_pulse(false, window);
        c.neurons_mut()[1].push_tick_pulse(true, window);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let center = c.neurons()[1];
        assert_eq!(center.strength(LEFT), 1);
        assert_eq!(center.tot_syn_strength(), 1);
    }

    fn anti_causal(strength: SynStrength) -> Cortex {
        let mut c = evolving(3, 1);
        let window = c.config().pulse_window;
        let center = &mut c.neurons_mut()[1];
        center.connect(LEFT, true);
        for _ in 0..strength {
            center.strengthen(LEFT);
        }
        // This neuron fired two ticks back, the neighbor one tick back.
        center.push_tick_pulse(true, window);
        center.push_tick_pulse(false, window);
        c.neurons_mut()[0].push_tick_pulse(true, window);
        c
    }

    #[test]
    fn anti_causal_timing_weakens() {
        let mut c = anti_causal(2);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let center = c.neurons()[1];
        assert_eq!(center.strength(LEFT), 1);
        assert_eq!(center.tot_syn_strength(), 1);
    }

    #[test]
    fn zero_strength_synapse_is_not_weakened() {
        let mut c = anti_causal(0);
        c.set_synwk_chance(Chance::MAX);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let center = c.neurons()[1];
        assert!(center.is_active(LEFT));
        assert_eq!(center.strength(LEFT), 0);
        assert_eq!(center.tot_syn_strength(), 0);
    }

    #[test]
    fn weakening_chance_weakens_quiet_synapses() {
        let mut c = evolving(3, 1);
        c.set_synwk_chance(Chance::MAX);
        let center = &mut c.neurons_mut()[1];
        center.connect(LEFT, true);
        for _ in 0..3 {
            center.strengthen(LEFT);
        }
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        assert_eq!(c.neurons()[1].strength(LEFT), 2);
        step(&mut c, &mut scratch);
        assert_eq!(c.neurons()[1].strength(LEFT), 1);
        assert_eq!(c.neurons()[1].tot_syn_strength(), 1);
    }

    #[test]
    fn disabled_region_stays_empty_under_generation() {
        let mut c = pulsing(4, 4);
        c.set_max_syn_count(8);
        for n in c.neurons_mut() {
            n.connect(0, true);
            n.connect(7, false);
        }
        c.syn_disable(1, 1, 3, 3);
        c.set_syngen_chance(MAX_CHANCE);
        let mut scratch = c.clone();

        for _ in 0..3 {
            step(&mut c, &mut scratch);
            assert_invariants(&c);
        }
        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            assert_eq!(c.neuron(x, y).unwrap().syn_count(), 0);
        }
        assert!(c.neuron(0, 0).unwrap().syn_count() > 0);
    }

    #[test]
    fn edges_do_not_wrap() {
        let mut c = quiet(3, 3, 1);
        // Slot 0 of the corner cell points outside the grid. With wrapping it
        // would reach the opposite corner.
        c.neurons_mut()[0].connect(0, true);
        c.neurons_mut()[8].value = 200;
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        assert_eq!(c.neurons()[0].value(), 0);
    }

    fn pulsing(width: u32, height: u32) -> Cortex {
        let mut c = Cortex::new(width, height, 1).unwrap();
        c.set_evol_step(0);
        c.set_syndel_chance(0);
        c.set_synstr_chance(0);
        c.set_synwk_chance(0);
        let window = c.config().pulse_window;
        for n in c.neurons_mut() {
            n.push_tick_pulse(true, window);
        }
        c
    }

    #[test]
    fn generation_respects_synapse_cap() {
        let mut c = pulsing(3, 3);
        c.set_syngen_chance(MAX_CHANCE);
        c.set_max_syn_count(3);
        c.set_inhexc_ratio(0);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let center = c.neurons()[4];
        assert_eq!(center.syn_count(), 3);
        assert_eq!(center.synapse_mask(), 0b111);
        assert_eq!(center.excitatory_mask() & center.synapse_mask(), 0b111);
    }

    #[test]
    fn full_inhexc_ratio_generates_inhibitory_synapses() {
        let mut c = pulsing(3, 3);
        c.set_syngen_chance(MAX_CHANCE);
        c.set_max_syn_count(8);
        let range = c.config().inhexc_range;
        c.set_inhexc_ratio(range);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let center = c.neurons()[4];
        assert_eq!(center.syn_count(), 8);
        assert_eq!(center.excitatory_mask() & center.synapse_mask(), 0);
    }

    #[test]
    fn quiet_neighbors_lose_weak_synapses() {
        let mut c = Cortex::new(3, 3, 1).unwrap();
        c.set_evol_step(0);
        c.set_syngen_chance(0);
        c.set_syndel_chance(MAX_CHANCE);
        c.set_synwk_chance(0);
        c.set_synstr_chance(0);
        c.set_max_syn_count(8);
        for s in 0..8 {
            c.neurons_mut()[4].connect(s, true);
        }
        c.neurons_mut()[4].strengthen(2);
        let mut scratch = c.clone();

        step(&mut c, &mut scratch);
        let center = c.neurons()[4];
        assert_eq!(center.synapse_mask(), 1 << 2);
        assert_eq!(center.syn_count(), 1);
    }

    #[test]
    fn strengthening_stops_at_total_cap() {
        let mut c = Cortex::new(3, 3, 1).unwrap();
        c.set_evol_step(0);
        c.set_syngen_chance(0);
        c.set_syndel_chance(0);
        c.set_synwk_chance(0);
        c.set_synstr_chance(MAX_CHANCE);
        c.set_max_syn_count(8);
        for s in 0..8 {
            c.neurons_mut()[4].connect(s, true);
        }
        let mut scratch = c.clone();

        for _ in 0..10 {
            step(&mut c, &mut scratch);
        }
        let center = c.neurons()[4];
        assert_eq!(center.tot_syn_strength(), c.config().max_tot_strength);
        assert!((0..8).all(|s| center.strength(s) <= MAX_SYN_STRENGTH));
    }

    #[test]
    fn empty_cortex_ticks() {
        let mut c = Cortex::new(0, 4, 1).unwrap();
        let mut scratch = c.clone();
        step(&mut c, &mut scratch);
        assert_eq!(c.ticks_count(), 1);
        assert!(c.neurons().is_empty());

        c.set_execution_tier(ExecutionTier::Parallel);
        step(&mut c, &mut scratch);
        assert_eq!(c.ticks_count(), 2);
    }

    #[test]
    fn next_takes_prev_shape_and_parameters() {
        let mut prev = Cortex::new(5, 4, 2).unwrap();
        prev.set_fire_threshold(99);
        let mut next = Cortex::new(1, 1, 1).unwrap();

        tick(&prev, &mut next);
        assert_eq!(next.width(), 5);
        assert_eq!(next.height(), 4);
        assert_eq!(next.neurons().len(), 20);
        assert_eq!(next.config(), prev.config());
        assert_eq!(next.ticks_count(), 1);
    }

    #[test]
    fn pair_alternates_buffers() {
        let mut pair = CortexPair::new(quiet(4, 4, 1));
        pair.current_mut().neurons_mut()[5].value = 200;
        pair.step(None);
        assert_eq!(pair.ticks(), 1);
        assert_eq!(pair.current().neurons()[5].value(), DEFAULT_RECOVERY_VALUE);

        pair.run(9, None);
        assert_eq!(pair.ticks(), 10);
        assert_eq!(pair.into_current().ticks_count(), 10);
    }

    #[test]
    fn tier_falls_back_without_parallel_feature() {
        let mut c = Cortex::new(2, 2, 1).unwrap();
        c.set_execution_tier(ExecutionTier::Parallel);
        #[cfg(feature = "parallel")]
        assert_eq!(c.effective_execution_tier(), ExecutionTier::Parallel);
        #[cfg(not(feature = "parallel"))]
        assert_eq!(c.effective_execution_tier(), ExecutionTier::Scalar);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_scalar_for_any_thread_count() {
        let cfg = CortexConfig::with_radius(2).with_seed(5).with_evol_step(0);
        let base = Cortex::with_config(23, 17, cfg).unwrap();

        let run = |tier: ExecutionTier| {
            let mut c = base.clone();
            c.set_execution_tier(tier);
            let mut scratch = c.clone();
            for t in 0..40 {
                excite(&mut c, t);
                step(&mut c, &mut scratch);
            }
            c
        };

        let scalar = run(ExecutionTier::Scalar);
        for threads in [1, 3, 8] {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap();
            let parallel = pool.install(|| run(ExecutionTier::Parallel));
            assert_eq!(parallel.neurons(), scalar.neurons());
        }
    }
}
