//! Bit-packed neuron record.
//!
//! Synapses from the neighborhood are addressed by slot: the `d × d` square
//! around the neuron is enumerated row-major with the center skipped, and slot
//! `s` is bit `s` of every synapse mask.
//!
//! ```text
//! 1|1|0
//! 0|x|1  => slots 0..8 = 1,1,0,0,1,1,0,0
//! 1|0|0
//! ```
//!
//! Synapse strength is a 3-bit value spread over three bit planes, so each
//! plane holds one bit of every slot's strength. Callers go through
//! [`Neuron::strength`] and never touch the planes directly.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cortex::{
    Chance, NeuronValue, NhMask, PulseMask, PulsesCount, SynCount, SynStrength, MAX_SYN_STRENGTH,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Neuron {
    // Active synapses from the neighborhood (SYNapses ACtivation state).
    pub(crate) synac_mask: NhMask,
    // Excitatory (1) or inhibitory (0) synapses. Only meaningful where active.
    pub(crate) synex_mask: NhMask,
    // Strength bit planes, least significant first.
    pub(crate) synstr_mask: [NhMask; 3],

    // Fire history, newest tick at bit 0:
    //           |<--pulse_window-->|
    // xxxxxxxxxx01001010001010001001
    //                              ^
    pub(crate) tick_pulse_mask: PulseMask,
    // Set bits of `tick_pulse_mask` inside the pulse window.
    pub(crate) tick_pulse: PulsesCount,

    // Same as above, shifted on evolution ticks only.
    pub(crate) evol_pulse_mask: PulseMask,
    pub(crate) evol_pulse: PulsesCount,

    pub(crate) value: NeuronValue,
    // Cap on synapse generation. 0 disables it for this neuron.
    pub(crate) max_syn_count: SynCount,
    pub(crate) syn_count: SynCount,
    pub(crate) tot_syn_strength: SynStrength,
    // Chance (out of the cortex' inhexc_range) that a new synapse is inhibitory.
    pub(crate) inhexc_ratio: Chance,
}

impl Neuron {
    pub(crate) fn new(value: NeuronValue, max_syn_count: SynCount, inhexc_ratio: Chance) -> Self {
        Self {
            value,
            max_syn_count,
            inhexc_ratio,
            ..Default::default()
        }
    }

    #[inline]
    pub fn value(&self) -> NeuronValue {
        self.value
    }

    #[inline]
    pub fn syn_count(&self) -> SynCount {
        self.syn_count
    }

    #[inline]
    pub fn max_syn_count(&self) -> SynCount {
        self.max_syn_count
    }

    #[inline]
    pub fn tot_syn_strength(&self) -> SynStrength {
        self.tot_syn_strength
    }

    #[inline]
    pub fn inhexc_ratio(&self) -> Chance {
        self.inhexc_ratio
    }

    #[inline]
    pub fn tick_pulse(&self) -> PulsesCount {
        self.tick_pulse
    }

    #[inline]
    pub fn tick_pulse_mask(&self) -> PulseMask {
        self.tick_pulse_mask
    }

    #[inline]
    pub fn evol_pulse(&self) -> PulsesCount {
        self.evol_pulse
    }

    #[inline]
    pub fn evol_pulse_mask(&self) -> PulseMask {
        self.evol_pulse_mask
    }

    #[inline]
    pub fn synapse_mask(&self) -> NhMask {
        self.synac_mask
    }

    #[inline]
    pub fn excitatory_mask(&self) -> NhMask {
        self.synex_mask
    }

    #[inline]
    pub fn strength_planes(&self) -> [NhMask; 3] {
        self.synstr_mask
    }

    #[inline]
    pub fn is_active(&self, slot: usize) -> bool {
        (self.synac_mask >> slot) & 1 != 0
    }

    #[inline]
    pub fn is_excitatory(&self, slot: usize) -> bool {
        (self.synex_mask >> slot) & 1 != 0
    }

    #[inline]
    pub fn strength(&self, slot: usize) -> SynStrength {
        let [a, b, c] = self.synstr_mask;
        (((a >> slot) & 1) | (((b >> slot) & 1) << 1) | (((c >> slot) & 1) << 2)) as SynStrength
    }

    /// Whether the neuron fired `ticks_ago` ticks before the latest recorded one.
    #[inline]
    pub fn fired(&self, ticks_ago: u32) -> bool {
        ticks_ago < PulseMask::BITS && (self.tick_pulse_mask >> ticks_ago) & 1 != 0
    }

    #[inline]
    pub(crate) fn add_value(&mut self, delta: NeuronValue) {
        self.value = self.value.saturating_add(delta);
    }

    pub(crate) fn set_strength(&mut self, slot: usize, strength: SynStrength) {
        let bit = 1u64 << slot;
        for (plane_idx, plane) in self.synstr_mask.iter_mut().enumerate() {
            if (strength >> plane_idx) & 1 != 0 {
                *plane |= bit;
            } else {
                *plane &= !bit;
            }
        }
    }

    /// Create a zero-strength synapse on an inactive slot.
    pub(crate) fn connect(&mut self, slot: usize, excitatory: bool) {
        debug_assert!(!self.is_active(slot));
        let bit = 1u64 << slot;
        self.synac_mask |= bit;
        self.set_strength(slot, 0);
        if excitatory {
            self.synex_mask |= bit;
        } else {
            self.synex_mask &= !bit;
        }
        self.syn_count = self.syn_count.saturating_add(1);
    }

    /// Remove an active synapse, giving its strength back.
    pub(crate) fn disconnect(&mut self, slot: usize) {
        debug_assert!(self.is_active(slot));
        let strength = self.strength(slot);
        self.tot_syn_strength = self.tot_syn_strength.saturating_sub(strength);
        self.set_strength(slot, 0);
        self.synac_mask &= !(1u64 << slot);
        self.syn_count = self.syn_count.saturating_sub(1);
    }

    pub(crate) fn strengthen(&mut self, slot: usize) {
        let strength = self.strength(slot);
        if strength < MAX_SYN_STRENGTH {
            self.set_strength(slot, strength + 1);
            self.tot_syn_strength = self.tot_syn_strength.saturating_add(1);
        }
    }

    pub(crate) fn weaken(&mut self, slot: usize) {
        let strength = self.strength(slot);
        if strength > 0 {
            self.set_strength(slot, strength - 1);
            self.tot_syn_strength = self.tot_syn_strength.saturating_sub(1);
        }
    }

    pub(crate) fn clear_synapses(&mut self) {
        self.synac_mask = 0;
        self.synex_mask = 0;
        self.synstr_mask = [0; 3];
        self.syn_count = 0;
        self.tot_syn_strength = 0;
    }

    /// Delete the weakest synapses until at most `max` remain. Ties go to the
    /// highest slot.
    pub(crate) fn trim_synapses(&mut self, max: SynCount) {
        while self.syn_count > max {
            let Some(slot) = self.weakest_slot() else {
                break;
            };
            self.disconnect(slot);
        }
    }

    /// Weaken the strongest synapses until the summed strength fits `max`.
    /// Ties go to the highest slot.
    pub(crate) fn trim_strength(&mut self, max: SynStrength) {
        while self.tot_syn_strength > max {
            let Some(slot) = self.strongest_slot() else {
                break;
            };
            self.weaken(slot);
        }
    }

    /// Replace the active-synapse set with `mask`.
    ///
    /// Synapses leaving the set give their strength back. Synapses entering it
    /// start at strength 0 and keep the slot's excitatory bit.
    pub(crate) fn set_synapse_mask(&mut self, mask: NhMask) {
        let removed = self.synac_mask & !mask;
        for slot in BitSlots(removed) {
            self.disconnect(slot);
        }
        let added = mask & !self.synac_mask;
        for slot in BitSlots(added) {
            let excitatory = self.is_excitatory(slot);
            self.connect(slot, excitatory);
        }
    }

    fn weakest_slot(&self) -> Option<usize> {
        BitSlots(self.synac_mask)
            .min_by_key(|&slot| (self.strength(slot), core::cmp::Reverse(slot)))
    }

    fn strongest_slot(&self) -> Option<usize> {
        BitSlots(self.synac_mask).max_by_key(|&slot| (self.strength(slot), slot))
    }

    #[inline]
    pub(crate) fn push_tick_pulse(&mut self, fired: bool, window: PulsesCount) {
        push_pulse(&mut self.tick_pulse_mask, &mut self.tick_pulse, fired, window);
    }

    #[inline]
    pub(crate) fn push_evol_pulse(&mut self, active: bool, window: PulsesCount) {
        push_pulse(&mut self.evol_pulse_mask, &mut self.evol_pulse, active, window);
    }

    /// Recount both pulse histories after a window change.
    pub(crate) fn recount_pulses(&mut self, window: PulsesCount) {
        self.tick_pulse = count_in_window(self.tick_pulse_mask, window);
        self.evol_pulse = count_in_window(self.evol_pulse_mask, window);
    }
}

/// Indices of the set bits of a mask, lowest first.
struct BitSlots(NhMask);

impl Iterator for BitSlots {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let slot = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(slot)
    }
}

// The bit shifted onto position `window` leaves the window.
#[inline]
fn push_pulse(mask: &mut PulseMask, count: &mut PulsesCount, spike: bool, window: PulsesCount) {
    *mask <<= 1;
    if (*mask >> window) & 1 != 0 {
        *count = count.saturating_sub(1);
    }
    if spike {
        *mask |= 1;
        *count = count.saturating_add(1);
    }
}

#[inline]
fn count_in_window(mask: PulseMask, window: PulsesCount) -> PulsesCount {
    let in_window = mask & ((1u64 << window) - 1);
    in_window.count_ones() as PulsesCount
}
