use crate::cortex::{Cortex, CortexSize, Diagnostics, NeuronValue, TicksCount};

/// A read-only snapshot of what the cortex is doing.
///
/// Design intent:
/// - Observers cannot mutate or steer the cortex.
/// - Snapshotting is *on-demand* and can allocate; the tick loop stays unchanged.
#[derive(Debug, Clone)]
pub struct CortexSnapshot {
    pub width: CortexSize,
    pub height: CortexSize,
    pub ticks: TicksCount,
    pub evols: TicksCount,
    pub diagnostics: Diagnostics,

    /// Neuron values, row-major.
    pub values: Vec<NeuronValue>,
    /// Whether each neuron fired on the latest recorded tick, row-major.
    pub firing: Vec<bool>,
}

impl CortexSnapshot {
    /// One character per neuron: `@` fired, `+` above zero, `-` below, `.` at rest.
    pub fn render_ascii(&self) -> String {
        let width = self.width as usize;
        let mut out = String::with_capacity((width + 1) * self.height as usize);
        for (i, (&value, &fired)) in self.values.iter().zip(&self.firing).enumerate() {
            out.push(if fired {
                '@'
            } else if value > 0 {
                '+'
            } else if value < 0 {
                '-'
            } else {
                '.'
            });
            if (i + 1) % width == 0 {
                out.push('\n');
            }
        }
        out
    }
}

pub struct CortexAdapter<'a> {
    cortex: &'a Cortex,
}

impl<'a> CortexAdapter<'a> {
    pub fn new(cortex: &'a Cortex) -> Self {
        Self { cortex }
    }

    pub fn snapshot(&self) -> CortexSnapshot {
        let neurons = self.cortex.neurons();

        CortexSnapshot {
            width: self.cortex.width(),
            height: self.cortex.height(),
            ticks: self.cortex.ticks_count(),
            evols: self.cortex.evols_count(),
            diagnostics: self.cortex.diagnostics(),

            values: neurons.iter().map(|n| n.value()).collect(),
            firing: neurons.iter().map(|n| n.fired(0)).collect(),
        }
    }
}
