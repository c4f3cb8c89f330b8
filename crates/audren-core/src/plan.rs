//! Render plan produced by [`AudioRenderer::generate_plan`](crate::AudioRenderer::generate_plan).
//!
//! A [`RenderPlan`] is the ordered instruction list a processing stage walks
//! once per frame: every used sub-mix after all of its sources, then the final
//! mix, then the sinks fed by the final mix. The plan only names entities by
//! index; the processing side looks their state up in the renderer.

use crate::upsampler::UpsamplerId;

/// One instruction of a [`RenderPlan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderStep {
    /// Run a sub-mix's effect chain and mix the result into its destination.
    SubMix {
        /// Mix slot.
        mix: usize,
        /// First mix buffer owned by the mix.
        buffer_offset: u32,
        /// Mix buffers owned by the mix.
        buffer_count: u32,
        /// Effect indices in processing order.
        effects: Vec<usize>,
        /// Mix the output is accumulated into, `None` for a dangling mix.
        destination: Option<usize>,
    },

    /// Run the final mix's effect chain.
    FinalMix {
        /// First mix buffer owned by the final mix.
        buffer_offset: u32,
        /// Mix buffers owned by the final mix.
        buffer_count: u32,
        /// Effect indices in processing order.
        effects: Vec<usize>,
    },

    /// Hand the final mix to a sink.
    Sink {
        /// Sink slot.
        sink: usize,
        /// Diagnostics correlation id.
        node_id: u32,
        /// Upsampler the device sink runs through, if the renderer rate needs one.
        upsampler: Option<UpsamplerId>,
    },
}

/// Ordered instructions for one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderPlan {
    /// Renderer sample rate.
    pub sample_rate: u32,
    /// Samples per channel in the frame.
    pub sample_count: u32,
    /// Instructions, in execution order.
    pub steps: Vec<RenderStep>,
}

impl RenderPlan {
    /// Sub-mix slots in execution order.
    pub fn sub_mix_order(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                RenderStep::SubMix { mix, .. } => Some(*mix),
                _ => None,
            })
            .collect()
    }

    /// Sink slots in execution order.
    pub fn sink_order(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                RenderStep::Sink { sink, .. } => Some(*sink),
                _ => None,
            })
            .collect()
    }

    /// Whether the plan contains no instructions.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
