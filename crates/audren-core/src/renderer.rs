//! Renderer front-end.
//!
//! [`AudioRenderer`] owns every preallocated context of one renderer session
//! and applies a frame's parameters in the fixed order effects, splitters,
//! mixes, sinks. Mixes read the effects and splitters updated just before
//! them, so the order is part of the contract.
//!
//! ```rust
//! use audren_core::{
//!     AudioRenderer, MixParameter, PoolMapper, RendererParameters, UpdateInput,
//! };
//!
//! let parameters = RendererParameters {
//!     sub_mix_count: 1,
//!     effect_count: 0,
//!     sink_count: 0,
//!     ..RendererParameters::default()
//! };
//! let mut renderer = AudioRenderer::new(&parameters, PoolMapper::new()).unwrap();
//!
//! let mixes = [MixParameter::new(0), MixParameter::new(1).with_destination(0)];
//! let output = renderer
//!     .update(&UpdateInput { mixes: &mixes, ..UpdateInput::default() })
//!     .unwrap();
//! assert!(output.resorted);
//!
//! let plan = renderer.generate_plan();
//! assert_eq!(plan.sub_mix_order(), vec![1]);
//! ```

use crate::behaviour::{BehaviourContext, LAST_REVISION};
use crate::constants::{MIX_BUFFER_COUNT_MAX, TARGET_SAMPLE_RATE};
use crate::effect::{EffectContext, EffectOutStatus, EffectParameter, EffectType};
use crate::error::{ErrorInfo, Result, UpdateError};
use crate::memory::AddressMapper;
use crate::mix::{Mix, MixContext, MixParameter};
use crate::plan::{RenderPlan, RenderStep};
use crate::sink::{SinkContext, SinkOutStatus, SinkParameter};
use crate::splitter::{SplitterContext, SplitterDestinationParameter, SplitterParameter};

/// Sample rates a renderer can be created with.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [32_000, TARGET_SAMPLE_RATE];

/// Allocation limits of a renderer session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RendererParameters {
    /// Output sample rate.
    pub sample_rate: u32,
    /// Samples per channel in one frame.
    pub sample_count: u32,
    /// Mix buffers shared by all mixes.
    pub mix_buffer_count: u32,
    /// Mixes besides the final mix.
    pub sub_mix_count: u32,
    /// Effect slots.
    pub effect_count: u32,
    /// Splitter slots.
    pub splitter_count: u32,
    /// Splitter destination slots.
    pub splitter_destination_count: u32,
    /// Sink slots.
    pub sink_count: u32,
    /// Guest revision features are gated on.
    pub revision: u32,
}

impl Default for RendererParameters {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            sample_count: 240,
            mix_buffer_count: MIX_BUFFER_COUNT_MAX as u32,
            sub_mix_count: 4,
            effect_count: 4,
            splitter_count: 0,
            splitter_destination_count: 0,
            sink_count: 1,
            revision: LAST_REVISION,
        }
    }
}

impl RendererParameters {
    /// Mix slots including the final mix.
    pub fn mix_count(&self) -> usize {
        self.sub_mix_count as usize + 1
    }

    /// Checks the limits a renderer can be built from.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(UpdateError::InvalidParameters(format!(
                "unsupported sample rate {}",
                self.sample_rate
            )));
        }
        if self.sample_count == 0 {
            return Err(UpdateError::InvalidParameters(
                "sample count must be positive".into(),
            ));
        }
        if self.mix_buffer_count == 0 {
            return Err(UpdateError::InvalidParameters(
                "at least one mix buffer is required".into(),
            ));
        }
        if self.revision == 0 {
            return Err(UpdateError::InvalidParameters(
                "revision must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// One frame's parameters, borrowed from the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateInput<'a> {
    /// Per-update behaviour flags.
    pub behaviour_flags: u64,
    /// One entry per effect slot.
    pub effects: &'a [EffectParameter],
    /// Splitters to re-link.
    pub splitters: &'a [SplitterParameter],
    /// Splitter destinations to update.
    pub splitter_destinations: &'a [SplitterDestinationParameter],
    /// Mix parameters; a dirty subset when the revision allows it.
    pub mixes: &'a [MixParameter],
    /// One entry per sink slot.
    pub sinks: &'a [SinkParameter],
}

/// Everything reported back after an update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateOutput {
    /// Effect statuses, in slot order.
    pub effects: Vec<EffectOutStatus>,
    /// Sink statuses, in slot order.
    pub sinks: Vec<SinkOutStatus>,
    /// Absorbed per-entity errors.
    pub errors: Vec<ErrorInfo>,
    /// Whether the mix graph was re-sorted.
    pub resorted: bool,
    /// Frames rendered since the renderer was started.
    pub elapsed_frame_count: u64,
}

/// One renderer session.
#[derive(Debug)]
pub struct AudioRenderer<M: AddressMapper> {
    sample_rate: u32,
    sample_count: u32,
    behaviour: BehaviourContext,
    mapper: M,
    effects: EffectContext,
    splitters: SplitterContext,
    mixes: MixContext,
    sinks: SinkContext,
    active: bool,
    elapsed_frame_count: u64,
}

impl<M: AddressMapper> AudioRenderer<M> {
    /// Builds a renderer with every context preallocated.
    pub fn new(parameters: &RendererParameters, mapper: M) -> Result<Self> {
        parameters.validate()?;

        let effect_count = parameters.effect_count as usize;

        #[cfg(feature = "tracing")]
        tracing::info!(
            sample_rate = parameters.sample_rate,
            mixes = parameters.mix_count(),
            effects = effect_count,
            sinks = parameters.sink_count,
            revision = parameters.revision,
            "audio renderer created"
        );

        Ok(Self {
            sample_rate: parameters.sample_rate,
            sample_count: parameters.sample_count,
            behaviour: BehaviourContext::new(parameters.revision),
            mapper,
            effects: EffectContext::new(effect_count),
            splitters: SplitterContext::new(
                parameters.splitter_count as usize,
                parameters.splitter_destination_count as usize,
            ),
            mixes: MixContext::new(
                parameters.mix_count(),
                effect_count,
                parameters.mix_buffer_count,
            ),
            sinks: SinkContext::new(parameters.sink_count as usize),
            active: false,
            elapsed_frame_count: 0,
        })
    }

    /// Marks the renderer active and restarts the frame counter.
    pub fn start(&mut self) {
        self.elapsed_frame_count = 0;
        self.active = true;
    }

    /// Marks the renderer inactive.
    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Whether the renderer is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per channel in one frame.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Frames planned since [`start`](Self::start). Plans generated while
    /// stopped are not counted.
    pub fn elapsed_frame_count(&self) -> u64 {
        self.elapsed_frame_count
    }

    /// Feature gates.
    pub fn behaviour(&self) -> &BehaviourContext {
        &self.behaviour
    }

    /// Effect slots.
    pub fn effects(&self) -> &EffectContext {
        &self.effects
    }

    /// Splitters and destinations.
    pub fn splitters(&self) -> &SplitterContext {
        &self.splitters
    }

    /// Mixes and their routing graph.
    pub fn mixes(&self) -> &MixContext {
        &self.mixes
    }

    /// Sink slots.
    pub fn sinks(&self) -> &SinkContext {
        &self.sinks
    }

    /// The address mapper.
    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Mutable access to the address mapper, for registering pools.
    pub fn mapper_mut(&mut self) -> &mut M {
        &mut self.mapper
    }

    /// Applies one frame's parameters.
    ///
    /// Per-entity failures are absorbed and listed in
    /// [`UpdateOutput::errors`]; structural failures abort the call.
    pub fn update(&mut self, input: &UpdateInput<'_>) -> Result<UpdateOutput> {
        let result = self.apply(input);
        if result.is_err() {
            self.behaviour.take_errors();
        }
        result
    }

    fn apply(&mut self, input: &UpdateInput<'_>) -> Result<UpdateOutput> {
        self.behaviour.update_flags(input.behaviour_flags);
        self.mapper
            .set_force_mapping(self.behaviour.is_memory_pool_force_mapping_enabled());

        let effects = self.effects.update(
            input.effects,
            &mut self.mapper,
            &mut self.behaviour,
            self.active,
        )?;

        self.splitters.update(
            input.splitters,
            input.splitter_destinations,
            &self.behaviour,
        );

        let resorted =
            self.mixes
                .update(input.mixes, &self.effects, &self.splitters, &self.behaviour)?;

        let sinks = self
            .sinks
            .update(input.sinks, &mut self.mapper, &mut self.behaviour)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            resorted,
            errors = self.behaviour.errors().len(),
            "renderer update applied"
        );

        Ok(UpdateOutput {
            effects,
            sinks,
            errors: self.behaviour.take_errors(),
            resorted,
            elapsed_frame_count: self.elapsed_frame_count,
        })
    }

    fn generate_effects(effects: &mut EffectContext, mix: &Mix) -> Vec<usize> {
        let mut generated = Vec::new();
        for index in mix.ordered_effects() {
            let Some(effect) = effects.get_mut(index) else {
                break;
            };
            if effect.effect_type() == EffectType::Invalid || effect.should_skip() {
                continue;
            }
            generated.push(index);
            effect.update_for_command_generation();
        }
        generated
    }

    /// Walks the sorted graph and emits one frame's instructions.
    ///
    /// Effects and sinks that appear in the plan advance their
    /// command-generation state; calling this counts as rendering a frame.
    pub fn generate_plan(&mut self) -> RenderPlan {
        let mut steps = Vec::new();

        for &index in self.mixes.sorted() {
            let Some(mix) = self.mixes.get(index) else {
                continue;
            };
            if mix.is_final() || !mix.is_used() {
                continue;
            }
            steps.push(RenderStep::SubMix {
                mix: index,
                buffer_offset: mix.buffer_offset(),
                buffer_count: mix.buffer_count(),
                effects: Self::generate_effects(&mut self.effects, mix),
                destination: self.mixes.edges().outgoing(index).next(),
            });
        }

        let final_mix_used = self.mixes.final_mix().is_some_and(Mix::is_used);
        if let Some(final_mix) = self.mixes.final_mix()
            && final_mix.is_used()
        {
            steps.push(RenderStep::FinalMix {
                buffer_offset: final_mix.buffer_offset(),
                buffer_count: final_mix.buffer_count(),
                effects: Self::generate_effects(&mut self.effects, final_mix),
            });
        }

        if final_mix_used {
            self.generate_sinks(&mut steps);
        }

        if self.active {
            self.elapsed_frame_count += 1;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            steps = steps.len(),
            frame = self.elapsed_frame_count,
            "render plan generated"
        );

        RenderPlan {
            sample_rate: self.sample_rate,
            sample_count: self.sample_count,
            steps,
        }
    }

    fn generate_sinks(&mut self, steps: &mut Vec<RenderStep>) {
        for index in 0..self.sinks.len() {
            let Some(sink) = self.sinks.get(index) else {
                continue;
            };
            if !sink.is_used() || sink.should_skip() {
                continue;
            }
            let node_id = sink.node_id();

            let upsampler = match self.sinks.prepare_upsampler(index, self.sample_rate) {
                Ok(upsampler) => upsampler,
                Err(info) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(sink = index, "no upsampler available, sink skipped");
                    self.behaviour.append_error(info);
                    continue;
                }
            };

            steps.push(RenderStep::Sink {
                sink: index,
                node_id,
                upsampler,
            });
            self.sinks.update_for_command_generation(index);
        }
    }

    /// Releases every mapping and upsampler held by effects and sinks.
    pub fn release_all(&mut self) {
        self.effects.release_all(&mut self.mapper);
        self.sinks.release_all(&mut self.mapper);
    }
}
