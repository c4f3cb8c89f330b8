//! Effects attached to mixes.
//!
//! An [`Effect`] is one slot of the renderer's preallocated effect list. Each
//! frame the guest sends an [`EffectParameter`] per slot naming the owning mix,
//! the position inside that mix's effect chain, and a per-kind payload
//! ([`EffectParams`]). The DSP itself happens elsewhere; this module only
//! validates parameters, maps work buffers, and tracks usage state so command
//! generation knows what to emit.
//!
//! # Validation
//!
//! Channel layouts are checked in two steps, mirroring how the hardware mixer
//! treats them:
//!
//! - an illegal *maximum* channel count rejects the whole parameter block and
//!   the effect keeps its previous state
//! - an illegal *current* channel count (or a channel index outside the mix
//!   buffers) stores the parameters but leaves the enabled flag untouched

use crate::behaviour::BehaviourContext;
use crate::constants::{
    CHANNEL_COUNT_MAX, INVALID_PROCESSING_ORDER, MIX_BUFFER_COUNT_MAX, UNUSED_MIX_ID,
    is_channel_count_valid,
};
use crate::error::{ErrorInfo, Result, UpdateError};
use crate::memory::{AddressMapper, BufferDescriptor, MappedRegion};

/// Effect kinds understood by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EffectType {
    /// Empty slot.
    #[default]
    Invalid,
    /// Volume-weighted copy between mix buffers.
    BufferMix,
    /// Send/return through guest-owned ring buffers.
    AuxiliaryBuffer,
    /// Feedback delay.
    Delay,
    /// Classic reverb.
    Reverb,
    /// I3DL2 reverb.
    Reverb3d,
    /// Second-order IIR filter.
    BiquadFilter,
    /// Peak limiter.
    Limiter,
    /// Capture into a guest-owned ring buffer.
    CaptureBuffer,
    /// Dynamic range compressor.
    Compressor,
}

/// Server-side lifecycle of an effect slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UsageState {
    /// Never configured.
    #[default]
    Invalid,
    /// Configured or remapped this frame, not yet consumed by command generation.
    New,
    /// Enabled and consumed by command generation.
    Used,
    /// Consumed by command generation while disabled.
    Disabled,
}

/// State reported back to the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectState {
    /// The effect is (or will be) processed.
    Enabled,
    /// The effect is not processed.
    Disabled,
}

/// Input/output channel routing shared by the multi-channel effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Mix buffer index read for each channel.
    pub input: [u8; CHANNEL_COUNT_MAX],
    /// Mix buffer index written for each channel.
    pub output: [u8; CHANNEL_COUNT_MAX],
    /// Channels processed this frame.
    pub channel_count: u32,
    /// Channels the work buffer was sized for.
    pub channel_count_max: u32,
}

impl ChannelLayout {
    /// Identity routing (`channel i` reads and writes mix buffer `i`).
    pub fn new(channel_count: u32, channel_count_max: u32) -> Self {
        let identity = [0, 1, 2, 3, 4, 5];
        Self {
            input: identity,
            output: identity,
            channel_count,
            channel_count_max,
        }
    }

    /// Whether the maximum channel count is one the mixer accepts.
    pub fn is_channel_count_max_valid(&self) -> bool {
        is_channel_count_valid(self.channel_count_max)
    }

    /// Whether the current channel count is legal and within the maximum.
    pub fn is_channel_count_valid(&self) -> bool {
        is_channel_count_valid(self.channel_count) && self.channel_count <= self.channel_count_max
    }

    /// Whether every used channel index addresses an existing mix buffer.
    pub fn are_indices_valid(&self) -> bool {
        let count = (self.channel_count as usize).min(CHANNEL_COUNT_MAX);
        self.input[..count]
            .iter()
            .chain(&self.output[..count])
            .all(|&index| (index as usize) < MIX_BUFFER_COUNT_MAX)
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::new(2, 2)
    }
}

/// [`EffectType::BufferMix`] payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferMixParams {
    /// Source mix buffer per mix.
    pub input: [u8; MIX_BUFFER_COUNT_MAX],
    /// Destination mix buffer per mix.
    pub output: [u8; MIX_BUFFER_COUNT_MAX],
    /// Gain per mix.
    pub volumes: [f32; MIX_BUFFER_COUNT_MAX],
    /// Number of valid entries.
    pub mix_count: u32,
}

impl Default for BufferMixParams {
    fn default() -> Self {
        Self {
            input: [0; MIX_BUFFER_COUNT_MAX],
            output: [0; MIX_BUFFER_COUNT_MAX],
            volumes: [0.0; MIX_BUFFER_COUNT_MAX],
            mix_count: 0,
        }
    }
}

/// [`EffectType::AuxiliaryBuffer`] and [`EffectType::CaptureBuffer`] payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AuxiliaryBufferParams {
    /// Channel routing.
    pub channels: ChannelLayout,
    /// Ring buffer the renderer writes into.
    pub send_buffer: BufferDescriptor,
    /// Ring buffer the renderer reads back (auxiliary only).
    pub return_buffer: BufferDescriptor,
    /// Sample rate of the ring buffers.
    pub sample_rate: u32,
}

/// [`EffectType::Delay`] payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DelayParams {
    /// Channel routing.
    pub channels: ChannelLayout,
    /// Longest delay the work buffer holds.
    pub delay_time_max_ms: u32,
    /// Current delay.
    pub delay_time_ms: u32,
    /// Feedback gain.
    pub feedback_gain: f32,
    /// Dry signal gain.
    pub dry_gain: f32,
}

/// [`EffectType::Reverb`] and [`EffectType::Reverb3d`] payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReverbParams {
    /// Channel routing.
    pub channels: ChannelLayout,
    /// Late reverb decay.
    pub decay_time_ms: u32,
    /// Dry signal gain.
    pub dry_gain: f32,
}

/// [`EffectType::BiquadFilter`] payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BiquadFilterParams {
    /// Channel routing.
    pub channels: ChannelLayout,
    /// `b0, b1, b2` in Q14.
    pub numerator: [i16; 3],
    /// `a1, a2` in Q14.
    pub denominator: [i16; 2],
}

/// [`EffectType::Limiter`] and [`EffectType::Compressor`] payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DynamicsParams {
    /// Channel routing.
    pub channels: ChannelLayout,
    /// Level above which gain reduction starts.
    pub threshold: f32,
    /// Compression ratio (compressor only).
    pub ratio: f32,
    /// Collect per-channel statistics (limiter only).
    pub statistics_enabled: bool,
    /// Reset statistics this frame (limiter only).
    pub statistics_reset: bool,
}

/// Per-kind effect payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum EffectParams {
    /// Empty slot.
    #[default]
    Invalid,
    /// See [`EffectType::BufferMix`].
    BufferMix(BufferMixParams),
    /// See [`EffectType::AuxiliaryBuffer`].
    AuxiliaryBuffer(AuxiliaryBufferParams),
    /// See [`EffectType::Delay`].
    Delay(DelayParams),
    /// See [`EffectType::Reverb`].
    Reverb(ReverbParams),
    /// See [`EffectType::Reverb3d`].
    Reverb3d(ReverbParams),
    /// See [`EffectType::BiquadFilter`].
    BiquadFilter(BiquadFilterParams),
    /// See [`EffectType::Limiter`].
    Limiter(DynamicsParams),
    /// See [`EffectType::CaptureBuffer`].
    CaptureBuffer(AuxiliaryBufferParams),
    /// See [`EffectType::Compressor`].
    Compressor(DynamicsParams),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Validity {
    Accept,
    Disable,
    Reject,
}

impl EffectParams {
    /// The kind tag of this payload.
    pub fn effect_type(&self) -> EffectType {
        match self {
            Self::Invalid => EffectType::Invalid,
            Self::BufferMix(_) => EffectType::BufferMix,
            Self::AuxiliaryBuffer(_) => EffectType::AuxiliaryBuffer,
            Self::Delay(_) => EffectType::Delay,
            Self::Reverb(_) => EffectType::Reverb,
            Self::Reverb3d(_) => EffectType::Reverb3d,
            Self::BiquadFilter(_) => EffectType::BiquadFilter,
            Self::Limiter(_) => EffectType::Limiter,
            Self::CaptureBuffer(_) => EffectType::CaptureBuffer,
            Self::Compressor(_) => EffectType::Compressor,
        }
    }

    /// Channel routing, for the kinds that have one.
    pub fn channels(&self) -> Option<&ChannelLayout> {
        match self {
            Self::Invalid | Self::BufferMix(_) => None,
            Self::AuxiliaryBuffer(p) | Self::CaptureBuffer(p) => Some(&p.channels),
            Self::Delay(p) => Some(&p.channels),
            Self::Reverb(p) | Self::Reverb3d(p) => Some(&p.channels),
            Self::BiquadFilter(p) => Some(&p.channels),
            Self::Limiter(p) | Self::Compressor(p) => Some(&p.channels),
        }
    }

    fn validity(&self) -> Validity {
        if let Self::BufferMix(p) = self {
            let count = p.mix_count as usize;
            let valid = count <= MIX_BUFFER_COUNT_MAX
                && p.input[..count]
                    .iter()
                    .chain(&p.output[..count])
                    .all(|&index| (index as usize) < MIX_BUFFER_COUNT_MAX);
            return if valid {
                Validity::Accept
            } else {
                Validity::Disable
            };
        }

        match self.channels() {
            None => Validity::Accept,
            Some(layout) if !layout.is_channel_count_max_valid() => Validity::Reject,
            Some(layout) if !layout.is_channel_count_valid() || !layout.are_indices_valid() => {
                Validity::Disable
            }
            Some(_) => Validity::Accept,
        }
    }

    fn buffers(&self, work_buffer: BufferDescriptor) -> Vec<BufferDescriptor> {
        match self {
            Self::Invalid | Self::BufferMix(_) | Self::BiquadFilter(_) => Vec::new(),
            Self::AuxiliaryBuffer(p) => vec![p.send_buffer, p.return_buffer],
            Self::CaptureBuffer(p) => vec![p.send_buffer],
            Self::Delay(_)
            | Self::Reverb(_)
            | Self::Reverb3d(_)
            | Self::Limiter(_)
            | Self::Compressor(_) => vec![work_buffer],
        }
    }
}

/// One frame's parameters for an effect slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParameter {
    /// The guest (re)created this effect; work buffers are remapped.
    pub is_new: bool,
    /// The guest wants the effect processed.
    pub is_enabled: bool,
    /// Owning mix, or [`UNUSED_MIX_ID`].
    pub mix_id: i32,
    /// Position in the owning mix's effect chain.
    pub processing_order: i32,
    /// DSP work buffer for the kinds that need one.
    pub work_buffer: BufferDescriptor,
    /// Kind-specific payload.
    pub params: EffectParams,
}

impl EffectParameter {
    /// A new, enabled, unowned effect with the given payload.
    pub fn new(params: EffectParams) -> Self {
        Self {
            is_new: true,
            is_enabled: true,
            mix_id: UNUSED_MIX_ID,
            processing_order: INVALID_PROCESSING_ORDER,
            work_buffer: BufferDescriptor::default(),
            params,
        }
    }

    /// The kind tag of the payload.
    pub fn effect_type(&self) -> EffectType {
        self.params.effect_type()
    }
}

impl Default for EffectParameter {
    fn default() -> Self {
        Self {
            is_new: false,
            is_enabled: false,
            ..Self::new(EffectParams::Invalid)
        }
    }
}

/// Per-channel limiter statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimiterStatistics {
    /// Highest input level seen per channel.
    pub input_max: [f32; CHANNEL_COUNT_MAX],
    /// Lowest applied gain per channel.
    pub compression_gain_min: [f32; CHANNEL_COUNT_MAX],
}

impl Default for LimiterStatistics {
    fn default() -> Self {
        Self {
            input_max: [0.0; CHANNEL_COUNT_MAX],
            compression_gain_min: [1.0; CHANNEL_COUNT_MAX],
        }
    }
}

impl LimiterStatistics {
    /// Folds one observation into the statistics.
    pub fn record(&mut self, channel: usize, input_level: f32, gain: f32) {
        if channel < CHANNEL_COUNT_MAX {
            self.input_max[channel] = self.input_max[channel].max(input_level);
            self.compression_gain_min[channel] = self.compression_gain_min[channel].min(gain);
        }
    }
}

/// Status written back to the guest after an update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectOutStatus {
    /// Whether the effect is being processed.
    pub state: EffectState,
    /// Limiter statistics, for limiters on revisions with extended effect info.
    pub limiter_statistics: Option<LimiterStatistics>,
}

/// One effect slot.
#[derive(Debug, Clone)]
pub struct Effect {
    params: EffectParams,
    mix_id: i32,
    processing_order: i32,
    is_enabled: bool,
    usage: UsageState,
    buffer_unmapped: bool,
    regions: Vec<MappedRegion>,
    statistics: LimiterStatistics,
}

impl Default for Effect {
    fn default() -> Self {
        Self {
            params: EffectParams::Invalid,
            mix_id: UNUSED_MIX_ID,
            processing_order: INVALID_PROCESSING_ORDER,
            is_enabled: false,
            usage: UsageState::Invalid,
            buffer_unmapped: true,
            regions: Vec::new(),
            statistics: LimiterStatistics::default(),
        }
    }
}

impl Effect {
    /// The kind currently held by this slot.
    pub fn effect_type(&self) -> EffectType {
        self.params.effect_type()
    }

    /// Current payload.
    pub fn params(&self) -> &EffectParams {
        &self.params
    }

    /// Owning mix id (raw, may be [`UNUSED_MIX_ID`]).
    pub fn mix_id(&self) -> i32 {
        self.mix_id
    }

    /// Position in the owning mix's chain (raw, may be negative).
    pub fn processing_order(&self) -> i32 {
        self.processing_order
    }

    /// Whether the guest asked for processing.
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Server-side lifecycle state.
    pub fn usage_state(&self) -> UsageState {
        self.usage
    }

    /// True while the effect's buffers are not mapped; the effect is left out
    /// of command generation.
    pub fn should_skip(&self) -> bool {
        self.buffer_unmapped
    }

    /// Mapped buffers, in the order the kind declares them.
    pub fn regions(&self) -> &[MappedRegion] {
        &self.regions
    }

    /// Limiter statistics gathered by the processing side.
    pub fn limiter_statistics_mut(&mut self) -> &mut LimiterStatistics {
        &mut self.statistics
    }

    /// Whether `parameter` carries the same kind as this slot.
    pub fn is_type_valid(&self, parameter: &EffectParameter) -> bool {
        self.effect_type() == parameter.effect_type()
    }

    /// Releases every mapping and returns the slot to its initial state.
    pub fn reset<M: AddressMapper + ?Sized>(&mut self, mapper: &mut M) {
        self.release_regions(mapper);
        *self = Self::default();
    }

    fn release_regions<M: AddressMapper + ?Sized>(&mut self, mapper: &mut M) {
        for region in self.regions.drain(..) {
            mapper.release(region);
        }
    }

    /// Applies one frame's parameters.
    ///
    /// Returns the mapping failure, if any. The slot must already hold the
    /// parameter's kind (see [`EffectContext::update`]).
    pub fn update<M: AddressMapper + ?Sized>(
        &mut self,
        parameter: &EffectParameter,
        mapper: &mut M,
    ) -> Option<ErrorInfo> {
        let validity = parameter.params.validity();
        if validity == Validity::Reject {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                kind = ?parameter.effect_type(),
                "effect parameter rejected: invalid maximum channel count"
            );
            return None;
        }

        self.mix_id = parameter.mix_id;
        self.processing_order = parameter.processing_order;
        self.params = parameter.params;

        if validity == Validity::Disable {
            #[cfg(feature = "tracing")]
            tracing::debug!(kind = ?parameter.effect_type(), "effect channel layout invalid");
            return None;
        }

        self.is_enabled = parameter.is_enabled;

        if let EffectParams::Limiter(limiter) = &parameter.params
            && (parameter.is_new || limiter.statistics_reset)
        {
            self.statistics = LimiterStatistics::default();
        }

        if !(self.buffer_unmapped || parameter.is_new) {
            return None;
        }

        self.usage = UsageState::New;
        self.release_regions(mapper);

        let mut failure = None;
        for buffer in parameter.params.buffers(parameter.work_buffer) {
            match mapper.attach(buffer) {
                Ok(region) => self.regions.push(region),
                Err(info) => {
                    failure = Some(info);
                    break;
                }
            }
        }

        if failure.is_some() {
            self.release_regions(mapper);
        }
        self.buffer_unmapped = failure.is_some();
        failure
    }

    /// Builds the status reported to the guest.
    pub fn store_status(&self, renderer_active: bool, extended: bool) -> EffectOutStatus {
        let state = if renderer_active {
            if self.usage == UsageState::Disabled {
                EffectState::Disabled
            } else {
                EffectState::Enabled
            }
        } else if self.usage == UsageState::New {
            EffectState::Enabled
        } else {
            EffectState::Disabled
        };

        let limiter_statistics = (extended && self.effect_type() == EffectType::Limiter)
            .then_some(self.statistics);

        EffectOutStatus {
            state,
            limiter_statistics,
        }
    }

    /// Marks the effect as consumed by command generation.
    pub fn update_for_command_generation(&mut self) {
        self.usage = if self.is_enabled {
            UsageState::Used
        } else {
            UsageState::Disabled
        };
    }
}

/// The renderer's preallocated effect slots.
#[derive(Debug, Clone, Default)]
pub struct EffectContext {
    effects: Vec<Effect>,
}

impl EffectContext {
    /// Allocates `count` empty slots.
    pub fn new(count: usize) -> Self {
        Self {
            effects: vec![Effect::default(); count],
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether the renderer has no effect slots.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Slot `index`.
    pub fn get(&self, index: usize) -> Option<&Effect> {
        self.effects.get(index)
    }

    /// Mutable slot `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Effect> {
        self.effects.get_mut(index)
    }

    /// All slots in list order.
    pub fn iter(&self) -> std::slice::Iter<'_, Effect> {
        self.effects.iter()
    }

    /// Applies one parameter block per slot.
    ///
    /// A slot whose kind differs from its parameter is reset first. Mapping
    /// failures are recorded in `behaviour` and the slot is skipped; they do
    /// not fail the update.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn update<M: AddressMapper + ?Sized>(
        &mut self,
        parameters: &[EffectParameter],
        mapper: &mut M,
        behaviour: &mut BehaviourContext,
        renderer_active: bool,
    ) -> Result<Vec<EffectOutStatus>> {
        if parameters.len() != self.effects.len() {
            return Err(UpdateError::ParameterCount {
                kind: "effect",
                expected: self.effects.len(),
                given: parameters.len(),
            });
        }

        let extended = behaviour.is_effect_info_version2_supported();
        let mut statuses = Vec::with_capacity(parameters.len());

        for (index, (effect, parameter)) in self.effects.iter_mut().zip(parameters).enumerate() {
            if !effect.is_type_valid(parameter) {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    index,
                    from = ?effect.effect_type(),
                    to = ?parameter.effect_type(),
                    "effect kind changed, resetting slot"
                );
                effect.reset(mapper);
            }

            if let Some(info) = effect.update(parameter, mapper) {
                #[cfg(feature = "tracing")]
                tracing::warn!(index, address = info.extra, "effect buffer mapping failed");
                behaviour.append_error(info);
            }

            statuses.push(effect.store_status(renderer_active, extended));
        }

        Ok(statuses)
    }

    /// Releases every slot's mappings.
    pub fn release_all<M: AddressMapper + ?Sized>(&mut self, mapper: &mut M) {
        for effect in &mut self.effects {
            effect.reset(mapper);
        }
    }
}
