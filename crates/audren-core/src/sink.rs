//! Terminal graph nodes.
//!
//! A [`Sink`] consumes the final mix. Two kinds exist: a device sink feeding a
//! hardware output (optionally through an upsampler and a down-mix), and a
//! circular buffer sink that writes PCM16 into a guest-owned ring.
//!
//! # State machine
//!
//! ```text
//!   Unused ──(is_used)──▶ Used ──(!is_used)──▶ Unused
//!                          │
//!                          └─ mapping failed: Used + should_skip, retried next frame
//! ```
//!
//! The parameter's kind is checked before anything is touched; a mismatch is
//! reported as [`SinkTypeMismatch`] and the sink is left as it was.
//!
//! A used parameter whose channel count exceeds [`CHANNEL_COUNT_MAX`] or whose
//! input indices fall outside the mix buffers is rejected with an
//! [`ErrorCode::InvalidUpdateInfo`] info; the sink keeps its previous state.
//!
//! Circular buffer sinks report a write offset that lags by one
//! [`Sink::update_for_command_generation`] call, so the guest never reads the
//! frame currently being written.

use crate::behaviour::BehaviourContext;
use crate::constants::{
    CHANNEL_COUNT_MAX, MIX_BUFFER_COUNT_MAX, TARGET_SAMPLE_RATE, TARGET_SAMPLE_SIZE,
};
use crate::error::{ErrorCode, ErrorInfo, Result, UpdateError};
use crate::memory::{AddressMapper, BufferDescriptor, MappedRegion};
use crate::upsampler::{UpsamplerId, UpsamplerPool};
use thiserror::Error;

/// Sink kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SinkType {
    /// Empty slot.
    #[default]
    Invalid,
    /// Hardware output.
    Device,
    /// Guest ring buffer.
    CircularBuffer,
}

/// Device sink parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceParameter {
    /// Output device name.
    pub name: String,
    /// Number of final-mix buffers consumed.
    pub input_count: u32,
    /// Final-mix buffer index per channel.
    pub inputs: [u8; CHANNEL_COUNT_MAX],
    /// Whether the 6-to-2 down-mix is applied.
    pub downmix_enabled: bool,
    /// Down-mix coefficients (front, center, LFE, back).
    pub downmix_coefficients: [f32; 4],
}

/// Circular buffer sink parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CircularBufferParameter {
    /// The guest ring.
    pub buffer: BufferDescriptor,
    /// Number of final-mix buffers written per frame.
    pub input_count: u32,
    /// Final-mix buffer index per channel.
    pub inputs: [u8; CHANNEL_COUNT_MAX],
    /// Samples per channel per frame.
    pub sample_count: u32,
    /// Sample rate of the written data.
    pub sample_rate: u32,
}

/// Kind-specific sink parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SinkConfig {
    /// Empty slot.
    #[default]
    Invalid,
    /// See [`SinkType::Device`].
    Device(DeviceParameter),
    /// See [`SinkType::CircularBuffer`].
    CircularBuffer(CircularBufferParameter),
}

fn inputs_valid(input_count: u32, inputs: &[u8; CHANNEL_COUNT_MAX]) -> bool {
    input_count as usize <= CHANNEL_COUNT_MAX
        && inputs[..input_count as usize]
            .iter()
            .all(|&index| (index as usize) < MIX_BUFFER_COUNT_MAX)
}

impl SinkConfig {
    /// Whether the channel count and input indices are within limits.
    pub fn is_channel_layout_valid(&self) -> bool {
        match self {
            Self::Invalid => true,
            Self::Device(p) => inputs_valid(p.input_count, &p.inputs),
            Self::CircularBuffer(p) => inputs_valid(p.input_count, &p.inputs),
        }
    }

    /// Kind tag of the payload.
    pub fn sink_type(&self) -> SinkType {
        match self {
            Self::Invalid => SinkType::Invalid,
            Self::Device(_) => SinkType::Device,
            Self::CircularBuffer(_) => SinkType::CircularBuffer,
        }
    }
}

/// One frame's parameters for a sink slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SinkParameter {
    /// Whether the sink is active.
    pub is_used: bool,
    /// Diagnostics correlation id.
    pub node_id: u32,
    /// Kind-specific payload.
    pub config: SinkConfig,
}

impl SinkParameter {
    /// Kind tag of the payload.
    pub fn sink_type(&self) -> SinkType {
        self.config.sink_type()
    }
}

/// Status written back to the guest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkOutStatus {
    /// Byte offset up to which a circular buffer is safe to read.
    pub last_written_offset: u64,
}

/// Returned when a parameter's kind differs from the sink it was sent to.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("sink is {expected:?} but parameter is {found:?}")]
pub struct SinkTypeMismatch {
    /// Kind of the sink.
    pub expected: SinkType,
    /// Kind of the parameter.
    pub found: SinkType,
}

/// Device sink state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceSink {
    parameter: DeviceParameter,
    upsampler: Option<UpsamplerId>,
}

impl DeviceSink {
    /// Current parameters.
    pub fn parameter(&self) -> &DeviceParameter {
        &self.parameter
    }

    /// Upsampler assigned during command generation, if the renderer rate
    /// differs from the target rate.
    pub fn upsampler(&self) -> Option<UpsamplerId> {
        self.upsampler
    }
}

/// Circular buffer sink state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CircularBufferSink {
    parameter: CircularBufferParameter,
    region: Option<MappedRegion>,
    old_written_offset: u64,
    last_written_offset: u64,
}

impl CircularBufferSink {
    /// Current parameters.
    pub fn parameter(&self) -> &CircularBufferParameter {
        &self.parameter
    }

    /// The mapped ring, when mapping succeeded.
    pub fn region(&self) -> Option<&MappedRegion> {
        self.region.as_ref()
    }

    /// Offset the next frame will be written at.
    pub fn write_offset(&self) -> u64 {
        self.old_written_offset
    }

    /// Offset reported to the guest.
    pub fn last_written_offset(&self) -> u64 {
        self.last_written_offset
    }

    fn advance(&mut self) {
        let frame_size = u64::from(TARGET_SAMPLE_SIZE)
            .saturating_mul(u64::from(self.parameter.sample_count))
            .saturating_mul(u64::from(self.parameter.input_count));
        let size = self.region.map_or(self.parameter.buffer.size, |r| r.size);

        self.last_written_offset = self.old_written_offset;
        self.old_written_offset = if size > 0 {
            ((u128::from(self.old_written_offset) + u128::from(frame_size)) % u128::from(size))
                as u64
        } else {
            self.old_written_offset.wrapping_add(frame_size)
        };
    }
}

/// Kind-specific sink state.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SinkKind {
    /// Empty slot.
    #[default]
    Invalid,
    /// See [`DeviceSink`].
    Device(DeviceSink),
    /// See [`CircularBufferSink`].
    CircularBuffer(CircularBufferSink),
}

/// Result of a successful [`Sink::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkUpdate {
    /// Status for the guest.
    pub status: SinkOutStatus,
    /// Mapping failure recorded this frame.
    pub error: Option<ErrorInfo>,
}

/// One sink slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sink {
    is_used: bool,
    should_skip: bool,
    node_id: u32,
    kind: SinkKind,
}

impl Sink {
    /// A fresh, unused sink of the given kind.
    pub fn new(sink_type: SinkType) -> Self {
        let kind = match sink_type {
            SinkType::Invalid => SinkKind::Invalid,
            SinkType::Device => SinkKind::Device(DeviceSink::default()),
            SinkType::CircularBuffer => SinkKind::CircularBuffer(CircularBufferSink::default()),
        };
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Kind of this slot.
    pub fn sink_type(&self) -> SinkType {
        match self.kind {
            SinkKind::Invalid => SinkType::Invalid,
            SinkKind::Device(_) => SinkType::Device,
            SinkKind::CircularBuffer(_) => SinkType::CircularBuffer,
        }
    }

    /// Whether the sink is active.
    pub fn is_used(&self) -> bool {
        self.is_used
    }

    /// Whether the sink is active but inert because its memory is unmapped.
    pub fn should_skip(&self) -> bool {
        self.should_skip
    }

    /// Diagnostics correlation id.
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Kind-specific state.
    pub fn kind(&self) -> &SinkKind {
        &self.kind
    }

    /// Releases mappings and upsamplers held by the sink.
    pub fn cleanup<M: AddressMapper + ?Sized>(
        &mut self,
        mapper: &mut M,
        upsamplers: &mut UpsamplerPool,
    ) {
        match &mut self.kind {
            SinkKind::Invalid => {}
            SinkKind::Device(device) => {
                if let Some(id) = device.upsampler.take() {
                    upsamplers.release(id);
                }
            }
            SinkKind::CircularBuffer(ring) => {
                if let Some(region) = ring.region.take() {
                    mapper.release(region);
                }
            }
        }
    }

    /// Applies one frame's parameters.
    pub fn update<M: AddressMapper + ?Sized>(
        &mut self,
        parameter: &SinkParameter,
        mapper: &mut M,
        upsamplers: &mut UpsamplerPool,
    ) -> std::result::Result<SinkUpdate, SinkTypeMismatch> {
        if parameter.sink_type() != self.sink_type() {
            return Err(SinkTypeMismatch {
                expected: self.sink_type(),
                found: parameter.sink_type(),
            });
        }

        let mut update = SinkUpdate::default();
        if let SinkKind::CircularBuffer(ring) = &self.kind {
            update.status.last_written_offset = ring.last_written_offset;
        }

        if parameter.is_used && !parameter.config.is_channel_layout_valid() {
            #[cfg(feature = "tracing")]
            tracing::warn!(node = parameter.node_id, "sink channel layout out of range");
            update.error = Some(ErrorInfo::new(
                ErrorCode::InvalidUpdateInfo,
                u64::from(parameter.node_id),
            ));
            return Ok(update);
        }

        let edge = parameter.is_used != self.is_used;

        if edge && !parameter.is_used {
            self.cleanup(mapper, upsamplers);
            self.should_skip = false;
        }

        match (&mut self.kind, &parameter.config) {
            (SinkKind::Device(device), SinkConfig::Device(p)) => {
                if edge {
                    device.parameter = p.clone();
                } else {
                    device.parameter.downmix_enabled = p.downmix_enabled;
                    device.parameter.downmix_coefficients = p.downmix_coefficients;
                }
            }
            (SinkKind::CircularBuffer(ring), SinkConfig::CircularBuffer(p)) => {
                let remap = parameter.is_used && (edge || self.should_skip);
                ring.parameter = *p;
                if remap {
                    if let Some(region) = ring.region.take() {
                        mapper.release(region);
                    }
                    ring.old_written_offset = 0;
                    ring.last_written_offset = 0;
                    match mapper.attach(p.buffer) {
                        Ok(region) => {
                            ring.region = Some(region);
                            self.should_skip = false;
                        }
                        Err(info) => {
                            self.should_skip = true;
                            update.error = Some(info);
                        }
                    }
                }
                update.status.last_written_offset = ring.last_written_offset;
            }
            _ => {}
        }

        if edge {
            self.is_used = parameter.is_used;
            self.node_id = parameter.node_id;
        }

        Ok(update)
    }

    /// Assigns an upsampler when the renderer runs at a rate other than the
    /// target rate. Returns the assigned upsampler, if any.
    pub fn prepare_upsampler(
        &mut self,
        renderer_sample_rate: u32,
        upsamplers: &mut UpsamplerPool,
    ) -> std::result::Result<Option<UpsamplerId>, ErrorInfo> {
        let SinkKind::Device(device) = &mut self.kind else {
            return Ok(None);
        };
        if renderer_sample_rate == TARGET_SAMPLE_RATE {
            return Ok(device.upsampler);
        }
        if device.upsampler.is_none() {
            device.upsampler = Some(
                upsamplers
                    .allocate()
                    .ok_or(ErrorInfo::new(ErrorCode::OutOfResource, u64::from(self.node_id)))?,
            );
        }
        Ok(device.upsampler)
    }

    /// Advances the circular buffer write cursor by one frame.
    pub fn update_for_command_generation(&mut self) {
        if let SinkKind::CircularBuffer(ring) = &mut self.kind {
            ring.advance();
        }
    }
}

/// The renderer's preallocated sinks and their upsampler pool.
#[derive(Clone, Debug, Default)]
pub struct SinkContext {
    sinks: Vec<Sink>,
    upsamplers: UpsamplerPool,
}

impl SinkContext {
    /// Allocates `count` empty sinks and one upsampler per sink.
    pub fn new(count: usize) -> Self {
        Self {
            sinks: vec![Sink::default(); count],
            upsamplers: UpsamplerPool::new(count),
        }
    }

    /// Number of sink slots.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no sink slots.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Sink `index`.
    pub fn get(&self, index: usize) -> Option<&Sink> {
        self.sinks.get(index)
    }

    /// All sinks.
    pub fn iter(&self) -> std::slice::Iter<'_, Sink> {
        self.sinks.iter()
    }

    /// The upsampler pool.
    pub fn upsamplers(&self) -> &UpsamplerPool {
        &self.upsamplers
    }

    /// Applies one parameter block per sink.
    ///
    /// A sink whose kind differs from its parameter is cleaned up and
    /// replaced with a fresh sink of the parameter's kind before updating.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn update<M: AddressMapper + ?Sized>(
        &mut self,
        parameters: &[SinkParameter],
        mapper: &mut M,
        behaviour: &mut BehaviourContext,
    ) -> Result<Vec<SinkOutStatus>> {
        if parameters.len() != self.sinks.len() {
            return Err(UpdateError::ParameterCount {
                kind: "sink",
                expected: self.sinks.len(),
                given: parameters.len(),
            });
        }

        let mut statuses = Vec::with_capacity(parameters.len());
        for (sink, parameter) in self.sinks.iter_mut().zip(parameters) {
            if sink.sink_type() != parameter.sink_type() {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    node = parameter.node_id,
                    from = ?sink.sink_type(),
                    to = ?parameter.sink_type(),
                    "sink kind changed, resetting slot"
                );
                sink.cleanup(mapper, &mut self.upsamplers);
                *sink = Sink::new(parameter.sink_type());
            }

            match sink.update(parameter, mapper, &mut self.upsamplers) {
                Ok(update) => {
                    if let Some(info) = update.error {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            node = parameter.node_id,
                            extra = info.extra,
                            "sink update failed"
                        );
                        behaviour.append_error(info);
                    }
                    statuses.push(update.status);
                }
                Err(mismatch) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%mismatch, "sink update skipped");
                    statuses.push(SinkOutStatus::default());
                }
            }
        }
        Ok(statuses)
    }

    /// Assigns an upsampler to sink `index` if the renderer rate requires it.
    pub fn prepare_upsampler(
        &mut self,
        index: usize,
        renderer_sample_rate: u32,
    ) -> std::result::Result<Option<UpsamplerId>, ErrorInfo> {
        match self.sinks.get_mut(index) {
            Some(sink) => sink.prepare_upsampler(renderer_sample_rate, &mut self.upsamplers),
            None => Ok(None),
        }
    }

    /// Advances sink `index` past one generated frame.
    pub fn update_for_command_generation(&mut self, index: usize) {
        if let Some(sink) = self.sinks.get_mut(index) {
            sink.update_for_command_generation();
        }
    }

    /// Releases every sink's mappings and upsamplers.
    pub fn release_all<M: AddressMapper + ?Sized>(&mut self, mapper: &mut M) {
        for sink in &mut self.sinks {
            sink.cleanup(mapper, &mut self.upsamplers);
        }
    }
}
