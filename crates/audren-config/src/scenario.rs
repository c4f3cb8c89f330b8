//! Simulation scenarios: an engine config, memory pools, and a list of frames.
//!
//! Each frame lists only the entities it configures. Effect and sink slots
//! that a frame does not mention are sent as empty slots; mixes it does not
//! mention are sent unused unless the frame is `dirty_only`, in which case only
//! the listed mixes are sent.
//!
//! ```toml
//! [config.renderer]
//! sub_mix_count = 2
//! effect_count = 1
//! sink_count = 1
//!
//! [[pools]]
//! cpu_address = 0x10000
//! dsp_address = 0x80000
//! size = 0x10000
//!
//! [[frames]]
//! repeat = 4
//!
//! [[frames.mixes]]
//! id = 0
//!
//! [[frames.mixes]]
//! id = 1
//! destination = 0
//!
//! [[frames.effects]]
//! slot = 0
//! kind = "delay"
//! mix = 1
//! order = 0
//! work_buffer = { address = 0x10000, size = 0x4000 }
//!
//! [[frames.sinks]]
//! slot = 0
//! kind = "device"
//! name = "MainAudioOut"
//! ```

use std::path::Path;

use audren_core::{
    AuxiliaryBufferParams, BiquadFilterParams, BufferDescriptor, BufferMixParams,
    CHANNEL_COUNT_MAX, ChannelLayout, CircularBufferParameter, DelayParams, DeviceParameter,
    DynamicsParams, EffectParameter, EffectParams, MIX_BUFFER_COUNT_MAX, MixParameter,
    ReverbParams, SinkConfig, SinkParameter, SplitterDestinationParameter, SplitterParameter,
    UNUSED_MIX_ID, UNUSED_SPLITTER_ID, UpdateInput,
};
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::error::{ConfigError, Result};

const IDENTITY_CHANNELS: [u8; CHANNEL_COUNT_MAX] = [0, 1, 2, 3, 4, 5];

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_volume() -> f32 {
    1.0
}

fn default_channels() -> u32 {
    2
}

/// A guest memory range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSpec {
    /// Guest address.
    pub address: u64,
    /// Size in bytes.
    pub size: u64,
}

impl From<BufferSpec> for BufferDescriptor {
    fn from(spec: BufferSpec) -> Self {
        BufferDescriptor {
            address: spec.address,
            size: spec.size,
        }
    }
}

/// A memory pool registered with the renderer's mapper before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Guest base address.
    pub cpu_address: u64,
    /// DSP-side base address.
    pub dsp_address: u64,
    /// Size in bytes.
    pub size: u64,
}

/// One mix entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixSpec {
    /// Mix id (0 is the final mix).
    pub id: i32,
    /// Whether the mix is active.
    #[serde(default = "default_true")]
    pub used: bool,
    /// Direct destination mix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<i32>,
    /// Splitter the mix feeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splitter: Option<u32>,
    /// Mix buffers owned.
    #[serde(default = "default_one")]
    pub buffer_count: u32,
    /// Output gain.
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Diagnostics id.
    #[serde(default)]
    pub node_id: u32,
}

impl MixSpec {
    fn to_parameter(&self, sample_rate: u32) -> MixParameter {
        MixParameter {
            is_used: self.used,
            sample_rate,
            buffer_count: self.buffer_count,
            volume: self.volume,
            node_id: self.node_id,
            destination_mix_id: self.destination.unwrap_or(UNUSED_MIX_ID),
            destination_splitter_id: self.splitter.unwrap_or(UNUSED_SPLITTER_ID),
            ..MixParameter::new(self.id)
        }
    }
}

/// One splitter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterSpec {
    /// Splitter slot.
    pub id: u32,
    /// Destination slots, in routing order.
    #[serde(default)]
    pub destinations: Vec<u32>,
}

/// One splitter destination entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationSpec {
    /// Destination slot.
    pub id: u32,
    /// Mix fed by this destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix: Option<i32>,
    /// Whether the destination is active.
    #[serde(default = "default_true")]
    pub used: bool,
    /// Gain applied to every mix buffer.
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl DestinationSpec {
    fn to_parameter(&self) -> SplitterDestinationParameter {
        SplitterDestinationParameter {
            is_used: self.used,
            volumes: [self.volume; MIX_BUFFER_COUNT_MAX],
            ..SplitterDestinationParameter::new(self.id, self.mix.unwrap_or(UNUSED_MIX_ID))
        }
    }
}

/// Effect kinds accepted in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Volume-weighted buffer copy.
    BufferMix,
    /// Send/return through guest rings.
    AuxiliaryBuffer,
    /// Feedback delay.
    Delay,
    /// Classic reverb.
    Reverb,
    /// I3DL2 reverb.
    Reverb3d,
    /// Biquad filter.
    BiquadFilter,
    /// Peak limiter.
    Limiter,
    /// Capture ring.
    CaptureBuffer,
    /// Compressor.
    Compressor,
}

/// One effect entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    /// Effect slot.
    pub slot: u32,
    /// Effect kind.
    pub kind: EffectKind,
    /// Owning mix id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix: Option<i32>,
    /// Position in the owning mix's chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    /// Whether the effect is processed.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether work buffers are (re)mapped this frame.
    #[serde(default = "default_true")]
    pub new: bool,
    /// Channels processed.
    #[serde(default = "default_channels")]
    pub channels: u32,
    /// DSP work buffer.
    #[serde(default)]
    pub work_buffer: BufferSpec,
    /// Send ring (auxiliary and capture kinds).
    #[serde(default)]
    pub send_buffer: BufferSpec,
    /// Return ring (auxiliary kind).
    #[serde(default)]
    pub return_buffer: BufferSpec,
    /// Delay time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u32>,
    /// Reverb decay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_ms: Option<u32>,
    /// Whether limiter statistics are collected.
    #[serde(default)]
    pub statistics: bool,
}

impl EffectSpec {
    fn to_parameter(&self, sample_rate: u32) -> EffectParameter {
        let channels = ChannelLayout::new(self.channels, self.channels);
        let params = match self.kind {
            EffectKind::BufferMix => {
                let count = (self.channels as usize).min(MIX_BUFFER_COUNT_MAX);
                let mut p = BufferMixParams {
                    mix_count: count as u32,
                    ..BufferMixParams::default()
                };
                for i in 0..count {
                    p.input[i] = i as u8;
                    p.output[i] = i as u8;
                    p.volumes[i] = 1.0;
                }
                EffectParams::BufferMix(p)
            }
            EffectKind::AuxiliaryBuffer | EffectKind::CaptureBuffer => {
                let p = AuxiliaryBufferParams {
                    channels,
                    send_buffer: self.send_buffer.into(),
                    return_buffer: self.return_buffer.into(),
                    sample_rate,
                };
                if self.kind == EffectKind::AuxiliaryBuffer {
                    EffectParams::AuxiliaryBuffer(p)
                } else {
                    EffectParams::CaptureBuffer(p)
                }
            }
            EffectKind::Delay => {
                let delay = self.delay_ms.unwrap_or(100);
                EffectParams::Delay(DelayParams {
                    channels,
                    delay_time_max_ms: delay.max(1000),
                    delay_time_ms: delay,
                    feedback_gain: 0.5,
                    dry_gain: 1.0,
                })
            }
            EffectKind::Reverb | EffectKind::Reverb3d => {
                let p = ReverbParams {
                    channels,
                    decay_time_ms: self.decay_ms.unwrap_or(1500),
                    dry_gain: 1.0,
                };
                if self.kind == EffectKind::Reverb {
                    EffectParams::Reverb(p)
                } else {
                    EffectParams::Reverb3d(p)
                }
            }
            EffectKind::BiquadFilter => EffectParams::BiquadFilter(BiquadFilterParams {
                channels,
                numerator: [16384, 0, 0],
                denominator: [0, 0],
            }),
            EffectKind::Limiter | EffectKind::Compressor => {
                let p = DynamicsParams {
                    channels,
                    threshold: -6.0,
                    ratio: 4.0,
                    statistics_enabled: self.statistics,
                    statistics_reset: false,
                };
                if self.kind == EffectKind::Limiter {
                    EffectParams::Limiter(p)
                } else {
                    EffectParams::Compressor(p)
                }
            }
        };

        let mut parameter = EffectParameter::new(params);
        parameter.is_new = self.new;
        parameter.is_enabled = self.enabled;
        if let Some(mix) = self.mix {
            parameter.mix_id = mix;
        }
        if let Some(order) = self.order {
            parameter.processing_order = order;
        }
        parameter.work_buffer = self.work_buffer.into();
        parameter
    }
}

/// Sink kinds accepted in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Hardware output.
    Device,
    /// Guest ring buffer.
    CircularBuffer,
}

/// One sink entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSpec {
    /// Sink slot.
    pub slot: u32,
    /// Sink kind.
    pub kind: SinkKind,
    /// Whether the sink is active.
    #[serde(default = "default_true")]
    pub used: bool,
    /// Diagnostics id.
    #[serde(default)]
    pub node_id: u32,
    /// Device name (device kind).
    #[serde(default)]
    pub name: String,
    /// Final-mix buffers consumed.
    #[serde(default = "default_channels")]
    pub input_count: u32,
    /// Whether the 6-to-2 down-mix is applied (device kind).
    #[serde(default)]
    pub downmix: bool,
    /// Guest ring (circular buffer kind).
    #[serde(default)]
    pub buffer: BufferSpec,
}

impl SinkSpec {
    fn to_parameter(&self, sample_rate: u32, sample_count: u32) -> SinkParameter {
        let config = match self.kind {
            SinkKind::Device => SinkConfig::Device(DeviceParameter {
                name: self.name.clone(),
                input_count: self.input_count,
                inputs: IDENTITY_CHANNELS,
                downmix_enabled: self.downmix,
                downmix_coefficients: [1.0, 0.707, 0.251, 0.707],
            }),
            SinkKind::CircularBuffer => SinkConfig::CircularBuffer(CircularBufferParameter {
                buffer: self.buffer.into(),
                input_count: self.input_count,
                inputs: IDENTITY_CHANNELS,
                sample_count,
                sample_rate,
            }),
        };
        SinkParameter {
            is_used: self.used,
            node_id: self.node_id,
            config,
        }
    }
}

/// One scenario frame, possibly repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    /// How many consecutive frames use these parameters.
    #[serde(default = "default_one")]
    pub repeat: u32,
    /// Per-update behaviour flags.
    #[serde(default)]
    pub behaviour_flags: u64,
    /// Send only the listed mixes.
    #[serde(default)]
    pub dirty_only: bool,
    /// Mixes.
    #[serde(default)]
    pub mixes: Vec<MixSpec>,
    /// Splitters.
    #[serde(default)]
    pub splitters: Vec<SplitterSpec>,
    /// Splitter destinations.
    #[serde(default)]
    pub destinations: Vec<DestinationSpec>,
    /// Effects.
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
    /// Sinks.
    #[serde(default)]
    pub sinks: Vec<SinkSpec>,
}

/// Renderer parameters for one frame, owned so an [`UpdateInput`] can borrow them.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Per-update behaviour flags.
    pub behaviour_flags: u64,
    /// One entry per effect slot.
    pub effects: Vec<EffectParameter>,
    /// Splitters to re-link.
    pub splitters: Vec<SplitterParameter>,
    /// Splitter destinations.
    pub splitter_destinations: Vec<SplitterDestinationParameter>,
    /// Mix parameters.
    pub mixes: Vec<MixParameter>,
    /// One entry per sink slot.
    pub sinks: Vec<SinkParameter>,
}

impl Frame {
    /// Borrows the frame as renderer input.
    pub fn input(&self) -> UpdateInput<'_> {
        UpdateInput {
            behaviour_flags: self.behaviour_flags,
            effects: &self.effects,
            splitters: &self.splitters,
            splitter_destinations: &self.splitter_destinations,
            mixes: &self.mixes,
            sinks: &self.sinks,
        }
    }
}

/// A complete simulation description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Engine limits and driver settings.
    #[serde(default)]
    pub config: EngineConfig,
    /// Memory pools registered before the first frame.
    #[serde(default)]
    pub pools: Vec<PoolSpec>,
    /// Frames, in order.
    #[serde(default)]
    pub frames: Vec<FrameSpec>,
}

impl Scenario {
    /// Load a scenario from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a scenario from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Convert the scenario to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Frames after expanding `repeat`.
    pub fn frame_count(&self) -> usize {
        self.frames.iter().map(|f| f.repeat as usize).sum()
    }

    /// Builds renderer input for every frame, expanding `repeat`.
    ///
    /// Fails when an entry addresses a slot outside the configured limits.
    pub fn frames(&self) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(self.frame_count());
        for (index, spec) in self.frames.iter().enumerate() {
            let frame = self.build_frame(index, spec)?;
            for _ in 0..spec.repeat {
                frames.push(frame.clone());
            }
        }
        Ok(frames)
    }

    fn build_frame(&self, index: usize, spec: &FrameSpec) -> Result<Frame> {
        let renderer = &self.config.renderer;
        let sample_rate = renderer.sample_rate;
        let mix_count = renderer.to_parameters().mix_count();

        let mixes = if spec.dirty_only {
            spec.mixes
                .iter()
                .map(|m| m.to_parameter(sample_rate))
                .collect()
        } else {
            let mut mixes: Vec<MixParameter> = (0..mix_count)
                .map(|id| MixParameter {
                    is_used: false,
                    ..MixParameter::new(id as i32)
                })
                .collect();
            for mix in &spec.mixes {
                let slot = usize::try_from(mix.id)
                    .ok()
                    .filter(|&slot| slot < mix_count)
                    .ok_or_else(|| {
                        ConfigError::invalid_frame(index, format!("mix id {} out of range", mix.id))
                    })?;
                mixes[slot] = mix.to_parameter(sample_rate);
            }
            mixes
        };

        let mut effects = vec![EffectParameter::default(); renderer.effect_count as usize];
        for effect in &spec.effects {
            let slot = effects.get_mut(effect.slot as usize).ok_or_else(|| {
                ConfigError::invalid_frame(index, format!("effect slot {} out of range", effect.slot))
            })?;
            *slot = effect.to_parameter(sample_rate);
        }

        let mut sinks = vec![SinkParameter::default(); renderer.sink_count as usize];
        for sink in &spec.sinks {
            let slot = sinks.get_mut(sink.slot as usize).ok_or_else(|| {
                ConfigError::invalid_frame(index, format!("sink slot {} out of range", sink.slot))
            })?;
            *slot = sink.to_parameter(sample_rate, renderer.sample_count);
        }

        Ok(Frame {
            behaviour_flags: spec.behaviour_flags,
            effects,
            splitters: spec
                .splitters
                .iter()
                .map(|s| SplitterParameter {
                    id: s.id,
                    sample_rate,
                    destination_ids: s.destinations.clone(),
                })
                .collect(),
            splitter_destinations: spec.destinations.iter().map(DestinationSpec::to_parameter).collect(),
            mixes,
            sinks,
        })
    }
}
