//! Audren Core - mix/effect/sink graph engine for an audio renderer
//!
//! Each frame a guest describes its mixing graph declaratively: mixing buses
//! ("mixes"), effects attached to them, splitters fanning a bus out to several
//! destinations, and terminal sinks. This crate validates that description,
//! keeps the routing graph acyclic and ordered, and produces a render plan a
//! processing stage can execute deterministically.
//!
//! # Core Abstractions
//!
//! ## Renderer
//!
//! - [`AudioRenderer`] - owns every context; applies an [`UpdateInput`] and
//!   emits a [`RenderPlan`]
//! - [`BehaviourContext`] - revision-gated features and absorbed error infos
//!
//! ## Graph
//!
//! - [`MixContext`] / [`Mix`] - mixes, dirty tracking, processing order
//! - [`EdgeMatrix`] - one outgoing edge per mix
//! - [`CommandOrdering`] - topological sort that fails closed on cycles
//! - [`SplitterContext`] - fan-out nodes with `has_new_connection` flags
//!
//! ## Entities
//!
//! - [`EffectContext`] / [`Effect`] - closed set of effect kinds
//! - [`SinkContext`] / [`Sink`] - device and circular-buffer sinks
//!
//! ## Memory
//!
//! - [`AddressMapper`] - guest buffer translation seam
//! - [`PoolMapper`] - mapper backed by registered memory pools
//!
//! # Errors
//!
//! Per-entity failures (an unmappable work buffer, an exhausted upsampler
//! pool) become [`ErrorInfo`]s and the entity is skipped for the frame.
//! Structural failures ([`UpdateError`]) abort the update call.
//!
//! # Features
//!
//! - `tracing` (default) - log sites through the `tracing` facade

pub mod behaviour;
pub mod constants;
pub mod effect;
pub mod error;
pub mod graph;
pub mod memory;
pub mod mix;
pub mod plan;
pub mod renderer;
pub mod sink;
pub mod splitter;
pub mod upsampler;

pub use behaviour::{BehaviourContext, LAST_REVISION, REVISION_MAGIC};
pub use constants::{
    CHANNEL_COUNT_MAX, FINAL_MIX_ID, MIX_BUFFER_COUNT_MAX, TARGET_SAMPLE_RATE, UNUSED_MIX_ID,
    UNUSED_SPLITTER_ID,
};
pub use effect::{
    AuxiliaryBufferParams, BiquadFilterParams, BufferMixParams, ChannelLayout, DelayParams,
    DynamicsParams, Effect, EffectContext, EffectOutStatus, EffectParameter, EffectParams,
    EffectState, EffectType, LimiterStatistics, ReverbParams, UsageState,
};
pub use error::{ErrorCode, ErrorInfo, Result, UpdateError};
pub use graph::{CommandOrdering, EdgeMatrix, GraphError};
pub use memory::{AddressMapper, BufferDescriptor, MappedRegion, PoolMapper};
pub use mix::{Mix, MixContext, MixParameter};
pub use plan::{RenderPlan, RenderStep};
pub use renderer::{AudioRenderer, RendererParameters, UpdateInput, UpdateOutput};
pub use sink::{
    CircularBufferParameter, DeviceParameter, Sink, SinkConfig, SinkContext, SinkOutStatus,
    SinkParameter, SinkType,
};
pub use splitter::{SplitterContext, SplitterDestinationParameter, SplitterParameter};
pub use upsampler::{UpsamplerId, UpsamplerPool};
