//! Pluggable hardware backend abstraction.
//!
//! A [`HardwareBackend`] plays interleaved PCM16 buffers on voices. Sessions
//! submit buffers in order and poll for the tags of buffers the backend has
//! finished; the backend must report completions in submission order.
//!
//! ```text
//! HardwareDeviceSession ──submit──▶ HardwareBackend ──▶ device
//!          ▲                              │
//!          └──────── poll_completed ──────┘
//! ```
//!
//! The trait is object-safe so the driver can hold an `Arc<dyn HardwareBackend>`
//! chosen at runtime. All methods take `&self`; implementations synchronize
//! internally because the polling thread and the submitting threads call in
//! concurrently.

use crate::Result;

/// Identifies a voice opened on a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

/// Configuration for opening a voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channels per frame.
    pub channel_count: u16,
    /// Optional device name filter (uses the default device if `None`).
    pub device_name: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: audren_core::TARGET_SAMPLE_RATE,
            channel_count: 2,
            device_name: None,
        }
    }
}

/// A buffer of interleaved PCM16 samples with a caller-chosen tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    /// Opaque tag reported back on completion.
    pub tag: u64,
    /// Interleaved samples.
    pub samples: Vec<i16>,
}

impl AudioBuffer {
    /// Creates a buffer.
    pub fn new(tag: u64, samples: Vec<i16>) -> Self {
        Self { tag, samples }
    }

    /// Samples per channel for the given channel count.
    pub fn frame_count(&self, channel_count: u16) -> u64 {
        (self.samples.len() / usize::from(channel_count.max(1))) as u64
    }
}

/// Pluggable hardware output.
pub trait HardwareBackend: Send + Sync {
    /// Human-readable name of this backend (e.g., "cpal", "mock").
    fn name(&self) -> &str;

    /// Opens a paused voice.
    fn open_voice(&self, config: &VoiceConfig) -> Result<VoiceId>;

    /// Closes a voice, dropping any buffers it still holds.
    fn close_voice(&self, voice: VoiceId);

    /// Appends a buffer to the voice's playback queue.
    fn submit(&self, voice: VoiceId, buffer: AudioBuffer) -> Result<()>;

    /// Starts or resumes playback.
    fn start(&self, voice: VoiceId) -> Result<()>;

    /// Pauses playback. Queued buffers are kept.
    fn stop(&self, voice: VoiceId) -> Result<()>;

    /// Whether the voice is producing output. Some outputs stop by
    /// themselves once their queue runs dry.
    fn is_playing(&self, voice: VoiceId) -> bool;

    /// Sets the linear output gain.
    fn set_volume(&self, voice: VoiceId, volume: f32);

    /// Tags of buffers finished since the last poll, in completion order.
    fn poll_completed(&self, voice: VoiceId) -> Vec<u64>;

    /// Releases backend-wide resources. Called once, after every voice closed.
    fn release(&self) {}
}
