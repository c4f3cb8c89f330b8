//! Deterministic in-memory backend for tests and dry runs.
//!
//! [`MockBackend`] never touches a device. Buffers are held per voice until
//! the test completes them with [`complete_next`](MockBackend::complete_next)
//! (or out of order with [`complete_tag`](MockBackend::complete_tag)), or, in
//! auto-complete mode, until the next poll of a playing voice. A backend built
//! with [`with_stop_on_drain`](MockBackend::with_stop_on_drain) stops a voice
//! once its last pending buffer completes, like outputs that halt on
//! underrun. Clones share
//! state, so a test can keep one handle while the driver owns another.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{AudioBuffer, HardwareBackend, VoiceConfig, VoiceId};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct MockVoice {
    config: VoiceConfig,
    pending: VecDeque<AudioBuffer>,
    completed: Vec<u64>,
    playing: bool,
    volume: f32,
}

#[derive(Debug, Default)]
struct MockState {
    voices: HashMap<VoiceId, MockVoice>,
    next_voice: u64,
    auto_complete: bool,
    stop_on_drain: bool,
    released: bool,
}

/// In-memory [`HardwareBackend`].
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Creates a backend whose buffers complete only on request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that completes every pending buffer of a playing
    /// voice on each poll.
    pub fn with_auto_complete() -> Self {
        let backend = Self::new();
        backend.state.lock().auto_complete = true;
        backend
    }

    /// Creates a backend whose voices stop when their pending queue empties.
    pub fn with_stop_on_drain() -> Self {
        let backend = Self::new();
        backend.state.lock().stop_on_drain = true;
        backend
    }

    /// Completes the oldest pending buffer of `voice` and returns its tag.
    pub fn complete_next(&self, voice: VoiceId) -> Option<u64> {
        let mut state = self.state.lock();
        let stop_on_drain = state.stop_on_drain;
        let voice = state.voices.get_mut(&voice)?;
        let buffer = voice.pending.pop_front()?;
        voice.completed.push(buffer.tag);
        if stop_on_drain && voice.pending.is_empty() {
            voice.playing = false;
        }
        Some(buffer.tag)
    }

    /// Reports `tag` as completed without touching the pending queue.
    pub fn complete_tag(&self, voice: VoiceId, tag: u64) {
        if let Some(voice) = self.state.lock().voices.get_mut(&voice) {
            voice.completed.push(tag);
        }
    }

    /// Voices currently open, in opening order.
    pub fn voices(&self) -> Vec<VoiceId> {
        let mut voices: Vec<VoiceId> = self.state.lock().voices.keys().copied().collect();
        voices.sort();
        voices
    }

    /// Configuration a voice was opened with.
    pub fn voice_config(&self, voice: VoiceId) -> Option<VoiceConfig> {
        self.state.lock().voices.get(&voice).map(|v| v.config.clone())
    }

    /// Buffers submitted to `voice` and not yet completed.
    pub fn pending_count(&self, voice: VoiceId) -> usize {
        self.state
            .lock()
            .voices
            .get(&voice)
            .map_or(0, |v| v.pending.len())
    }

    /// Gain last set on `voice`.
    pub fn volume(&self, voice: VoiceId) -> Option<f32> {
        self.state.lock().voices.get(&voice).map(|v| v.volume)
    }

    /// Whether [`HardwareBackend::release`] was called.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl HardwareBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn open_voice(&self, config: &VoiceConfig) -> Result<VoiceId> {
        let mut state = self.state.lock();
        if state.released {
            return Err(Error::Disposed);
        }
        let id = VoiceId(state.next_voice);
        state.next_voice += 1;
        state.voices.insert(
            id,
            MockVoice {
                config: config.clone(),
                volume: 1.0,
                ..MockVoice::default()
            },
        );
        Ok(id)
    }

    fn close_voice(&self, voice: VoiceId) {
        self.state.lock().voices.remove(&voice);
    }

    fn submit(&self, voice: VoiceId, buffer: AudioBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .voices
            .get_mut(&voice)
            .ok_or(Error::UnknownVoice(voice))?;
        entry.pending.push_back(buffer);
        Ok(())
    }

    fn start(&self, voice: VoiceId) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .voices
            .get_mut(&voice)
            .ok_or(Error::UnknownVoice(voice))?;
        entry.playing = true;
        Ok(())
    }

    fn stop(&self, voice: VoiceId) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .voices
            .get_mut(&voice)
            .ok_or(Error::UnknownVoice(voice))?;
        entry.playing = false;
        Ok(())
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        self.state.lock().voices.get(&voice).is_some_and(|v| v.playing)
    }

    fn set_volume(&self, voice: VoiceId, volume: f32) {
        if let Some(entry) = self.state.lock().voices.get_mut(&voice) {
            entry.volume = volume;
        }
    }

    fn poll_completed(&self, voice: VoiceId) -> Vec<u64> {
        let mut state = self.state.lock();
        let auto_complete = state.auto_complete;
        let stop_on_drain = state.stop_on_drain;
        let Some(entry) = state.voices.get_mut(&voice) else {
            return Vec::new();
        };
        if auto_complete && entry.playing {
            let drained: Vec<u64> = entry.pending.drain(..).map(|b| b.tag).collect();
            entry.completed.extend(drained);
            if stop_on_drain {
                entry.playing = false;
            }
        }
        std::mem::take(&mut entry.completed)
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.voices.clear();
        state.released = true;
    }
}
