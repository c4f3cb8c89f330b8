//! One output track bound to a backend voice.
//!
//! A session keeps the FIFO of buffers it has handed to the backend. The
//! backend reports completions by tag; [`HardwareDeviceSession::update`] pops
//! the matching FIFO head and credits its frames to the played-sample counter.
//! The polling thread is the only caller of `update`, so the counter only
//! ever grows in submission order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use audren_core::constants::is_channel_count_valid;
use parking_lot::Mutex;

use crate::backend::{AudioBuffer, HardwareBackend, VoiceConfig, VoiceId};
use crate::{Error, Result};

/// Default cap on buffers in flight per session.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Parameters for opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channels per frame (1, 2, 4 or 6).
    pub channel_count: u16,
    /// Maximum buffers in flight before `queue_buffer` refuses more.
    pub queue_capacity: usize,
    /// Optional output device name filter.
    pub device_name: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: audren_core::TARGET_SAMPLE_RATE,
            channel_count: 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            device_name: None,
        }
    }
}

impl SessionConfig {
    fn voice_config(&self) -> VoiceConfig {
        VoiceConfig {
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
            device_name: self.device_name.clone(),
        }
    }
}

#[derive(Debug)]
struct PendingBuffer {
    tag: u64,
    frames: u64,
}

#[derive(Debug)]
struct SessionState {
    queue: VecDeque<PendingBuffer>,
    volume: f32,
    active: bool,
    played_sample_count: u64,
    anomaly_count: u64,
}

/// A hardware output track.
pub struct HardwareDeviceSession {
    backend: Arc<dyn HardwareBackend>,
    voice: VoiceId,
    config: SessionConfig,
    state: Mutex<SessionState>,
    disposed: AtomicBool,
}

impl HardwareDeviceSession {
    /// Opens a voice on `backend` and wraps it in an inactive session.
    pub fn new(backend: Arc<dyn HardwareBackend>, config: SessionConfig) -> Result<Self> {
        if !is_channel_count_valid(u32::from(config.channel_count)) {
            return Err(Error::UnsupportedChannelCount(config.channel_count));
        }
        let voice = backend.open_voice(&config.voice_config())?;
        tracing::debug!(
            voice = voice.0,
            backend = backend.name(),
            "hardware session opened"
        );
        Ok(Self {
            backend,
            voice,
            config,
            state: Mutex::new(SessionState {
                queue: VecDeque::new(),
                volume: 1.0,
                active: false,
                played_sample_count: 0,
                anomaly_count: 0,
            }),
            disposed: AtomicBool::new(false),
        })
    }

    /// Backend voice this session plays on.
    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    /// Configuration the session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    /// Submits a buffer for playback.
    ///
    /// Fails with [`Error::QueueFull`] when the session already holds
    /// `queue_capacity` buffers in flight. An active session whose voice
    /// stopped on underrun is started again.
    pub fn queue_buffer(&self, buffer: AudioBuffer) -> Result<()> {
        self.ensure_live()?;
        let mut state = self.state.lock();
        if state.queue.len() >= self.config.queue_capacity {
            return Err(Error::QueueFull {
                capacity: self.config.queue_capacity,
            });
        }
        let pending = PendingBuffer {
            tag: buffer.tag,
            frames: buffer.frame_count(self.config.channel_count),
        };
        self.backend.submit(self.voice, buffer)?;
        state.queue.push_back(pending);
        if state.active && !self.backend.is_playing(self.voice) {
            tracing::debug!(voice = self.voice.0, "restarting voice after underrun");
            self.backend.start(self.voice)?;
        }
        Ok(())
    }

    /// Starts playback.
    pub fn start(&self) -> Result<()> {
        self.ensure_live()?;
        let mut state = self.state.lock();
        self.backend.set_volume(self.voice, state.volume);
        self.backend.start(self.voice)?;
        state.active = true;
        Ok(())
    }

    /// Stops playback. The output gain is zeroed before the backend stops so
    /// the tail of the current period is silent.
    pub fn stop(&self) -> Result<()> {
        self.ensure_live()?;
        let mut state = self.state.lock();
        self.backend.set_volume(self.voice, 0.0);
        self.backend.stop(self.voice)?;
        state.active = false;
        Ok(())
    }

    /// Sets the output gain.
    pub fn set_volume(&self, volume: f32) {
        let mut state = self.state.lock();
        state.volume = volume;
        if state.active {
            self.backend.set_volume(self.voice, volume);
        }
    }

    /// Output gain requested by the caller.
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Whether the session is playing.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Applies backend completions. Returns whether any buffer finished.
    ///
    /// Completions must arrive in FIFO order. A tag that does not match the
    /// head, or a completion with nothing queued, is counted as an anomaly;
    /// the head is still retired so the queue keeps draining.
    pub fn update(&self) -> bool {
        if self.disposed.load(Ordering::Acquire) {
            return false;
        }
        let completed = self.backend.poll_completed(self.voice);
        if completed.is_empty() {
            return false;
        }

        let mut state = self.state.lock();
        for tag in completed {
            match state.queue.pop_front() {
                Some(head) => {
                    if head.tag != tag {
                        state.anomaly_count += 1;
                        tracing::warn!(
                            voice = self.voice.0,
                            expected = head.tag,
                            got = tag,
                            "out-of-order buffer completion"
                        );
                    }
                    state.played_sample_count += head.frames;
                }
                None => {
                    state.anomaly_count += 1;
                    tracing::warn!(
                        voice = self.voice.0,
                        tag,
                        "completion reported with no buffer queued"
                    );
                }
            }
        }
        tracing::debug!(
            voice = self.voice.0,
            played = state.played_sample_count,
            queued = state.queue.len(),
            "session updated"
        );
        true
    }

    /// Whether the buffer tagged `tag` is not the one currently playing.
    ///
    /// Only the FIFO head is in flight: true when the queue is empty or its
    /// head carries another tag.
    pub fn was_buffer_fully_consumed(&self, tag: u64) -> bool {
        self.state.lock().queue.front().is_none_or(|b| b.tag != tag)
    }

    /// Frames played since the session opened.
    pub fn played_sample_count(&self) -> u64 {
        self.state.lock().played_sample_count
    }

    /// Buffers submitted and not yet completed.
    pub fn queued_buffer_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Completions that did not match the FIFO head.
    pub fn anomaly_count(&self) -> u64 {
        self.state.lock().anomaly_count
    }

    /// Whether [`dispose`](Self::dispose) ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stops playback and closes the voice. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock();
        if state.active {
            self.backend.set_volume(self.voice, 0.0);
            if let Err(e) = self.backend.stop(self.voice) {
                tracing::warn!(voice = self.voice.0, error = %e, "stop during dispose failed");
            }
            state.active = false;
        }
        state.queue.clear();
        self.backend.close_voice(self.voice);
        tracing::debug!(voice = self.voice.0, "hardware session disposed");
    }
}

impl Drop for HardwareDeviceSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for HardwareDeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareDeviceSession")
            .field("voice", &self.voice)
            .field("backend", &self.backend.name())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockBackend;

    fn session(backend: &MockBackend, config: SessionConfig) -> HardwareDeviceSession {
        HardwareDeviceSession::new(Arc::new(backend.clone()), config).unwrap()
    }

    #[test]
    fn rejects_unsupported_channel_count() {
        let backend = MockBackend::new();
        let config = SessionConfig {
            channel_count: 3,
            ..SessionConfig::default()
        };
        let err = HardwareDeviceSession::new(Arc::new(backend.clone()), config).unwrap_err();
        assert!(matches!(err, Error::UnsupportedChannelCount(3)));
        assert!(backend.voices().is_empty());
    }

    #[test]
    fn played_count_follows_completion_order() {
        let backend = MockBackend::new();
        let session = session(&backend, SessionConfig::default());
        session.queue_buffer(AudioBuffer::new(1, vec![0; 200])).unwrap();
        session.queue_buffer(AudioBuffer::new(2, vec![0; 100])).unwrap();

        assert!(!session.update());
        backend.complete_next(session.voice());
        assert!(session.update());
        assert_eq!(session.played_sample_count(), 100);
        assert!(session.was_buffer_fully_consumed(1));
        assert!(!session.was_buffer_fully_consumed(2));

        backend.complete_next(session.voice());
        session.update();
        assert_eq!(session.played_sample_count(), 150);
        assert_eq!(session.queued_buffer_count(), 0);
    }

    #[test]
    fn stop_zeroes_volume_but_keeps_requested_gain() {
        let backend = MockBackend::new();
        let session = session(&backend, SessionConfig::default());
        session.set_volume(0.8);
        session.start().unwrap();
        assert_eq!(backend.volume(session.voice()), Some(0.8));
        assert!(backend.is_playing(session.voice()));

        session.stop().unwrap();
        assert_eq!(backend.volume(session.voice()), Some(0.0));
        assert!(!backend.is_playing(session.voice()));
        assert!((session.volume() - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn queueing_restarts_voice_stopped_on_underrun() {
        let backend = MockBackend::with_stop_on_drain();
        let session = session(&backend, SessionConfig::default());
        session.queue_buffer(AudioBuffer::new(1, vec![0; 4])).unwrap();
        session.start().unwrap();

        backend.complete_next(session.voice());
        session.update();
        assert!(!backend.is_playing(session.voice()));
        assert!(session.is_active());

        session.queue_buffer(AudioBuffer::new(2, vec![0; 4])).unwrap();
        assert!(backend.is_playing(session.voice()));
    }

    #[test]
    fn queueing_while_stopped_does_not_start() {
        let backend = MockBackend::new();
        let session = session(&backend, SessionConfig::default());
        session.queue_buffer(AudioBuffer::new(1, vec![0; 4])).unwrap();
        assert!(!backend.is_playing(session.voice()));

        session.start().unwrap();
        session.stop().unwrap();
        session.queue_buffer(AudioBuffer::new(2, vec![0; 4])).unwrap();
        assert!(!backend.is_playing(session.voice()));
    }

    #[test]
    fn only_the_head_buffer_counts_as_in_flight() {
        let backend = MockBackend::new();
        let session = session(&backend, SessionConfig::default());
        assert!(session.was_buffer_fully_consumed(1));

        session.queue_buffer(AudioBuffer::new(1, vec![0; 4])).unwrap();
        session.queue_buffer(AudioBuffer::new(2, vec![0; 4])).unwrap();
        assert!(!session.was_buffer_fully_consumed(1));
        assert!(session.was_buffer_fully_consumed(2));

        backend.complete_next(session.voice());
        session.update();
        assert!(session.was_buffer_fully_consumed(1));
        assert!(!session.was_buffer_fully_consumed(2));
    }

    #[test]
    fn queue_capacity_is_enforced() {
        let backend = MockBackend::new();
        let session = session(
            &backend,
            SessionConfig {
                queue_capacity: 2,
                ..SessionConfig::default()
            },
        );
        session.queue_buffer(AudioBuffer::new(1, vec![0; 2])).unwrap();
        session.queue_buffer(AudioBuffer::new(2, vec![0; 2])).unwrap();
        let err = session
            .queue_buffer(AudioBuffer::new(3, vec![0; 2]))
            .unwrap_err();
        assert!(matches!(err, Error::QueueFull { capacity: 2 }));
        assert_eq!(backend.pending_count(session.voice()), 2);
    }

    #[test]
    fn dispose_is_idempotent_and_closes_voice() {
        let backend = MockBackend::new();
        let session = session(&backend, SessionConfig::default());
        let voice = session.voice();
        session.start().unwrap();
        session.dispose();
        session.dispose();
        assert!(backend.voice_config(voice).is_none());
        assert!(matches!(session.start(), Err(Error::Disposed)));
        assert!(!session.update());
    }
}
