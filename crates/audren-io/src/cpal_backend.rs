//! cpal-based hardware backend.
//!
//! [`CpalBackend`] opens one cpal output stream per voice. Submitted buffers
//! travel to the stream callback over a channel; the callback converts PCM16
//! to f32, applies the voice gain, and sends the tag of each drained buffer
//! back on a second channel that [`poll_completed`](HardwareBackend::poll_completed)
//! empties. When the queue runs dry the callback writes silence.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::backend::{AudioBuffer, HardwareBackend, VoiceConfig, VoiceId};
use crate::{Error, Result};

/// Frames per hardware period requested from cpal.
const PERIOD_FRAMES: u32 = 240;

struct CpalVoice {
    stream: cpal::Stream,
    buffers: Sender<AudioBuffer>,
    completed: Receiver<u64>,
    volume: Arc<AtomicU32>,
    playing: AtomicBool,
}

/// Hardware backend over the platform's default cpal host.
pub struct CpalBackend {
    voices: Mutex<HashMap<VoiceId, CpalVoice>>,
    next_voice: AtomicU64,
}

impl CpalBackend {
    /// Creates a backend on the default host.
    pub fn new() -> Self {
        tracing::info!(
            host = cpal::default_host().id().name(),
            "cpal hardware backend initialized"
        );
        Self {
            voices: Mutex::new(HashMap::new()),
            next_voice: AtomicU64::new(0),
        }
    }

    fn find_output_device(name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        let Some(search) = name else {
            return host.default_output_device().ok_or(Error::NoDevice);
        };
        let search = search.to_lowercase();
        let devices = host
            .output_devices()
            .map_err(|e| Error::Stream(e.to_string()))?;
        for device in devices {
            if let Ok(description) = device.description()
                && description.name().to_lowercase().contains(&search)
            {
                return Ok(device);
            }
        }
        Err(Error::DeviceNotFound(format!(
            "no output device matching '{search}'"
        )))
    }

    fn with_voice<T>(&self, voice: VoiceId, f: impl FnOnce(&CpalVoice) -> T) -> Result<T> {
        self.voices
            .lock()
            .get(&voice)
            .map(f)
            .ok_or(Error::UnknownVoice(voice))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CpalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalBackend")
            .field("voices", &self.voices.lock().len())
            .finish_non_exhaustive()
    }
}

/// Callback-side playback cursor.
struct Playout {
    buffers: Receiver<AudioBuffer>,
    completed: Sender<u64>,
    volume: Arc<AtomicU32>,
    current: Option<AudioBuffer>,
    position: usize,
}

impl Playout {
    fn fill(&mut self, data: &mut [f32]) {
        let gain = f32::from_bits(self.volume.load(Ordering::Relaxed));
        for sample in data.iter_mut() {
            *sample = match self.next_sample() {
                Some(value) => f32::from(value) / 32768.0 * gain,
                None => 0.0,
            };
        }
    }

    fn next_sample(&mut self) -> Option<i16> {
        loop {
            if self.current.is_none() {
                self.current = Some(self.buffers.try_recv().ok()?);
                self.position = 0;
            }
            let buffer = self.current.as_ref()?;
            if let Some(&value) = buffer.samples.get(self.position) {
                self.position += 1;
                return Some(value);
            }
            if let Some(done) = self.current.take() {
                let _ = self.completed.send(done.tag);
            }
        }
    }
}

impl HardwareBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open_voice(&self, config: &VoiceConfig) -> Result<VoiceId> {
        let device = Self::find_output_device(config.device_name.as_deref())?;

        let stream_config = cpal::StreamConfig {
            channels: config.channel_count,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(PERIOD_FRAMES),
        };

        let (buffer_tx, buffer_rx) = crossbeam_channel::unbounded();
        let (completed_tx, completed_rx) = crossbeam_channel::unbounded();
        let volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let mut playout = Playout {
            buffers: buffer_rx,
            completed: completed_tx,
            volume: Arc::clone(&volume),
            current: None,
            position: 0,
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| playout.fill(data),
                move |err| tracing::warn!(error = %err, "hardware output stream error"),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;
        stream.pause().map_err(|e| Error::Stream(e.to_string()))?;

        let id = VoiceId(self.next_voice.fetch_add(1, Ordering::Relaxed));
        tracing::info!(
            voice = id.0,
            channels = config.channel_count,
            sample_rate = config.sample_rate,
            "hardware voice opened"
        );
        self.voices.lock().insert(
            id,
            CpalVoice {
                stream,
                buffers: buffer_tx,
                completed: completed_rx,
                volume,
                playing: AtomicBool::new(false),
            },
        );
        Ok(id)
    }

    fn close_voice(&self, voice: VoiceId) {
        if self.voices.lock().remove(&voice).is_some() {
            tracing::info!(voice = voice.0, "hardware voice closed");
        }
    }

    fn submit(&self, voice: VoiceId, buffer: AudioBuffer) -> Result<()> {
        self.with_voice(voice, |v| {
            v.buffers
                .send(buffer)
                .map_err(|e| Error::Stream(e.to_string()))
        })?
    }

    fn start(&self, voice: VoiceId) -> Result<()> {
        self.with_voice(voice, |v| {
            v.stream.play().map_err(|e| Error::Stream(e.to_string()))?;
            v.playing.store(true, Ordering::Release);
            Ok(())
        })?
    }

    fn stop(&self, voice: VoiceId) -> Result<()> {
        self.with_voice(voice, |v| {
            v.stream.pause().map_err(|e| Error::Stream(e.to_string()))?;
            v.playing.store(false, Ordering::Release);
            Ok(())
        })?
    }

    // A cpal stream keeps running on silence, so only start/stop change this.
    fn is_playing(&self, voice: VoiceId) -> bool {
        self.with_voice(voice, |v| v.playing.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn set_volume(&self, voice: VoiceId, volume: f32) {
        let _ = self.with_voice(voice, |v| {
            v.volume.store(volume.to_bits(), Ordering::Relaxed);
        });
    }

    fn poll_completed(&self, voice: VoiceId) -> Vec<u64> {
        self.with_voice(voice, |v| v.completed.try_iter().collect())
            .unwrap_or_default()
    }

    fn release(&self) {
        let mut voices = self.voices.lock();
        if !voices.is_empty() {
            tracing::warn!(count = voices.len(), "releasing backend with open voices");
        }
        voices.clear();
    }
}
