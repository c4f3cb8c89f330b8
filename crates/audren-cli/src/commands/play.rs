//! Test-tone playback through a hardware session.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use audren_config::EngineConfig;
use audren_io::{
    AudioBuffer, AudioManager, CpalBackend, Error as IoError, HardwareBackend,
    HardwareDeviceDriver, HardwareDeviceSession, MockBackend,
};
use clap::Args;

#[derive(Args)]
pub struct PlayArgs {
    /// Engine configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tone frequency in Hz
    #[arg(short, long, default_value = "440.0")]
    frequency: f32,

    /// Duration in seconds
    #[arg(short, long, default_value = "2.0")]
    duration: f32,

    /// Output gain (0.0 to 1.0)
    #[arg(long, default_value = "0.25")]
    volume: f32,

    /// Use the in-memory backend instead of an audio device
    #[arg(long)]
    mock: bool,
}

/// Interleaved PCM16 sine generator.
struct Tone {
    phase: f32,
    step: f32,
    channels: usize,
}

impl Tone {
    fn new(frequency: f32, sample_rate: u32, channels: u16) -> Self {
        Self {
            phase: 0.0,
            step: std::f32::consts::TAU * frequency / sample_rate as f32,
            channels: usize::from(channels),
        }
    }

    fn fill(&mut self, frames: usize) -> Vec<i16> {
        let mut samples = Vec::with_capacity(frames * self.channels);
        for _ in 0..frames {
            let value = (self.phase.sin() * f32::from(i16::MAX)) as i16;
            samples.extend(std::iter::repeat_n(value, self.channels));
            self.phase = (self.phase + self.step) % std::f32::consts::TAU;
        }
        samples
    }
}

/// Queues buffers until the session is full or the tone is exhausted.
fn refill(
    session: &HardwareDeviceSession,
    tone: &mut Tone,
    next_tag: &mut u64,
    remaining: &mut u64,
    period: u64,
) -> anyhow::Result<()> {
    while *remaining > 0 {
        let frames = period.min(*remaining);
        match session.queue_buffer(AudioBuffer::new(*next_tag, tone.fill(frames as usize))) {
            Ok(()) => {
                *next_tag += 1;
                *remaining -= frames;
            }
            Err(IoError::QueueFull { .. }) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load_validated(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let backend: Arc<dyn HardwareBackend> = if args.mock {
        Arc::new(MockBackend::with_auto_complete())
    } else {
        Arc::new(CpalBackend::new())
    };

    let mut manager = AudioManager::new();
    let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);
    manager.register(move || {
        let _ = wake_tx.try_send(());
    });
    manager.start()?;

    let mut driver = HardwareDeviceDriver::new(
        Arc::clone(&backend),
        config.driver.to_driver_config(),
        manager.update_event(),
    )?;

    let sample_rate = config.renderer.sample_rate;
    let session = driver.open_session(config.driver.session_config(sample_rate))?;
    session.set_volume(args.volume.clamp(0.0, 1.0));

    let total = (args.duration.max(0.0) * sample_rate as f32) as u64;
    let period = u64::from(config.renderer.sample_count);
    let mut tone = Tone::new(args.frequency, sample_rate, config.driver.channel_count);
    let mut next_tag = 0;
    let mut remaining = total;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    println!(
        "Playing {:.1} Hz for {:.2}s on '{}' ({} Hz, {} ch)",
        args.frequency,
        args.duration,
        backend.name(),
        sample_rate,
        config.driver.channel_count
    );

    refill(&session, &mut tone, &mut next_tag, &mut remaining, period)?;
    session.start()?;

    while running.load(Ordering::SeqCst) && session.played_sample_count() < total {
        let _ = wake_rx.recv_timeout(Duration::from_millis(100));
        refill(&session, &mut tone, &mut next_tag, &mut remaining, period)?;
    }

    session.stop()?;
    let played = session.played_sample_count();
    let anomalies = session.anomaly_count();
    drop(session);
    driver.dispose();
    manager.stop();

    println!("Played {played} of {total} frames ({next_tag} buffers, {anomalies} anomalies)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_duplicates_each_frame_across_channels() {
        let mut tone = Tone::new(1000.0, 48_000, 2);
        let samples = tone.fill(4);
        assert_eq!(samples.len(), 8);
        assert_eq!(samples[0], samples[1]);
        assert_eq!(samples[0], 0);
        assert!(samples[2] > 0);
    }
}
