//! Hardware output layer for the audren renderer.
//!
//! This crate provides:
//!
//! - **Backends**: the [`HardwareBackend`] trait, a deterministic [`MockBackend`],
//!   and a cpal-based backend (feature `cpal-backend`)
//! - **Sessions**: [`HardwareDeviceSession`], one per output track, with a FIFO
//!   of submitted buffers and played-sample accounting
//! - **Driver**: [`HardwareDeviceDriver`], which owns sessions and polls the
//!   backend for completions on a background thread
//! - **Notification**: [`UpdateEvent`] and [`AudioManager`], which wake
//!   registered callbacks when any session made progress
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use audren_io::{
//!     AudioBuffer, DriverConfig, HardwareDeviceDriver, MockBackend, SessionConfig, UpdateEvent,
//! };
//!
//! let backend = MockBackend::new();
//! let event = Arc::new(UpdateEvent::new());
//! let mut driver =
//!     HardwareDeviceDriver::new(Arc::new(backend.clone()), DriverConfig::default(), event)?;
//!
//! let session = driver.open_session(SessionConfig::default())?;
//! session.queue_buffer(AudioBuffer::new(1, vec![0; 480]))?;
//! session.start()?;
//!
//! driver.dispose();
//! # Ok::<(), audren_io::Error>(())
//! ```

pub mod backend;
#[cfg(feature = "cpal-backend")]
pub mod cpal_backend;
mod driver;
mod event;
mod manager;
pub mod mock;
mod session;

pub use backend::{AudioBuffer, HardwareBackend, VoiceConfig, VoiceId};
#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalBackend;
pub use driver::{DriverConfig, HardwareDeviceDriver};
pub use event::UpdateEvent;
pub use manager::AudioManager;
pub use mock::MockBackend;
pub use session::{HardwareDeviceSession, SessionConfig};

/// Error types for hardware output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The backend does not know the voice.
    #[error("Unknown voice {0:?}")]
    UnknownVoice(VoiceId),

    /// A session was configured with a channel count the hardware cannot play.
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannelCount(u16),

    /// The session already holds its maximum number of in-flight buffers.
    #[error("Buffer queue full ({capacity} buffers in flight)")]
    QueueFull {
        /// Maximum in-flight buffers per session.
        capacity: usize,
    },

    /// The driver already owns its maximum number of sessions.
    #[error("Session limit reached ({max} sessions)")]
    SessionLimit {
        /// Maximum sessions per driver.
        max: usize,
    },

    /// The session or driver was disposed.
    #[error("Disposed")]
    Disposed,

    /// A background thread could not be spawned.
    #[error("Thread error: {0}")]
    Thread(#[from] std::io::Error),
}

/// Convenience result type for hardware output operations.
pub type Result<T> = std::result::Result<T, Error>;
