//! Session registry plus the background completion poller.
//!
//! ```text
//! open_session ──▶ sessions (Weak) ◀── poll thread ──▶ session.update()
//!                                          │
//!                                          └── any progress ──▶ UpdateEvent::signal
//! ```
//!
//! The registry holds weak references: a session dropped by its owner is
//! pruned on the next poll, and one still alive at disposal is disposed by
//! the driver before the backend is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::backend::HardwareBackend;
use crate::event::UpdateEvent;
use crate::session::{DEFAULT_QUEUE_CAPACITY, HardwareDeviceSession, SessionConfig};
use crate::{Error, Result};

/// Driver tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Delay between completion polls.
    pub poll_interval: Duration,
    /// Default in-flight buffer cap for sessions opened through the driver.
    pub queue_capacity: usize,
    /// Maximum live sessions.
    pub max_sessions: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_sessions: 16,
        }
    }
}

struct Shared {
    backend: Arc<dyn HardwareBackend>,
    sessions: Mutex<Vec<Weak<HardwareDeviceSession>>>,
    running: AtomicBool,
    sleep: Mutex<()>,
    wake: Condvar,
    update_event: Arc<UpdateEvent>,
    config: DriverConfig,
}

impl Shared {
    fn live_sessions(&self) -> Vec<Arc<HardwareDeviceSession>> {
        let mut sessions = self.sessions.lock();
        sessions.retain(|weak| weak.strong_count() > 0);
        sessions.iter().filter_map(Weak::upgrade).collect()
    }

    fn poll_once(&self) -> bool {
        let mut progressed = false;
        for session in self.live_sessions() {
            progressed |= session.update();
        }
        if progressed {
            self.update_event.signal();
        }
        progressed
    }

    fn run(&self) {
        tracing::info!(
            backend = self.backend.name(),
            interval_ms = self.config.poll_interval.as_millis(),
            "hardware poll thread started"
        );
        while self.running.load(Ordering::Acquire) {
            self.poll_once();
            let mut guard = self.sleep.lock();
            if self.running.load(Ordering::Acquire) {
                self.wake.wait_for(&mut guard, self.config.poll_interval);
            }
        }
        tracing::info!("hardware poll thread stopped");
    }
}

/// Owns hardware sessions and polls their completions.
pub struct HardwareDeviceDriver {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    disposed: bool,
}

impl HardwareDeviceDriver {
    /// Starts the poll thread. Progress on any session signals `update_event`.
    pub fn new(
        backend: Arc<dyn HardwareBackend>,
        config: DriverConfig,
        update_event: Arc<UpdateEvent>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            backend,
            sessions: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            sleep: Mutex::new(()),
            wake: Condvar::new(),
            update_event,
            config,
        });
        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("audren-hw-poll".into())
            .spawn(move || worker.run())?;
        Ok(Self {
            shared,
            thread: Some(thread),
            disposed: false,
        })
    }

    /// Backend the driver plays through.
    pub fn backend(&self) -> &Arc<dyn HardwareBackend> {
        &self.shared.backend
    }

    /// Driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.shared.config
    }

    /// Opens a session and registers it with the poller.
    ///
    /// A `queue_capacity` of zero in `config` takes the driver default.
    pub fn open_session(&self, mut config: SessionConfig) -> Result<Arc<HardwareDeviceSession>> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        if config.queue_capacity == 0 {
            config.queue_capacity = self.shared.config.queue_capacity;
        }
        let mut sessions = self.shared.sessions.lock();
        sessions.retain(|weak| weak.strong_count() > 0);
        if sessions.len() >= self.shared.config.max_sessions {
            return Err(Error::SessionLimit {
                max: self.shared.config.max_sessions,
            });
        }
        let session = Arc::new(HardwareDeviceSession::new(
            Arc::clone(&self.shared.backend),
            config,
        )?);
        sessions.push(Arc::downgrade(&session));
        tracing::info!(
            voice = session.voice().0,
            sessions = sessions.len(),
            "hardware session registered"
        );
        Ok(session)
    }

    /// Live sessions.
    pub fn session_count(&self) -> usize {
        self.shared.live_sessions().len()
    }

    /// Runs one poll pass on the calling thread. Returns whether any session
    /// made progress.
    pub fn poll_now(&self) -> bool {
        self.shared.poll_once()
    }

    /// Stops the poll thread, disposes live sessions, then releases the
    /// backend. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        {
            let _guard = self.shared.sleep.lock();
            self.shared.running.store(false, Ordering::Release);
            self.shared.wake.notify_all();
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("hardware poll thread panicked");
        }

        let sessions = std::mem::take(&mut *self.shared.sessions.lock());
        for session in sessions.iter().filter_map(Weak::upgrade) {
            session.dispose();
        }
        self.shared.backend.release();
        tracing::info!(backend = self.shared.backend.name(), "hardware driver disposed");
    }
}

impl Drop for HardwareDeviceDriver {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for HardwareDeviceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareDeviceDriver")
            .field("backend", &self.shared.backend.name())
            .field("config", &self.shared.config)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AudioBuffer, MockBackend};

    fn idle_config() -> DriverConfig {
        DriverConfig {
            poll_interval: Duration::from_secs(60),
            ..DriverConfig::default()
        }
    }

    #[test]
    fn poll_signals_event_on_progress() {
        let backend = MockBackend::new();
        let event = Arc::new(UpdateEvent::new());
        let driver =
            HardwareDeviceDriver::new(Arc::new(backend.clone()), idle_config(), Arc::clone(&event))
                .unwrap();
        let session = driver.open_session(SessionConfig::default()).unwrap();
        session.queue_buffer(AudioBuffer::new(4, vec![0; 8])).unwrap();

        assert!(!driver.poll_now());
        assert!(!event.is_set());

        backend.complete_next(session.voice());
        assert!(driver.poll_now());
        assert!(event.is_set());
        assert_eq!(session.played_sample_count(), 4);
    }

    #[test]
    fn dropped_sessions_are_pruned() {
        let backend = MockBackend::new();
        let driver = HardwareDeviceDriver::new(
            Arc::new(backend.clone()),
            idle_config(),
            Arc::new(UpdateEvent::new()),
        )
        .unwrap();
        let a = driver.open_session(SessionConfig::default()).unwrap();
        let _b = driver.open_session(SessionConfig::default()).unwrap();
        assert_eq!(driver.session_count(), 2);
        drop(a);
        assert_eq!(driver.session_count(), 1);
        assert_eq!(backend.voices().len(), 1);
    }

    #[test]
    fn session_limit() {
        let driver = HardwareDeviceDriver::new(
            Arc::new(MockBackend::new()),
            DriverConfig {
                max_sessions: 1,
                ..idle_config()
            },
            Arc::new(UpdateEvent::new()),
        )
        .unwrap();
        let _first = driver.open_session(SessionConfig::default()).unwrap();
        let err = driver.open_session(SessionConfig::default()).unwrap_err();
        assert!(matches!(err, Error::SessionLimit { max: 1 }));
    }

    #[test]
    fn zero_capacity_takes_driver_default() {
        let driver = HardwareDeviceDriver::new(
            Arc::new(MockBackend::new()),
            DriverConfig {
                queue_capacity: 3,
                ..idle_config()
            },
            Arc::new(UpdateEvent::new()),
        )
        .unwrap();
        let session = driver
            .open_session(SessionConfig {
                queue_capacity: 0,
                ..SessionConfig::default()
            })
            .unwrap();
        assert_eq!(session.config().queue_capacity, 3);
    }
}
