//! Notification thread that fans the driver's update event out to callbacks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::Result;
use crate::event::UpdateEvent;

type Callback = Box<dyn Fn() + Send>;

struct Inner {
    event: Arc<UpdateEvent>,
    callbacks: Mutex<Vec<Callback>>,
    terminate: AtomicBool,
}

impl Inner {
    fn run(&self) {
        while !self.terminate.load(Ordering::Acquire) {
            self.event.wait();
            if self.terminate.load(Ordering::Acquire) {
                break;
            }
            for callback in self.callbacks.lock().iter() {
                callback();
            }
            self.event.clear();
        }
    }
}

/// Wakes registered callbacks whenever the update event is signalled.
///
/// Pass [`update_event`](Self::update_event) to the
/// [`HardwareDeviceDriver`](crate::HardwareDeviceDriver) so buffer completions
/// reach the callbacks.
pub struct AudioManager {
    inner: Arc<Inner>,
    thread: Option<JoinHandle<()>>,
}

impl AudioManager {
    /// Creates a stopped manager with a fresh event.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                event: Arc::new(UpdateEvent::new()),
                callbacks: Mutex::new(Vec::new()),
                terminate: AtomicBool::new(false),
            }),
            thread: None,
        }
    }

    /// Event that wakes the notification thread.
    pub fn update_event(&self) -> Arc<UpdateEvent> {
        Arc::clone(&self.inner.event)
    }

    /// Adds a callback run on every wake. Safe while the thread runs.
    pub fn register(&self, callback: impl Fn() + Send + 'static) {
        self.inner.callbacks.lock().push(Box::new(callback));
    }

    /// Spawns the notification thread. Does nothing if it already runs.
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        self.inner.terminate.store(false, Ordering::Release);
        let inner = Arc::clone(&self.inner);
        let thread = thread::Builder::new()
            .name("audren-notify".into())
            .spawn(move || inner.run())?;
        self.thread = Some(thread);
        tracing::info!("audio manager started");
        Ok(())
    }

    /// Whether the notification thread runs.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stops and joins the notification thread.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.inner.terminate.store(true, Ordering::Release);
        self.inner.event.signal();
        if thread.join().is_err() {
            tracing::warn!("audio manager thread panicked");
        }
        self.inner.event.clear();
        tracing::info!("audio manager stopped");
    }
}

impl Default for AudioManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AudioManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioManager")
            .field("callbacks", &self.inner.callbacks.lock().len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
