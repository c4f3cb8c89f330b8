//! Manual-reset wake-up signal shared by the driver and the audio manager.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A manual-reset event.
///
/// Once [`signal`](Self::signal)ed it stays set, waking every waiter, until
/// someone calls [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct UpdateEvent {
    set: Mutex<bool>,
    cond: Condvar,
}

impl UpdateEvent {
    /// Creates a cleared event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event and wakes all waiters.
    pub fn signal(&self) {
        *self.set.lock() = true;
        self.cond.notify_all();
    }

    /// Resets the event.
    pub fn clear(&self) {
        *self.set.lock() = false;
    }

    /// Whether the event is set.
    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Blocks until the event is set.
    pub fn wait(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.cond.wait(&mut set);
        }
    }

    /// Blocks until the event is set or `timeout` elapses. Returns whether it
    /// was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut set = self.set.lock();
        if !*set {
            self.cond.wait_while_for(&mut set, |set| !*set, timeout);
        }
        *set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn stays_set_until_cleared() {
        let event = UpdateEvent::new();
        assert!(!event.is_set());
        event.signal();
        assert!(event.is_set());
        assert!(event.wait_timeout(Duration::from_millis(1)));
        event.clear();
        assert!(!event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn wakes_a_waiting_thread() {
        let event = Arc::new(UpdateEvent::new());
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait())
        };
        event.signal();
        waiter.join().unwrap();
    }
}
