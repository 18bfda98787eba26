use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::debug;

use crate::constants::SUBSCRIBER_BUFFER;

struct Outlet<T> {
    tx: Sender<T>,
    // Publisher-side handle on the same queue, used to drop the oldest entry.
    overflow: Receiver<T>,
    alive: Weak<()>,
}

impl<T> Outlet<T> {
    fn push(&self, mut value: T) {
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return,
                Err(TrySendError::Full(v)) => {
                    let _ = self.overflow.try_recv();
                    value = v;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

struct State<T> {
    latest: Option<T>,
    outlets: Vec<Outlet<T>>,
}

impl<T> State<T> {
    fn prune(&mut self) {
        let before = self.outlets.len();
        self.outlets.retain(|o| o.alive.strong_count() > 0);
        let pruned = before - self.outlets.len();
        if pruned > 0 {
            debug!(pruned, "dropped closed telemetry subscribers");
        }
    }
}

struct Shared<T> {
    depth: usize,
    state: Mutex<State<T>>,
}

/// Cloneable publishing handle. All clones feed the same subscribers.
pub struct TelemetryChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TelemetryChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> Default for TelemetryChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> TelemetryChannel<T> {
    pub fn new() -> Self {
        Self::with_depth(SUBSCRIBER_BUFFER)
    }

    /// `depth` is the per-subscriber queue length; values below 1 are raised to 1.
    pub fn with_depth(depth: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                depth: depth.max(1),
                state: Mutex::new(State {
                    latest: None,
                    outlets: Vec::new(),
                }),
            }),
        }
    }

    pub fn publish(&self, value: T) {
        let mut state = self.lock();
        state.prune();

        for outlet in &state.outlets {
            outlet.push(value.clone());
        }
        state.latest = Some(value);
    }

    // A late reader is handed the cached value straight away.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = bounded(self.shared.depth);
        let token = Arc::new(());
        let outlet = Outlet {
            tx,
            overflow: rx.clone(),
            alive: Arc::downgrade(&token),
        };

        let mut state = self.lock();
        state.prune();
        if let Some(latest) = &state.latest {
            outlet.push(latest.clone());
        }
        state.outlets.push(outlet);

        Subscription { rx, _token: token }
    }

    pub fn latest(&self) -> Option<T> {
        self.lock().latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .outlets
            .iter()
            .filter(|o| o.alive.strong_count() > 0)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Dropping it unregisters the reader on the next publish or subscribe.
pub struct Subscription<T> {
    rx: Receiver<T>,
    _token: Arc<()>,
}

impl<T> Subscription<T> {
    /// Blocks for the next value; `None` once every publisher is gone.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn latest(&self) -> Option<T> {
        self.rx.try_iter().last()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
