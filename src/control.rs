use std::{
    sync::{atomic::Ordering, Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, Sender};
use tracing::{error, info, warn};

use crate::channel::{Subscription, TelemetryChannel};
use crate::error::{ConfigError, ServiceError};
use crate::power::PowerState;
use crate::scheduler::{ActiveGuard, LoadLevel, LoopState, SchedulerConfig, TelemetrySummary, TickLoop};

struct Worker {
    handle: JoinHandle<()>,
    // Dropping this wakes the loop out of its pacing sleep.
    stop: Sender<()>,
}

/// Owns the compute loop and its telemetry channel. Dropping the service
/// stops the loop.
pub struct TelemetryService {
    config: SchedulerConfig,
    power: Arc<dyn PowerState>,
    channel: TelemetryChannel<TelemetrySummary>,
    state: Arc<LoopState>,
    worker: Mutex<Option<Worker>>,
}

impl TelemetryService {
    pub fn new(
        config: SchedulerConfig,
        power: impl PowerState + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            power: Arc::new(power),
            channel: TelemetryChannel::new(),
            state: Arc::new(LoopState::new(LoadLevel::default())),
            worker: Mutex::new(None),
        })
    }

    /// Starts the loop with `initial_load`. Returns `Ok(false)` without
    /// spawning anything when a loop is already running.
    pub fn start(&self, initial_load: i64) -> Result<bool, ServiceError> {
        let mut worker = self.lock_worker();
        self.set_load(initial_load);

        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        // A loop that ended on its own leaves a finished handle behind.
        if let Some(stale) = worker.take() {
            if let Err(err) = Self::join(stale) {
                warn!(%err, "previous compute loop ended with a fault");
            }
        }

        let (stop_tx, stop_rx) = bounded(0);
        let tick_loop = TickLoop {
            config: self.config,
            power: Arc::clone(&self.power),
            channel: self.channel.clone(),
            state: Arc::clone(&self.state),
            stop: stop_rx,
            active: ActiveGuard::enter(Arc::clone(&self.state)),
        };

        let handle = thread::Builder::new()
            .name("telemetry-loop".into())
            .spawn(move || tick_loop.run())
            .map_err(|err| {
                self.state.running.store(false, Ordering::SeqCst);
                ServiceError::SpawnFailed(err)
            })?;

        *worker = Some(Worker {
            handle,
            stop: stop_tx,
        });
        info!(load = self.load().get(), "telemetry started");
        Ok(true)
    }

    /// Stops the loop and waits for the in-flight tick to finish.
    pub fn stop(&self) -> Result<(), ServiceError> {
        let mut worker = self.lock_worker();
        self.state.running.store(false, Ordering::SeqCst);

        match worker.take() {
            Some(w) => {
                info!("telemetry stopping");
                Self::join(w)
            }
            None => Ok(()),
        }
    }

    // Picked up by the next tick. Out-of-range values are clamped.
    pub fn set_load(&self, value: i64) -> LoadLevel {
        let level = LoadLevel::clamped(value);
        if level.get() as i64 != value {
            warn!(requested = value, applied = level.get(), "compute load clamped");
        }
        if level != self.state.load() {
            info!(load = level.get(), "compute load updated");
        }
        self.state.set_load(level);
        level
    }

    pub fn load(&self) -> LoadLevel {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn active_loops(&self) -> usize {
        self.state.active_loops.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> Subscription<TelemetrySummary> {
        self.channel.subscribe()
    }

    pub fn channel(&self) -> &TelemetryChannel<TelemetrySummary> {
        &self.channel
    }

    fn join(worker: Worker) -> Result<(), ServiceError> {
        drop(worker.stop);
        worker.handle.join().map_err(|_| {
            error!("compute loop panicked");
            ServiceError::LoopPanicked
        })
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TelemetryService {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(%err, "telemetry loop did not shut down cleanly");
        }
    }
}
