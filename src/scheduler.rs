use std::{
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use tracing::{error, info, trace};

use crate::channel::TelemetryChannel;
use crate::compute::{make_input, summary_mean_std, KernelEngine};
use crate::constants::{DEFAULT_LOAD, FAST_PERIOD, GRID_SIZE, MAX_LOAD, MIN_LOAD, SLOW_PERIOD};
use crate::error::ConfigError;
use crate::power::PowerState;
use crate::tracker::FrameStats;

/// Number of convolution passes per tick, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LoadLevel(u8);

impl LoadLevel {
    pub const MIN: LoadLevel = LoadLevel(MIN_LOAD);
    pub const MAX: LoadLevel = LoadLevel(MAX_LOAD);

    pub fn new(value: i64) -> Result<Self, ConfigError> {
        if (MIN_LOAD as i64..=MAX_LOAD as i64).contains(&value) {
            Ok(LoadLevel(value as u8))
        } else {
            Err(ConfigError::LoadOutOfRange { value })
        }
    }

    pub fn clamped(value: i64) -> Self {
        LoadLevel(value.clamp(MIN_LOAD as i64, MAX_LOAD as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// One step lighter, never below the minimum.
    pub fn reduced(self) -> Self {
        LoadLevel(self.0.saturating_sub(1).max(MIN_LOAD))
    }
}

impl Default for LoadLevel {
    fn default() -> Self {
        LoadLevel(DEFAULT_LOAD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub grid_size: usize,
    pub fast_period: Duration,
    pub slow_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            fast_period: FAST_PERIOD,
            slow_period: SLOW_PERIOD,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size < 3 {
            return Err(ConfigError::GridTooSmall {
                size: self.grid_size,
            });
        }
        if self.fast_period.is_zero() || self.slow_period < self.fast_period {
            return Err(ConfigError::InvalidPeriod);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    pub period: Duration,
    pub passes: usize,
}

impl TickPlan {
    pub fn new(config: &SchedulerConfig, power_save: bool, load: LoadLevel) -> Self {
        if power_save {
            TickPlan {
                period: config.slow_period,
                passes: load.reduced().get() as usize,
            }
        } else {
            TickPlan {
                period: config.fast_period,
                passes: load.get() as usize,
            }
        }
    }
}

/// `moving_std_ms` is the spatial std of the convolution output, not a timing figure.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub last_frame_ms: f64,
    pub moving_avg_ms: f64,
    pub moving_std_ms: f64,
    pub jank_percent_last_30s: f64,
    pub jank_count_last_30s: usize,
    pub timestamp_ms: i64,
}

impl TelemetrySummary {
    pub fn from_tick(frame_ms: f64, output_std: f64) -> Self {
        Self {
            last_frame_ms: frame_ms,
            moving_avg_ms: frame_ms,
            moving_std_ms: output_std,
            jank_percent_last_30s: 0.0,
            jank_count_last_30s: 0,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_frame_stats(self, stats: &FrameStats) -> Self {
        Self {
            jank_percent_last_30s: stats.jank_percent(),
            jank_count_last_30s: stats.jank_count,
            ..self
        }
    }
}

#[derive(Debug)]
pub(crate) struct LoopState {
    pub running: AtomicBool,
    pub load: AtomicU8,
    pub active_loops: AtomicUsize,
}

impl LoopState {
    pub fn new(load: LoadLevel) -> Self {
        Self {
            running: AtomicBool::new(false),
            load: AtomicU8::new(load.get()),
            active_loops: AtomicUsize::new(0),
        }
    }

    pub fn load(&self) -> LoadLevel {
        LoadLevel::clamped(self.load.load(Ordering::Relaxed) as i64)
    }

    pub fn set_load(&self, load: LoadLevel) {
        self.load.store(load.get(), Ordering::Relaxed);
    }
}

// Live from before the thread is spawned until it has exited, unwinding included.
pub(crate) struct ActiveGuard(Arc<LoopState>);

impl ActiveGuard {
    pub fn enter(state: Arc<LoopState>) -> Self {
        state.active_loops.fetch_add(1, Ordering::SeqCst);
        ActiveGuard(state)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
        self.0.active_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct TickLoop {
    pub config: SchedulerConfig,
    pub power: Arc<dyn PowerState>,
    pub channel: TelemetryChannel<TelemetrySummary>,
    pub state: Arc<LoopState>,
    // Disconnects on stop; doubles as the pacing sleep.
    pub stop: Receiver<()>,
    pub active: ActiveGuard,
}

impl TickLoop {
    pub fn run(self) {
        let TickLoop {
            config,
            power,
            channel,
            state,
            stop,
            active: _active,
        } = self;

        let input = make_input(config.grid_size);
        let mut engine = match KernelEngine::new(config.grid_size) {
            Ok(engine) => engine,
            Err(err) => {
                error!(%err, "compute engine could not be created");
                return;
            }
        };
        info!(grid = config.grid_size, "compute loop started");

        let mut ticks = 0u64;
        while state.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();
            let power_save = power.is_power_save();
            let plan = TickPlan::new(&config, power_save, state.load());

            let proc_start = Instant::now();
            let output = match engine.convolve(&input, plan.passes) {
                Ok(output) => output,
                Err(err) => {
                    error!(%err, "convolution failed, stopping compute loop");
                    break;
                }
            };
            let frame_ms = proc_start.elapsed().as_secs_f64() * 1000.0;

            let (_, output_std) = summary_mean_std(output);
            channel.publish(TelemetrySummary::from_tick(frame_ms, output_std));
            ticks += 1;
            trace!(
                power_save,
                passes = plan.passes,
                period_ms = plan.period.as_millis() as u64,
                frame_ms,
                "tick"
            );

            // Overrun ticks go straight into the next one.
            let Some(rest) = plan.period.checked_sub(tick_start.elapsed()) else {
                continue;
            };
            if rest.is_zero() {
                continue;
            }
            match stop.recv_timeout(rest) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(ticks, "compute loop stopped");
    }
}
