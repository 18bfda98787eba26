use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::constants::{JANK_THRESHOLD_MS, WINDOW};
use crate::util::mean_std;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    at: Instant,
    duration_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub window: Duration,
    pub jank_threshold_ms: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window: WINDOW,
            jank_threshold_ms: JANK_THRESHOLD_MS,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStats {
    pub avg_ms: f64,
    pub std_ms: f64,
    pub jank_count: usize,
    pub sample_count: usize,
}

impl FrameStats {
    pub fn jank_percent(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.jank_count as f64 * 100.0 / self.sample_count as f64
        }
    }
}

pub struct FrameTracker<C: Clock = SystemClock> {
    config: TrackerConfig,
    clock: C,
    window: Mutex<VecDeque<Sample>>,
}

impl FrameTracker<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(TrackerConfig::default(), SystemClock)
    }
}

impl Default for FrameTracker<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FrameTracker<C> {
    pub fn with_clock(config: TrackerConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    pub fn record(&self, duration_ms: f64) {
        let now = self.clock.now();
        let mut window = self.lock();
        window.push_back(Sample {
            at: now,
            duration_ms,
        });
        self.evict(&mut window, now);
    }

    pub fn record_duration(&self, duration: Duration) {
        self.record(duration.as_secs_f64() * 1000.0);
    }

    // An empty window yields all zeros.
    pub fn snapshot(&self) -> FrameStats {
        let now = self.clock.now();
        let durations: Vec<f64> = {
            let mut window = self.lock();
            self.evict(&mut window, now);
            window.iter().map(|s| s.duration_ms).collect()
        };

        if durations.is_empty() {
            return FrameStats::default();
        }

        let (avg_ms, std_ms) = mean_std(durations.iter().copied());
        let jank_count = durations
            .iter()
            .filter(|&&d| d > self.config.jank_threshold_ms)
            .count();

        FrameStats {
            avg_ms,
            std_ms,
            jank_count,
            sample_count: durations.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Sample>> {
        // A panicking writer cannot leave the deque half-updated, so a
        // poisoned lock is still safe to read.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict(&self, window: &mut VecDeque<Sample>, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.config.window) else {
            return;
        };
        while window.front().is_some_and(|s| s.at < cutoff) {
            window.pop_front();
        }
    }
}
