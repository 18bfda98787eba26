use std::time::Duration;

// Dashboard redraw rate
pub const TICK_RATE_MS: u64 = 100;
pub const HISTORY_LEN: usize = 120;

// Scheduler pacing: 20 Hz normally, 10 Hz under power-save
pub const FAST_PERIOD: Duration = Duration::from_millis(50);
pub const SLOW_PERIOD: Duration = Duration::from_millis(100);

pub const GRID_SIZE: usize = 256;

pub const MIN_LOAD: u8 = 1;
pub const MAX_LOAD: u8 = 5;
pub const DEFAULT_LOAD: u8 = 2;

// Frame timing window and jank threshold (60 Hz budget)
pub const WINDOW: Duration = Duration::from_millis(30_000);
pub const JANK_THRESHOLD_MS: f64 = 16.0;

// Per-subscriber queue depth on the telemetry channel
pub const SUBSCRIBER_BUFFER: usize = 4;
