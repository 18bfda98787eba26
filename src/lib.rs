//! Adaptive CPU telemetry: a paced convolution workload, a rolling frame
//! timing window, and a replaying broadcast of per-tick summaries.

pub mod channel;
pub mod compute;
pub mod constants;
pub mod control;
pub mod error;
pub mod power;
pub mod scheduler;
pub mod tracker;
pub mod util;

pub use channel::{Subscription, TelemetryChannel};
pub use compute::{make_input, summary_mean_std, ComputeBuffer, KernelEngine};
pub use control::TelemetryService;
pub use error::{ComputeError, ConfigError, ServiceError};
pub use power::{ManualPowerState, PowerSource, PowerState, SysfsPowerState};
pub use scheduler::{LoadLevel, SchedulerConfig, TelemetrySummary, TickPlan};
pub use tracker::{Clock, FrameStats, FrameTracker, ManualClock, SystemClock, TrackerConfig};
