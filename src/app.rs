use std::time::Instant;

use chrono::{DateTime, Local, TimeZone};
use telemetry_lab::{
    constants::HISTORY_LEN, FrameStats, FrameTracker, ManualPowerState, Subscription,
    TelemetryService, TelemetrySummary,
};
use tracing::warn;

// Rows kept for the recent-ticks table
const RECENT_ROWS: usize = 20;

// Main application state
pub struct App {
    pub frame_history: Vec<f64>,
    pub latest: TelemetrySummary,
    pub frame_stats: FrameStats,
    pub peak_frame_record: (f64, DateTime<Local>),
    pub ticks_seen: u64,

    // Newest first: (local time, last frame ms, spatial std)
    pub recent: Vec<(DateTime<Local>, f64, f64)>,

    pub power: Option<ManualPowerState>,
    pub status: String,
    pub last_tick: Instant,
}

impl App {
    pub fn new(power: Option<ManualPowerState>) -> App {
        App {
            frame_history: vec![0.0; HISTORY_LEN],
            latest: TelemetrySummary::default(),
            frame_stats: FrameStats::default(),
            peak_frame_record: (0.0, Local::now()),
            ticks_seen: 0,
            recent: Vec::with_capacity(RECENT_ROWS),
            power,
            status: "ready".to_string(),
            last_tick: Instant::now(),
        }
    }

    pub fn on_tick(&mut self, summaries: &Subscription<TelemetrySummary>, tracker: &FrameTracker) {
        while let Some(summary) = summaries.try_recv() {
            self.frame_history.remove(0);
            self.frame_history.push(summary.last_frame_ms);
            self.ticks_seen += 1;

            let at = local_time(summary.timestamp_ms);
            if summary.last_frame_ms > self.peak_frame_record.0 {
                self.peak_frame_record = (summary.last_frame_ms, at);
            }

            self.recent
                .insert(0, (at, summary.last_frame_ms, summary.moving_std_ms));
            self.recent.truncate(RECENT_ROWS);
            self.latest = summary;
        }

        self.frame_stats = tracker.snapshot();
        self.latest = self.latest.with_frame_stats(&self.frame_stats);
    }

    pub fn toggle_running(&mut self, service: &TelemetryService) {
        if service.is_running() {
            self.status = match service.stop() {
                Ok(()) => "stopped".to_string(),
                Err(err) => {
                    warn!(%err, "stop failed");
                    format!("stop failed: {err}")
                }
            };
        } else {
            self.status = match service.start(service.load().get() as i64) {
                Ok(_) => "running".to_string(),
                Err(err) => {
                    warn!(%err, "start failed");
                    format!("start failed: {err}")
                }
            };
        }
    }

    pub fn adjust_load(&mut self, service: &TelemetryService, delta: i64) {
        let level = service.set_load(service.load().get() as i64 + delta);
        self.status = format!("load {}", level.get());
    }

    pub fn toggle_power_save(&mut self) {
        self.status = match &self.power {
            Some(power) => {
                if power.toggle() {
                    "power-save on".to_string()
                } else {
                    "power-save off".to_string()
                }
            }
            None => "power-save follows the battery (--power-save auto)".to_string(),
        };
    }

    pub fn reset_window(&mut self, tracker: &FrameTracker) {
        tracker.clear();
        self.frame_stats = FrameStats::default();
        self.status = "frame window cleared".to_string();
    }
}

fn local_time(timestamp_ms: i64) -> DateTime<Local> {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_else(Local::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_lab::TelemetryChannel;

    fn summary(frame_ms: f64) -> TelemetrySummary {
        TelemetrySummary::from_tick(frame_ms, 0.3)
    }

    #[test]
    fn on_tick_drains_all_pending_summaries() {
        let channel = TelemetryChannel::new();
        let sub = channel.subscribe();
        let tracker = FrameTracker::new();
        let mut app = App::new(None);

        channel.publish(summary(2.0));
        channel.publish(summary(7.5));
        channel.publish(summary(3.0));
        app.on_tick(&sub, &tracker);

        assert_eq!(app.ticks_seen, 3);
        assert_eq!(app.frame_history.len(), HISTORY_LEN);
        assert_eq!(app.frame_history[HISTORY_LEN - 1], 3.0);
        assert_eq!(app.peak_frame_record.0, 7.5);
        assert_eq!(app.latest.last_frame_ms, 3.0);
        assert_eq!(app.recent[0].1, 3.0);
    }

    #[test]
    fn on_tick_merges_frame_window_jank() {
        let channel = TelemetryChannel::new();
        let sub = channel.subscribe();
        let tracker = FrameTracker::new();
        for ms in [10.0, 17.0, 20.0, 5.0] {
            tracker.record(ms);
        }
        let mut app = App::new(None);
        channel.publish(summary(1.0));
        app.on_tick(&sub, &tracker);

        assert_eq!(app.latest.jank_count_last_30s, 2);
        assert!((app.latest.jank_percent_last_30s - 50.0).abs() < 1e-9);
        assert!((app.frame_stats.avg_ms - 13.0).abs() < 1e-9);
    }

    #[test]
    fn power_toggle_without_manual_source_is_reported() {
        let mut app = App::new(None);
        app.toggle_power_save();
        assert!(app.status.contains("auto"));

        let power = ManualPowerState::new(false);
        let mut app = App::new(Some(power.clone()));
        app.toggle_power_save();
        assert_eq!(app.status, "power-save on");
    }
}
