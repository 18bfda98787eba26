use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use telemetry_lab::{
    ManualPowerState, SchedulerConfig, ServiceError, Subscription, TelemetryService,
    TelemetrySummary,
};

fn small_config() -> SchedulerConfig {
    SchedulerConfig {
        grid_size: 32,
        ..SchedulerConfig::default()
    }
}

// Drains the subscription for `window` and returns how many summaries arrived.
fn count_for(sub: &Subscription<TelemetrySummary>, window: Duration) -> usize {
    let deadline = Instant::now() + window;
    let mut count = 0;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match sub.recv_timeout(left) {
            Ok(_) => count += 1,
            Err(_) => break,
        }
    }
    count
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn double_start_runs_a_single_loop() {
    let service = TelemetryService::new(small_config(), ManualPowerState::new(false)).unwrap();
    let sub = service.subscribe();

    assert!(service.start(1).unwrap());
    assert!(!service.start(1).unwrap());
    assert_eq!(service.active_loops(), 1);

    // One loop at 50 ms yields about 12 summaries in 600 ms; two would double that.
    let count = count_for(&sub, Duration::from_millis(600));
    assert!((3..=15).contains(&count), "got {count} summaries");

    service.stop().unwrap();
    assert_eq!(service.active_loops(), 0);
}

#[test]
fn power_save_halves_the_rate() {
    let service = TelemetryService::new(small_config(), ManualPowerState::new(true)).unwrap();
    let sub = service.subscribe();
    service.start(3).unwrap();

    let count = count_for(&sub, Duration::from_millis(600));
    assert!((2..=8).contains(&count), "got {count} summaries");

    service.stop().unwrap();
}

#[test]
fn stop_is_observed_within_one_tick() {
    let service = TelemetryService::new(small_config(), ManualPowerState::new(true)).unwrap();
    service.start(2).unwrap();
    std::thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    service.stop().unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!service.is_running());
}

#[test]
fn late_subscriber_gets_last_summary_after_stop() {
    let service = TelemetryService::new(small_config(), ManualPowerState::new(false)).unwrap();
    let early = service.subscribe();
    service.start(2).unwrap();
    early.recv_timeout(Duration::from_secs(2)).unwrap();
    service.stop().unwrap();

    let late = service.subscribe();
    let replayed = late.try_recv().expect("replayed summary");
    assert_eq!(Some(replayed), service.channel().latest());
}

#[test]
fn dropping_the_service_closes_subscriptions() {
    let service = TelemetryService::new(small_config(), ManualPowerState::new(false)).unwrap();
    let sub = service.subscribe();
    service.start(1).unwrap();
    sub.recv_timeout(Duration::from_secs(2)).unwrap();
    drop(service);

    loop {
        match sub.recv_timeout(Duration::from_secs(1)) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => panic!("subscription stayed open"),
        }
    }
}

#[test]
fn fault_in_a_tick_ends_the_loop() {
    let failing = || -> bool { panic!("power sensor fault") };
    let service = TelemetryService::new(small_config(), failing).unwrap();
    let sub = service.subscribe();
    service.start(2).unwrap();

    assert!(wait_until(|| service.active_loops() == 0));
    assert!(!service.is_running());
    assert!(sub.try_recv().is_none());
    assert!(matches!(service.stop(), Err(ServiceError::LoopPanicked)));
}

#[test]
fn load_set_while_stopped_is_used_on_start() {
    let service = TelemetryService::new(small_config(), ManualPowerState::new(false)).unwrap();
    service.set_load(5);
    assert_eq!(service.load().get(), 5);
    service.start(4).unwrap();
    assert_eq!(service.load().get(), 4);
    service.set_load(1);
    assert_eq!(service.load().get(), 1);
    assert!(service.is_running());
    service.stop().unwrap();
}

// Waits for a summary whose spatial std differs from `previous`.
fn next_distinct_std(sub: &Subscription<TelemetrySummary>, previous: f64) -> Option<f64> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        let summary = sub.recv_timeout(left).ok()?;
        if (summary.moving_std_ms - previous).abs() > 1e-6 {
            return Some(summary.moving_std_ms);
        }
    }
    None
}

#[test]
fn load_and_power_changes_reach_the_running_loop() {
    let power = ManualPowerState::new(false);
    let service = TelemetryService::new(small_config(), power.clone()).unwrap();
    let sub = service.subscribe();
    service.start(1).unwrap();

    let light = sub.recv_timeout(Duration::from_secs(2)).unwrap().moving_std_ms;
    assert_eq!(service.active_loops(), 1);

    // More passes smooth the grid further.
    service.set_load(5);
    let heavy = next_distinct_std(&sub, light).expect("load change not picked up");
    assert!(heavy < light, "load 5 std {heavy} vs load 1 std {light}");
    assert_eq!(service.active_loops(), 1);

    // Power-save drops one pass, so the grid is a little less smooth again.
    power.set(true);
    let reduced = next_distinct_std(&sub, heavy).expect("power-save not picked up");
    assert!(reduced > heavy && reduced < light, "power-save std {reduced}");
    assert_eq!(service.active_loops(), 1);
    assert!(service.is_running());

    service.stop().unwrap();
    assert_eq!(service.active_loops(), 0);
}
