use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::debug;

/// Polled once per tick by the scheduler.
pub trait PowerState: Send + Sync {
    fn is_power_save(&self) -> bool;
}

impl<F> PowerState for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_power_save(&self) -> bool {
        self()
    }
}

/// Externally toggled flag. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ManualPowerState {
    enabled: Arc<AtomicBool>,
}

impl ManualPowerState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    // Returns the new value.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::Relaxed)
    }
}

impl PowerState for ManualPowerState {
    fn is_power_save(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// Treats "running on battery" as power-save: true when any supply under
/// `/sys/class/power_supply` reports `Discharging`.
#[derive(Debug, Clone)]
pub struct SysfsPowerState {
    root: PathBuf,
}

impl Default for SysfsPowerState {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsPowerState {
    pub fn new() -> Self {
        Self::with_root(POWER_SUPPLY_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PowerState for SysfsPowerState {
    fn is_power_save(&self) -> bool {
        any_discharging(&self.root)
    }
}

fn any_discharging(root: &Path) -> bool {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(root = %root.display(), %err, "power supply info unavailable");
            return false;
        }
    };

    entries.flatten().any(|entry| {
        fs::read_to_string(entry.path().join("status"))
            .map(|status| status.trim().eq_ignore_ascii_case("discharging"))
            .unwrap_or(false)
    })
}

#[derive(Debug, Clone)]
pub enum PowerSource {
    Sysfs(SysfsPowerState),
    Manual(ManualPowerState),
}

impl PowerSource {
    pub fn manual(&self) -> Option<ManualPowerState> {
        match self {
            PowerSource::Manual(state) => Some(state.clone()),
            PowerSource::Sysfs(_) => None,
        }
    }
}

impl PowerState for PowerSource {
    fn is_power_save(&self) -> bool {
        match self {
            PowerSource::Sysfs(state) => state.is_power_save(),
            PowerSource::Manual(state) => state.is_power_save(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn closure_is_a_power_state() {
        let always = || true;
        assert!(always.is_power_save());
    }

    #[test]
    fn manual_toggle_is_shared() {
        let state = ManualPowerState::new(false);
        let other = state.clone();
        assert!(state.toggle());
        assert!(other.is_power_save());
        assert!(!other.toggle());
        assert!(!state.is_power_save());
        state.set(true);
        assert!(other.is_power_save());
    }

    #[test]
    fn sysfs_reports_discharging_battery() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("AC")).unwrap();
        fs::write(root.join("AC/online"), "0\n").unwrap();
        fs::create_dir_all(root.join("BAT0")).unwrap();
        fs::write(root.join("BAT0/status"), "Discharging\n").unwrap();

        assert!(SysfsPowerState::with_root(root).is_power_save());

        fs::write(root.join("BAT0/status"), "Charging\n").unwrap();
        assert!(!SysfsPowerState::with_root(root).is_power_save());
    }

    #[test]
    fn power_source_exposes_manual_handle() {
        let source = PowerSource::Manual(ManualPowerState::new(false));
        let handle = source.manual().unwrap();
        handle.set(true);
        assert!(source.is_power_save());
        assert!(PowerSource::Sysfs(SysfsPowerState::new()).manual().is_none());
    }

    #[test]
    fn sysfs_missing_root_is_not_power_save() {
        let state = SysfsPowerState::with_root("/nonexistent/telemetry-lab/power");
        assert!(!state.is_power_save());
    }
}
