use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use telemetry_lab::{
    constants::{DEFAULT_LOAD, MAX_LOAD, MIN_LOAD},
    ManualPowerState, PowerSource, SysfsPowerState,
};

/// telemetry-lab - paced CPU workload with live frame timing statistics
#[derive(Parser, Debug)]
#[command(name = "telemetry-lab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Convolution passes per tick
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_LOAD as i64,
        value_parser = clap::value_parser!(i64).range(MIN_LOAD as i64..=MAX_LOAD as i64)
    )]
    pub load: i64,

    /// Where the power-save signal comes from
    #[arg(long, value_enum, default_value_t = PowerMode::Auto)]
    pub power_save: PowerMode,

    /// Print one JSON summary per line instead of drawing the dashboard
    #[arg(long)]
    pub headless: bool,

    /// Stop after this many summaries (headless only)
    #[arg(long, requires = "headless")]
    pub ticks: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// Power-save while any battery is discharging
    Auto,
    /// Start in power-save; toggle with `p`
    On,
    /// Start at full rate; toggle with `p`
    Off,
}

impl PowerMode {
    pub fn source(self) -> PowerSource {
        match self {
            PowerMode::Auto => PowerSource::Sysfs(SysfsPowerState::new()),
            PowerMode::On => PowerSource::Manual(ManualPowerState::new(true)),
            PowerMode::Off => PowerSource::Manual(ManualPowerState::new(false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use telemetry_lab::PowerState;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["telemetry-lab"]).unwrap();
        assert_eq!(cli.load, 2);
        assert_eq!(cli.power_save, PowerMode::Auto);
        assert!(!cli.headless);
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn load_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from(["telemetry-lab", "--load", "0"]).is_err());
        assert!(Cli::try_parse_from(["telemetry-lab", "--load", "6"]).is_err());
        let cli = Cli::try_parse_from(["telemetry-lab", "-l", "5"]).unwrap();
        assert_eq!(cli.load, 5);
    }

    #[test]
    fn ticks_requires_headless() {
        assert!(Cli::try_parse_from(["telemetry-lab", "--ticks", "3"]).is_err());
        let cli =
            Cli::try_parse_from(["telemetry-lab", "--headless", "--ticks", "3"]).unwrap();
        assert_eq!(cli.ticks, Some(3));
    }

    #[test]
    fn manual_modes_start_in_requested_state() {
        assert!(PowerMode::On.source().is_power_save());
        assert!(!PowerMode::Off.source().is_power_save());
        assert!(PowerMode::Off.source().manual().is_some());
        assert!(PowerMode::Auto.source().manual().is_none());
    }
}
