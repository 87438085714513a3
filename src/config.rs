use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

/// First day RescueTime data is requested for, unless configured otherwise.
pub const DEFAULT_EPOCH: NaiveDate = NaiveDate::from_ymd_opt(2016, 1, 1).unwrap();

/// Settings shared by all commands. Every one of them can also come from the environment.
#[derive(Debug, Clone, clap::Args)]
pub struct Settings {
    #[arg(
        long,
        global = true,
        env = "RESCUETIME_API_KEY",
        hide_env_values = true,
        help = "RescueTime API key. Needed for commands that talk to RescueTime"
    )]
    api_key: Option<String>,
    #[arg(
        long,
        global = true,
        env = "RESCUESYNC_STATS_DIR",
        help = "Directory with cached statistics. By default $XDG_STATE_HOME/rescuesync/rescuetime or $HOME/.local/state/rescuesync/rescuetime"
    )]
    stats_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "RESCUESYNC_SINCE",
        default_value_t = DEFAULT_EPOCH,
        help = "First day to keep statistics for"
    )]
    since: NaiveDate,
}

impl Settings {
    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("No API key given, use --api-key or RESCUETIME_API_KEY"))
    }

    pub fn stats_root(&self, application_dir: &Path) -> PathBuf {
        self.stats_dir
            .clone()
            .unwrap_or_else(|| application_dir.join("rescuetime"))
    }

    pub fn since(&self) -> NaiveDate {
        self.since
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;

    use super::{Settings, DEFAULT_EPOCH};

    #[derive(Parser)]
    struct TestArgs {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn test_defaults() {
        let args = TestArgs::parse_from(["test", "--api-key", "abc"]);
        assert_eq!(args.settings.since(), DEFAULT_EPOCH);
        assert_eq!(args.settings.api_key().unwrap(), "abc");
        assert_eq!(
            args.settings.stats_root(Path::new("/state/rescuesync")),
            Path::new("/state/rescuesync/rescuetime")
        );
    }

    #[test]
    fn test_overrides() {
        let args = TestArgs::parse_from([
            "test",
            "--api-key",
            " ",
            "--stats-dir",
            "/data/stats",
            "--since",
            "2020-05-17",
        ]);
        assert!(args.settings.api_key().is_err());
        assert_eq!(
            args.settings.stats_root(Path::new("/ignored")),
            Path::new("/data/stats")
        );
        assert_eq!(args.settings.since().to_string(), "2020-05-17");
    }
}
