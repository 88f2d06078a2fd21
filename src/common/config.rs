use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub fn config_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("rolodex")
        .join("config.toml")
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Suppress the synthetic entry shown for apps with zero open windows.
    #[serde(default)]
    pub hide_windowless_apps: bool,
    /// Bundle ids that never appear in the switcher.
    #[serde(default)]
    pub blocklisted_apps: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Total time budget for one accessibility attempt before it is
    /// abandoned. Tuning parameter, not a correctness contract.
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_total_timeout_ms() -> u64 { 5_000 }
fn default_poll_interval_ms() -> u64 { 250 }

impl Default for Settings {
    fn default() -> Self {
        Settings {
            hide_windowless_apps: false,
            blocklisted_apps: Vec::new(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            total_timeout_ms: default_total_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settings: Settings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Config::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(contents).context("parsing config")?;
        Ok(config)
    }

    /// Loads the config file if present, falling back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_file);
        if path.exists() {
            Config::read(&path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn retry_total_timeout(&self) -> Duration {
        Duration::from_millis(self.retry.total_timeout_ms)
    }

    pub fn retry_poll_interval(&self) -> Duration {
        Duration::from_millis(self.retry.poll_interval_ms)
    }

    pub fn is_blocklisted(&self, bundle_id: Option<&str>) -> bool {
        let Some(bundle_id) = bundle_id else { return false };
        self.settings.blocklisted_apps.iter().any(|b| b == bundle_id)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_config_round_trips() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed = Config::parse(&serialized).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config = Config::parse(
            r#"
            [settings]
            hide_windowless_apps = true
            "#,
        )
        .unwrap();
        assert!(config.settings.hide_windowless_apps);
        assert_eq!(config.retry.total_timeout_ms, 5_000);
        assert_eq!(config.retry.poll_interval_ms, 250);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = Config::parse(
            r#"
            [settings]
            hide_windowless_app = true
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn blocklist_matches_exact_bundle_id() {
        let config = Config::parse(
            r#"
            [settings]
            blocklisted_apps = ["com.example.screensaver"]
            "#,
        )
        .unwrap();
        assert!(config.is_blocklisted(Some("com.example.screensaver")));
        assert!(!config.is_blocklisted(Some("com.example.screen")));
        assert!(!config.is_blocklisted(None));
    }
}
