use anyhow::Result;
use config::Config;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_CYCLE_TIMEOUT_SECS, DEFAULT_FETCH_CONCURRENCY, DEFAULT_FETCH_TIMEOUT_SECS,
    DEFAULT_INTERVAL_MINUTES,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub sources: Vec<SourceConfig>,
    pub output: OutputConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One configured calendar feed.
///
/// Declaration order in the config file is significant: it fixes both the
/// merge order and which event wins on a UID collision.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// `http(s)://` or `file://` URL of the feed.
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path the merged calendar is written to.
    #[serde(default = "default_output_path")]
    pub path: String,
    /// IANA identifier of the timezone every timed event is rewritten into.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Deadline for one whole fetch-merge-write pass.
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            cycle_timeout_secs: DEFAULT_CYCLE_TIMEOUT_SECS,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_output_path() -> String {
    "merged.ics".to_string()
}

fn default_timezone() -> String {
    "Europe/Berlin".to_string()
}

fn default_interval_minutes() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_cycle_timeout_secs() -> u64 {
    DEFAULT_CYCLE_TIMEOUT_SECS
}

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `config.toml` and environment variables into a
    /// `Settings`. Environment variables take precedence over file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Self::from_config(
            Config::builder()
                .add_source(config::File::with_name("config").required(false))
                .add_source(
                    config::Environment::with_prefix("CALFUSE")
                        .separator("__")
                        .ignore_empty(true)
                        .try_parsing(true),
                )
                .build()?,
        )
    }

    fn from_config(config: Config) -> Result<Self> {
        let mut settings = config.try_deserialize::<Settings>()?;
        // A zero permit count would park every fetch task forever.
        settings.sync.fetch_concurrency = settings.sync.fetch_concurrency.max(1);
        Ok(settings)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_defaults() {
        let sync = SyncConfig::default();
        assert_eq!(sync.interval_minutes, 15);
        assert_eq!(sync.fetch_timeout_secs, 30);
        assert_eq!(sync.cycle_timeout_secs, 300);
        assert_eq!(sync.fetch_concurrency, 4);
    }

    #[test]
    fn zero_fetch_concurrency_clamped_to_one() {
        let toml = r#"
            [[sources]]
            name = "work"
            url = "https://example.com/work.ics"

            [output]

            [sync]
            fetch_concurrency = 0
        "#;
        let config = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .expect("valid config");
        let settings = Settings::from_config(config).expect("deserializes");
        assert_eq!(settings.sync.fetch_concurrency, 1);
    }

    #[test]
    fn deserialize_minimal() {
        let toml = r#"
            [[sources]]
            name = "work"
            url = "https://example.com/work.ics"

            [output]
        "#;
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .and_then(Config::try_deserialize)
            .expect("valid config");
        assert_eq!(settings.sources.len(), 1);
        assert_eq!(settings.output.path, "merged.ics");
        assert_eq!(settings.output.timezone, "Europe/Berlin");
        assert_eq!(settings.sync.interval_minutes, 15);
    }
}
