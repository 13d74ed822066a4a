use config::Config;
use serde::Deserialize;
use std::fmt::{Display, Formatter, Result};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::rates::{TimeWindow, TimeWindowError};

pub const CONFIG_KEY_MODE: &str = "mode";
pub const CONFIG_KEY_POLL_INTERVAL_MS: &str = "poll-interval-ms";
pub const CONFIG_KEY_RATE_WINDOWS: &str = "rate-windows";

pub const CONFIG_KEY_HTTP_ADDRESS: &str = "http-address";
pub const CONFIG_KEY_NETWORK_ADDRESS: &str = "network-address";
pub const CONFIG_KEY_NETWORK_MAX_LINE_BYTES: &str = "network-max-line-bytes";
pub const CONFIG_KEY_LOCAL_CAPACITY: &str = "local-capacity";
pub const CONFIG_KEY_LOCAL_REPLAY_FILE: &str = "local-replay-file";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{key}': {source}")]
    InvalidValue {
        key: &'static str,
        #[source]
        source: config::ConfigError,
    },

    #[error(transparent)]
    RateWindow(#[from] TimeWindowError),

    #[error("'{0}' must be greater than zero")]
    NotPositive(&'static str),
}

/// Where snapshot batches are drained from; fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// In-process buffer, no cross-process transport
    Local,

    /// Batches delivered over TCP
    Network,
}

impl SourceMode {
    pub fn from_config(config: &Config) -> Self {
        match config.get::<SourceMode>(CONFIG_KEY_MODE) {
            Ok(mode) => mode,
            Err(config::ConfigError::NotFound(_)) => SourceMode::Network,
            Err(e) => {
                warn!("Ignoring unusable '{CONFIG_KEY_MODE}' ({e}), using network");
                SourceMode::Network
            }
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SourceMode::Local)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SourceMode::Network)
    }
}

impl Display for SourceMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            SourceMode::Local => write!(f, "local"),
            SourceMode::Network => write!(f, "network"),
        }
    }
}

/// Poll bridge period, defaulting to 100ms
pub fn poll_interval_from_config(config: &Config) -> std::result::Result<Duration, ConfigError> {
    match config.get_int(CONFIG_KEY_POLL_INTERVAL_MS) {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms as u64)),
        Ok(_) => Err(ConfigError::NotPositive(CONFIG_KEY_POLL_INTERVAL_MS)),
        Err(config::ConfigError::NotFound(_)) => Ok(DEFAULT_POLL_INTERVAL),
        Err(source) => Err(ConfigError::InvalidValue {
            key: CONFIG_KEY_POLL_INTERVAL_MS,
            source,
        }),
    }
}

/// Rate windows annotated onto publishers, defaulting to 10 seconds and 1 minute
pub fn rate_windows_from_config(
    config: &Config,
) -> std::result::Result<Vec<TimeWindow>, ConfigError> {
    match config.get::<Vec<String>>(CONFIG_KEY_RATE_WINDOWS) {
        Ok(labels) => {
            let mut windows = labels
                .iter()
                .map(|label| label.parse::<TimeWindow>())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            windows.sort();
            windows.dedup();
            Ok(windows)
        }
        Err(config::ConfigError::NotFound(_)) => Ok(TimeWindow::defaults()),
        Err(source) => Err(ConfigError::InvalidValue {
            key: CONFIG_KEY_RATE_WINDOWS,
            source,
        }),
    }
}

/// String value of `key`, `None` when absent
pub fn optional_string_from_config(
    config: &Config,
    key: &'static str,
) -> std::result::Result<Option<String>, ConfigError> {
    match config.get_string(key) {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(source) => Err(ConfigError::InvalidValue { key, source }),
    }
}

/// String value of `key`, `default` when absent
pub fn string_from_config(
    config: &Config,
    key: &'static str,
    default: &str,
) -> std::result::Result<String, ConfigError> {
    Ok(optional_string_from_config(config, key)?.unwrap_or_else(|| default.to_string()))
}

/// Positive count for `key`, `default` when absent
pub fn count_from_config(
    config: &Config,
    key: &'static str,
    default: usize,
) -> std::result::Result<usize, ConfigError> {
    match config.get_int(key) {
        Ok(value) if value > 0 => Ok(value as usize),
        Ok(_) => Err(ConfigError::NotPositive(key)),
        Err(config::ConfigError::NotFound(_)) => Ok(default),
        Err(source) => Err(ConfigError::InvalidValue { key, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::TimeUnit;
    use config::FileFormat;

    fn config_from(toml: &str) -> Config {
        Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn mode_defaults_to_network() {
        let config = config_from("");
        assert_eq!(SourceMode::from_config(&config), SourceMode::Network);
    }

    #[test]
    fn mode_reads_local() {
        let config = config_from("mode = \"local\"");
        let mode = SourceMode::from_config(&config);
        assert!(mode.is_local());
        assert_eq!(mode.to_string(), "local");
    }

    #[test]
    fn unknown_mode_falls_back_to_network() {
        let config = config_from("mode = \"carrier-pigeon\"");
        assert!(SourceMode::from_config(&config).is_network());
    }

    #[test]
    fn poll_interval_default_and_override() {
        assert_eq!(
            poll_interval_from_config(&config_from("")).unwrap(),
            Duration::from_millis(100)
        );
        assert_eq!(
            poll_interval_from_config(&config_from("poll-interval-ms = 250")).unwrap(),
            Duration::from_millis(250)
        );
        assert!(matches!(
            poll_interval_from_config(&config_from("poll-interval-ms = 0")),
            Err(ConfigError::NotPositive(_))
        ));
    }

    #[test]
    fn rate_windows_default_to_ten_seconds_and_one_minute() {
        let windows = rate_windows_from_config(&config_from("")).unwrap();
        assert_eq!(windows, vec![TimeWindow::TEN_SECONDS, TimeWindow::ONE_MINUTE]);
    }

    #[test]
    fn rate_windows_are_parsed_sorted_and_deduplicated() {
        let config = config_from(r#"rate-windows = ["5_MINUTES", "30_SECONDS", "30_SECONDS"]"#);
        let windows = rate_windows_from_config(&config).unwrap();
        assert_eq!(
            windows,
            vec![
                TimeWindow::new(30, TimeUnit::Seconds),
                TimeWindow::new(5, TimeUnit::Minutes)
            ]
        );
    }

    #[test]
    fn bad_rate_window_is_an_error() {
        let config = config_from(r#"rate-windows = ["soon"]"#);
        assert!(matches!(
            rate_windows_from_config(&config),
            Err(ConfigError::RateWindow(_))
        ));
    }

    #[test]
    fn strings_fall_back_only_when_absent() {
        assert_eq!(
            string_from_config(&config_from(""), CONFIG_KEY_HTTP_ADDRESS, "0.0.0.0:8080").unwrap(),
            "0.0.0.0:8080"
        );
        let config = config_from(r#"http-address = "127.0.0.1:9000""#);
        assert_eq!(
            string_from_config(&config, CONFIG_KEY_HTTP_ADDRESS, "0.0.0.0:8080").unwrap(),
            "127.0.0.1:9000"
        );
        assert_eq!(
            optional_string_from_config(&config_from(""), CONFIG_KEY_LOCAL_REPLAY_FILE).unwrap(),
            None
        );
    }

    #[test]
    fn mistyped_string_is_an_error() {
        let config = config_from(r#"network-address = ["a", "b"]"#);
        assert!(matches!(
            string_from_config(&config, CONFIG_KEY_NETWORK_ADDRESS, "0.0.0.0:40123"),
            Err(ConfigError::InvalidValue { key: "network-address", .. })
        ));
    }

    #[test]
    fn counts_are_positive_and_typed() {
        let key = CONFIG_KEY_LOCAL_CAPACITY;
        assert_eq!(count_from_config(&config_from(""), key, 1024).unwrap(), 1024);
        assert_eq!(count_from_config(&config_from("local-capacity = 8"), key, 1024).unwrap(), 8);
        assert!(matches!(
            count_from_config(&config_from("local-capacity = 0"), key, 1024),
            Err(ConfigError::NotPositive("local-capacity"))
        ));
        assert!(matches!(
            count_from_config(&config_from(r#"local-capacity = "lots""#), key, 1024),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
