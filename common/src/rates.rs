//! Publisher throughput samples, keyed by averaging window

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ChannelSessionKey;

/// Unit of a rate window's magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "SECONDS",
            TimeUnit::Minutes => "MINUTES",
            TimeUnit::Hours => "HOURS",
        }
    }

    fn seconds(&self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3600,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeWindowError {
    #[error("Rate window '{0}' is not of the form <magnitude>_<UNIT>")]
    Malformed(String),

    #[error("Rate window '{0}' has an unknown unit")]
    UnknownUnit(String),

    #[error("Rate window '{0}' must have a positive magnitude")]
    ZeroMagnitude(String),
}

/// A fixed historical duration over which throughput is averaged
///
/// Windows order by the span of time they cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub magnitude: u32,
    pub unit: TimeUnit,
}

impl TimeWindow {
    pub const fn new(magnitude: u32, unit: TimeUnit) -> Self {
        Self { magnitude, unit }
    }

    /// Short window used by default
    pub const TEN_SECONDS: TimeWindow = TimeWindow::new(10, TimeUnit::Seconds);

    /// Long window used by default
    pub const ONE_MINUTE: TimeWindow = TimeWindow::new(1, TimeUnit::Minutes);

    pub fn defaults() -> Vec<TimeWindow> {
        vec![Self::TEN_SECONDS, Self::ONE_MINUTE]
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.magnitude as u64 * self.unit.seconds())
    }

    /// Key used in rendered rate maps, e.g. `10_SECONDS`
    pub fn label(&self) -> String {
        format!("{}_{}", self.magnitude, self.unit)
    }
}

impl Ord for TimeWindow {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.duration()
            .cmp(&other.duration())
            .then_with(|| self.unit.cmp(&other.unit))
            .then_with(|| self.magnitude.cmp(&other.magnitude))
    }
}

impl PartialOrd for TimeWindow {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.magnitude, self.unit)
    }
}

impl FromStr for TimeWindow {
    type Err = TimeWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (magnitude, unit) =
            s.trim().split_once('_').ok_or_else(|| TimeWindowError::Malformed(s.to_string()))?;
        let magnitude: u32 =
            magnitude.parse().map_err(|_| TimeWindowError::Malformed(s.to_string()))?;
        if magnitude == 0 {
            return Err(TimeWindowError::ZeroMagnitude(s.to_string()));
        }
        let unit = match unit.to_ascii_uppercase().as_str() {
            "SECOND" | "SECONDS" => TimeUnit::Seconds,
            "MINUTE" | "MINUTES" => TimeUnit::Minutes,
            "HOUR" | "HOURS" => TimeUnit::Hours,
            _ => return Err(TimeWindowError::UnknownUnit(s.to_string())),
        };
        Ok(Self { magnitude, unit })
    }
}

/// Average throughput of one publisher over one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    pub window: TimeWindow,
    pub bytes_per_second: i64,
}

/// Source of per-publisher rate samples, pulled on demand
pub trait RateMonitor: Send + Sync {
    /// Samples for the given publisher; empty when nothing is known
    fn rates_for(&self, key: &ChannelSessionKey) -> Vec<RateSample>;
}

/// A rate monitor that never has samples
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRates;

impl RateMonitor for NoRates {
    fn rates_for(&self, _key: &ChannelSessionKey) -> Vec<RateSample> {
        Vec::new()
    }
}
