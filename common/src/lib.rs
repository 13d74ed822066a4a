// Aether Net common library - main library exports

pub mod configuration;
pub mod listener;
pub mod rates;
pub mod types;

// Flattened re-exports
pub use self::listener::{AggregateListener, CounterSnapshotListener, FanOutError};
pub use self::rates::{NoRates, RateMonitor, RateSample, TimeUnit, TimeWindow};
pub use self::types::*;
