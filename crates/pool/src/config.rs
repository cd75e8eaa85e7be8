//! Pool configuration types
//!
//! [`PoolConfig`] is the normalized, immutable configuration a pool runs
//! with. Raw option blobs (for example loaded from a JSON settings file)
//! go through [`PoolConfig::from_options`], which coerces every field the
//! lenient way and never fails.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Configuration for a connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    /// Minimum number of connections kept open
    pub min: usize,
    /// Maximum number of connections, placeholders included
    pub max: usize,
    /// How long a request may wait for a connection (`ZERO` = forever)
    #[serde(with = "millis", alias = "acquireTimeout")]
    pub request_timeout: Duration,
    /// Waiting-queue bound enforced at admission (`0` = unbounded)
    pub max_waiting_requests: usize,
    /// Period of the idle sweep (`ZERO` = disabled)
    #[serde(with = "millis", alias = "checkInterval")]
    pub idle_check_interval: Duration,
    /// Idle time after which an available connection is evicted
    #[serde(with = "millis")]
    pub idle_timeout: Duration,
    /// Publish `poolDebug` events on the event bus
    pub debug: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 3,
            max: 50,
            request_timeout: Duration::from_millis(5000),
            max_waiting_requests: 0,
            idle_check_interval: Duration::ZERO,
            idle_timeout: Duration::from_millis(30_000),
            debug: false,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given bounds and default timings.
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    /// Set the request timeout (`Duration::ZERO` disables it).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the waiting-queue bound (`0` = unbounded).
    pub fn with_max_waiting_requests(mut self, max_waiting: usize) -> Self {
        self.max_waiting_requests = max_waiting;
        self
    }

    /// Set the idle sweep period (`Duration::ZERO` disables the sweep).
    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    /// Set the idle eviction threshold.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable or disable `poolDebug` events.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Request timeout as an option, `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (!self.request_timeout.is_zero()).then_some(self.request_timeout)
    }

    /// Clamp the bounds: `max >= 1` and `min <= max`.
    pub fn normalized(mut self) -> Self {
        self.max = self.max.max(1);
        self.min = self.min.min(self.max);
        self
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max == 0 {
            return Err(Error::configuration("max must be greater than 0"));
        }
        if self.min > self.max {
            return Err(Error::configuration(format!(
                "min ({}) must not exceed max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Build a configuration from a loosely typed option object.
    ///
    /// Missing keys take their default. Numeric fields accept numbers and
    /// numeric strings; anything unparseable falls back to `1` for `max`
    /// and `0` for every other field. `debug` is `true` only for a boolean
    /// `true` or a case-insensitive `"true"` string. The result is always
    /// normalized.
    pub fn from_options(options: &Value) -> Self {
        let defaults = Self::default();
        let Some(map) = options.as_object() else {
            return defaults;
        };
        let lookup = |keys: &[&str]| keys.iter().find_map(|key| map.get(*key));

        let max = match lookup(&["max"]) {
            None => defaults.max,
            Some(value) => coerce_number(value)
                .filter(|n| *n >= 1.0)
                .map_or(1, |n| n as usize),
        };
        let min = match lookup(&["min"]) {
            None => defaults.min,
            Some(value) => coerce_number(value).map_or(0, |n| n.max(0.0) as usize),
        };
        let count = |keys: &[&str], default: usize| match lookup(keys) {
            None => default,
            Some(value) => coerce_number(value).map_or(0, |n| n.max(0.0) as usize),
        };
        let millis = |keys: &[&str], default: Duration| match lookup(keys) {
            None => default,
            Some(value) => {
                Duration::from_millis(coerce_number(value).map_or(0, |n| n.max(0.0) as u64))
            }
        };
        let debug = match lookup(&["debug"]) {
            None => defaults.debug,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => text.eq_ignore_ascii_case("true"),
            Some(_) => false,
        };

        Self {
            min,
            max,
            request_timeout: millis(
                &["requestTimeout", "acquireTimeout"],
                defaults.request_timeout,
            ),
            max_waiting_requests: count(&["maxWaitingRequests"], defaults.max_waiting_requests),
            idle_check_interval: millis(
                &["idleCheckInterval", "checkInterval"],
                defaults.idle_check_interval,
            ),
            idle_timeout: millis(&["idleTimeout"], defaults.idle_timeout),
            debug,
        }
        .normalized()
    }
}

/// Numeric coercion of a JSON option value; `None` when it is not a number.
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Null => Some(0.0),
        Value::Bool(flag) => Some(f64::from(u8::from(*flag))),
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                Some(0.0)
            } else {
                text.parse::<f64>().ok()
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    };
    number.filter(|n| n.is_finite())
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn default_matches_documented_values() {
        let config = PoolConfig::default();
        assert_eq!(config.min, 3);
        assert_eq!(config.max, 50);
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert_eq!(config.max_waiting_requests, 0);
        assert_eq!(config.idle_check_interval, Duration::ZERO);
        assert_eq!(config.idle_timeout, Duration::from_millis(30_000));
        assert!(!config.debug);
    }

    #[rstest]
    #[case::empty_object(json!({}))]
    #[case::null(Value::Null)]
    #[case::not_an_object(json!("min=3"))]
    fn empty_options_yield_defaults(#[case] options: Value) {
        assert_eq!(PoolConfig::from_options(&options), PoolConfig::default());
    }

    #[rstest]
    #[case::min_above_max(json!({"min": 45, "max": 35}), 35, 35)]
    #[case::zero_max(json!({"max": 0}), 1, 1)]
    #[case::garbage_min(json!({"min": "A"}), 0, 50)]
    #[case::garbage_max(json!({"max": "A"}), 1, 1)]
    #[case::numeric_strings(json!({"min": "2", "max": " 8 "}), 2, 8)]
    fn bounds_are_coerced(#[case] options: Value, #[case] min: usize, #[case] max: usize) {
        let config = PoolConfig::from_options(&options);
        assert_eq!((config.min, config.max), (min, max));
    }

    #[test]
    fn garbage_numbers_fall_back_to_zero() {
        let config = PoolConfig::from_options(&json!({
            "acquireTimeout": "A",
            "maxWaitingRequests": "A",
            "checkInterval": [],
            "idleTimeout": {},
        }));
        assert_eq!(config.request_timeout, Duration::ZERO);
        assert_eq!(config.max_waiting_requests, 0);
        assert_eq!(config.idle_check_interval, Duration::ZERO);
        assert_eq!(config.idle_timeout, Duration::ZERO);
    }

    #[rstest]
    #[case(json!({"debug": true}), true)]
    #[case(json!({"debug": "True"}), true)]
    #[case(json!({"debug": "A"}), false)]
    #[case(json!({"debug": 1}), false)]
    fn debug_flag_is_strict(#[case] options: Value, #[case] expected: bool) {
        assert_eq!(PoolConfig::from_options(&options).debug, expected);
    }

    #[test]
    fn aliases_are_accepted() {
        let config = PoolConfig::from_options(&json!({
            "acquireTimeout": 800,
            "checkInterval": 50_000,
        }));
        assert_eq!(config.request_timeout, Duration::from_millis(800));
        assert_eq!(config.idle_check_interval, Duration::from_millis(50_000));
    }

    #[test]
    fn validate_rejects_bad_bounds() {
        assert!(PoolConfig::new(0, 0).validate().is_err());
        assert!(PoolConfig::new(11, 10).validate().is_err());
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::new(11, 10).normalized().validate().is_ok());
    }

    #[test]
    fn zero_request_timeout_means_none() {
        let config = PoolConfig::default().with_request_timeout(Duration::ZERO);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn serde_uses_camel_case_millis() {
        let config: PoolConfig = serde_json::from_value(json!({
            "min": 2,
            "max": 5,
            "acquireTimeout": 800,
            "maxWaitingRequests": 6,
        }))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(800));
        assert_eq!(config.max_waiting_requests, 6);
        assert_eq!(config.idle_timeout, PoolConfig::default().idle_timeout);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["requestTimeout"], json!(800));
    }
}
