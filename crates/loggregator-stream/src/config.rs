// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_FLUSH_PERIOD, DEFAULT_HOLD_WINDOW, DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_LOG_LEVEL,
    MAX_CONFIGURED_INTERVAL, VALID_LOG_LEVELS,
};
use crate::errors::ConfigError;

/// Timing parameters of a log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Minimum time a record is buffered before release
    pub hold_window: Duration,
    /// How often the reorder buffer is inspected for releasable records
    pub flush_period: Duration,
    /// Interval between keep-alive pings on the connection
    pub keep_alive_interval: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            hold_window: DEFAULT_HOLD_WINDOW,
            flush_period: DEFAULT_FLUSH_PERIOD,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl StreamConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let hold_window = env::var("LOGGREGATOR_HOLD_WINDOW_MS")
            .ok()
            .and_then(|ms| ms.trim().parse::<u64>().ok())
            .map_or(DEFAULT_HOLD_WINDOW, Duration::from_millis);
        let flush_period = env::var("LOGGREGATOR_FLUSH_PERIOD_MS")
            .ok()
            .and_then(|ms| ms.trim().parse::<u64>().ok())
            .map_or(DEFAULT_FLUSH_PERIOD, Duration::from_millis);
        let keep_alive_interval = env::var("LOGGREGATOR_KEEP_ALIVE_SECS")
            .ok()
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .map_or(DEFAULT_KEEP_ALIVE_INTERVAL, Duration::from_secs);
        let log_level = env::var("LOGGREGATOR_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let config = Self {
            hold_window,
            flush_period,
            keep_alive_interval,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hold_window.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "hold window must be greater than 0".to_string(),
            ));
        }

        if self.hold_window > MAX_CONFIGURED_INTERVAL {
            return Err(ConfigError::InvalidConfig(format!(
                "hold window ({:?}) must not exceed {:?}",
                self.hold_window, MAX_CONFIGURED_INTERVAL
            )));
        }

        if self.flush_period.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "flush period must be greater than 0".to_string(),
            ));
        }

        // A longer period would let records wait arbitrarily past the hold window
        if self.flush_period > self.hold_window {
            return Err(ConfigError::InvalidConfig(format!(
                "flush period ({:?}) must not exceed the hold window ({:?})",
                self.flush_period, self.hold_window
            )));
        }

        if self.keep_alive_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "keep-alive interval must be greater than 0".to_string(),
            ));
        }

        if self.keep_alive_interval > MAX_CONFIGURED_INTERVAL {
            return Err(ConfigError::InvalidConfig(format!(
                "keep-alive interval ({:?}) must not exceed {:?}",
                self.keep_alive_interval, MAX_CONFIGURED_INTERVAL
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hold_window, Duration::from_millis(1000));
        assert_eq!(config.flush_period, Duration::from_millis(200));
        assert_eq!(config.keep_alive_interval, Duration::from_secs(25));
    }

    #[test]
    fn test_validate_zero_durations() {
        let config = StreamConfig {
            hold_window: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StreamConfig {
            flush_period: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StreamConfig {
            keep_alive_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_flush_period_longer_than_hold_window() {
        let config = StreamConfig {
            hold_window: Duration::from_millis(100),
            flush_period: Duration::from_millis(101),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StreamConfig {
            hold_window: Duration::from_millis(100),
            flush_period: Duration::from_millis(100),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_huge_intervals() {
        let config = StreamConfig {
            hold_window: Duration::from_millis(u64::MAX),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StreamConfig {
            keep_alive_interval: Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StreamConfig {
            hold_window: MAX_CONFIGURED_INTERVAL,
            keep_alive_interval: MAX_CONFIGURED_INTERVAL,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let config = StreamConfig {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Log level '{}' should be valid",
                level
            );
        }

        let config = StreamConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("LOGGREGATOR_HOLD_WINDOW_MS", "500");
        env::set_var("LOGGREGATOR_FLUSH_PERIOD_MS", "not-a-number");
        env::set_var("LOGGREGATOR_KEEP_ALIVE_SECS", "10");
        env::set_var("LOGGREGATOR_LOG_LEVEL", "DEBUG");

        let config = StreamConfig::from_env().expect("config should load");

        for key in [
            "LOGGREGATOR_HOLD_WINDOW_MS",
            "LOGGREGATOR_FLUSH_PERIOD_MS",
            "LOGGREGATOR_KEEP_ALIVE_SECS",
            "LOGGREGATOR_LOG_LEVEL",
        ] {
            env::remove_var(key);
        }

        assert_eq!(config.hold_window, Duration::from_millis(500));
        assert_eq!(config.flush_period, DEFAULT_FLUSH_PERIOD);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(10));
        assert_eq!(config.log_level, "debug");
    }
}
