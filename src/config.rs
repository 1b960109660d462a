//! Engine configuration.
//!
//! All mixing and timing constants live here so a host can tune them without
//! touching scheduling code. Every field has a default, so a config file only
//! needs the values it overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Upper bound on every configured time, in seconds.
pub const MAX_CONFIG_SECS: f64 = 3600.0;

/// Tunable constants for the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Gain of the master bus feeding the physical output.
    pub master_gain: f32,

    /// Peak envelope level of a drum hit at velocity 127.
    pub drum_gain: f32,

    /// Peak envelope level of a tonal note at velocity 127.
    pub tonal_gain: f32,

    /// How far in the past an event may start and still be played.
    pub stale_tolerance_secs: f64,

    /// How long before an iteration starts its events are submitted.
    pub schedule_ahead_secs: f64,

    /// Lower bound on the loop timer delay.
    pub min_timer_delay_secs: f64,

    /// Period of the finished-source reaper.
    pub reap_interval_secs: f64,

    /// Level the release ramp decays to by the end of a note.
    pub release_floor: f32,

    /// Sample rate used when rendering without an output device.
    pub offline_sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            master_gain: 0.3,
            drum_gain: 0.75,
            tonal_gain: 0.35,
            stale_tolerance_secs: 0.1,
            schedule_ahead_secs: 0.1,
            min_timer_delay_secs: 0.01,
            reap_interval_secs: 1.0,
            release_floor: 0.001,
            offline_sample_rate: 44_100,
        }
    }
}

impl EngineConfig {
    /// Loads a config from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or contains out-of-range values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parses and validates a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is finite and in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gains = [
            ("master_gain", self.master_gain),
            ("drum_gain", self.drum_gain),
            ("tonal_gain", self.tonal_gain),
        ];
        for (field, value) in gains {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    value: value as f64,
                });
            }
        }

        let times = [
            ("stale_tolerance_secs", self.stale_tolerance_secs),
            ("schedule_ahead_secs", self.schedule_ahead_secs),
        ];
        for (field, value) in times {
            if !value.is_finite() || !(0.0..=MAX_CONFIG_SECS).contains(&value) {
                return Err(ConfigError::Invalid { field, value });
            }
        }

        let periods = [
            ("min_timer_delay_secs", self.min_timer_delay_secs),
            ("reap_interval_secs", self.reap_interval_secs),
        ];
        for (field, value) in periods {
            if !value.is_finite() || value <= 0.0 || value > MAX_CONFIG_SECS {
                return Err(ConfigError::Invalid { field, value });
            }
        }

        if !self.release_floor.is_finite() || self.release_floor <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "release_floor",
                value: self.release_floor as f64,
            });
        }

        if self.offline_sample_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "offline_sample_rate",
                value: 0.0,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.drum_gain, 0.75);
        assert_eq!(config.tonal_gain, 0.35);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{ "drum_gain": 0.5 }"#).unwrap();
        assert_eq!(config.drum_gain, 0.5);
        assert_eq!(config.tonal_gain, 0.35);
        assert_eq!(config.offline_sample_rate, 44_100);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err = EngineConfig::from_json(r#"{ "master_gain": 3.0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "master_gain",
                ..
            }
        ));

        let err = EngineConfig::from_json(r#"{ "reap_interval_secs": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_rejects_huge_periods() {
        for json in [
            r#"{ "reap_interval_secs": 1e30 }"#,
            r#"{ "min_timer_delay_secs": 1e20 }"#,
            r#"{ "schedule_ahead_secs": 1e300 }"#,
            r#"{ "stale_tolerance_secs": 7200 }"#,
        ] {
            assert!(
                matches!(
                    EngineConfig::from_json(json),
                    Err(ConfigError::Invalid { .. })
                ),
                "{json}"
            );
        }
        let config = EngineConfig::from_json(r#"{ "reap_interval_secs": 3600 }"#).unwrap();
        assert_eq!(config.reap_interval_secs, MAX_CONFIG_SECS);
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(
            EngineConfig::from_json("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }
}
