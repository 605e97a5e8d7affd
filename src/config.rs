use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Upper bound on `max_history_size`. Estimates only need a handful of intervals.
pub const MAX_HISTORY_LIMIT: usize = 1024;

/// Tuning constants for a [`TempoEstimator`](crate::TempoEstimator).
///
/// All durations are in seconds. Every field is optional when deserialising;
/// missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TempoConfig {
    /// Inactivity threshold. A larger gap between taps restarts the sequence,
    /// and the estimator resets on its own after this much silence.
    pub max_tap_interval: f64,
    /// Taps required before an estimate is produced.
    pub min_taps_for_bpm: usize,
    /// EMA weight of each new raw estimate.
    pub smoothing_factor: f64,
    /// Number of intervals kept. The history holds one more timestamp than this.
    pub max_history_size: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Intervals whose ratio to the median lies strictly inside
    /// `(outlier_low, outlier_high)` are used for averaging.
    pub outlier_low: f64,
    pub outlier_high: f64,
    /// Floor applied to every interval so out-of-order timestamps cannot
    /// produce a zero or negative period.
    pub min_interval: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            max_tap_interval: 2.0,
            min_taps_for_bpm: 2,
            smoothing_factor: 0.3,
            max_history_size: 8,
            min_bpm: 20.0,
            max_bpm: 300.0,
            outlier_low: 0.5,
            outlier_high: 2.0,
            min_interval: 0.001,
        }
    }
}

impl TempoConfig {
    /// Check the constants for consistency.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(Error::InvalidConfig(msg)) };

        if !(self.max_tap_interval > 0.0)
            || Duration::try_from_secs_f64(self.max_tap_interval).is_err()
        {
            return invalid(format!(
                "max_tap_interval must be a positive number of seconds, got {}",
                self.max_tap_interval
            ));
        }
        if self.min_taps_for_bpm < 2 {
            return invalid(format!(
                "min_taps_for_bpm must be at least 2, got {}",
                self.min_taps_for_bpm
            ));
        }
        if self.max_history_size == 0 || self.max_history_size > MAX_HISTORY_LIMIT {
            return invalid(format!(
                "max_history_size must lie in [1, {MAX_HISTORY_LIMIT}], got {}",
                self.max_history_size
            ));
        }
        if self.min_taps_for_bpm > self.max_history_size + 1 {
            return invalid(format!(
                "min_taps_for_bpm ({}) cannot exceed max_history_size + 1 ({})",
                self.min_taps_for_bpm,
                self.max_history_size + 1
            ));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return invalid(format!(
                "smoothing_factor must lie in (0, 1], got {}",
                self.smoothing_factor
            ));
        }
        if !(self.min_bpm > 0.0 && self.min_bpm < self.max_bpm && self.max_bpm.is_finite()) {
            return invalid(format!(
                "bpm range must satisfy 0 < min_bpm < max_bpm, got [{}, {}]",
                self.min_bpm, self.max_bpm
            ));
        }
        if !(self.outlier_low > 0.0
            && self.outlier_low < 1.0
            && self.outlier_high > 1.0
            && self.outlier_high.is_finite())
        {
            return invalid(format!(
                "outlier band must satisfy 0 < low < 1 < high, got ({}, {})",
                self.outlier_low, self.outlier_high
            ));
        }
        if !(self.min_interval > 0.0 && self.min_interval < self.max_tap_interval) {
            return invalid(format!(
                "min_interval must be positive and below max_tap_interval, got {}",
                self.min_interval
            ));
        }

        Ok(())
    }

    /// The inactivity threshold as a [`Duration`].
    ///
    /// Only meaningful on a validated config.
    pub fn tap_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_tap_interval).unwrap_or(Duration::ZERO)
    }
}

/// MIDI tap input settings. Only used when built with the `midi` feature.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MidiConfig {
    /// Case-insensitive substring of the input port name. Empty picks the first port.
    #[serde(default)]
    pub port: String,
    /// Only note-on messages for this note count as taps. Any note when unset.
    #[serde(default)]
    pub note: Option<u8>,
}

/// Settings for the terminal front-end.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub tempo: TempoConfig,
    pub midi: Option<MidiConfig>,
}

impl AppConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.tempo.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TempoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tap_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str("tempo:\n  smoothing_factor: 0.5\n").unwrap();
        assert_eq!(config.tempo.smoothing_factor, 0.5);
        assert_eq!(config.tempo.max_history_size, 8);
        assert_eq!(config.tempo.max_tap_interval, 2.0);
        assert!(config.midi.is_none());
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(AppConfig::from_yaml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn parses_midi_section() {
        let config = AppConfig::from_yaml_str("midi:\n  port: x1\n  note: 36\n").unwrap();
        let midi = config.midi.unwrap();
        assert_eq!(midi.port, "x1");
        assert_eq!(midi.note, Some(36));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = AppConfig::from_yaml_str("tempo:\n  smoothing: 0.5\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn rejects_inconsistent_constants() {
        let cases = [
            TempoConfig {
                min_taps_for_bpm: 1,
                ..Default::default()
            },
            TempoConfig {
                min_taps_for_bpm: 10,
                ..Default::default()
            },
            TempoConfig {
                max_history_size: 0,
                ..Default::default()
            },
            TempoConfig {
                max_history_size: MAX_HISTORY_LIMIT + 1,
                ..Default::default()
            },
            TempoConfig {
                max_history_size: usize::MAX,
                ..Default::default()
            },
            TempoConfig {
                max_tap_interval: 0.0,
                ..Default::default()
            },
            TempoConfig {
                max_tap_interval: f64::NAN,
                ..Default::default()
            },
            TempoConfig {
                smoothing_factor: 0.0,
                ..Default::default()
            },
            TempoConfig {
                smoothing_factor: 1.5,
                ..Default::default()
            },
            TempoConfig {
                min_bpm: 300.0,
                max_bpm: 20.0,
                ..Default::default()
            },
            TempoConfig {
                outlier_low: 1.2,
                ..Default::default()
            },
            TempoConfig {
                outlier_high: 0.9,
                ..Default::default()
            },
            TempoConfig {
                min_interval: 0.0,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn rejects_oversized_history_from_yaml() {
        for size in ["18446744073709551615", "1000000000000000000"] {
            let yaml = format!("tempo:\n  max_history_size: {size}\n");
            let err = AppConfig::from_yaml_str(&yaml).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "accepted {size}");
        }
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tempo:\n  max_tap_interval: 1.5").unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.tempo.tap_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
