use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_STABILITY_THRESHOLD: f64 = 5.0;
pub const DEFAULT_TURN_TOLERANCE: f64 = 15.0;
pub const DEFAULT_MIN_STABLE_LEN: usize = 2;
pub const DEFAULT_MAX_OUTLIERS: usize = 0;
pub const DEFAULT_SUM_TOLERANCE: f64 = 15.0;

pub const STABILITY_THRESHOLD_RANGE: (f64, f64) = (0.0, 20.0);
pub const TURN_TOLERANCE_RANGE: (f64, f64) = (0.0, 30.0);
pub const MIN_STABLE_LEN_RANGE: (usize, usize) = (1, 10);
pub const MAX_OUTLIERS_RANGE: (usize, usize) = (0, 10);
pub const SUM_TOLERANCE_RANGE: (f64, f64) = (0.0, 50.0);

/// Tunables shared by every pipeline stage.
///
/// Field names serialize in camelCase; fields missing from a JSON document
/// fall back to their defaults.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Maximum circular deviation (degrees) from the running segment mean.
    pub stability_threshold: f64,
    /// Accepted deviation (degrees) of a turn from 90°.
    pub turn_tolerance: f64,
    /// Minimum accepted readings for a segment to be kept.
    pub min_stable_len: usize,
    /// Consecutive non-conforming readings skipped before a segment closes.
    pub max_outliers: usize,
    /// Accepted deviation (degrees) of the four-turn sum from 360°.
    pub sum_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            turn_tolerance: DEFAULT_TURN_TOLERANCE,
            min_stable_len: DEFAULT_MIN_STABLE_LEN,
            max_outliers: DEFAULT_MAX_OUTLIERS,
            sum_tolerance: DEFAULT_SUM_TOLERANCE,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_degrees(
            "stabilityThreshold",
            self.stability_threshold,
            STABILITY_THRESHOLD_RANGE,
        )?;
        check_degrees("turnTolerance", self.turn_tolerance, TURN_TOLERANCE_RANGE)?;
        check_count("minStableLen", self.min_stable_len, MIN_STABLE_LEN_RANGE)?;
        check_count("maxOutliers", self.max_outliers, MAX_OUTLIERS_RANGE)?;
        check_degrees("sumTolerance", self.sum_tolerance, SUM_TOLERANCE_RANGE)?;
        Ok(())
    }
}

fn check_degrees(field: &'static str, value: f64, range: (f64, f64)) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFinite { field, value });
    }
    if value < range.0 || value > range.1 {
        return Err(ConfigError::DegreesOutOfRange {
            field,
            value,
            min: range.0,
            max: range.1,
        });
    }
    Ok(())
}

fn check_count(
    field: &'static str,
    value: usize,
    range: (usize, usize),
) -> Result<(), ConfigError> {
    if value < range.0 || value > range.1 {
        return Err(ConfigError::CountOutOfRange {
            field,
            value,
            min: range.0,
            max: range.1,
        });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    NonFinite {
        field: &'static str,
        value: f64,
    },
    DegreesOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    CountOutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },
}

impl ConfigError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::NonFinite { field, .. }
            | Self::DegreesOutOfRange { field, .. }
            | Self::CountOutOfRange { field, .. } => field,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite { field, value } => {
                write!(f, "{} must be a finite number, got {}", field, value)
            }
            Self::DegreesOutOfRange {
                field,
                value,
                min,
                max,
            } => write!(
                f,
                "{} must be within [{}, {}] degrees, got {}",
                field, min, max, value
            ),
            Self::CountOutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{} must be within [{}, {}], got {}", field, min, max, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(AnalysisConfig::default().validate(), Ok(()));
    }

    #[test]
    fn range_edges_are_inclusive() {
        let config = AnalysisConfig {
            stability_threshold: 20.0,
            turn_tolerance: 0.0,
            min_stable_len: 10,
            max_outliers: 10,
            sum_tolerance: 50.0,
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn out_of_range_names_the_field() {
        let config = AnalysisConfig {
            turn_tolerance: 30.5,
            ..AnalysisConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), "turnTolerance");
        assert!(err.to_string().contains("[0, 30]"));

        let config = AnalysisConfig {
            min_stable_len: 0,
            ..AnalysisConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().field(), "minStableLen");
    }

    #[test]
    fn nan_is_rejected() {
        let config = AnalysisConfig {
            sum_tolerance: f64::NAN,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFinite {
                field: "sumTolerance",
                ..
            })
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"turnTolerance": 10, "maxOutliers": 2}"#).unwrap();
        assert_eq!(config.turn_tolerance, 10.0);
        assert_eq!(config.max_outliers, 2);
        assert_eq!(config.stability_threshold, DEFAULT_STABILITY_THRESHOLD);
        assert_eq!(config.min_stable_len, DEFAULT_MIN_STABLE_LEN);
    }
}
