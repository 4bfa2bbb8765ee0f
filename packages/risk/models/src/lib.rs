#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk scoring configuration and output records.

use landwatch_geography_models::ProjectionKind;
use landwatch_source_models::WeatherObservation;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Tolerance used when checking that weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Risk bucket derived from a score in `[0, 1]`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Error returned when a [`RiskConfig`] is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRiskConfig {
    /// Dotted path of the offending setting, e.g. `weights.temperature`.
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for InvalidRiskConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid risk setting `{}`: {}", self.field, self.message)
    }
}

impl std::error::Error for InvalidRiskConfig {}

/// Contribution of each normalized signal to the score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RiskWeights {
    pub temperature: f64,
    pub wind_speed: f64,
    /// Weight of `1 - humidity_norm`.
    pub dryness: f64,
    pub fire_count: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            temperature: 0.35,
            wind_speed: 0.25,
            dryness: 0.15,
            fire_count: 0.25,
        }
    }
}

impl RiskWeights {
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.temperature + self.wind_speed + self.dryness + self.fire_count
    }

    /// # Errors
    ///
    /// Returns [`InvalidRiskConfig`] if a weight is negative or non-finite,
    /// or the weights do not sum to 1.
    pub fn validate(&self) -> Result<(), InvalidRiskConfig> {
        for (field, value) in [
            ("weights.temperature", self.temperature),
            ("weights.wind_speed", self.wind_speed),
            ("weights.dryness", self.dryness),
            ("weights.fire_count", self.fire_count),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(InvalidRiskConfig {
                    field,
                    message: format!("{value} is not a non-negative number"),
                });
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(InvalidRiskConfig {
                field: "weights",
                message: format!("weights sum to {sum}, expected 1"),
            });
        }

        Ok(())
    }
}

/// Inclusive upper bounds of the Low and Medium buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RiskLevels {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for RiskLevels {
    fn default() -> Self {
        Self {
            low_max: 0.33,
            medium_max: 0.66,
        }
    }
}

impl RiskLevels {
    #[must_use]
    pub fn classify(&self, score: f64) -> RiskLevel {
        if score <= self.low_max {
            RiskLevel::Low
        } else if score <= self.medium_max {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    /// # Errors
    ///
    /// Returns [`InvalidRiskConfig`] unless `0 <= low_max < medium_max <= 1`.
    pub fn validate(&self) -> Result<(), InvalidRiskConfig> {
        let ordered = self.low_max.is_finite()
            && self.medium_max.is_finite()
            && self.low_max >= 0.0
            && self.low_max < self.medium_max
            && self.medium_max <= 1.0;

        if ordered {
            Ok(())
        } else {
            Err(InvalidRiskConfig {
                field: "levels",
                message: format!(
                    "expected 0 <= low_max < medium_max <= 1, got {} and {}",
                    self.low_max, self.medium_max
                ),
            })
        }
    }
}

/// Parameters of a risk assessment run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RiskConfig {
    /// Search radius around each weather point, kilometres.
    pub radius_km: f64,
    pub projection: ProjectionKind,
    pub weights: RiskWeights,
    pub levels: RiskLevels,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            radius_km: 10.0,
            projection: ProjectionKind::default(),
            weights: RiskWeights::default(),
            levels: RiskLevels::default(),
        }
    }
}

impl RiskConfig {
    /// # Errors
    ///
    /// Returns [`InvalidRiskConfig`] for a negative or non-finite radius, or
    /// invalid weights or levels.
    pub fn validate(&self) -> Result<(), InvalidRiskConfig> {
        if !self.radius_km.is_finite() || self.radius_km < 0.0 {
            return Err(InvalidRiskConfig {
                field: "radius_km",
                message: format!("{} is not a non-negative number", self.radius_km),
            });
        }
        self.weights.validate()?;
        self.levels.validate()
    }

    /// Output column name for the fire count, e.g. `firms_count_10km`.
    #[must_use]
    pub fn fire_count_key(&self) -> String {
        fire_count_key(self.radius_km)
    }
}

/// `firms_count_<whole km>km`. Fractional radii are truncated.
#[must_use]
pub fn fire_count_key(radius_km: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let whole = radius_km.trunc() as i64;
    format!("firms_count_{whole}km")
}

/// A weather point with its fire count and risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRecord {
    pub observation: WeatherObservation,
    /// Fires within the configured radius.
    pub fire_count: u32,
    /// Score in `[0, 1]`, rounded to three decimals.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}
