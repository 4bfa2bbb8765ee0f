#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical record types for the fire-detection and weather feeds.
//!
//! Feed adapters in `landwatch_source` map raw provider rows into
//! [`FireDetection`] and [`WeatherObservation`]. Rows that cannot be mapped
//! are reported as [`SkippedRecord`]s in a [`NormalizedBatch`] rather than
//! dropped silently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A record with a geographic position in WGS84 degrees.
pub trait Located {
    fn longitude(&self) -> f64;
    fn latitude(&self) -> f64;
}

/// Detection confidence as reported by the satellite product.
///
/// MODIS reports a 0-100 percentage; VIIRS reports a `low`/`nominal`/`high`
/// class (sometimes abbreviated to `l`/`n`/`h`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Percentage in `[0, 100]`.
    Percent(f64),
    Low,
    Nominal,
    High,
    /// Missing or unparseable.
    #[default]
    Unknown,
}

impl Confidence {
    /// Score used when the confidence is missing or malformed.
    pub const NEUTRAL_SCORE: f64 = 0.5;

    /// Parses a raw confidence value. Anything unrecognized becomes
    /// [`Confidence::Unknown`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "l" | "low" => Self::Low,
            "n" | "nominal" => Self::Nominal,
            "h" | "high" => Self::High,
            _ => trimmed.parse::<f64>().map_or(Self::Unknown, Self::from_percent),
        }
    }

    /// Wraps a percentage, rejecting values outside `[0, 100]`.
    #[must_use]
    pub fn from_percent(value: f64) -> Self {
        if value.is_finite() && (0.0..=100.0).contains(&value) {
            Self::Percent(value)
        } else {
            Self::Unknown
        }
    }

    /// Confidence mapped onto `[0, 1]`. Published with each fire in the
    /// snapshot; the risk score counts fires and does not weight them by
    /// confidence.
    #[must_use]
    pub fn score(&self) -> f64 {
        match self {
            Self::Percent(pct) => (pct / 100.0).clamp(0.0, 1.0),
            Self::Low => 0.2,
            Self::Nominal | Self::Unknown => Self::NEUTRAL_SCORE,
            Self::High => 0.85,
        }
    }

    /// Short label suitable for tabular output; `None` for unknown.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Percent(pct) => Some(format!("{pct}")),
            Self::Low => Some("low".to_string()),
            Self::Nominal => Some("nominal".to_string()),
            Self::High => Some("high".to_string()),
            Self::Unknown => None,
        }
    }
}

/// A single active-fire detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireDetection {
    pub latitude: f64,
    pub longitude: f64,
    pub confidence: Confidence,
    /// Brightness temperature in kelvin.
    pub brightness: Option<f64>,
    /// Fire radiative power in megawatts.
    pub frp: Option<f64>,
    /// Acquisition time (UTC).
    pub acquired_at: Option<DateTime<Utc>>,
    pub satellite: Option<String>,
    pub instrument: Option<String>,
}

impl Located for FireDetection {
    fn longitude(&self) -> f64 {
        self.longitude
    }

    fn latitude(&self) -> f64 {
        self.latitude
    }
}

/// Weather conditions at a point. Each measurement is optional; a missing
/// value is never coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherObservation {
    pub latitude: f64,
    pub longitude: f64,
    /// Air temperature at 2 m, degrees Celsius.
    pub temperature: Option<f64>,
    /// Relative humidity at 2 m, percent.
    pub relative_humidity: Option<f64>,
    /// Wind speed at 10 m, km/h.
    pub wind_speed: Option<f64>,
    /// Wind direction at 10 m, degrees.
    pub wind_direction: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl WeatherObservation {
    /// An observation with no measurements at the given position.
    #[must_use]
    pub const fn empty(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            temperature: None,
            relative_humidity: None,
            wind_speed: None,
            wind_direction: None,
            observed_at: None,
        }
    }
}

impl Located for WeatherObservation {
    fn longitude(&self) -> f64 {
        self.longitude
    }

    fn latitude(&self) -> f64 {
        self.latitude
    }
}

/// Provider of the weather points.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WeatherSource {
    /// Hourly forecast at sampled grid centroids.
    #[default]
    OpenMeteo,
    /// Recent hourly observations at weather stations.
    Meteostat,
}

/// Unit a provider reports wind speed in.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WindSpeedUnit {
    #[default]
    KilometresPerHour,
    MetresPerSecond,
}

impl WindSpeedUnit {
    /// Converts a speed in this unit to km/h.
    #[must_use]
    pub fn to_kmh(self, speed: f64) -> f64 {
        match self {
            Self::KilometresPerHour => speed,
            Self::MetresPerSecond => speed * 3.6,
        }
    }
}

/// Why a feed row was excluded.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// The row is not a key/value record.
    NotAnObject,
    MissingLatitude,
    MissingLongitude,
    /// A coordinate is NaN, infinite, or outside the valid degree range.
    InvalidCoordinate,
    /// The row lies outside the region of interest.
    OutsideRegion,
}

/// A feed row that could not be used, identified by its position in the
/// input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: SkipReason,
}

/// Normalized records plus a report of every skipped row.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedRecord>,
}

impl<T> NormalizedBatch<T> {
    /// Number of skipped rows with the given reason.
    #[must_use]
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }
}

impl<T> Default for NormalizedBatch<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}
