#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wildfire risk scoring.
//!
//! Each signal (temperature, wind speed, relative humidity, fire count) is
//! min-max normalized over the batch being scored, then combined:
//!
//! ```text
//! risk = w_t * temp + w_w * wind + w_h * (1 - humidity) + w_f * fires
//! ```
//!
//! The result is clamped to `[0, 1]`, rounded to three decimals, and
//! bucketed with [`landwatch_risk_models::RiskLevels::classify`].
//!
//! A column whose finite values are all equal (or that has none) is
//! *degenerate*: every point normalizes to `0.0`, including points where
//! the value is missing, and the column is reported in
//! [`ScoreReport::degenerate`]. So a feed without humidity still adds the
//! full dryness weight to every score. In a column with spread, a missing
//! or non-finite value contributes nothing to its term.

use landwatch_geography_models::BoundingBox;
use landwatch_risk_models::{InvalidRiskConfig, RiskConfig, RiskRecord};
use landwatch_source_models::{FireDetection, WeatherObservation};
use landwatch_spatial::{AggregatedPoint, Projection, SpatialError, count_fires_within};
use strum_macros::{AsRefStr, Display};

/// Errors raised while assessing risk.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// The risk configuration is invalid.
    #[error(transparent)]
    Config(#[from] InvalidRiskConfig),

    /// Projection or radius counting failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

/// An input signal of the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Signal {
    Temperature,
    WindSpeed,
    RelativeHumidity,
    FireCount,
}

/// A min-max normalized column.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// In `[0, 1]`. `None` where the input was missing or non-finite and
    /// the column is not degenerate.
    pub values: Vec<Option<f64>>,
    /// No spread among the finite inputs. Every value is then `Some(0.0)`.
    pub degenerate: bool,
}

/// Min-max normalizes `values` over the finite entries.
#[must_use]
pub fn min_max(values: &[Option<f64>]) -> Normalized {
    let finite = || values.iter().filter_map(|v| v.filter(|x| x.is_finite()));
    let min = finite().fold(f64::INFINITY, f64::min);
    let max = finite().fold(f64::NEG_INFINITY, f64::max);

    let degenerate = !(min.is_finite() && max.is_finite() && max > min);

    let values = values
        .iter()
        .map(|v| {
            if degenerate {
                return Some(0.0);
            }
            let x = v.filter(|x| x.is_finite())?;
            let range = max - min;
            let norm = if range.is_finite() {
                (x - min) / range
            } else {
                // Halve first so the span of extreme inputs stays finite.
                (x / 2.0 - min / 2.0) / (max / 2.0 - min / 2.0)
            };
            Some(norm.clamp(0.0, 1.0))
        })
        .collect();

    Normalized { values, degenerate }
}

/// Rounds to three decimal places.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Scored records plus the signals that had no spread.
#[derive(Debug, Clone, Default)]
pub struct ScoreReport {
    pub records: Vec<RiskRecord>,
    pub degenerate: Vec<Signal>,
}

/// Scores aggregated points.
///
/// # Errors
///
/// Returns [`RiskError::Config`] if the weights or levels are invalid.
pub fn score(points: &[AggregatedPoint], config: &RiskConfig) -> Result<ScoreReport, RiskError> {
    config.weights.validate()?;
    config.levels.validate()?;

    let temperature = column(points, |p| p.observation.temperature);
    let wind = column(points, |p| p.observation.wind_speed);
    let humidity = column(points, |p| p.observation.relative_humidity);
    let fires = column(points, |p| Some(f64::from(p.fire_count)));

    let degenerate: Vec<Signal> = [
        (Signal::Temperature, &temperature),
        (Signal::WindSpeed, &wind),
        (Signal::RelativeHumidity, &humidity),
        (Signal::FireCount, &fires),
    ]
    .into_iter()
    .filter(|(_, n)| n.degenerate && !points.is_empty())
    .map(|(signal, _)| signal)
    .collect();

    for signal in &degenerate {
        log::info!("No spread in {signal} across {} points; normalized to 0", points.len());
    }

    let w = config.weights;
    let records = points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let raw = w.temperature * temperature.values[i].unwrap_or(0.0)
                + w.wind_speed * wind.values[i].unwrap_or(0.0)
                + w.dryness * humidity.values[i].map_or(0.0, |h| 1.0 - h)
                + w.fire_count * fires.values[i].unwrap_or(0.0);
            let risk_score = finalize(raw);

            RiskRecord {
                observation: point.observation.clone(),
                fire_count: point.fire_count,
                risk_score,
                risk_level: config.levels.classify(risk_score),
            }
        })
        .collect();

    Ok(ScoreReport {
        records,
        degenerate,
    })
}

fn column(points: &[AggregatedPoint], f: impl Fn(&AggregatedPoint) -> Option<f64>) -> Normalized {
    min_max(&points.iter().map(f).collect::<Vec<_>>())
}

fn finalize(raw: f64) -> f64 {
    if raw.is_finite() {
        round3(raw.clamp(0.0, 1.0))
    } else {
        0.0
    }
}

/// Full output of [`assess`].
#[derive(Debug, Clone, Default)]
pub struct Assessment {
    pub records: Vec<RiskRecord>,
    pub degenerate: Vec<Signal>,
    /// Fire indexes that could not be projected.
    pub skipped_fires: Vec<usize>,
    /// Weather indexes that could not be projected.
    pub skipped_weather: Vec<usize>,
    /// Output name of the fire-count column, e.g. `firms_count_10km`.
    pub fire_count_key: String,
}

impl Assessment {
    /// Records per level, in `Low, Medium, High` order.
    #[must_use]
    pub fn level_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for record in &self.records {
            counts[record.risk_level as usize] += 1;
        }
        counts
    }
}

/// Counts fires around each weather point and scores the result.
///
/// # Errors
///
/// * [`RiskError::Config`] if `config` is invalid
/// * [`RiskError::Spatial`] if the projection cannot be built for `region`
pub fn assess(
    region: &BoundingBox,
    weather: &[WeatherObservation],
    fires: &[FireDetection],
    config: &RiskConfig,
) -> Result<Assessment, RiskError> {
    config.validate()?;

    let projection = Projection::for_region(config.projection, region)?;
    let aggregation = count_fires_within(weather, fires, config.radius_km, &projection)?;
    let report = score(&aggregation.points, config)?;

    let assessment = Assessment {
        records: report.records,
        degenerate: report.degenerate,
        skipped_fires: aggregation.skipped_fires,
        skipped_weather: aggregation.skipped_weather,
        fire_count_key: config.fire_count_key(),
    };

    let [low, medium, high] = assessment.level_counts();
    log::info!(
        "Scored {} points: {low} low, {medium} medium, {high} high",
        assessment.records.len()
    );

    Ok(assessment)
}
