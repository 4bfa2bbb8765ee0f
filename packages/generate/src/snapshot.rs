//! Fire and weather snapshots.
//!
//! File names follow `firms_<dataset>_<date>.geojson` and
//! `weather_grid_<date>.geojson`. Property names match the provider
//! columns so the files read back through the feed normalizers unchanged.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geojson::{Feature, JsonObject};
use landwatch_source::normalize::{normalize_fire_records, normalize_weather_records};
use landwatch_source_models::{FireDetection, NormalizedBatch, WeatherObservation};
use serde_json::json;

use crate::{GenerateError, point_feature, read_point_rows, write_collection};

#[must_use]
pub fn fire_snapshot_path(dir: &Path, dataset: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("firms_{dataset}_{}.geojson", date.format("%Y-%m-%d")))
}

#[must_use]
pub fn weather_snapshot_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("weather_grid_{}.geojson", date.format("%Y-%m-%d")))
}

fn properties(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

#[must_use]
pub fn fire_feature(fire: &FireDetection) -> Feature {
    point_feature(
        fire.longitude,
        fire.latitude,
        properties(json!({
            "acquired_at": fire.acquired_at.map(|t| t.to_rfc3339()),
            "confidence": fire.confidence.label(),
            "confidence_score": fire.confidence.score(),
            "brightness": fire.brightness,
            "frp": fire.frp,
            "satellite": fire.satellite,
            "instrument": fire.instrument,
        })),
    )
}

/// Weather properties shared by the weather snapshot and the risk output.
#[must_use]
pub fn weather_properties(observation: &WeatherObservation) -> JsonObject {
    properties(json!({
        "timestamp": observation.observed_at.map(|t| t.to_rfc3339()),
        "temperature_2m": observation.temperature,
        "relative_humidity_2m": observation.relative_humidity,
        "windspeed_10m": observation.wind_speed,
        "winddirection_10m": observation.wind_direction,
    }))
}

/// # Errors
///
/// Returns [`GenerateError`] if the file cannot be written.
pub fn write_fire_snapshot(path: &Path, fires: &[FireDetection]) -> Result<usize, GenerateError> {
    write_collection(path, fires.iter().map(fire_feature).collect())
}

/// # Errors
///
/// Returns [`GenerateError`] if the file cannot be written.
pub fn write_weather_snapshot(
    path: &Path,
    observations: &[WeatherObservation],
) -> Result<usize, GenerateError> {
    write_collection(
        path,
        observations
            .iter()
            .map(|o| point_feature(o.longitude, o.latitude, weather_properties(o)))
            .collect(),
    )
}

/// Loads a fire snapshot. Unusable features are reported in the batch.
///
/// # Errors
///
/// Returns [`GenerateError`] if the file cannot be read or parsed.
pub fn read_fire_snapshot(path: &Path) -> Result<NormalizedBatch<FireDetection>, GenerateError> {
    let rows = read_point_rows(path)?;
    Ok(normalize_fire_records(&rows, None))
}

/// Loads a weather snapshot. Unusable features are reported in the batch.
///
/// # Errors
///
/// Returns [`GenerateError`] if the file cannot be read or parsed.
pub fn read_weather_snapshot(
    path: &Path,
) -> Result<NormalizedBatch<WeatherObservation>, GenerateError> {
    let rows = read_point_rows(path)?;
    Ok(normalize_weather_records(&rows, None))
}
