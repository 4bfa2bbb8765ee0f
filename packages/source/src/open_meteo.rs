//! Open-Meteo hourly forecast client.
//!
//! One request per point. Only the most recent hourly entry of each
//! response is kept. Per-point failures are collected and logged; they
//! never abort the batch.

use std::sync::Arc;

use landwatch_source_models::WeatherObservation;
use serde::Deserialize;

use crate::SourceError;
use crate::normalize::parse_timestamp;
use crate::progress::ProgressCallback;

/// Hourly variables requested from the forecast API.
pub const HOURLY_VARIABLES: &str =
    "temperature_2m,relative_humidity_2m,windspeed_10m,winddirection_10m";

/// Forecast response body. Only the fields used here are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub hourly: Option<HourlySeries>,
}

/// Parallel arrays keyed by hour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default, alias = "wind_speed_10m")]
    pub windspeed_10m: Vec<Option<f64>>,
    #[serde(default, alias = "wind_direction_10m")]
    pub winddirection_10m: Vec<Option<f64>>,
}

/// A point whose forecast could not be retrieved.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFailure {
    pub latitude: f64,
    pub longitude: f64,
    pub message: String,
}

/// Result of fetching a batch of points.
#[derive(Debug, Clone, Default)]
pub struct WeatherFetchReport {
    pub observations: Vec<WeatherObservation>,
    pub failures: Vec<PointFailure>,
    /// Points whose response had no hourly entries.
    pub empty: usize,
}

/// Forecast URL for a single point.
#[must_use]
pub fn forecast_url(base_url: &str, latitude: f64, longitude: f64, forecast_days: u32) -> String {
    format!(
        "{base_url}?latitude={latitude}&longitude={longitude}\
         &hourly={HOURLY_VARIABLES}&forecast_days={forecast_days}&timezone=UTC"
    )
}

/// Observation built from the last hourly entry, positioned at the
/// requested point. `None` when the series is empty.
#[must_use]
pub fn latest_hour(
    response: &ForecastResponse,
    latitude: f64,
    longitude: f64,
) -> Option<WeatherObservation> {
    let hourly = response.hourly.as_ref()?;
    let idx = hourly.time.len().checked_sub(1)?;
    let at = |series: &[Option<f64>]| series.get(idx).copied().flatten().filter(|v| v.is_finite());

    Some(WeatherObservation {
        latitude,
        longitude,
        temperature: at(&hourly.temperature_2m),
        relative_humidity: at(&hourly.relative_humidity_2m),
        wind_speed: at(&hourly.windspeed_10m),
        wind_direction: at(&hourly.winddirection_10m),
        observed_at: parse_timestamp(&hourly.time[idx]),
    })
}

/// Fetches the latest hourly observation for one point.
///
/// # Errors
///
/// Returns [`SourceError::Http`] on transport or non-2xx status errors and
/// [`SourceError::Json`] if the body does not parse.
pub async fn fetch_point(
    client: &reqwest::Client,
    base_url: &str,
    latitude: f64,
    longitude: f64,
    forecast_days: u32,
) -> Result<Option<WeatherObservation>, SourceError> {
    let url = forecast_url(base_url, latitude, longitude, forecast_days);
    let body = client.get(&url).send().await?.error_for_status()?.text().await?;
    let response: ForecastResponse = serde_json::from_str(&body)?;
    Ok(latest_hour(&response, latitude, longitude))
}

/// Fetches every point sequentially. Points are `(latitude, longitude)`.
pub async fn fetch_points(
    client: &reqwest::Client,
    base_url: &str,
    points: &[(f64, f64)],
    forecast_days: u32,
    progress: &Arc<dyn ProgressCallback>,
) -> WeatherFetchReport {
    let mut report = WeatherFetchReport::default();
    progress.set_total(points.len() as u64);

    for &(latitude, longitude) in points {
        match fetch_point(client, base_url, latitude, longitude, forecast_days).await {
            Ok(Some(observation)) => report.observations.push(observation),
            Ok(None) => {
                log::debug!("No hourly data for ({latitude:.4}, {longitude:.4})");
                report.empty += 1;
            }
            Err(e) => {
                log::warn!("Weather fetch failed for ({latitude:.4}, {longitude:.4}): {e}");
                report.failures.push(PointFailure {
                    latitude,
                    longitude,
                    message: e.to_string(),
                });
            }
        }
        progress.inc(1);
    }

    if report.observations.is_empty() {
        log::warn!("No weather observations retrieved for {} points", points.len());
    }

    progress.finish(format!(
        "weather: {} ok, {} failed, {} empty",
        report.observations.len(),
        report.failures.len(),
        report.empty
    ));

    report
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builds_forecast_url() {
        assert_eq!(
            forecast_url("https://api.open-meteo.com/v1/forecast", 52.5, -98.25, 2),
            "https://api.open-meteo.com/v1/forecast?latitude=52.5&longitude=-98.25\
             &hourly=temperature_2m,relative_humidity_2m,windspeed_10m,winddirection_10m\
             &forecast_days=2&timezone=UTC"
        );
    }

    #[test]
    fn takes_last_hourly_entry() {
        let response: ForecastResponse = serde_json::from_value(json!({
            "latitude": 52.5,
            "longitude": -98.25,
            "hourly": {
                "time": ["2024-07-01T00:00", "2024-07-01T01:00", "2024-07-01T02:00"],
                "temperature_2m": [18.0, 17.5, 17.1],
                "relative_humidity_2m": [60, 62, 65],
                "windspeed_10m": [10.0, 11.0, 12.5],
                "winddirection_10m": [180, 190, 200],
            }
        }))
        .unwrap();

        let obs = latest_hour(&response, 52.5, -98.25).unwrap();
        assert_eq!(obs.temperature, Some(17.1));
        assert_eq!(obs.relative_humidity, Some(65.0));
        assert_eq!(obs.wind_speed, Some(12.5));
        assert_eq!(obs.wind_direction, Some(200.0));
        assert_eq!(obs.observed_at.unwrap().to_rfc3339(), "2024-07-01T02:00:00+00:00");
        assert!((obs.latitude - 52.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_series_values_stay_missing() {
        let response: ForecastResponse = serde_json::from_value(json!({
            "hourly": {
                "time": ["2024-07-01T00:00", "2024-07-01T01:00"],
                "temperature_2m": [18.0, null],
                "wind_speed_10m": [4.0, 5.0],
            }
        }))
        .unwrap();

        let obs = latest_hour(&response, 50.0, -100.0).unwrap();
        assert_eq!(obs.temperature, None);
        assert_eq!(obs.relative_humidity, None);
        assert_eq!(obs.wind_speed, Some(5.0));
    }

    #[test]
    fn empty_series_yields_no_observation() {
        let response: ForecastResponse =
            serde_json::from_value(json!({"hourly": {"time": []}})).unwrap();
        assert!(latest_hour(&response, 50.0, -100.0).is_none());

        let response: ForecastResponse = serde_json::from_value(json!({})).unwrap();
        assert!(latest_hour(&response, 50.0, -100.0).is_none());
    }
}
