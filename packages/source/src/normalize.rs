//! Mapping of raw feed rows onto typed records.
//!
//! Rows arrive as JSON objects (from CSV, `GeoJSON` properties, or API
//! responses) with provider-specific column names. Each field is looked up
//! through an alias list, case-insensitively. Numbers may be JSON numbers
//! or numeric strings.
//!
//! Recovery rules:
//!
//! * missing or non-finite coordinates skip the row (reported)
//! * rows outside the optional region are skipped (reported)
//! * a malformed measurement becomes `None`
//! * a malformed confidence becomes [`Confidence::Unknown`]

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use landwatch_geography_models::BoundingBox;
use landwatch_source_models::{
    Confidence, FireDetection, NormalizedBatch, SkipReason, SkippedRecord, WeatherObservation,
};
use serde_json::{Map, Value};

pub const LATITUDE_ALIASES: &[&str] = &["latitude", "lat", "y", "latitud"];
pub const LONGITUDE_ALIASES: &[&str] = &["longitude", "lon", "x", "longitud", "long"];

const BRIGHTNESS_ALIASES: &[&str] = &["brightness", "bright_ti4"];
const TEMPERATURE_ALIASES: &[&str] = &["temperature_2m", "temperature", "temp"];
const HUMIDITY_ALIASES: &[&str] = &[
    "relative_humidity_2m",
    "relative_humidity",
    "rhum",
    "humidity",
];
const WIND_SPEED_ALIASES: &[&str] = &["windspeed_10m", "wind_speed_10m", "wind_speed", "wspd"];
const WIND_DIRECTION_ALIASES: &[&str] = &[
    "winddirection_10m",
    "wind_direction_10m",
    "wind_direction",
    "wdir",
];

/// Normalizes fire-detection rows, optionally clipping to `region`.
#[must_use]
pub fn normalize_fire_records(
    rows: &[Value],
    region: Option<&BoundingBox>,
) -> NormalizedBatch<FireDetection> {
    normalize_rows(rows, region, |obj, latitude, longitude| FireDetection {
        latitude,
        longitude,
        confidence: field(obj, &["confidence"]).map_or(Confidence::Unknown, parse_confidence),
        brightness: number_field(obj, BRIGHTNESS_ALIASES),
        frp: number_field(obj, &["frp"]),
        acquired_at: acquisition_time(obj),
        satellite: text_field(obj, &["satellite"]),
        instrument: text_field(obj, &["instrument"]),
    })
}

/// Normalizes weather rows, optionally clipping to `region`.
#[must_use]
pub fn normalize_weather_records(
    rows: &[Value],
    region: Option<&BoundingBox>,
) -> NormalizedBatch<WeatherObservation> {
    normalize_rows(rows, region, |obj, latitude, longitude| WeatherObservation {
        latitude,
        longitude,
        temperature: number_field(obj, TEMPERATURE_ALIASES),
        relative_humidity: number_field(obj, HUMIDITY_ALIASES),
        wind_speed: number_field(obj, WIND_SPEED_ALIASES),
        wind_direction: number_field(obj, WIND_DIRECTION_ALIASES),
        observed_at: field(obj, &["timestamp", "time"])
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
    })
}

fn normalize_rows<T>(
    rows: &[Value],
    region: Option<&BoundingBox>,
    build: impl Fn(&Map<String, Value>, f64, f64) -> T,
) -> NormalizedBatch<T> {
    let mut batch = NormalizedBatch::default();

    for (index, row) in rows.iter().enumerate() {
        let outcome = row
            .as_object()
            .ok_or(SkipReason::NotAnObject)
            .and_then(|obj| coordinates(obj).map(|(lat, lon)| (obj, lat, lon)))
            .and_then(|(obj, lat, lon)| match region {
                Some(bbox) if !bbox.contains(lon, lat) => Err(SkipReason::OutsideRegion),
                _ => Ok(build(obj, lat, lon)),
            });

        match outcome {
            Ok(record) => batch.records.push(record),
            Err(reason) => {
                log::debug!("Skipping row {index}: {reason}");
                batch.skipped.push(SkippedRecord { index, reason });
            }
        }
    }

    if !batch.skipped.is_empty() {
        log::info!(
            "Normalized {} rows, skipped {} ({} outside region)",
            batch.records.len(),
            batch.skipped.len(),
            batch.skipped_for(SkipReason::OutsideRegion)
        );
    }

    batch
}

fn coordinates(obj: &Map<String, Value>) -> Result<(f64, f64), SkipReason> {
    let lat = field(obj, LATITUDE_ALIASES).ok_or(SkipReason::MissingLatitude)?;
    let lon = field(obj, LONGITUDE_ALIASES).ok_or(SkipReason::MissingLongitude)?;

    let (Some(lat), Some(lon)) = (as_number(lat), as_number(lon)) else {
        return Err(SkipReason::InvalidCoordinate);
    };

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(SkipReason::InvalidCoordinate);
    }

    Ok((lat, lon))
}

/// First present, non-null, non-blank value among `aliases`.
fn field<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| {
        obj.iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(alias))
            .map(|(_, value)| value)
            .filter(|value| match value {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
    })
}

fn number_field(obj: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    field(obj, aliases).and_then(as_number)
}

fn text_field(obj: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    field(obj, aliases).map(|value| match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

/// A finite number from a JSON number or numeric string.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_confidence(value: &Value) -> Confidence {
    match value {
        Value::Number(n) => n.as_f64().map_or(Confidence::Unknown, Confidence::from_percent),
        Value::String(s) => Confidence::parse(s),
        _ => Confidence::Unknown,
    }
}

/// Acquisition time from `acquired_at`, or from FIRMS `acq_date` +
/// `acq_time` (`HHMM`, leading zeros optional).
fn acquisition_time(obj: &Map<String, Value>) -> Option<DateTime<Utc>> {
    if let Some(ts) = field(obj, &["acquired_at"]).and_then(Value::as_str) {
        return parse_timestamp(ts);
    }

    let date = field(obj, &["acq_date"])
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())?;

    let time = field(obj, &["acq_time"])
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64().map(|n| format!("{n:04}")),
            Value::String(s) => Some(s.trim().replace(':', "")),
            _ => None,
        })
        .and_then(|hhmm| parse_hhmm(&hhmm))
        .unwrap_or_default();

    Some(date.and_time(time).and_utc())
}

fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    if raw.is_empty() || raw.len() > 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{raw:0>4}");
    NaiveTime::parse_from_str(&padded, "%H%M").ok()
}

/// Parses RFC 3339 or the naive ISO forms used by Open-Meteo
/// (`2024-07-01T13:00`). Naive values are taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
