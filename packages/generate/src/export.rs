//! Export of scored weather points.

use std::path::Path;

use geojson::Feature;
use landwatch_risk_models::RiskRecord;
use serde_json::json;

use crate::snapshot::weather_properties;
use crate::{GenerateError, point_feature, write_collection};

/// One feature per record: the weather properties plus the fire count
/// under `fire_count_key`, `risk_score` and `risk_level`.
#[must_use]
pub fn risk_feature(record: &RiskRecord, fire_count_key: &str) -> Feature {
    let observation = &record.observation;
    let mut properties = weather_properties(observation);
    properties.insert(fire_count_key.to_string(), json!(record.fire_count));
    properties.insert("risk_score".to_string(), json!(record.risk_score));
    properties.insert("risk_level".to_string(), json!(record.risk_level.as_ref()));

    point_feature(observation.longitude, observation.latitude, properties)
}

/// Writes the scored collection to `path`, replacing any previous run.
///
/// # Errors
///
/// Returns [`GenerateError`] if the file cannot be written.
pub fn write_risk_collection(
    path: &Path,
    records: &[RiskRecord],
    fire_count_key: &str,
) -> Result<usize, GenerateError> {
    let features = records
        .iter()
        .map(|record| risk_feature(record, fire_count_key))
        .collect();
    write_collection(path, features)
}

#[cfg(test)]
mod tests {
    use landwatch_risk_models::RiskLevel;
    use landwatch_source_models::WeatherObservation;

    use super::*;
    use crate::{read_point_rows, test_dir};

    fn record(score: f64, level: RiskLevel, fires: u32) -> RiskRecord {
        RiskRecord {
            observation: WeatherObservation {
                temperature: Some(30.0),
                relative_humidity: Some(20.0),
                wind_speed: Some(0.0),
                ..WeatherObservation::empty(52.0, -98.5)
            },
            fire_count: fires,
            risk_score: score,
            risk_level: level,
        }
    }

    #[test]
    fn feature_carries_risk_properties() {
        let feature = risk_feature(&record(0.5, RiskLevel::Medium, 3), "firms_count_10km");
        let properties = feature.properties.unwrap();
        assert_eq!(properties["firms_count_10km"], json!(3));
        assert_eq!(properties["risk_score"], json!(0.5));
        assert_eq!(properties["risk_level"], json!("Medium"));
        assert_eq!(properties["temperature_2m"], json!(30.0));
        assert_eq!(properties["windspeed_10m"], json!(0.0));
        assert!(properties["winddirection_10m"].is_null());
    }

    #[test]
    fn writes_one_feature_per_record() {
        let dir = test_dir::fresh("risk");
        let path = dir.join("risk_latest.geojson");
        let records = vec![
            record(0.5, RiskLevel::Medium, 0),
            record(0.9, RiskLevel::High, 12),
        ];

        assert_eq!(
            write_risk_collection(&path, &records, "firms_count_25km").unwrap(),
            2
        );

        let rows = read_point_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["firms_count_25km"], json!(12));
        assert_eq!(rows[1]["risk_level"], json!("High"));
        assert_eq!(rows[1]["longitude"], json!(-98.5));
    }

    #[test]
    fn empty_run_writes_empty_collection() {
        let dir = test_dir::fresh("risk-empty");
        let path = dir.join("risk_latest.geojson");
        assert_eq!(write_risk_collection(&path, &[], "firms_count_10km").unwrap(), 0);
        assert!(read_point_rows(&path).unwrap().is_empty());
    }
}
