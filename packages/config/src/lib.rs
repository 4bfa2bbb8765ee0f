#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline configuration.
//!
//! Defaults live in the embedded `default.toml`. A user file is merged on
//! top of them key by key, so it only needs the settings it changes.
//! Secrets and machine-specific paths come from the environment:
//!
//! * `FIRMS_MAP_KEY` (or `FIRMS_API_KEY`): FIRMS map key
//! * `LANDWATCH_DATA_DIR`: overrides `paths.data_dir`

pub mod paths;

use std::path::{Path, PathBuf};

use landwatch_geography_models::BoundingBox;
use landwatch_risk_models::{InvalidRiskConfig, RiskConfig};
use landwatch_source_models::{WeatherSource, WindSpeedUnit};
use serde::Deserialize;

const DEFAULT_TOML: &str = include_str!("default.toml");

/// Environment variables checked for the FIRMS map key, in order.
pub const MAP_KEY_VARS: &[&str] = &["FIRMS_MAP_KEY", "FIRMS_API_KEY"];

/// Environment variable overriding `paths.data_dir`.
pub const DATA_DIR_VAR: &str = "LANDWATCH_DATA_DIR";

/// Largest forecast horizon Open-Meteo serves.
pub const MAX_FORECAST_DAYS: u32 = 16;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or does not match the schema.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Risk settings are out of range.
    #[error(transparent)]
    Risk(#[from] InvalidRiskConfig),

    /// Any other setting is out of range.
    #[error("invalid setting `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LandwatchConfig {
    pub region: RegionConfig,
    pub firms: FirmsConfig,
    pub weather: WeatherConfig,
    pub risk: RiskConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RegionConfig {
    pub bbox: BoundingBox,
}

/// NASA FIRMS download settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FirmsConfig {
    pub base_url: String,
    pub dataset: String,
    /// Day range; FIRMS accepts 1 to 10.
    pub days: u32,
    /// Alpha-3 country code for the last-resort country endpoint. Empty
    /// disables it.
    #[serde(default)]
    pub country: Option<String>,
    pub timeout_secs: u64,
    /// Read from the environment, never from a file.
    #[serde(skip)]
    pub map_key: Option<String>,
}

/// Weather feed and grid sampling settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub source: WeatherSource,
    /// Open-Meteo forecast endpoint.
    pub base_url: String,
    /// Grid resolution in kilometres.
    pub cell_km: f64,
    /// Upper bound on sampled grid centroids per run.
    pub max_points: usize,
    pub forecast_days: u32,
    pub timeout_secs: u64,
    pub meteostat: MeteostatConfig,
}

/// Meteostat station feed settings, used when `weather.source` is
/// `meteostat`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeteostatConfig {
    /// Bulk archive root.
    pub base_url: String,
    /// Look-back window in hours.
    pub hours: u32,
    /// Station cap for the in-region and padded lookups.
    pub station_limit: usize,
    /// Degrees added to each side of the region when no station is inside.
    pub pad_degrees: f64,
    /// Alpha-2 country for the nearest-station lookup. Empty disables it.
    #[serde(default)]
    pub country: Option<String>,
    pub nearby_limit: usize,
    #[serde(default)]
    pub wind_speed_unit: WindSpeedUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl LandwatchConfig {
    /// The embedded defaults, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the embedded file is malformed.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::from_toml_str("")
    }

    /// Defaults merged with `overlay` (TOML text).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if either document is malformed or
    /// the merged result does not match the schema.
    pub fn from_toml_str(overlay: &str) -> Result<Self, ConfigError> {
        let mut base: toml::Table = toml::from_str(DEFAULT_TOML)?;
        let overlay: toml::Table = toml::from_str(overlay)?;
        merge_tables(&mut base, overlay);
        Ok(toml::Value::Table(base).try_into()?)
    }

    /// Loads defaults, the optional file at `path`, and the environment,
    /// then validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or a
    /// setting is out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let overlay = match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => String::new(),
        };

        let mut config = Self::from_toml_str(&overlay)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = MAP_KEY_VARS.iter().find_map(|name| non_blank(name)) {
            self.firms.map_key = Some(key.trim().to_string());
        }
        if let Some(dir) = non_blank(DATA_DIR_VAR) {
            self.paths.data_dir = PathBuf::from(dir);
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] for the first out-of-range setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weather;
        if !w.cell_km.is_finite() || w.cell_km <= 0.0 {
            return Err(invalid("weather.cell_km", format!("{} must be positive", w.cell_km)));
        }
        if w.max_points == 0 {
            return Err(invalid("weather.max_points", "must be at least 1".to_string()));
        }
        if !(1..=MAX_FORECAST_DAYS).contains(&w.forecast_days) {
            return Err(invalid(
                "weather.forecast_days",
                format!("{} is outside 1..={MAX_FORECAST_DAYS}", w.forecast_days),
            ));
        }
        let m = &w.meteostat;
        if m.hours == 0 {
            return Err(invalid("weather.meteostat.hours", "must be at least 1".to_string()));
        }
        if m.station_limit == 0 || m.nearby_limit == 0 {
            return Err(invalid(
                "weather.meteostat.station_limit",
                "station limits must be at least 1".to_string(),
            ));
        }
        if !m.pad_degrees.is_finite() || m.pad_degrees < 0.0 {
            return Err(invalid(
                "weather.meteostat.pad_degrees",
                format!("{} must be zero or positive", m.pad_degrees),
            ));
        }
        if self.firms.days == 0 {
            return Err(invalid("firms.days", "must be at least 1".to_string()));
        }
        if self.firms.dataset.trim().is_empty() {
            return Err(invalid("firms.dataset", "must not be empty".to_string()));
        }
        if self.weather.timeout_secs == 0 || self.firms.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "must be at least 1".to_string()));
        }

        self.risk.validate()?;
        Ok(())
    }

    /// Country code for the FIRMS fallback, if configured.
    #[must_use]
    pub fn firms_country(&self) -> Option<&str> {
        self.firms
            .country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Country for the nearest-station lookup, if configured.
    #[must_use]
    pub fn meteostat_country(&self) -> Option<&str> {
        self.weather
            .meteostat
            .country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

const fn invalid(field: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { field, message }
}

/// Recursively overlays `overlay` onto `base`. Tables merge; every other
/// value replaces.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use landwatch_geography_models::ProjectionKind;

    use super::*;

    #[test]
    fn parses_default_toml() {
        let config = LandwatchConfig::defaults().unwrap();
        assert_eq!(
            config.region.bbox,
            BoundingBox::new(-102.0, 49.0, -95.0, 55.0).unwrap()
        );
        assert_eq!(config.firms.dataset, "VIIRS_NOAA20_NRT");
        assert_eq!(config.firms.days, 7);
        assert_eq!(config.firms_country(), Some("CAN"));
        assert!(config.firms.map_key.is_none());
        assert!((config.weather.cell_km - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.weather.max_points, 300);
        assert_eq!(config.weather.source, WeatherSource::OpenMeteo);
        assert_eq!(config.weather.meteostat.hours, 24);
        assert_eq!(config.weather.meteostat.station_limit, 200);
        assert_eq!(config.weather.meteostat.nearby_limit, 50);
        assert!((config.weather.meteostat.pad_degrees - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.meteostat_country(), Some("CA"));
        assert_eq!(
            config.weather.meteostat.wind_speed_unit,
            WindSpeedUnit::MetresPerSecond
        );
        assert_eq!(config.risk, RiskConfig::default());
        assert_eq!(config.paths.data_dir, PathBuf::from("data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overlay_replaces_only_given_keys() {
        let config = LandwatchConfig::from_toml_str(
            r#"
            [region]
            bbox = [-124.0, 32.0, -114.0, 42.0]

            [firms]
            country = ""

            [risk]
            radius_km = 15.0
            projection = "regional"

            [risk.weights]
            temperature = 0.25
            wind_speed = 0.35
            "#,
        )
        .unwrap();

        assert!((config.region.bbox.west() - -124.0).abs() < f64::EPSILON);
        assert_eq!(config.firms.dataset, "VIIRS_NOAA20_NRT");
        assert_eq!(config.firms_country(), None);
        assert!((config.risk.radius_km - 15.0).abs() < f64::EPSILON);
        assert_eq!(config.risk.projection, ProjectionKind::Regional);
        assert!((config.risk.weights.dryness - 0.15).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn weather_source_switches_to_meteostat() {
        let config = LandwatchConfig::from_toml_str(
            r#"
            [weather]
            source = "meteostat"

            [weather.meteostat]
            hours = 12
            country = ""
            wind_speed_unit = "kilometres_per_hour"
            "#,
        )
        .unwrap();

        assert_eq!(config.weather.source, WeatherSource::Meteostat);
        assert_eq!(config.weather.meteostat.hours, 12);
        assert_eq!(config.weather.meteostat.station_limit, 200);
        assert_eq!(config.meteostat_country(), None);
        assert_eq!(
            config.weather.meteostat.wind_speed_unit,
            WindSpeedUnit::KilometresPerHour
        );
        assert!(config.validate().is_ok());

        assert!(matches!(
            LandwatchConfig::from_toml_str("[weather]\nsource = \"noaa\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_meteostat_settings() {
        let mut config = LandwatchConfig::defaults().unwrap();
        config.weather.meteostat.hours = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "weather.meteostat.hours",
                ..
            })
        ));

        let mut config = LandwatchConfig::defaults().unwrap();
        config.weather.meteostat.pad_degrees = -1.0;
        assert!(config.validate().is_err());

        let mut config = LandwatchConfig::defaults().unwrap();
        config.weather.meteostat.nearby_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_bbox_at_parse_time() {
        let err = LandwatchConfig::from_toml_str("[region]\nbbox = [-95.0, 49.0, -102.0, 55.0]\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let mut config = LandwatchConfig::defaults().unwrap();
        config.weather.cell_km = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "weather.cell_km",
                ..
            })
        ));

        let mut config = LandwatchConfig::defaults().unwrap();
        config.risk.weights.fire_count = 0.5;
        assert!(matches!(config.validate(), Err(ConfigError::Risk(_))));

        let mut config = LandwatchConfig::defaults().unwrap();
        config.firms.days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn environment_supplies_map_key_and_data_dir() {
        let mut config = LandwatchConfig::defaults().unwrap();
        config.apply_env(|name| match name {
            "FIRMS_API_KEY" => Some(" secret ".to_string()),
            "LANDWATCH_DATA_DIR" => Some("/tmp/landwatch".to_string()),
            _ => None,
        });
        assert_eq!(config.firms.map_key.as_deref(), Some("secret"));
        assert_eq!(config.paths.data_dir, PathBuf::from("/tmp/landwatch"));
    }

    #[test]
    fn primary_map_key_variable_wins() {
        let mut config = LandwatchConfig::defaults().unwrap();
        config.apply_env(|name| match name {
            "FIRMS_MAP_KEY" => Some("primary".to_string()),
            "FIRMS_API_KEY" => Some("secondary".to_string()),
            _ => None,
        });
        assert_eq!(config.firms.map_key.as_deref(), Some("primary"));
    }

    #[test]
    fn blank_environment_values_are_ignored() {
        let mut config = LandwatchConfig::defaults().unwrap();
        config.apply_env(|_| Some("   ".to_string()));
        assert!(config.firms.map_key.is_none());
        assert_eq!(config.paths.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn map_key_is_never_read_from_file() {
        let config =
            LandwatchConfig::from_toml_str("[firms]\nmap_key = \"from-file\"\n").unwrap();
        assert!(config.firms.map_key.is_none());
    }
}
