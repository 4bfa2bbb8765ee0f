//! Meteostat station observations.
//!
//! Reads the public bulk archive: a gzipped JSON station list and one
//! gzipped, headerless hourly CSV per station and year. Each station with
//! data in the look-back window becomes one [`WeatherObservation`]:
//! temperature and humidity are window means, wind is the last reported
//! hour.
//!
//! Stations are chosen in three passes, each used only when the previous
//! one finds nothing: stations inside the region, stations inside the
//! region padded on every side, then the stations of one country nearest
//! to the region centre.

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use landwatch_geography_models::BoundingBox;
use landwatch_source_models::{WeatherObservation, WindSpeedUnit};
use serde::Deserialize;
use strum_macros::Display;

use crate::SourceError;
use crate::open_meteo::{PointFailure, WeatherFetchReport};
use crate::progress::ProgressCallback;

/// Station list path under the bulk base URL.
pub const STATIONS_PATH: &str = "stations/lite.json.gz";

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A station with an hourly inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// ISO 3166-1 alpha-2.
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStation {
    id: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    location: Option<RawLocation>,
    #[serde(default)]
    inventory: Option<RawInventory>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawInventory {
    #[serde(default)]
    hourly: Option<RawSpan>,
}

#[derive(Debug, Deserialize)]
struct RawSpan {
    #[serde(default)]
    start: Option<String>,
}

impl RawStation {
    fn into_station(self) -> Option<Station> {
        let has_hourly = self
            .inventory
            .and_then(|i| i.hourly)
            .and_then(|h| h.start)
            .is_some();
        let location = self.location?;
        let latitude = location.latitude.filter(|v| v.is_finite())?;
        let longitude = location.longitude.filter(|v| v.is_finite())?;

        has_hourly.then_some(Station {
            id: self.id,
            latitude,
            longitude,
            country: self.country,
        })
    }
}

/// Gunzips a bulk file into text.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the bytes are not valid gzip or the
/// content is not UTF-8.
pub fn decompress(bytes: &[u8]) -> Result<String, SourceError> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    log::debug!("Decompressed {} bytes to {}", bytes.len(), text.len());
    Ok(text)
}

/// Parses the station list, keeping stations that have coordinates and an
/// hourly inventory.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if the document is not a station array.
pub fn parse_stations(json: &str) -> Result<Vec<Station>, SourceError> {
    let raw: Vec<RawStation> = serde_json::from_str(json)?;
    let total = raw.len();
    let stations: Vec<Station> = raw.into_iter().filter_map(RawStation::into_station).collect();
    log::debug!("{} of {total} stations have hourly data", stations.len());
    Ok(stations)
}

/// Which pass of [`select_stations`] produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StationLookup {
    InRegion,
    Padded,
    Nearest,
    /// No pass found a station.
    Empty,
}

/// Station selection settings.
#[derive(Debug, Clone, Copy)]
pub struct StationQuery<'a> {
    pub region: &'a BoundingBox,
    /// Cap for the in-region and padded passes.
    pub limit: usize,
    /// Degrees added to every side of the region for the second pass.
    pub pad_degrees: f64,
    /// Country for the nearest-station pass. `None` skips that pass.
    pub country: Option<&'a str>,
    pub nearby_limit: usize,
}

fn inside(station: &Station, west: f64, south: f64, east: f64, north: f64) -> bool {
    (west..=east).contains(&station.longitude) && (south..=north).contains(&station.latitude)
}

/// Great-circle distance on a sphere, in kilometres.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (phi1.cos() * phi2.cos())
        .mul_add((dlambda / 2.0).sin().powi(2), (dphi / 2.0).sin().powi(2));
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Picks the stations to summarize.
#[must_use]
pub fn select_stations(
    stations: &[Station],
    query: &StationQuery<'_>,
) -> (Vec<Station>, StationLookup) {
    let r = query.region;

    let in_region: Vec<Station> = stations
        .iter()
        .filter(|s| inside(s, r.west(), r.south(), r.east(), r.north()))
        .take(query.limit)
        .cloned()
        .collect();
    if !in_region.is_empty() {
        return (in_region, StationLookup::InRegion);
    }

    let pad = query.pad_degrees;
    let padded: Vec<Station> = stations
        .iter()
        .filter(|s| inside(s, r.west() - pad, r.south() - pad, r.east() + pad, r.north() + pad))
        .take(query.limit)
        .cloned()
        .collect();
    if !padded.is_empty() {
        return (padded, StationLookup::Padded);
    }

    let Some(country) = query.country else {
        return (Vec::new(), StationLookup::Empty);
    };
    let centre_lat = r.mid_latitude();
    let centre_lon = (r.west() + r.east()) / 2.0;
    let mut nearest: Vec<(f64, &Station)> = stations
        .iter()
        .filter(|s| s.country.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(country)))
        .map(|s| (haversine_km(centre_lat, centre_lon, s.latitude, s.longitude), s))
        .collect();
    nearest.sort_by(|a, b| a.0.total_cmp(&b.0));

    let nearest: Vec<Station> = nearest
        .into_iter()
        .take(query.nearby_limit)
        .map(|(_, s)| s.clone())
        .collect();
    if nearest.is_empty() {
        (nearest, StationLookup::Empty)
    } else {
        (nearest, StationLookup::Nearest)
    }
}

/// One row of an hourly station file.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRow {
    pub time: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    /// In the unit the archive reports.
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
}

// Column positions in the headerless hourly files.
const COL_DATE: usize = 0;
const COL_HOUR: usize = 1;
const COL_TEMP: usize = 2;
const COL_RHUM: usize = 4;
const COL_WDIR: usize = 7;
const COL_WSPD: usize = 8;

fn field(record: &csv::StringRecord, idx: usize) -> Option<f64> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn row_time(record: &csv::StringRecord) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(record.get(COL_DATE)?.trim(), "%Y-%m-%d").ok()?;
    let hour: u32 = record.get(COL_HOUR)?.trim().parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    Some(date.and_time(time).and_utc())
}

/// Parses an hourly station file. Rows without a valid date and hour are
/// dropped.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the text is not readable CSV.
pub fn parse_hourly_csv(text: &str) -> Result<Vec<HourlyRow>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(time) = row_time(&record) else {
            continue;
        };
        rows.push(HourlyRow {
            time,
            temperature: field(&record, COL_TEMP),
            relative_humidity: field(&record, COL_RHUM),
            wind_speed: field(&record, COL_WSPD),
            wind_direction: field(&record, COL_WDIR),
        });
    }
    Ok(rows)
}

/// Hourly file URLs covering `start..=end`, one per calendar year.
#[must_use]
pub fn hourly_urls(
    base_url: &str,
    station_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<String> {
    let base_url = base_url.trim_end_matches('/');
    (start.year()..=end.year())
        .map(|year| format!("{base_url}/hourly/{year}/{station_id}.csv.gz"))
        .collect()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0_u32), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

/// Summarizes the rows inside `start..=end` into one observation at the
/// station. `None` when no row falls in the window.
#[must_use]
pub fn summarize(
    station: &Station,
    rows: &[HourlyRow],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    unit: WindSpeedUnit,
) -> Option<WeatherObservation> {
    let mut window: Vec<&HourlyRow> = rows
        .iter()
        .filter(|r| (start..=end).contains(&r.time))
        .collect();
    window.sort_by_key(|r| r.time);
    let last = window.last()?;

    Some(WeatherObservation {
        latitude: station.latitude,
        longitude: station.longitude,
        temperature: mean(window.iter().filter_map(|r| r.temperature)).map(round1),
        relative_humidity: mean(window.iter().filter_map(|r| r.relative_humidity)).map(round1),
        wind_speed: window
            .iter()
            .rev()
            .find_map(|r| r.wind_speed)
            .map(|v| round1(unit.to_kmh(v))),
        wind_direction: window.iter().rev().find_map(|r| r.wind_direction).map(round1),
        observed_at: Some(last.time),
    })
}

/// Settings for [`fetch_observations`].
#[derive(Debug, Clone, Copy)]
pub struct MeteostatRequest<'a> {
    pub base_url: &'a str,
    pub stations: StationQuery<'a>,
    /// Look-back window in hours.
    pub hours: u32,
    pub wind_speed_unit: WindSpeedUnit,
}

async fn get_gz(client: &reqwest::Client, url: &str) -> Result<Option<String>, SourceError> {
    let response = client.get(url).send().await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let bytes = response.error_for_status()?.bytes().await?;
    log::debug!("Downloaded {} bytes from {url}", bytes.len());
    decompress(&bytes).map(Some)
}

/// Downloads and parses the station list.
///
/// # Errors
///
/// Returns [`SourceError`] if the list cannot be downloaded, is missing,
/// or does not parse.
pub async fn fetch_stations(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<Vec<Station>, SourceError> {
    let url = format!("{}/{STATIONS_PATH}", base_url.trim_end_matches('/'));
    log::info!("Fetching Meteostat stations from {url}");
    let bytes = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    parse_stations(&decompress(&bytes)?)
}

/// Downloads the hourly rows of one station for the window. Years the
/// archive has no file for contribute nothing.
///
/// # Errors
///
/// Returns [`SourceError`] on transport, status, gzip, or CSV errors.
pub async fn fetch_station_hours(
    client: &reqwest::Client,
    base_url: &str,
    station_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<HourlyRow>, SourceError> {
    let mut rows = Vec::new();
    for url in hourly_urls(base_url, station_id, start, end) {
        match get_gz(client, &url).await? {
            Some(text) => rows.extend(parse_hourly_csv(&text)?),
            None => log::debug!("No hourly file at {url}"),
        }
    }
    Ok(rows)
}

/// Fetches the station list, selects stations for the region, and
/// summarizes the last `hours` of each one. Per-station failures are
/// reported, not returned.
///
/// # Errors
///
/// Returns [`SourceError`] only if the station list cannot be retrieved.
pub async fn fetch_observations(
    client: &reqwest::Client,
    request: &MeteostatRequest<'_>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<WeatherFetchReport, SourceError> {
    let all = fetch_stations(client, request.base_url).await?;
    let (stations, lookup) = select_stations(&all, &request.stations);
    log::info!("Selected {} Meteostat station(s) ({lookup})", stations.len());

    let end = Utc::now();
    let start = end - Duration::hours(i64::from(request.hours));

    let mut report = WeatherFetchReport::default();
    progress.set_total(stations.len() as u64);

    for station in &stations {
        match fetch_station_hours(client, request.base_url, &station.id, start, end).await {
            Ok(rows) => match summarize(station, &rows, start, end, request.wind_speed_unit) {
                Some(observation) => report.observations.push(observation),
                None => {
                    log::debug!("Station {} has no hours in the window", station.id);
                    report.empty += 1;
                }
            },
            Err(e) => {
                log::warn!("Meteostat fetch failed for station {}: {e}", station.id);
                report.failures.push(PointFailure {
                    latitude: station.latitude,
                    longitude: station.longitude,
                    message: e.to_string(),
                });
            }
        }
        progress.inc(1);
    }

    if report.observations.is_empty() {
        log::warn!("No station observations in the last {} hours", request.hours);
    }

    progress.finish(format!(
        "stations: {} ok, {} failed, {} empty",
        report.observations.len(),
        report.failures.len(),
        report.empty
    ));

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;

    use super::*;

    fn station(id: &str, latitude: f64, longitude: f64, country: &str) -> Station {
        Station {
            id: id.to_string(),
            latitude,
            longitude,
            country: Some(country.to_string()),
        }
    }

    fn manitoba() -> BoundingBox {
        BoundingBox::new(-102.0, 49.0, -95.0, 55.0).unwrap()
    }

    fn query(region: &BoundingBox) -> StationQuery<'_> {
        StationQuery {
            region,
            limit: 200,
            pad_degrees: 2.0,
            country: Some("CA"),
            nearby_limit: 50,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn station_list_keeps_hourly_stations_with_coordinates() {
        let json = r#"[
            {"id": "71852", "country": "CA",
             "location": {"latitude": 49.9, "longitude": -97.2, "elevation": 239},
             "inventory": {"hourly": {"start": "1953-01-01", "end": "2024-07-01"}}},
            {"id": "NODATA", "country": "CA",
             "location": {"latitude": 50.0, "longitude": -98.0},
             "inventory": {"hourly": {"start": null, "end": null}}},
            {"id": "NOLOC", "country": "CA",
             "location": {"latitude": null, "longitude": null},
             "inventory": {"hourly": {"start": "2000-01-01"}}}
        ]"#;

        let stations = parse_stations(json).unwrap();
        assert_eq!(stations, vec![station("71852", 49.9, -97.2, "CA")]);
    }

    #[test]
    fn gzip_station_list_decompresses() {
        let json = r#"[{"id":"71852","country":"CA","location":{"latitude":49.9,"longitude":-97.2},"inventory":{"hourly":{"start":"1953-01-01"}}}]"#;
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(json.as_bytes()).unwrap();
        let bytes = encoder.finish().unwrap();

        let stations = parse_stations(&decompress(&bytes).unwrap()).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, "71852");
    }

    #[test]
    fn non_gzip_bytes_are_an_error() {
        assert!(matches!(decompress(b"not gzip"), Err(SourceError::Io(_))));
    }

    #[test]
    fn stations_inside_region_win() {
        let region = manitoba();
        let stations = vec![
            station("in", 50.0, -98.0, "CA"),
            station("near", 48.0, -98.0, "US"),
        ];
        let (picked, lookup) = select_stations(&stations, &query(&region));
        assert_eq!(lookup, StationLookup::InRegion);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "in");
    }

    #[test]
    fn padded_region_is_second_pass() {
        let region = manitoba();
        let stations = vec![
            station("near", 48.0, -98.0, "US"),
            station("far", 40.0, -98.0, "US"),
        ];
        let (picked, lookup) = select_stations(&stations, &query(&region));
        assert_eq!(lookup, StationLookup::Padded);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "near");
    }

    #[test]
    fn nearest_country_stations_are_last_resort() {
        let region = manitoba();
        let stations = vec![
            station("toronto", 43.7, -79.4, "CA"),
            station("calgary", 51.0, -114.1, "CA"),
            station("denver", 39.7, -105.0, "US"),
        ];
        let mut q = query(&region);
        q.nearby_limit = 1;
        let (picked, lookup) = select_stations(&stations, &q);
        assert_eq!(lookup, StationLookup::Nearest);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "calgary");

        q.country = None;
        let (picked, lookup) = select_stations(&stations, &q);
        assert!(picked.is_empty());
        assert_eq!(lookup, StationLookup::Empty);
    }

    #[test]
    fn in_region_pass_respects_limit() {
        let region = manitoba();
        let stations: Vec<Station> = (0..5)
            .map(|i| station(&i.to_string(), 50.0, -98.0 + f64::from(i) * 0.1, "CA"))
            .collect();
        let mut q = query(&region);
        q.limit = 3;
        assert_eq!(select_stations(&stations, &q).0.len(), 3);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Winnipeg to Regina is roughly 536 km in a straight line.
        let d = haversine_km(49.8951, -97.1384, 50.4452, -104.6189);
        assert!((d - 536.0).abs() < 5.0, "{d}");
        assert!(haversine_km(50.0, -98.0, 50.0, -98.0).abs() < 1e-9);
    }

    #[test]
    fn parses_headerless_hourly_rows() {
        let text = "2024-07-01,10,21.3,12.0,55,0.0,,180,4.0,,1012.0,,2\n\
                    2024-07-01,11,,,,,,,,,,,\n\
                    bad-date,12,30.0,,40,,,90,5.0,,,,\n";
        let rows = parse_hourly_csv(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time, at(10));
        assert_eq!(rows[0].temperature, Some(21.3));
        assert_eq!(rows[0].relative_humidity, Some(55.0));
        assert_eq!(rows[0].wind_direction, Some(180.0));
        assert_eq!(rows[0].wind_speed, Some(4.0));
        assert_eq!(rows[1].temperature, None);
        assert_eq!(rows[1].wind_speed, None);
    }

    #[test]
    fn hourly_urls_cover_each_year_of_window() {
        let start = Utc.with_ymd_and_hms(2023, 12, 31, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(
            hourly_urls("https://bulk.meteostat.net/v2/", "71852", start, end),
            vec![
                "https://bulk.meteostat.net/v2/hourly/2023/71852.csv.gz",
                "https://bulk.meteostat.net/v2/hourly/2024/71852.csv.gz",
            ]
        );
    }

    #[test]
    fn summary_averages_window_and_takes_last_wind() {
        let stn = station("71852", 49.9, -97.2, "CA");
        let row = |hour, temperature, relative_humidity, wind_speed| HourlyRow {
            time: at(hour),
            temperature,
            relative_humidity,
            wind_speed,
            wind_direction: Some(f64::from(hour) * 10.0),
        };
        let rows = vec![
            row(1, Some(40.0), Some(10.0), Some(9.0)),
            row(5, Some(20.0), Some(40.0), Some(3.0)),
            row(6, Some(21.0), None, Some(4.0)),
            row(7, Some(22.05), Some(45.0), None),
        ];

        let obs = summarize(&stn, &rows, at(4), at(8), WindSpeedUnit::MetresPerSecond).unwrap();
        assert_eq!(obs.temperature, Some(21.0));
        assert_eq!(obs.relative_humidity, Some(42.5));
        assert_eq!(obs.wind_speed, Some(14.4));
        assert_eq!(obs.wind_direction, Some(70.0));
        assert_eq!(obs.observed_at, Some(at(7)));
        assert!((obs.latitude - 49.9).abs() < f64::EPSILON);

        let obs = summarize(&stn, &rows, at(4), at(8), WindSpeedUnit::KilometresPerHour).unwrap();
        assert_eq!(obs.wind_speed, Some(4.0));
    }

    #[test]
    fn summary_of_empty_window_is_none() {
        let stn = station("71852", 49.9, -97.2, "CA");
        let rows = vec![HourlyRow {
            time: at(1),
            temperature: Some(20.0),
            relative_humidity: None,
            wind_speed: None,
            wind_direction: None,
        }];
        assert!(summarize(&stn, &rows, at(4), at(8), WindSpeedUnit::MetresPerSecond).is_none());
    }
}
