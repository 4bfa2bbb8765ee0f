//! NASA FIRMS active-fire download.
//!
//! FIRMS serves near-real-time detections as CSV. The area endpoint has
//! historically accepted the bounding box in two orderings, so the client
//! tries `west,south,east,north`, then `south,west,north,east`, then the
//! country endpoint when a country code is configured. Each endpoint is
//! requested once; the first response that looks like CSV wins.
//!
//! FIRMS reports most errors with HTTP 200 and a plain-text message, so a
//! response is only accepted when its first [`HEAD_LEN`] characters contain
//! neither `invalid` nor `error`.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use landwatch_geography_models::BoundingBox;
use landwatch_source_models::{FireDetection, NormalizedBatch};

use crate::SourceError;
use crate::csv_records::parse_csv_records;
use crate::normalize::normalize_fire_records;

/// Largest day range FIRMS accepts.
pub const MAX_DAYS: u8 = 10;

/// Number of leading characters inspected when validating a response.
pub const HEAD_LEN: usize = 160;

/// Parameters for a FIRMS download.
#[derive(Debug, Clone)]
pub struct FirmsRequest<'a> {
    /// Service root, e.g. `https://firms.modaps.eosdis.nasa.gov`.
    pub base_url: &'a str,
    pub map_key: &'a str,
    /// Product name, e.g. `VIIRS_NOAA20_NRT`.
    pub dataset: &'a str,
    pub region: &'a BoundingBox,
    /// Requested day range. Clamped to `1..=MAX_DAYS`.
    pub days: u32,
    /// ISO 3166 alpha-3 code for the country endpoint fallback.
    pub country: Option<&'a str>,
}

impl FirmsRequest<'_> {
    #[must_use]
    pub fn clamped_days(&self) -> u8 {
        clamp_days(self.days)
    }

    /// Candidate URLs in the order they are tried.
    #[must_use]
    pub fn endpoint_urls(&self) -> Vec<String> {
        let base = self.base_url.trim_end_matches('/');
        let days = self.clamped_days();
        let b = self.region;

        let mut urls = vec![
            format!(
                "{base}/api/area/csv/{}/{}/{},{},{},{}/{days}",
                self.map_key,
                self.dataset,
                b.west(),
                b.south(),
                b.east(),
                b.north()
            ),
            format!(
                "{base}/api/area/csv/{}/{}/{},{},{},{}/{days}",
                self.map_key,
                self.dataset,
                b.south(),
                b.west(),
                b.north(),
                b.east()
            ),
        ];

        if let Some(country) = self.country.filter(|c| !c.trim().is_empty()) {
            urls.push(format!(
                "{base}/api/country/csv/{}/{}/{}/{days}",
                self.map_key,
                self.dataset,
                country.trim()
            ));
        }

        urls
    }
}

/// One rejected endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// URL with the map key redacted.
    pub url: String,
    /// HTTP status, or `None` if the request itself failed.
    pub status: Option<u16>,
    /// Leading part of the body, or the transport error message.
    pub head: String,
}

/// A successful download.
#[derive(Debug, Clone)]
pub struct FirmsDownload {
    /// URL with the map key redacted.
    pub url: String,
    pub body: String,
    /// Endpoints rejected before this one succeeded.
    pub rejected: Vec<FailedAttempt>,
}

/// Clamps a day range to what FIRMS accepts.
#[must_use]
pub fn clamp_days(days: u32) -> u8 {
    u8::try_from(days.clamp(1, u32::from(MAX_DAYS))).unwrap_or(MAX_DAYS)
}

/// First [`HEAD_LEN`] characters of a body.
#[must_use]
pub fn response_head(body: &str) -> String {
    body.chars().take(HEAD_LEN).collect()
}

/// Whether a FIRMS response can be treated as CSV data.
#[must_use]
pub fn is_valid_response(status: u16, body: &str) -> bool {
    if status != 200 {
        return false;
    }
    let head = response_head(body).to_lowercase();
    !head.contains("invalid") && !head.contains("error")
}

/// Replaces every occurrence of the map key.
#[must_use]
pub fn redact(url: &str, map_key: &str) -> String {
    if map_key.is_empty() {
        url.to_string()
    } else {
        url.replace(map_key, "***")
    }
}

pub(crate) fn describe_attempts(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| {
            let status = a.status.map_or_else(|| "no response".to_string(), |s| s.to_string());
            format!("  {} [{status}]: {}", a.url, a.head.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Downloads detections, walking the endpoint fallbacks in order.
///
/// # Errors
///
/// * [`SourceError::MissingMapKey`] if `request.map_key` is blank
/// * [`SourceError::FirmsUnavailable`] if every endpoint fails
pub async fn fetch_csv(
    client: &reqwest::Client,
    request: &FirmsRequest<'_>,
) -> Result<FirmsDownload, SourceError> {
    if request.map_key.trim().is_empty() {
        return Err(SourceError::MissingMapKey);
    }

    let mut rejected = Vec::new();

    for url in request.endpoint_urls() {
        let shown = redact(&url, request.map_key);
        log::info!("Requesting FIRMS {shown}");

        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("FIRMS request failed for {shown}: {e}");
                rejected.push(FailedAttempt {
                    url: shown,
                    status: None,
                    head: redact(&e.to_string(), request.map_key),
                });
                continue;
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                rejected.push(FailedAttempt {
                    url: shown,
                    status: Some(status),
                    head: redact(&e.to_string(), request.map_key),
                });
                continue;
            }
        };

        if is_valid_response(status, &body) {
            log::info!("FIRMS responded with {} bytes from {shown}", body.len());
            return Ok(FirmsDownload {
                url: shown,
                body,
                rejected,
            });
        }

        log::warn!("FIRMS rejected {shown} [{status}]");
        rejected.push(FailedAttempt {
            url: shown,
            status: Some(status),
            head: response_head(&body),
        });
    }

    Err(SourceError::FirmsUnavailable { attempts: rejected })
}

/// Parses a FIRMS CSV body and clips it to `region`.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the body is not valid CSV.
pub fn parse_detections(
    body: &str,
    region: &BoundingBox,
) -> Result<NormalizedBatch<FireDetection>, SourceError> {
    let rows = parse_csv_records(body)?;
    Ok(normalize_fire_records(&rows, Some(region)))
}

/// Date stamped on raw and snapshot files: `days` (clamped to 1..=10)
/// before today, UTC.
#[must_use]
pub fn window_start(days: u32) -> NaiveDate {
    window_start_from(Utc::now().date_naive(), days)
}

/// [`window_start`] relative to `today`.
#[must_use]
pub fn window_start_from(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(chrono::Days::new(u64::from(clamp_days(days))))
        .unwrap_or(today)
}

/// `firms_<dataset>_<start>.csv` under `dir`.
#[must_use]
pub fn raw_csv_path(dir: &Path, dataset: &str, start: NaiveDate) -> PathBuf {
    dir.join(format!("firms_{dataset}_{}.csv", start.format("%Y-%m-%d")))
}

/// Writes the raw body to disk.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the file cannot be written.
pub async fn save_raw(path: &Path, body: &str) -> Result<(), SourceError> {
    tokio::fs::write(path, body).await?;
    log::info!("Saved raw FIRMS CSV to {}", path.display());
    Ok(())
}
