#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feed acquisition and normalization.
//!
//! [`firms`] downloads active-fire detections from NASA FIRMS.
//! [`open_meteo`] pulls the latest hourly forecast for a set of points and
//! [`meteostat`] summarizes recent station observations; either one
//! supplies the weather layer. Feed rows go through [`normalize`], which
//! maps provider columns onto the typed records in
//! [`landwatch_source_models`].
//!
//! Every endpoint is requested at most once per call. There is no retry or
//! backoff layer.

pub mod csv_records;
pub mod firms;
pub mod meteostat;
pub mod normalize;
pub mod open_meteo;
pub mod progress;

use std::time::Duration;

/// Errors that can occur while acquiring or parsing feed data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No FIRMS map key was configured.
    #[error("FIRMS map key is not set (export FIRMS_MAP_KEY or FIRMS_API_KEY)")]
    MissingMapKey,

    /// Every FIRMS endpoint rejected the request.
    #[error("all FIRMS endpoints failed:\n{}", firms::describe_attempts(.attempts))]
    FirmsUnavailable {
        /// One entry per endpoint tried, in order.
        attempts: Vec<firms::FailedAttempt>,
    },
}

/// Builds the HTTP client used by the feed fetchers.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the TLS backend cannot be initialized.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("landwatch/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
