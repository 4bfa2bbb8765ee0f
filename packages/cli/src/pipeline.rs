//! Pipeline stages behind the CLI subcommands.
//!
//! Each stage reads what it needs from disk and writes its result back, so
//! stages can run separately (`fetch-firms` on one schedule, `score` on
//! another) or chained by [`run`].

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use landwatch_cli_utils::{IndicatifProgress, MultiProgress};
use landwatch_config::LandwatchConfig;
use landwatch_config::paths::{FIRE_SNAPSHOT_PREFIX, WEATHER_SNAPSHOT_PREFIX, ensure_dir};
use landwatch_generate::export::write_risk_collection;
use landwatch_generate::latest_snapshot;
use landwatch_generate::snapshot::{
    fire_snapshot_path, read_fire_snapshot, read_weather_snapshot, weather_snapshot_path,
    write_fire_snapshot, write_weather_snapshot,
};
use landwatch_grid::{Grid, build_grid, sample_step};
use landwatch_source::firms::{self, FirmsRequest};
use landwatch_source::meteostat::{self, MeteostatRequest, StationQuery};
use landwatch_source::open_meteo::{self, WeatherFetchReport};
use landwatch_source::{SourceError, http_client};
use landwatch_source_models::WeatherSource;

type PipelineResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Prints the grid that `fetch-weather` would sample.
///
/// # Errors
///
/// Returns an error if the grid cannot be built at the configured
/// resolution.
pub fn describe_grid(config: &LandwatchConfig) -> PipelineResult<()> {
    let grid = build_grid(&config.region.bbox, config.weather.cell_km)?;
    let (rows, cols) = grid.dims();
    let (cell_lat, cell_lon) = grid.cell_degrees();
    let step = sample_step(grid.len(), config.weather.max_points);
    let sampled = grid.sampled(config.weather.max_points).count();

    println!("region      {}", grid.bbox());
    println!("cell size   {} km ({cell_lat:.5} deg lat x {cell_lon:.5} deg lon)", grid.cell_km());
    println!("grid        {rows} rows x {cols} cols = {} cells", grid.len());
    println!("sampling    every {step} cell(s), {sampled} points");

    Ok(())
}

/// Downloads FIRMS detections, keeps the raw CSV, and writes a fire
/// snapshot clipped to the region.
///
/// # Errors
///
/// Returns an error if the map key is missing, every FIRMS endpoint fails,
/// or a file cannot be written.
pub async fn fetch_firms(config: &LandwatchConfig) -> PipelineResult<PathBuf> {
    let map_key = config
        .firms
        .map_key
        .as_deref()
        .ok_or(SourceError::MissingMapKey)?;

    let raw_dir = config.raw_dir();
    let processed_dir = config.processed_dir();
    ensure_dir(&raw_dir)?;
    ensure_dir(&processed_dir)?;

    let client = http_client(Duration::from_secs(config.firms.timeout_secs))?;
    let request = FirmsRequest {
        base_url: &config.firms.base_url,
        map_key,
        dataset: &config.firms.dataset,
        region: &config.region.bbox,
        days: config.firms.days,
        country: config.firms_country(),
    };

    let download = firms::fetch_csv(&client, &request).await?;
    if !download.rejected.is_empty() {
        log::info!(
            "FIRMS answered from fallback {} after {} rejected endpoint(s)",
            download.url,
            download.rejected.len()
        );
    }

    let start = firms::window_start(config.firms.days);
    firms::save_raw(
        &firms::raw_csv_path(&raw_dir, &config.firms.dataset, start),
        &download.body,
    )
    .await?;

    let batch = firms::parse_detections(&download.body, &config.region.bbox)?;
    log::info!(
        "{} fire detections in region, {} rows skipped",
        batch.records.len(),
        batch.skipped.len()
    );

    let path = fire_snapshot_path(&processed_dir, &config.firms.dataset, start);
    write_fire_snapshot(&path, &batch.records)?;
    Ok(path)
}

/// Centroids picked for weather sampling, as `(latitude, longitude)`.
#[must_use]
pub fn sample_points(grid: &Grid, max_points: usize) -> Vec<(f64, f64)> {
    grid.sampled(max_points)
        .map(|cell| (cell.centroid.y(), cell.centroid.x()))
        .collect()
}

/// Meteostat settings for the configured region.
#[must_use]
pub fn meteostat_request(config: &LandwatchConfig) -> MeteostatRequest<'_> {
    let m = &config.weather.meteostat;
    MeteostatRequest {
        base_url: &m.base_url,
        stations: StationQuery {
            region: &config.region.bbox,
            limit: m.station_limit,
            pad_degrees: m.pad_degrees,
            country: config.meteostat_country(),
            nearby_limit: m.nearby_limit,
        },
        hours: m.hours,
        wind_speed_unit: m.wind_speed_unit,
    }
}

/// Display name of the configured weather feed.
#[must_use]
pub const fn weather_label(source: WeatherSource) -> &'static str {
    match source {
        WeatherSource::OpenMeteo => "Open-Meteo",
        WeatherSource::Meteostat => "Meteostat",
    }
}

async fn fetch_open_meteo(
    config: &LandwatchConfig,
    client: &reqwest::Client,
    multi: &MultiProgress,
) -> PipelineResult<WeatherFetchReport> {
    let grid = build_grid(&config.region.bbox, config.weather.cell_km)?;
    let points = sample_points(&grid, config.weather.max_points);
    log::info!(
        "Sampling {} of {} grid cells for weather",
        points.len(),
        grid.len()
    );

    let progress = IndicatifProgress::records_bar(multi, "Open-Meteo");
    Ok(open_meteo::fetch_points(
        client,
        &config.weather.base_url,
        &points,
        config.weather.forecast_days,
        &progress,
    )
    .await)
}

/// Downloads weather from the configured feed and writes a weather
/// snapshot. Open-Meteo samples grid centroids; Meteostat summarizes
/// stations in or near the region.
///
/// # Errors
///
/// Returns an error if the grid cannot be built, the Meteostat station
/// list cannot be retrieved, or a file cannot be written. Individual point
/// and station failures are logged, not returned.
pub async fn fetch_weather(
    config: &LandwatchConfig,
    multi: &MultiProgress,
) -> PipelineResult<PathBuf> {
    let processed_dir = config.processed_dir();
    ensure_dir(&processed_dir)?;

    let client = http_client(Duration::from_secs(config.weather.timeout_secs))?;
    let report = match config.weather.source {
        WeatherSource::OpenMeteo => fetch_open_meteo(config, &client, multi).await?,
        WeatherSource::Meteostat => {
            let progress = IndicatifProgress::records_bar(multi, "Meteostat");
            meteostat::fetch_observations(&client, &meteostat_request(config), &progress).await?
        }
    };

    if !report.failures.is_empty() {
        log::warn!("{} weather point(s) failed", report.failures.len());
    }

    let path = weather_snapshot_path(&processed_dir, Utc::now().date_naive());
    write_weather_snapshot(&path, &report.observations)?;
    Ok(path)
}

/// Scores the most recent snapshots and writes the risk collection.
///
/// # Errors
///
/// Returns an error if a snapshot is missing or unreadable, the risk
/// settings are invalid, or the output cannot be written.
pub fn score(config: &LandwatchConfig) -> PipelineResult<PathBuf> {
    let processed_dir = config.processed_dir();

    let weather_path = latest_snapshot(&processed_dir, WEATHER_SNAPSHOT_PREFIX)?;
    let fire_path = latest_snapshot(&processed_dir, FIRE_SNAPSHOT_PREFIX)?;
    log::info!(
        "Scoring {} against {}",
        weather_path.display(),
        fire_path.display()
    );

    let weather = read_weather_snapshot(&weather_path)?;
    let fires = read_fire_snapshot(&fire_path)?;
    if !weather.skipped.is_empty() || !fires.skipped.is_empty() {
        log::warn!(
            "Snapshot rows skipped: {} weather, {} fire",
            weather.skipped.len(),
            fires.skipped.len()
        );
    }

    let assessment = landwatch_risk::assess(
        &config.region.bbox,
        &weather.records,
        &fires.records,
        &config.risk,
    )?;

    for signal in &assessment.degenerate {
        log::warn!("{signal} has no spread across points; its term is zero");
    }

    let path = config.risk_output_path();
    write_risk_collection(&path, &assessment.records, &assessment.fire_count_key)?;
    Ok(path)
}

/// Fetches both feeds and scores them.
///
/// # Errors
///
/// Returns the first stage error.
pub async fn run(config: &LandwatchConfig, multi: &MultiProgress) -> PipelineResult<PathBuf> {
    let started = Instant::now();
    let steps = IndicatifProgress::steps_bar(multi, "FIRMS", 3);

    let fires = fetch_firms(config).await?;
    log::info!("Fire snapshot: {}", fires.display());
    steps.inc(1);

    steps.set_message(weather_label(config.weather.source).to_string());
    let weather = fetch_weather(config, multi).await?;
    log::info!("Weather snapshot: {}", weather.display());
    steps.inc(1);

    steps.set_message("Scoring".to_string());
    let output = score(config)?;
    steps.inc(1);

    steps.finish(format!("Done in {:.1}s", started.elapsed().as_secs_f64()));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_region_samples_at_most_max_points() {
        let config = LandwatchConfig::defaults().unwrap();
        let grid = build_grid(&config.region.bbox, config.weather.cell_km).unwrap();
        let points = sample_points(&grid, config.weather.max_points);

        assert_eq!(grid.len(), 12_864);
        assert_eq!(points.len(), 300);
        assert!(points
            .iter()
            .all(|&(lat, lon)| config.region.bbox.contains(lon, lat)));
    }

    #[test]
    fn meteostat_request_follows_config() {
        let mut config = LandwatchConfig::from_toml_str(
            "[weather]\nsource = \"meteostat\"\n[weather.meteostat]\nhours = 6\n",
        )
        .unwrap();
        let request = meteostat_request(&config);

        assert_eq!(request.base_url, "https://bulk.meteostat.net/v2");
        assert_eq!(request.hours, 6);
        assert_eq!(request.stations.limit, 200);
        assert_eq!(request.stations.nearby_limit, 50);
        assert_eq!(request.stations.country, Some("CA"));
        assert_eq!(*request.stations.region, config.region.bbox);
        assert_eq!(weather_label(config.weather.source), "Meteostat");

        config.weather.meteostat.country = Some("  ".to_string());
        assert_eq!(meteostat_request(&config).stations.country, None);
    }

    #[test]
    fn score_without_snapshots_fails() {
        let mut config = LandwatchConfig::defaults().unwrap();
        config.paths.data_dir =
            std::env::temp_dir().join(format!("landwatch-cli-empty-{}", std::process::id()));
        assert!(score(&config).is_err());
    }

    #[tokio::test]
    async fn fetch_firms_requires_map_key() {
        let config = LandwatchConfig::defaults().unwrap();
        let err = fetch_firms(&config).await.unwrap_err();
        assert!(err.to_string().contains("map key"));
    }
}
