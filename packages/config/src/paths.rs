#![allow(clippy::module_name_repetitions)]
//! Canonical locations under the data directory.
//!
//! ```text
//! <data_dir>/raw/         raw FIRMS CSV downloads
//! <data_dir>/processed/   snapshots and risk output
//! ```

use std::path::{Path, PathBuf};

use crate::LandwatchConfig;

/// File name of the exported risk collection.
pub const RISK_OUTPUT_FILE: &str = "risk_latest.geojson";

/// Prefix of weather snapshot files.
pub const WEATHER_SNAPSHOT_PREFIX: &str = "weather_grid_";

/// Prefix of fire snapshot files.
pub const FIRE_SNAPSHOT_PREFIX: &str = "firms_";

impl LandwatchConfig {
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.paths.data_dir
    }

    #[must_use]
    pub fn raw_dir(&self) -> PathBuf {
        self.paths.data_dir.join("raw")
    }

    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.paths.data_dir.join("processed")
    }

    #[must_use]
    pub fn risk_output_path(&self) -> PathBuf {
        self.processed_dir().join(RISK_OUTPUT_FILE)
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        log::debug!("Created {}", path.display());
    }
    Ok(())
}
