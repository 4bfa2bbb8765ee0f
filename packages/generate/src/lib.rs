#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `GeoJSON` input and output for the pipeline.
//!
//! Feed snapshots ([`snapshot`]) are point feature collections written
//! after each fetch and read back by the scoring step. Reading goes through
//! the same normalizers as live feed data, so a hand-edited or third-party
//! snapshot is held to the same rules. The scored output is written by
//! [`export`].

pub mod export;
pub mod snapshot;

use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject};

/// Errors that can occur while reading or writing `GeoJSON`.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// The document is valid `GeoJSON` but not a feature collection.
    #[error("{path} is not a GeoJSON FeatureCollection")]
    NotACollection {
        path: PathBuf,
    },

    /// No snapshot matching the prefix exists.
    #[error("no {prefix}*.geojson snapshot in {dir}")]
    NoSnapshot {
        dir: PathBuf,
        prefix: String,
    },
}

/// A point feature with the given properties.
#[must_use]
pub fn point_feature(longitude: f64, latitude: f64, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::Point(vec![longitude, latitude]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Writes a feature collection to `path`.
///
/// # Errors
///
/// Returns [`GenerateError`] if the file cannot be created or written.
pub fn write_collection(path: &Path, features: Vec<Feature>) -> Result<usize, GenerateError> {
    let count = features.len();
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    log::info!("Wrote {count} features to {}", path.display());
    Ok(count)
}

/// Reads a point feature collection as flat rows: each feature's
/// properties plus `longitude`/`latitude` from its point geometry.
///
/// Features without a point geometry keep only their properties, so the
/// normalizers report them as missing coordinates.
///
/// # Errors
///
/// Returns [`GenerateError`] if the file cannot be read or is not a
/// `GeoJSON` feature collection.
pub fn read_point_rows(path: &Path) -> Result<Vec<serde_json::Value>, GenerateError> {
    let text = std::fs::read_to_string(path)?;
    let geojson: GeoJson = text.parse().map_err(Box::new)?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(GenerateError::NotACollection {
            path: path.to_path_buf(),
        });
    };

    Ok(collection.features.into_iter().map(feature_row).collect())
}

fn feature_row(feature: Feature) -> serde_json::Value {
    let mut row = feature.properties.unwrap_or_default();

    if let Some(geojson::Value::Point(coords)) = feature.geometry.map(|g| g.value)
        && let [lon, lat, ..] = coords.as_slice()
    {
        row.insert("longitude".to_string(), serde_json::json!(lon));
        row.insert("latitude".to_string(), serde_json::json!(lat));
    }

    serde_json::Value::Object(row)
}

/// Most recently modified `<prefix>*.geojson` file in `dir`.
///
/// # Errors
///
/// * [`GenerateError::Io`] if `dir` cannot be listed
/// * [`GenerateError::NoSnapshot`] if nothing matches
pub fn latest_snapshot(dir: &Path, prefix: &str) -> Result<PathBuf, GenerateError> {
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;

    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(prefix) || !name.ends_with(".geojson") {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            if best.as_ref().is_none_or(|(t, _)| modified > *t) {
                best = Some((modified, entry.path()));
            }
        }
    }

    best.map(|(_, path)| path).ok_or_else(|| GenerateError::NoSnapshot {
        dir: dir.to_path_buf(),
        prefix: prefix.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_dir {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// A fresh, empty directory under the system temp dir.
    pub fn fresh(label: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "landwatch-generate-{label}-{}-{n}",
            std::process::id()
        ));
        if dir.exists() {
            std::fs::remove_dir_all(&dir).unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
