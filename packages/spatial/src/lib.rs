#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Radius counting of fire detections around weather points.
//!
//! Both point sets are projected into a common planar CRS (see
//! [`projection`]), fires are bulk-loaded into an R-tree, and each weather
//! point counts the fires whose planar distance is at most the radius. The
//! boundary is inclusive. A fire may be counted by several weather points.

pub mod projection;

use landwatch_source_models::{FireDetection, Located, WeatherObservation};
use rstar::{AABB, RTree};

pub use projection::{LambertParams, Projection};

/// Errors raised by the spatial stage.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The search radius is negative or not finite.
    #[error("invalid radius {radius_km} km: must be finite and non-negative")]
    InvalidRadius {
        /// The rejected radius.
        radius_km: f64,
    },

    /// Projection parameters do not define a usable cone.
    #[error("invalid projection: {message}")]
    InvalidProjection {
        /// What is wrong with the parameters.
        message: String,
    },
}

/// Projected fire positions indexed for radius queries.
pub struct FireIndex {
    tree: RTree<[f64; 2]>,
    skipped: Vec<usize>,
}

impl FireIndex {
    /// Projects and indexes `fires`. Fires whose projected position is not
    /// finite are left out and their input indexes recorded.
    #[must_use]
    pub fn build<T: Located>(fires: &[T], projection: &Projection) -> Self {
        let mut points = Vec::with_capacity(fires.len());
        let mut skipped = Vec::new();

        for (index, fire) in fires.iter().enumerate() {
            match project(fire, projection) {
                Some(xy) => points.push(xy),
                None => skipped.push(index),
            }
        }

        Self::from_projected(points, skipped)
    }

    fn from_projected(points: Vec<[f64; 2]>, skipped: Vec<usize>) -> Self {
        Self {
            tree: RTree::bulk_load(points),
            skipped,
        }
    }

    /// Number of indexed fires.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Input indexes of fires that could not be projected.
    #[must_use]
    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    /// Fires within `radius_m` metres of `center` (inclusive).
    #[must_use]
    pub fn count_within(&self, center: [f64; 2], radius_m: f64) -> usize {
        let [cx, cy] = center;
        let envelope = AABB::from_corners([cx - radius_m, cy - radius_m], [cx + radius_m, cy + radius_m]);
        let max_sq = radius_m * radius_m;

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|[x, y]| {
                let dx = x - cx;
                let dy = y - cy;
                dx.mul_add(dx, dy * dy) <= max_sq
            })
            .count()
    }
}

/// A weather point and the number of fires within the radius.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedPoint {
    pub observation: WeatherObservation,
    pub fire_count: u32,
}

/// Output of [`count_fires_within`].
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// One entry per usable weather point, in input order.
    pub points: Vec<AggregatedPoint>,
    /// Input indexes of fires that could not be projected.
    pub skipped_fires: Vec<usize>,
    /// Input indexes of weather points that could not be projected.
    pub skipped_weather: Vec<usize>,
}

/// Counts, for each weather point, the fires within `radius_km`.
///
/// Output coordinates are the projected positions converted back to
/// degrees.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidRadius`] if `radius_km` is negative or
/// not finite.
pub fn count_fires_within(
    weather: &[WeatherObservation],
    fires: &[FireDetection],
    radius_km: f64,
    projection: &Projection,
) -> Result<Aggregation, SpatialError> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(SpatialError::InvalidRadius { radius_km });
    }

    let index = FireIndex::build(fires, projection);
    let radius_m = radius_km * 1000.0;

    let mut aggregation = Aggregation {
        points: Vec::with_capacity(weather.len()),
        skipped_fires: index.skipped().to_vec(),
        skipped_weather: Vec::new(),
    };

    for (i, observation) in weather.iter().enumerate() {
        let Some(xy) = project(observation, projection) else {
            log::debug!("Weather point {i} could not be projected; skipping");
            aggregation.skipped_weather.push(i);
            continue;
        };

        let count = index.count_within(xy, radius_m);
        let (longitude, latitude) = projection.inverse(xy[0], xy[1]);

        aggregation.points.push(AggregatedPoint {
            observation: WeatherObservation {
                latitude,
                longitude,
                ..observation.clone()
            },
            fire_count: u32::try_from(count).unwrap_or(u32::MAX),
        });
    }

    log::info!(
        "Counted {} fires around {} weather points within {radius_km} km ({} fires, {} points skipped)",
        index.len(),
        aggregation.points.len(),
        aggregation.skipped_fires.len(),
        aggregation.skipped_weather.len()
    );

    Ok(aggregation)
}

fn project<T: Located>(item: &T, projection: &Projection) -> Option<[f64; 2]> {
    let (lon, lat) = (item.longitude(), item.latitude());
    if !lon.is_finite() || !lat.is_finite() {
        return None;
    }
    let (x, y) = projection.forward(lon, lat);
    (x.is_finite() && y.is_finite()).then_some([x, y])
}
