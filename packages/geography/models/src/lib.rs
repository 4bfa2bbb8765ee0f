#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic extent and projection types.
//!
//! A [`BoundingBox`] is the region of interest for a pipeline run. Every
//! constructor validates it, so downstream stages can rely on
//! `west < east` and `south < north` without re-checking.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Error returned when a bounding box does not describe a non-empty
/// geographic rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidBoundingBox {
    /// Western edge (degrees longitude).
    pub west: f64,
    /// Southern edge (degrees latitude).
    pub south: f64,
    /// Eastern edge (degrees longitude).
    pub east: f64,
    /// Northern edge (degrees latitude).
    pub north: f64,
}

impl std::fmt::Display for InvalidBoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid bounding box ({}, {}, {}, {}): expected finite west < east within \
             [-180, 180] and south < north within [-90, 90]",
            self.west, self.south, self.east, self.north
        )
    }
}

impl std::error::Error for InvalidBoundingBox {}

/// A geographic rectangle in WGS84 degrees.
///
/// Serialized as `[west, south, east, north]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl BoundingBox {
    /// Creates a validated bounding box.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBoundingBox`] if any edge is non-finite, out of
    /// range, or the box is empty (`west >= east` or `south >= north`).
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, InvalidBoundingBox> {
        let finite = [west, south, east, north].iter().all(|v| v.is_finite());
        let in_range = (-180.0..=180.0).contains(&west)
            && (-180.0..=180.0).contains(&east)
            && (-90.0..=90.0).contains(&south)
            && (-90.0..=90.0).contains(&north);

        if !finite || !in_range || west >= east || south >= north {
            return Err(InvalidBoundingBox {
                west,
                south,
                east,
                north,
            });
        }

        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    #[must_use]
    pub const fn west(&self) -> f64 {
        self.west
    }

    #[must_use]
    pub const fn south(&self) -> f64 {
        self.south
    }

    #[must_use]
    pub const fn east(&self) -> f64 {
        self.east
    }

    #[must_use]
    pub const fn north(&self) -> f64 {
        self.north
    }

    /// Longitude span in degrees.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Latitude span in degrees.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Latitude halfway between the southern and northern edges.
    #[must_use]
    pub fn mid_latitude(&self) -> f64 {
        (self.south + self.north) / 2.0
    }

    /// Whether the point lies inside the box. Edges are inclusive.
    #[must_use]
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        (self.west..=self.east).contains(&longitude) && (self.south..=self.north).contains(&latitude)
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = InvalidBoundingBox;

    fn try_from([west, south, east, north]: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(west, south, east, north)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.west, bbox.south, bbox.east, bbox.north]
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Planar projection used for distance tests.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectionKind {
    /// Statistics Canada Lambert (EPSG:3347). Accurate across Canada.
    #[default]
    StatcanLambert,
    /// Lambert conformal conic fitted to the region's bounding box.
    Regional,
}
