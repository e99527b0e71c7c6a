//! Raster grids and time-stamped scenes.

pub mod filter;
pub mod transform;

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use geo::{coord, Coord, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub use filter::SceneFilter;
pub use transform::{BandPlan, Transform};

/// One band of pixel values, row-major. Undefined pixels are NaN.
pub type Band = Array2<f64>;

pub fn default_crs() -> String {
    "EPSG:4326".to_string()
}

/// Georeferenced pixel grid. The origin is the upper-left corner and rows
/// advance southward, so row `r` spans `origin_y - (r + 1) * pixel_height
/// ..origin_y - r * pixel_height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    #[serde(default = "default_crs")]
    pub crs: String,
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub width: usize,
    pub height: usize,
}

impl Grid {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "grid has invalid dimensions {}x{}",
                self.width, self.height
            )));
        }
        if !(self.pixel_width > 0.0 && self.pixel_height > 0.0)
            || !self.pixel_width.is_finite()
            || !self.pixel_height.is_finite()
        {
            return Err(Error::Config(format!(
                "grid pixel size must be positive, got {} x {}",
                self.pixel_width, self.pixel_height
            )));
        }
        if !self.origin_x.is_finite() || !self.origin_y.is_finite() {
            return Err(Error::Config("grid origin must be finite".to_string()));
        }

        Ok(())
    }

    /// Whether grid coordinates are longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        matches!(
            self.crs.to_uppercase().as_str(),
            "EPSG:4326" | "OGC:CRS84" | "CRS84" | "WGS84"
        )
    }

    /// `(rows, cols)`, the shape of every band on this grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn extent(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.origin_x, y: self.origin_y - self.height as f64 * self.pixel_height },
            coord! { x: self.origin_x + self.width as f64 * self.pixel_width, y: self.origin_y },
        )
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> Coord<f64> {
        coord! {
            x: self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            y: self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        }
    }

    /// `(row, col)` of the pixel containing the point, if it is on the grid.
    pub fn cell_of(&self, point: Coord<f64>) -> Option<(usize, usize)> {
        let col = ((point.x - self.origin_x) / self.pixel_width).floor();
        let row = ((self.origin_y - point.y) / self.pixel_height).floor();

        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }

        Some((row as usize, col as usize))
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} grid at ({}, {}) with {}x{} pixels in {}",
            self.width,
            self.height,
            self.origin_x,
            self.origin_y,
            self.pixel_width,
            self.pixel_height,
            self.crs
        )
    }
}

/// Description of an image series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub id: String,
    pub grid: Grid,
    #[serde(default)]
    pub bands: Vec<String>,
}

/// A single time-stamped image of a series.
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub time: DateTime<Utc>,
    pub properties: Map<String, Value>,
    pub footprint: Rect<f64>,
    pub bands: BTreeMap<String, Band>,
}

impl Scene {
    /// Checks that every band has the shape of `grid`.
    pub fn check_grid(&self, grid: &Grid) -> Result<()> {
        for (name, band) in &self.bands {
            if band.dim() != grid.shape() {
                let (rows, cols) = band.dim();
                return Err(Error::GridMismatch {
                    scene: self.id.clone(),
                    expected: format!("{}x{}", grid.width, grid.height),
                    found: format!("{}x{} in band {}", cols, rows, name),
                });
            }
        }

        Ok(())
    }
}

// -- Tests -------------------------------------------------------------------
