//! Resolves a named boundary into the region of interest.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use geo::{BoundingRect, Contains, Coord, Geometry, Intersects, MultiPolygon, Point, Rect};
use geojson::GeoJson;
use log::{debug, info};
use ndarray::Array2;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    raster::Grid,
};

/// A feature of a boundary dataset.
#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    pub properties: Map<String, Value>,
    pub geometry: Option<Geometry<f64>>,
}

/// Read access to a vector boundary dataset.
pub trait BoundarySource {
    fn dataset_id(&self) -> String;
    fn features(&self) -> Result<Vec<BoundaryFeature>>;
}

/// Boundary dataset stored as a GeoJSON `FeatureCollection` (or single `Feature`).
pub struct GeoJsonBoundaries {
    path: PathBuf,
}

impl GeoJsonBoundaries {
    pub fn new(path: impl AsRef<Path>) -> Self {
        GeoJsonBoundaries {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BoundarySource for GeoJsonBoundaries {
    fn dataset_id(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    fn features(&self) -> Result<Vec<BoundaryFeature>> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => Error::SourceUnavailable {
                source_id: self.dataset_id(),
                reason: e.to_string(),
            },
            _ => Error::Io(e),
        })?;

        let features = match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(Error::Config(format!(
                    "boundary dataset {} holds a bare geometry, expected features",
                    self.dataset_id()
                )))
            }
        };

        features
            .into_iter()
            .map(|feature| {
                let geometry = feature.geometry.map(Geometry::<f64>::try_from).transpose()?;
                Ok(BoundaryFeature {
                    properties: feature.properties.unwrap_or_default(),
                    geometry,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// The selector must match exactly one feature.
    #[default]
    ExactlyOne,
    /// All matching features are merged into one region.
    Union,
}

/// Attribute-equality selector, e.g. `country_na = "Turkey"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionSelector {
    pub property: String,
    pub equals: String,
    #[serde(default)]
    pub policy: MatchPolicy,
}

impl RegionSelector {
    fn matches(&self, feature: &BoundaryFeature) -> bool {
        match feature.properties.get(&self.property) {
            Some(Value::String(s)) => *s == self.equals,
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string() == self.equals,
            _ => false,
        }
    }
}

/// The area of interest. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub crs: String,
    pub geometry: MultiPolygon<f64>,
    bbox: Rect<f64>,
}

impl Region {
    pub fn new(name: String, crs: String, geometry: MultiPolygon<f64>) -> Result<Self> {
        let bbox = geometry
            .bounding_rect()
            .ok_or_else(|| Error::InvalidGeometry(format!("region {} is empty", name)))?;

        Ok(Region {
            name,
            crs,
            geometry,
            bbox,
        })
    }

    pub fn bounding_rect(&self) -> Rect<f64> {
        self.bbox
    }

    pub fn contains(&self, point: Coord<f64>) -> bool {
        self.bbox.intersects(&point) && self.geometry.contains(&Point::from(point))
    }

    pub fn intersects(&self, rect: &Rect<f64>) -> bool {
        self.bbox.intersects(rect) && self.geometry.intersects(&rect.to_polygon())
    }

    /// Pixels of `grid` whose centre lies inside the region.
    pub fn mask(&self, grid: &Grid) -> RegionMask {
        let inside = Array2::from_shape_fn(grid.shape(), |(row, col)| {
            self.contains(grid.pixel_center(row, col))
        });

        RegionMask { inside }
    }
}

#[derive(Debug, Clone)]
pub struct RegionMask {
    inside: Array2<bool>,
}

impl RegionMask {
    pub fn covers(&self, row: usize, col: usize) -> bool {
        self.inside.get((row, col)).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.inside.iter().filter(|inside| **inside).count()
    }
}

/// Looks up the boundary feature(s) named by `selector`.
pub fn load_region(
    source: &dyn BoundarySource,
    selector: &RegionSelector,
    crs: &str,
) -> Result<Region> {
    let features = source.features()?;
    debug!(
        "Boundary dataset {} has {} features",
        source.dataset_id(),
        features.len()
    );

    let matching: Vec<BoundaryFeature> = features
        .into_iter()
        .filter(|f| selector.matches(f))
        .collect();

    if matching.is_empty() {
        return Err(Error::RegionNotFound {
            property: selector.property.clone(),
            value: selector.equals.clone(),
        });
    }
    if matching.len() > 1 && selector.policy == MatchPolicy::ExactlyOne {
        return Err(Error::AmbiguousRegion {
            property: selector.property.clone(),
            value: selector.equals.clone(),
            count: matching.len(),
        });
    }

    let count = matching.len();
    let mut polygons = Vec::new();
    for feature in matching {
        match feature.geometry {
            Some(Geometry::Polygon(p)) => polygons.push(p),
            Some(Geometry::MultiPolygon(mp)) => polygons.extend(mp.0),
            Some(other) => {
                return Err(Error::InvalidGeometry(format!(
                    "{} = {:?} is a {}",
                    selector.property,
                    selector.equals,
                    geometry_kind(&other)
                )))
            }
            None => {
                return Err(Error::InvalidGeometry(format!(
                    "{} = {:?} has no geometry",
                    selector.property, selector.equals
                )))
            }
        }
    }

    let region = Region::new(selector.equals.clone(), crs.to_string(), MultiPolygon(polygons))?;
    info!(
        "Resolved region {} from {} feature(s), {} polygon(s)",
        region.name,
        count,
        region.geometry.0.len()
    );

    Ok(region)
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => "point geometry",
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            "line geometry"
        }
        Geometry::GeometryCollection(_) => "geometry collection",
        _ => "non-polygon geometry",
    }
}

// -- Tests -------------------------------------------------------------------
