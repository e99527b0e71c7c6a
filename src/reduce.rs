//! Spatial mean of a composite over the region.

use std::collections::BTreeMap;

use geo::coord;

use crate::{
    composite::MonthlyComposite,
    error::{Error, Result},
    raster::Grid,
    region::Region,
};

/// Mean WGS84 metres per degree of latitude.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Per-band spatial mean. `None` where no defined pixel was sampled.
pub type RegionStatistic = BTreeMap<String, Option<f64>>;

pub fn undefined_statistic(bands: &[String]) -> RegionStatistic {
    bands.iter().map(|b| (b.clone(), None)).collect()
}

/// Sampling options of a region reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    /// Linear ground resolution of the sampling lattice, in metres for
    /// geographic grids and in grid units otherwise.
    pub scale: f64,
    /// Upper bound on lattice points visited inside the region.
    pub max_pixels: u64,
}

impl Reduction {
    pub fn new(scale: f64, max_pixels: u64) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::Config(format!("scale must be positive, got {}", scale)));
        }
        if max_pixels == 0 {
            return Err(Error::Config("max_pixels must be positive".to_string()));
        }

        Ok(Reduction { scale, max_pixels })
    }
}

/// `(x, y)` spacing of the sampling lattice in grid coordinates. On
/// geographic grids `scale` metres become degrees of latitude, and the
/// longitude step widens with `1 / cos(centre_lat)`.
fn lattice_step(grid: &Grid, scale: f64, centre_lat: f64) -> (f64, f64) {
    if grid.is_geographic() {
        let step_y = scale / METRES_PER_DEGREE;
        let step_x = step_y / centre_lat.to_radians().cos().max(1e-6);
        (step_x, step_y)
    } else {
        (scale, scale)
    }
}

/// Mean of every defined composite pixel sampled at `reduction.scale`
/// whose lattice point lies inside `region`.
pub fn reduce_region(
    composite: &MonthlyComposite,
    region: &Region,
    reduction: &Reduction,
) -> Result<RegionStatistic> {
    let names: Vec<String> = composite.bands.keys().cloned().collect();
    if composite.is_empty() {
        return Ok(undefined_statistic(&names));
    }

    let grid = &composite.grid;
    let extent = grid.extent();
    let bbox = region.bounding_rect();

    let min_x = extent.min().x.max(bbox.min().x);
    let max_x = extent.max().x.min(bbox.max().x);
    let min_y = extent.min().y.max(bbox.min().y);
    let max_y = extent.max().y.min(bbox.max().y);
    if min_x >= max_x || min_y >= max_y {
        return Ok(undefined_statistic(&names));
    }

    let (step_x, step_y) = lattice_step(grid, reduction.scale, (min_y + max_y) / 2.0);

    // lattice anchored at the grid origin
    let first_col = ((min_x - grid.origin_x) / step_x).floor() as i64;
    let last_col = ((max_x - grid.origin_x) / step_x).ceil() as i64;
    let first_row = ((grid.origin_y - max_y) / step_y).floor() as i64;
    let last_row = ((grid.origin_y - min_y) / step_y).ceil() as i64;

    let bands: Vec<_> = composite.bands.values().collect();
    let mut sums = vec![0.0; bands.len()];
    let mut counts = vec![0u64; bands.len()];
    let mut visited = 0u64;

    for j in first_row..last_row {
        let y = grid.origin_y - (j as f64 + 0.5) * step_y;
        for i in first_col..last_col {
            let point = coord! { x: grid.origin_x + (i as f64 + 0.5) * step_x, y: y };
            let Some(cell) = grid.cell_of(point) else {
                continue;
            };
            if !region.contains(point) {
                continue;
            }

            visited += 1;
            if visited > reduction.max_pixels {
                return Err(Error::ResourceLimitExceeded {
                    limit: reduction.max_pixels,
                });
            }

            for (k, band) in bands.iter().enumerate() {
                let v = band[cell];
                if !v.is_nan() {
                    sums[k] += v;
                    counts[k] += 1;
                }
            }
        }
    }

    Ok(names
        .into_iter()
        .zip(sums.into_iter().zip(counts))
        .map(|(name, (sum, count))| (name, (count > 0).then(|| sum / count as f64)))
        .collect())
}

// -- Tests -------------------------------------------------------------------
