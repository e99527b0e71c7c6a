//! Monthly pixel-wise mean composites clipped to the region.

use std::{collections::BTreeMap, sync::Arc};

use log::debug;
use ndarray::{Array2, Zip};

use crate::{
    bucket::MonthBucket,
    error::{Error, Result},
    raster::{filter::matches_all, Band, BandPlan, Grid, SceneFilter},
    region::{Region, RegionMask},
    source::{SceneQuery, SceneSource},
};

/// One month's temporal mean. With `scene_count == 0` every band is all NaN.
#[derive(Debug, Clone)]
pub struct MonthlyComposite {
    pub bucket: MonthBucket,
    pub grid: Grid,
    pub bands: BTreeMap<String, Band>,
    pub scene_count: usize,
}

impl MonthlyComposite {
    pub fn empty(bucket: MonthBucket, grid: &Grid, bands: &[String]) -> Self {
        let bands = bands
            .iter()
            .map(|name| (name.clone(), Array2::from_elem(grid.shape(), f64::NAN)))
            .collect();

        MonthlyComposite {
            bucket,
            grid: grid.clone(),
            bands,
            scene_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scene_count == 0
    }
}

#[derive(Debug)]
struct MeanAccumulator {
    sum: Array2<f64>,
    count: Array2<u32>,
}

impl MeanAccumulator {
    fn new(shape: (usize, usize)) -> Self {
        MeanAccumulator {
            sum: Array2::zeros(shape),
            count: Array2::zeros(shape),
        }
    }

    fn add(&mut self, band: &Band) {
        Zip::from(&mut self.sum)
            .and(&mut self.count)
            .and(band)
            .for_each(|sum, count, &v| {
                if !v.is_nan() {
                    *sum += v;
                    *count += 1;
                }
            });
    }

    fn finish(self, mask: &RegionMask) -> Band {
        let mut mean = Array2::from_elem(self.sum.dim(), f64::NAN);
        for ((row, col), value) in mean.indexed_iter_mut() {
            let count = self.count[[row, col]];
            if count > 0 && mask.covers(row, col) {
                *value = self.sum[[row, col]] / count as f64;
            }
        }

        mean
    }
}

/// Builds monthly composites of one series over one region.
pub struct Compositor {
    source: Arc<dyn SceneSource>,
    region: Arc<Region>,
    mask: RegionMask,
    plan: BandPlan,
    filters: Vec<SceneFilter>,
}

impl Compositor {
    pub fn new(
        source: Arc<dyn SceneSource>,
        region: Arc<Region>,
        plan: BandPlan,
        filters: Vec<SceneFilter>,
    ) -> Result<Self> {
        let grid = &source.describe().grid;
        if !grid.crs.eq_ignore_ascii_case(&region.crs) {
            return Err(Error::Config(format!(
                "series {} is in {} but region {} is in {}",
                source.describe().id,
                grid.crs,
                region.name,
                region.crs
            )));
        }

        let mask = region.mask(grid);
        debug!(
            "Region {} covers {} of {} pixels of series {}",
            region.name,
            mask.count(),
            grid.width * grid.height,
            source.describe().id
        );

        Ok(Compositor {
            source,
            region,
            mask,
            plan,
            filters,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.source.describe().grid
    }

    pub fn source_id(&self) -> &str {
        &self.source.describe().id
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Mean of every scene in `bucket` that intersects the region and passes the filters.
    pub fn composite(&self, bucket: MonthBucket) -> Result<MonthlyComposite> {
        let grid = self.grid();
        let candidates = self.source.query(&SceneQuery {
            bucket,
            bounds: self.region.bounding_rect(),
        })?;

        let mut accumulators: BTreeMap<String, MeanAccumulator> = self
            .plan
            .bands
            .iter()
            .map(|name| (name.clone(), MeanAccumulator::new(grid.shape())))
            .collect();

        let mut scene_count = 0;
        for scene in candidates {
            let scene = scene?;
            if !bucket.contains(&scene.time)
                || !self.region.intersects(&scene.footprint)
                || !matches_all(&self.filters, &scene.properties)
            {
                continue;
            }
            scene.check_grid(grid)?;

            let scene = self.plan.apply(scene)?;
            for (name, band) in &scene.bands {
                if let Some(acc) = accumulators.get_mut(name) {
                    acc.add(band);
                }
            }
            scene_count += 1;
        }

        debug!(
            "{} {}: {} scenes composited",
            self.source.describe().id,
            bucket.iso_month(),
            scene_count
        );

        if scene_count == 0 {
            return Ok(MonthlyComposite::empty(bucket, grid, &self.plan.bands));
        }

        let bands = accumulators
            .into_iter()
            .map(|(name, acc)| (name, acc.finish(&self.mask)))
            .collect();

        Ok(MonthlyComposite {
            bucket,
            grid: grid.clone(),
            bands,
            scene_count,
        })
    }
}

// -- Tests -------------------------------------------------------------------
