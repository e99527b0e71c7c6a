//! Run configuration, read from a TOML file.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    bucket::{month_buckets, MonthBuckets},
    error::{Error, Result},
    export::Column,
    raster::{default_crs, BandPlan, SceneFilter, Transform},
    reduce::Reduction,
    region::RegionSelector,
    source::archive::is_url,
};

const DEFAULT_MAX_PIXELS: f64 = 1e13;
const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub region: RegionConfig,
    pub period: PeriodConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(rename = "dataset", default)]
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    /// GeoJSON boundary dataset.
    pub boundaries: PathBuf,
    #[serde(flatten)]
    pub selector: RegionSelector,
    #[serde(default = "default_crs")]
    pub crs: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PeriodConfig {
    pub start_year: i32,
    pub end_year: i32,
}

impl PeriodConfig {
    pub fn buckets(&self) -> Result<MonthBuckets> {
        month_buckets(self.start_year, self.end_year)
    }
}

/// What to do with a bucket whose reduction exceeds `max_pixels`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceLimitPolicy {
    /// Fail the whole dataset.
    #[default]
    Abort,
    /// Emit the bucket with undefined values and carry on.
    MarkUndefined,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub concurrency: Option<usize>,
    pub on_resource_limit: ResourceLimitPolicy,
    pub output_dir: Option<PathBuf>,
    pub parquet: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    /// Output file stem, defaults to `<name>_<start>_<end>`.
    #[serde(default)]
    pub description: Option<String>,
    /// Series directory, `.tar.gz` archive or `http(s)` archive URL.
    pub source: String,
    pub bands: Vec<String>,
    pub scale: f64,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: f64,
    #[serde(default)]
    pub transforms: Vec<Transform>,
    #[serde(default)]
    pub filters: Vec<SceneFilter>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

fn default_max_pixels() -> f64 {
    DEFAULT_MAX_PIXELS
}

impl DatasetConfig {
    /// Declared columns, or one column per band named after it.
    pub fn columns(&self) -> Vec<Column> {
        if self.columns.is_empty() {
            self.bands.iter().map(|b| Column::for_band(b)).collect()
        } else {
            self.columns.clone()
        }
    }

    pub fn file_stem(&self, period: &PeriodConfig) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => format!("{}_{}_{}", self.name, period.start_year, period.end_year),
        }
    }

    pub fn plan(&self) -> Result<BandPlan> {
        BandPlan::new(self.transforms.clone(), self.bands.clone())
    }

    pub fn reduction(&self) -> Result<Reduction> {
        if !self.max_pixels.is_finite() || self.max_pixels < 1.0 {
            return Err(Error::Config(format!(
                "dataset {}: max_pixels must be at least 1, got {}",
                self.name, self.max_pixels
            )));
        }
        Reduction::new(self.scale, self.max_pixels as u64)
    }

    fn validate(&self) -> Result<()> {
        self.plan()?;
        self.reduction()?;

        for column in &self.columns {
            if !self.bands.contains(&column.band) {
                return Err(Error::Config(format!(
                    "dataset {}: column {} reads band {} which is not selected",
                    self.name, column.name, column.band
                )));
            }
        }

        Ok(())
    }
}

impl Config {
    /// Reads and validates `path`. Relative paths inside the file are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&text)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;

        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.region.boundaries.is_relative() {
            self.region.boundaries = base.join(&self.region.boundaries);
        }
        if let Some(dir) = &self.run.output_dir {
            if dir.is_relative() {
                self.run.output_dir = Some(base.join(dir));
            }
        }
        for dataset in &mut self.datasets {
            if !is_url(&dataset.source) && Path::new(&dataset.source).is_relative() {
                dataset.source = base.join(&dataset.source).to_string_lossy().into_owned();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.period.buckets()?;

        if self.datasets.is_empty() {
            return Err(Error::Config("no [[dataset]] entries".to_string()));
        }
        if self.run.concurrency == Some(0) {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }

        let mut names = HashSet::new();
        for dataset in &self.datasets {
            if !names.insert(dataset.name.as_str()) {
                return Err(Error::Config(format!("dataset {} is declared twice", dataset.name)));
            }
            dataset.validate()?;
        }

        Ok(())
    }

    pub fn concurrency(&self) -> usize {
        self.run.concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(DEFAULT_CONCURRENCY)
        })
    }

    /// The named datasets in declaration order, or all of them when `names` is empty.
    pub fn select_datasets(&self, names: &[String]) -> Result<Vec<&DatasetConfig>> {
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.datasets.iter().any(|d| &d.name == *n))
        {
            return Err(Error::Config(format!("no dataset named {}", unknown)));
        }

        Ok(self
            .datasets
            .iter()
            .filter(|d| names.is_empty() || names.contains(&d.name))
            .collect())
    }
}

// -- Tests -------------------------------------------------------------------
