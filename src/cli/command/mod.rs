pub mod buckets;
pub mod check;
pub mod merge;
pub mod regress;
pub mod run;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};

use crate::{
    config::Config,
    region::{load_region, GeoJsonBoundaries, Region},
};

pub use buckets::buckets;
pub use check::check;
pub use merge::merge;
pub use regress::regress;
pub use run::run;

/// Where output files go when neither the command line nor the
/// configuration names a directory.
pub fn default_output_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine the home directory"))
}

pub fn resolve_region(config: &Config) -> Result<Arc<Region>> {
    let boundaries = GeoJsonBoundaries::new(&config.region.boundaries);
    let region = load_region(&boundaries, &config.region.selector, &config.region.crs)
        .with_context(|| format!("Resolving region from {}", config.region.boundaries.display()))?;

    Ok(Arc::new(region))
}
