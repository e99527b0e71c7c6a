use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use super::resolve_region;
use crate::{
    composite::Compositor,
    config::Config,
    source::{LocalSeries, SceneSource},
};

/// Validates the configuration, resolves the region and opens every source.
/// Returns a summary line per checked item.
pub async fn check(config_path: &Path) -> Result<Vec<String>> {
    let config = Config::load(config_path)
        .with_context(|| format!("Loading configuration {}", config_path.display()))?;

    let region = resolve_region(&config)?;
    let bbox = region.bounding_rect();
    let mut report = vec![
        format!(
            "region {}: {} polygons within ({}, {})..({}, {})",
            region.name,
            region.geometry.0.len(),
            bbox.min().x,
            bbox.min().y,
            bbox.max().x,
            bbox.max().y
        ),
        format!(
            "period {}..{}: {} months",
            config.period.start_year,
            config.period.end_year,
            config.period.buckets()?.len()
        ),
    ];

    for dataset in &config.datasets {
        let series = LocalSeries::open(&dataset.source)
            .await
            .with_context(|| format!("Dataset {}", dataset.name))?;
        let line = format!(
            "dataset {}: {} scenes on {}, bands [{}]",
            dataset.name,
            series.scene_count(),
            series.describe().grid,
            series.describe().bands.join(", ")
        );

        Compositor::new(Arc::new(series), region.clone(), dataset.plan()?, dataset.filters.clone())
            .with_context(|| format!("Dataset {}", dataset.name))?;
        report.push(line);
    }

    Ok(report)
}
