//! Per-dataset orchestration: bucket, composite, reduce, export.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{stream, StreamExt};
use log::{info, warn};

use crate::{
    bucket::MonthBucket,
    cli::create_progress_bar,
    composite::Compositor,
    config::{DatasetConfig, PeriodConfig, ResourceLimitPolicy},
    error::Result,
    export::{write_csv, write_parquet, Column, TimeSeriesTable},
    reduce::{reduce_region, undefined_statistic, Reduction, RegionStatistic},
    region::Region,
    source::{LocalSeries, SceneSource},
};

/// Everything needed to turn one series into a monthly table.
pub struct SeriesJob {
    pub compositor: Arc<Compositor>,
    pub reduction: Reduction,
    pub columns: Vec<Column>,
    pub policy: ResourceLimitPolicy,
    pub concurrency: usize,
}

fn process_bucket(
    compositor: &Compositor,
    reduction: &Reduction,
    policy: ResourceLimitPolicy,
    bucket: MonthBucket,
) -> Result<RegionStatistic> {
    let composite = compositor.composite(bucket)?;

    match reduce_region(&composite, compositor.region(), reduction) {
        Err(e) if e.is_resource_limit() && policy == ResourceLimitPolicy::MarkUndefined => {
            warn!("{}: {}, marking undefined", bucket.iso_month(), e);
            let bands: Vec<String> = composite.bands.keys().cloned().collect();
            Ok(undefined_statistic(&bands))
        }
        result => result,
    }
}

impl SeriesJob {
    /// Computes every bucket, at most `concurrency` at a time. The first
    /// failing bucket aborts the job.
    pub async fn run(&self, buckets: impl IntoIterator<Item = MonthBucket>) -> Result<TimeSeriesTable> {
        let buckets: Vec<MonthBucket> = buckets.into_iter().collect();
        let pb = create_progress_bar(
            buckets.len() as u64,
            format!("Reducing {}", self.compositor.source_id()),
        );

        let mut tasks = stream::iter(buckets)
            .map(|bucket| {
                let compositor = self.compositor.clone();
                let reduction = self.reduction;
                let policy = self.policy;

                tokio::task::spawn_blocking(move || {
                    process_bucket(&compositor, &reduction, policy, bucket)
                        .map(|stats| (bucket, stats))
                        .map_err(|e| e.in_bucket(bucket.year, bucket.month))
                })
            })
            .buffer_unordered(self.concurrency.max(1));

        let mut results = Vec::new();
        while let Some(joined) = tasks.next().await {
            results.push(joined??);
            pb.inc(1);
        }
        pb.finish_with_message(format!("Reduced {}", self.compositor.source_id()));

        Ok(TimeSeriesTable::from_statistics(self.columns.clone(), results))
    }
}

/// Output options shared by every dataset of a run.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub dir: PathBuf,
    pub parquet: bool,
}

fn output_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", stem, extension))
}

/// Opens the dataset's series, computes its table over `period` and writes
/// it. Returns the written files.
pub async fn run_dataset(
    dataset: &DatasetConfig,
    region: Arc<Region>,
    period: &PeriodConfig,
    policy: ResourceLimitPolicy,
    concurrency: usize,
    output: &OutputOptions,
) -> Result<Vec<PathBuf>> {
    info!("Starting dataset {}", dataset.name);

    let series: Arc<dyn SceneSource> = Arc::new(LocalSeries::open(&dataset.source).await?);
    let compositor = Compositor::new(series, region, dataset.plan()?, dataset.filters.clone())?;

    let job = SeriesJob {
        compositor: Arc::new(compositor),
        reduction: dataset.reduction()?,
        columns: dataset.columns(),
        policy,
        concurrency,
    };
    let table = job.run(period.buckets()?).await?;

    let stem = dataset.file_stem(period);
    let mut written = vec![write_csv(&table, &output_path(&output.dir, &stem, "csv"))?];
    if output.parquet {
        written.push(write_parquet(&table, &output_path(&output.dir, &stem, "parquet"))?);
    }

    info!(
        "Finished dataset {}: {} months written",
        dataset.name,
        table.rows.len()
    );
    Ok(written)
}

// -- Tests -------------------------------------------------------------------
