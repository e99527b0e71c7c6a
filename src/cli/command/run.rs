use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;

use super::{default_output_dir, resolve_region};
use crate::{
    config::Config,
    pipeline::{run_dataset, OutputOptions},
};

/// Runs the selected datasets one after the other. `on_saved` sees each
/// file as soon as its dataset finishes, so the files of earlier datasets
/// are reported even when a later one fails.
pub async fn run(
    config_path: &Path,
    datasets: &[String],
    output_dir: Option<PathBuf>,
    parquet: bool,
    mut on_saved: impl FnMut(&Path),
) -> Result<usize> {
    let config = Config::load(config_path)
        .with_context(|| format!("Loading configuration {}", config_path.display()))?;
    let selected = config.select_datasets(datasets)?;

    let region = resolve_region(&config)?;
    info!("Region {} resolved", region.name);

    let dir = match output_dir.or_else(|| config.run.output_dir.clone()) {
        Some(dir) => dir,
        None => default_output_dir()?,
    };
    fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;
    let output = OutputOptions {
        dir,
        parquet: parquet || config.run.parquet,
    };

    let mut written = 0;
    for dataset in selected {
        let files = run_dataset(
            dataset,
            region.clone(),
            &config.period,
            config.run.on_resource_limit,
            config.concurrency(),
            &output,
        )
        .await
        .with_context(|| format!("Dataset {}", dataset.name))?;

        for file in &files {
            on_saved(file);
        }
        written += files.len();
    }

    Ok(written)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::source::local::test::write_series;

    fn write_config(root: &Path) -> PathBuf {
        fs::write(
            root.join("square.geojson"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"name":"square"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}}
            ]}"#,
        )
        .unwrap();
        write_series(&root.join("good"), &[("a", "2020-01-05T10:00:00Z", 20.0)]);

        let path = root.join("run.toml");
        fs::write(
            &path,
            r#"
[region]
boundaries = "square.geojson"
property = "name"
equals = "square"
crs = "EPSG:32635"

[period]
start_year = 2020
end_year = 2020

[run]
concurrency = 2
output_dir = "out"

[[dataset]]
name = "good"
source = "good"
bands = ["mean"]
scale = 1.0

[[dataset]]
name = "gone"
source = "gone"
bands = ["mean"]
scale = 1.0
"#,
        )
        .unwrap();

        path
    }

    #[tokio::test]
    async fn should_report_saved_files_before_later_failure() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        let mut saved = Vec::new();
        let result = run(&config, &[], None, false, |file| saved.push(file.to_path_buf())).await;

        let e = result.unwrap_err();
        assert!(format!("{:#}", e).starts_with("Dataset gone"));
        assert_eq!(saved, vec![dir.path().join("out").join("good_2020_2020.csv")]);
        assert!(saved[0].exists());
    }

    #[tokio::test]
    async fn should_count_written_files() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        let mut saved = Vec::new();
        let count = run(&config, &["good".to_string()], None, true, |file| {
            saved.push(file.to_path_buf())
        })
        .await
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            saved,
            vec![
                dir.path().join("out").join("good_2020_2020.csv"),
                dir.path().join("out").join("good_2020_2020.parquet"),
            ]
        );
    }
}
