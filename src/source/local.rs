//! Image series stored as a manifest plus one JSON file per scene.
//!
//! ```text
//! <root>/series.json          { "id": .., "grid": {..}, "bands": [..] }
//! <root>/scenes/<id>.json     one scene, optionally gzipped as <id>.json.gz
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use futures::future::join_all;
use geo::{coord, Intersects, Rect};
use log::{debug, info};
use ndarray::Array2;
use serde::{
    de::{DeserializeOwned, IgnoredAny},
    Deserialize,
};
use serde_json::{Map, Value};
use tempfile::TempDir;

use super::{
    archive::{download_archive, extract_archive, is_archive, is_url, series_root},
    SceneQuery, SceneSource, Scenes,
};
use crate::{
    cli::{create_progress_bar, create_spinner},
    error::{Error, Result},
    raster::{Band, Grid, Scene, SeriesInfo},
};

#[derive(Debug, Deserialize)]
struct SceneHeader {
    id: String,
    time: DateTime<Utc>,
    #[serde(default)]
    footprint: Option<[f64; 4]>,
    // skipped without building the pixel arrays
    #[serde(default, rename = "bands")]
    _bands: IgnoredAny,
}

#[derive(Debug, Deserialize)]
struct SceneFile {
    id: String,
    time: DateTime<Utc>,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    footprint: Option<[f64; 4]>,
    #[serde(default)]
    nodata: Option<f64>,
    bands: BTreeMap<String, Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Clone)]
struct SceneEntry {
    path: PathBuf,
    id: String,
    time: DateTime<Utc>,
    footprint: Rect<f64>,
}

pub struct LocalSeries {
    info: SeriesInfo,
    index: Vec<SceneEntry>,
    // keeps an extracted archive alive for the lifetime of the series
    _workdir: Option<TempDir>,
}

impl LocalSeries {
    /// Opens a series from a directory, a `.tar.gz` archive or an `http(s)` archive URL.
    pub async fn open(source: &str) -> Result<Self> {
        if is_url(source) {
            let workdir = TempDir::new()?;
            let file_name = source.rsplit('/').next().unwrap_or("series.tar.gz");
            let archive_path = workdir.path().join(file_name);

            let bar = create_spinner(format!("Downloading {}...", file_name));
            download_archive(source, &archive_path, &bar).await?;
            bar.finish_with_message(format!("{} downloaded", file_name));

            Self::open_archive(source, &archive_path, workdir).await
        } else if is_archive(source) {
            let workdir = TempDir::new()?;
            Self::open_archive(source, Path::new(source), workdir).await
        } else {
            let root = PathBuf::from(source);
            if !root.is_dir() {
                return Err(Error::SourceUnavailable {
                    source_id: source.to_string(),
                    reason: "not a directory".to_string(),
                });
            }
            Self::open_dir(&root, None).await
        }
    }

    async fn open_archive(source: &str, archive_path: &Path, workdir: TempDir) -> Result<Self> {
        let bar = create_spinner(format!("Unpacking {}...", source));
        extract_archive(archive_path, workdir.path())?;
        bar.finish_with_message(format!("{} unpacked", source));

        let root = series_root(workdir.path())?;
        Self::open_dir(&root, Some(workdir)).await
    }

    async fn open_dir(root: &Path, workdir: Option<TempDir>) -> Result<Self> {
        let info: SeriesInfo = read_json(&root.join("series.json"))?;
        info.grid.validate()?;

        let files = scene_files(&root.join("scenes"))?;
        let index = index_scenes(files, &info.grid).await?;
        info!(
            "Opened series {} with {} scenes on {}",
            info.id,
            index.len(),
            info.grid
        );

        Ok(LocalSeries {
            info,
            index,
            _workdir: workdir,
        })
    }

    pub fn scene_count(&self) -> usize {
        self.index.len()
    }
}

impl SceneSource for LocalSeries {
    fn describe(&self) -> &SeriesInfo {
        &self.info
    }

    fn query(&self, query: &SceneQuery) -> Result<Scenes<'_>> {
        let mut entries: Vec<&SceneEntry> = self
            .index
            .iter()
            .filter(|e| query.bucket.contains(&e.time) && e.footprint.intersects(&query.bounds))
            .collect();
        entries.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));

        debug!(
            "{} {}: {} candidate scenes",
            self.info.id,
            query.bucket.iso_month(),
            entries.len()
        );

        let grid = &self.info.grid;
        Ok(Box::new(
            entries
                .into_iter()
                .map(move |entry| load_scene(&entry.path, grid)),
        ))
    }
}

fn scene_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = dir.read_dir().map_err(|e| Error::SourceUnavailable {
        source_id: dir.to_string_lossy().to_string(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let name = path.to_string_lossy();
        if path.is_file() && (name.ends_with(".json") || name.ends_with(".json.gz")) {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Reads every scene header concurrently.
async fn index_scenes(files: Vec<PathBuf>, grid: &Grid) -> Result<Vec<SceneEntry>> {
    let pb = create_progress_bar(files.len() as u64, "Indexing scenes".to_string());

    let tasks: Vec<_> = files
        .into_iter()
        .map(|path| {
            let pb = pb.clone();
            let extent = grid.extent();
            tokio::task::spawn_blocking(move || {
                let header: SceneHeader = read_json(&path)?;
                pb.inc(1);
                Ok::<SceneEntry, Error>(SceneEntry {
                    footprint: header.footprint.map(footprint_rect).unwrap_or(extent),
                    id: header.id,
                    time: header.time,
                    path,
                })
            })
        })
        .collect();

    let mut index = Vec::with_capacity(tasks.len());
    for result in join_all(tasks).await {
        index.push(result??);
    }
    pb.finish_with_message("Scenes indexed");

    Ok(index)
}

fn footprint_rect(bounds: [f64; 4]) -> Rect<f64> {
    let [min_x, min_y, max_x, max_y] = bounds;
    Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::SourceUnavailable {
        source_id: path.to_string_lossy().to_string(),
        reason: e.to_string(),
    })?;

    let reader: Box<dyn Read> = if path.to_string_lossy().ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    serde_json::from_reader(BufReader::new(reader)).map_err(|e| Error::SourceUnavailable {
        source_id: path.to_string_lossy().to_string(),
        reason: e.to_string(),
    })
}

fn load_scene(path: &Path, grid: &Grid) -> Result<Scene> {
    let file: SceneFile = read_json(path)?;
    let (rows, cols) = grid.shape();

    let mut bands = BTreeMap::new();
    for (name, values) in file.bands {
        if values.len() != rows || values.iter().any(|row| row.len() != cols) {
            return Err(Error::GridMismatch {
                scene: file.id.clone(),
                expected: format!("{}x{}", cols, rows),
                found: format!(
                    "{}x{} in band {}",
                    values.first().map(Vec::len).unwrap_or(0),
                    values.len(),
                    name
                ),
            });
        }

        let flat: Vec<f64> = values
            .into_iter()
            .flatten()
            .map(|v| match v {
                Some(v) if Some(v) != file.nodata => v,
                _ => f64::NAN,
            })
            .collect();
        let band: Band = Array2::from_shape_vec((rows, cols), flat)?;
        bands.insert(name, band);
    }

    Ok(Scene {
        id: file.id,
        time: file.time,
        properties: file.properties,
        footprint: file.footprint.map(footprint_rect).unwrap_or(grid.extent()),
        bands,
    })
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use std::{fs, io::Write};

    use flate2::{write::GzEncoder, Compression};
    use serde_json::json;

    use super::*;
    use crate::bucket::MonthBucket;

    /// Writes a 2x2 series with the given `(id, time, value)` scenes of band `mean`.
    pub fn write_series(root: &Path, scenes: &[(&str, &str, f64)]) {
        fs::create_dir_all(root.join("scenes")).unwrap();
        fs::write(
            root.join("series.json"),
            json!({
                "id": "synthetic",
                "grid": {
                    "crs": "EPSG:32635",
                    "origin_x": 0.0, "origin_y": 2.0,
                    "pixel_width": 1.0, "pixel_height": 1.0,
                    "width": 2, "height": 2
                },
                "bands": ["mean"]
            })
            .to_string(),
        )
        .unwrap();

        for (id, time, value) in scenes {
            let scene = json!({
                "id": id,
                "time": time,
                "properties": { "CLOUDY_PIXEL_PERCENTAGE": 5 },
                "nodata": -9999.0,
                "bands": { "mean": [[value, value], [value, -9999.0]] }
            });
            fs::write(root.join("scenes").join(format!("{}.json", id)), scene.to_string()).unwrap();
        }
    }

    fn whole_grid() -> Rect<f64> {
        footprint_rect([0.0, 0.0, 2.0, 2.0])
    }

    #[tokio::test]
    async fn should_index_and_query_by_month() {
        let dir = TempDir::new().unwrap();
        write_series(
            dir.path(),
            &[
                ("b", "2020-01-20T10:00:00Z", 3.0),
                ("a", "2020-01-05T10:00:00Z", 1.0),
                ("c", "2020-02-01T00:00:00Z", 5.0),
            ],
        );

        let series = LocalSeries::open(&dir.path().to_string_lossy()).await.unwrap();
        assert_eq!(series.scene_count(), 3);
        assert_eq!(series.describe().id, "synthetic");

        let january = series
            .query(&SceneQuery {
                bucket: MonthBucket::new(2020, 1).unwrap(),
                bounds: whole_grid(),
            })
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        let ids: Vec<_> = january.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(january[0].bands["mean"][[0, 0]], 1.0);
        assert!(january[0].bands["mean"][[1, 1]].is_nan());
        assert_eq!(
            january[0].properties["CLOUDY_PIXEL_PERCENTAGE"],
            json!(5)
        );
    }

    #[tokio::test]
    async fn should_skip_scenes_outside_bounds() {
        let dir = TempDir::new().unwrap();
        write_series(dir.path(), &[("a", "2020-01-05T10:00:00Z", 1.0)]);

        let series = LocalSeries::open(&dir.path().to_string_lossy()).await.unwrap();
        let scenes = series
            .query(&SceneQuery {
                bucket: MonthBucket::new(2020, 1).unwrap(),
                bounds: footprint_rect([10.0, 10.0, 11.0, 11.0]),
            })
            .unwrap();

        assert_eq!(scenes.count(), 0);
    }

    #[tokio::test]
    async fn should_read_gzipped_scene() {
        let dir = TempDir::new().unwrap();
        write_series(dir.path(), &[]);
        let scene = json!({
            "id": "gz",
            "time": "2020-03-02T00:00:00Z",
            "bands": { "mean": [[1.0, 2.0], [3.0, null]] }
        });
        let file = File::create(dir.path().join("scenes").join("gz.json.gz")).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(scene.to_string().as_bytes()).unwrap();
        encoder.finish().unwrap();

        let series = LocalSeries::open(&dir.path().to_string_lossy()).await.unwrap();
        let scenes = series
            .query(&SceneQuery {
                bucket: MonthBucket::new(2020, 3).unwrap(),
                bounds: whole_grid(),
            })
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].bands["mean"][[1, 0]], 3.0);
        assert!(scenes[0].bands["mean"][[1, 1]].is_nan());
    }

    #[tokio::test]
    async fn should_reject_band_with_wrong_shape() {
        let dir = TempDir::new().unwrap();
        write_series(dir.path(), &[]);
        let scene = json!({
            "id": "bad",
            "time": "2020-01-02T00:00:00Z",
            "bands": { "mean": [[1.0, 2.0, 3.0]] }
        });
        fs::write(dir.path().join("scenes").join("bad.json"), scene.to_string()).unwrap();

        let series = LocalSeries::open(&dir.path().to_string_lossy()).await.unwrap();
        let result: Result<Vec<_>> = series
            .query(&SceneQuery {
                bucket: MonthBucket::new(2020, 1).unwrap(),
                bounds: whole_grid(),
            })
            .unwrap()
            .collect();

        assert!(matches!(result, Err(Error::GridMismatch { .. })));
    }

    #[tokio::test]
    async fn should_index_without_reading_band_payload() {
        let dir = TempDir::new().unwrap();
        write_series(dir.path(), &[("a", "2020-01-05T10:00:00Z", 1.0)]);
        let scene = json!({
            "id": "b",
            "time": "2020-01-20T10:00:00Z",
            "bands": { "mean": "truncated" }
        });
        fs::write(dir.path().join("scenes").join("b.json"), scene.to_string()).unwrap();

        let series = LocalSeries::open(&dir.path().to_string_lossy()).await.unwrap();
        assert_eq!(series.scene_count(), 2);

        let mut scenes = series
            .query(&SceneQuery {
                bucket: MonthBucket::new(2020, 1).unwrap(),
                bounds: whole_grid(),
            })
            .unwrap();

        // rasters are loaded in order, one per step
        assert_eq!(scenes.next().unwrap().unwrap().id, "a");
        assert!(matches!(
            scenes.next(),
            Some(Err(Error::SourceUnavailable { .. }))
        ));
        assert!(scenes.next().is_none());
    }

    #[tokio::test]
    async fn should_report_missing_directory_as_unavailable() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let result = LocalSeries::open(&missing.to_string_lossy()).await;

        assert!(matches!(result, Err(Error::SourceUnavailable { .. })));
    }

    #[tokio::test]
    async fn should_open_series_archive() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("chirps");
        write_series(&staging, &[("a", "2020-01-05T10:00:00Z", 1.0)]);

        let tarball = dir.path().join("chirps.tar.gz");
        let encoder = GzEncoder::new(File::create(&tarball).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all("chirps", &staging).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let series = LocalSeries::open(&tarball.to_string_lossy()).await.unwrap();
        assert_eq!(series.scene_count(), 1);
    }
}
