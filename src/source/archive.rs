//! Downloads and extracts series archives.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use tar::Archive;

use crate::error::{Error, Result};

const MANIFEST: &str = "series.json";

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub fn is_archive(source: &str) -> bool {
    source.ends_with(".tar.gz") || source.ends_with(".tgz")
}

/// Downloads the archive at `url` to `file_path`, reporting bytes on `progress_bar`.
pub async fn download_archive(url: &str, file_path: &Path, progress_bar: &ProgressBar) -> Result<()> {
    let unavailable = |reason: String| Error::SourceUnavailable {
        source_id: url.to_string(),
        reason,
    };

    let response = reqwest::get(url)
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(unavailable(format!("server returned {}", response.status())));
    }

    let total_size = response.content_length().unwrap_or(0);
    if total_size > 0 {
        progress_bar.set_length(total_size);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {eta}",
        ) {
            progress_bar.set_style(style.progress_chars("=> "));
        }
    }

    let mut file = File::create(file_path)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| unavailable(format!("error reading chunk: {}", e)))?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        progress_bar.set_position(downloaded);
    }

    debug!("Downloaded {} bytes from {}", downloaded, url);

    Ok(())
}

/// Extracts the gzipped tarball at `tar_gz_path` into `working_dir`.
pub fn extract_archive(tar_gz_path: &Path, working_dir: &Path) -> Result<()> {
    let tar_gz = File::open(tar_gz_path).map_err(|e| Error::SourceUnavailable {
        source_id: tar_gz_path.to_string_lossy().to_string(),
        reason: e.to_string(),
    })?;
    let mut archive = Archive::new(GzDecoder::new(tar_gz));
    archive.unpack(working_dir)?;

    Ok(())
}

/// Returns the directory holding the series manifest: `dir` itself, or its
/// only subdirectory when the archive wraps the series in a folder.
pub fn series_root(dir: &Path) -> Result<PathBuf> {
    if dir.join(MANIFEST).is_file() {
        return Ok(dir.to_path_buf());
    }

    let mut directories: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            directories.push(path);
        }
    }

    match directories.as_slice() {
        [only] if only.join(MANIFEST).is_file() => Ok(only.clone()),
        _ => Err(Error::SourceUnavailable {
            source_id: dir.to_string_lossy().to_string(),
            reason: format!("no {} found", MANIFEST),
        }),
    }
}

// -- Tests -------------------------------------------------------------------
