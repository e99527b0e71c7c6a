use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::export::{merge_csv_files, write_merged};

pub fn merge(output: &Path, inputs: &[PathBuf]) -> Result<PathBuf> {
    let merged = merge_csv_files(inputs).context("Merging series")?;
    info!(
        "Merged {} files into {} columns over {} months",
        inputs.len(),
        merged.columns.len(),
        merged.rows.len()
    );

    Ok(write_merged(&merged, output)?)
}
