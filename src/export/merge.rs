//! Outer join of exported series files on their `date` column.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use log::debug;

use super::write_atomically;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    pub columns: Vec<String>,
    /// Field values keyed by date, one per column, empty when a file has
    /// no row for that date.
    pub rows: BTreeMap<String, Vec<String>>,
}

struct SeriesFile {
    columns: Vec<String>,
    rows: Vec<(String, Vec<String>)>,
}

fn read_series_file(path: &Path) -> Result<SeriesFile> {
    let mut rdr = ::csv::ReaderBuilder::new().has_headers(true).from_path(path)?;

    let headers = rdr.headers()?.clone();
    if headers.get(0) != Some("date") {
        return Err(Error::Config(format!(
            "`{}` does not start with a date column",
            path.display()
        )));
    }
    let columns: Vec<String> = headers.iter().skip(1).map(String::from).collect();

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let date = record.get(0).unwrap_or_default().to_string();
        if !seen.insert(date.clone()) {
            return Err(Error::Config(format!(
                "`{}` has more than one row for {}",
                path.display(),
                date
            )));
        }
        rows.push((date, record.iter().skip(1).map(String::from).collect()));
    }

    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(SeriesFile { columns, rows })
}

/// Joins the files on `date`. Every non-date column name must be unique
/// across all inputs.
pub fn merge_csv_files(paths: &[PathBuf]) -> Result<MergedTable> {
    let files = paths
        .iter()
        .map(|p| read_series_file(p))
        .collect::<Result<Vec<_>>>()?;

    let mut columns: Vec<String> = Vec::new();
    for file in &files {
        for name in &file.columns {
            if columns.contains(name) {
                return Err(Error::Config(format!("column `{}` appears in more than one file", name)));
            }
            columns.push(name.clone());
        }
    }

    let mut rows: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut offset = 0;
    for file in files {
        let width = file.columns.len();
        for (date, values) in file.rows {
            let row = rows
                .entry(date)
                .or_insert_with(|| vec![String::new(); columns.len()]);
            for (i, value) in values.into_iter().take(width).enumerate() {
                row[offset + i] = value;
            }
        }
        offset += width;
    }

    Ok(MergedTable { columns, rows })
}

pub fn write_merged(table: &MergedTable, path: &Path) -> Result<PathBuf> {
    write_atomically(path, |file| {
        let mut wtr = ::csv::WriterBuilder::new()
            .terminator(::csv::Terminator::Any(b'\n'))
            .from_writer(file);

        wtr.write_record(std::iter::once("date").chain(table.columns.iter().map(String::as_str)))?;
        for (date, values) in &table.rows {
            wtr.write_record(std::iter::once(date.as_str()).chain(values.iter().map(String::as_str)))?;
        }
        wtr.flush()?;
        Ok(())
    })
}

// -- Tests -------------------------------------------------------------------
