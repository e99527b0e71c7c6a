//! Time series tables and their serialisation.

pub mod csv_file;
pub mod merge;
pub mod parquet_file;

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::{bucket::MonthBucket, error::Result, reduce::RegionStatistic};

pub use csv_file::{to_csv_string, write_csv};
pub use merge::{merge_csv_files, write_merged, MergedTable};
pub use parquet_file::write_parquet;

/// An output column: the band it reads from and its header name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Column {
    pub band: String,
    pub name: String,
}

impl Column {
    pub fn for_band(band: &str) -> Self {
        Column {
            band: band.to_string(),
            name: band.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRow {
    pub bucket: MonthBucket,
    /// One value per column, `None` when undefined.
    pub values: Vec<Option<f64>>,
}

/// Rows ordered by ascending bucket, one per bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    pub columns: Vec<Column>,
    pub rows: Vec<TimeSeriesRow>,
}

impl TimeSeriesTable {
    pub fn from_statistics(
        columns: Vec<Column>,
        statistics: impl IntoIterator<Item = (MonthBucket, RegionStatistic)>,
    ) -> Self {
        let mut rows: Vec<TimeSeriesRow> = statistics
            .into_iter()
            .map(|(bucket, stats)| TimeSeriesRow {
                bucket,
                values: columns
                    .iter()
                    .map(|c| stats.get(&c.band).copied().flatten())
                    .collect(),
            })
            .collect();
        rows.sort_by_key(|row| row.bucket);

        TimeSeriesTable { columns, rows }
    }

    pub fn header(&self) -> Vec<String> {
        std::iter::once("date".to_string())
            .chain(self.columns.iter().map(|c| c.name.clone()))
            .collect()
    }
}

/// Writes through a temporary file in the destination directory and moves
/// it into place only once `write` succeeds.
pub(crate) fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut File) -> Result<()>,
) -> Result<PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = NamedTempFile::new_in(&dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(path.to_path_buf())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, fs, io::Write};

    use tempfile::TempDir;

    use super::*;
    use crate::error::Error;

    fn stat(value: Option<f64>) -> RegionStatistic {
        let mut stats = BTreeMap::new();
        stats.insert("precipitation".to_string(), value);
        stats
    }

    #[test]
    fn should_sort_rows_by_bucket() {
        let columns = vec![Column::for_band("precipitation")];
        let table = TimeSeriesTable::from_statistics(
            columns,
            vec![
                (MonthBucket::new(2020, 3).unwrap(), stat(Some(3.0))),
                (MonthBucket::new(2019, 12).unwrap(), stat(Some(1.0))),
                (MonthBucket::new(2020, 1).unwrap(), stat(None)),
            ],
        );

        let months: Vec<_> = table.rows.iter().map(|r| r.bucket.iso_month()).collect();
        assert_eq!(months, vec!["2019-12", "2020-01", "2020-03"]);
        assert_eq!(table.rows[1].values, vec![None]);
    }

    #[test]
    fn should_use_declared_column_names() {
        let columns = vec![Column {
            band: "precipitation".to_string(),
            name: "mean_precip_mm".to_string(),
        }];
        let table = TimeSeriesTable::from_statistics(columns, vec![]);

        assert_eq!(table.header(), vec!["date", "mean_precip_mm"]);
    }

    #[test]
    fn should_leave_no_file_when_write_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let result = write_atomically(&path, |file| {
            file.write_all(b"date,mean\n")?;
            Err(Error::Config("boom".to_string()))
        });

        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn should_replace_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale").unwrap();

        write_atomically(&path, |file| Ok(file.write_all(b"fresh")?)).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh");
    }
}
