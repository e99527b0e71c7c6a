//! Delimited text export: `date,<column...>` with empty fields for undefined values.

use std::{io::Write, path::Path, path::PathBuf};

use super::{write_atomically, TimeSeriesTable};
use crate::error::Result;

fn write_table<W: Write>(table: &TimeSeriesTable, writer: W) -> Result<()> {
    let mut wtr = ::csv::WriterBuilder::new()
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    wtr.write_record(table.header())?;
    for row in &table.rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.bucket.iso_month());
        record.extend(row.values.iter().map(|v| match v {
            Some(v) => v.to_string(),
            None => String::new(),
        }));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;

    Ok(())
}

/// Writes the table as one complete CSV file at `path`.
pub fn write_csv(table: &TimeSeriesTable, path: &Path) -> Result<PathBuf> {
    write_atomically(path, |file| write_table(table, file))
}

pub fn to_csv_string(table: &TimeSeriesTable) -> Result<String> {
    let mut buffer = Vec::new();
    write_table(table, &mut buffer)?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, fs};

    use tempfile::TempDir;

    use super::*;
    use crate::{bucket::MonthBucket, export::Column};

    fn table() -> TimeSeriesTable {
        let columns = vec![
            Column {
                band: "SoilMoi0_10cm_inst".to_string(),
                name: "mean_soil_moisture".to_string(),
            },
            Column {
                band: "Qair_f_inst".to_string(),
                name: "mean_specific_humidity".to_string(),
            },
        ];
        let january: BTreeMap<_, _> = [
            ("SoilMoi0_10cm_inst".to_string(), Some(24.5)),
            ("Qair_f_inst".to_string(), Some(0.0041)),
        ]
        .into_iter()
        .collect();
        let february: BTreeMap<_, _> = [
            ("SoilMoi0_10cm_inst".to_string(), None),
            ("Qair_f_inst".to_string(), Some(0.0)),
        ]
        .into_iter()
        .collect();

        TimeSeriesTable::from_statistics(
            columns,
            vec![
                (MonthBucket::new(2020, 2).unwrap(), february),
                (MonthBucket::new(2020, 1).unwrap(), january),
            ],
        )
    }

    #[test]
    fn should_format_rows() {
        let text = to_csv_string(&table()).unwrap();

        assert_eq!(
            text,
            "date,mean_soil_moisture,mean_specific_humidity\n\
             2020-01,24.5,0.0041\n\
             2020-02,,0\n"
        );
    }

    #[test]
    fn should_write_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gldas.csv");

        let written = write_csv(&table(), &path).unwrap();

        assert_eq!(written, path);
        assert_eq!(fs::read_to_string(&path).unwrap(), to_csv_string(&table()).unwrap());
    }

    #[test]
    fn should_write_header_for_empty_table() {
        let empty = TimeSeriesTable::from_statistics(vec![Column::for_band("VV")], vec![]);
        assert_eq!(to_csv_string(&empty).unwrap(), "date,VV\n");
    }
}
