//! Columnar export of a time series table as a Parquet file.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Date32Array, Float64Array, RecordBatch},
    datatypes::{DataType, Field, Schema},
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};

use super::{write_atomically, TimeSeriesTable};
use crate::error::Result;

const SECONDS_PER_DAY: i64 = 86_400;

fn to_record_batch(table: &TimeSeriesTable) -> Result<(Arc<Schema>, RecordBatch)> {
    let mut fields = vec![Field::new("date", DataType::Date32, false)];
    fields.extend(
        table
            .columns
            .iter()
            .map(|c| Field::new(c.name.as_str(), DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let dates: Date32Array = table
        .rows
        .iter()
        .map(|row| Some((row.bucket.start().timestamp() / SECONDS_PER_DAY) as i32))
        .collect();

    let mut arrays: Vec<ArrayRef> = vec![Arc::new(dates)];
    for i in 0..table.columns.len() {
        let values: Float64Array = table.rows.iter().map(|row| row.values[i]).collect();
        arrays.push(Arc::new(values));
    }

    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    Ok((schema, batch))
}

/// Writes the table as a single-row-group Parquet file, one `Date32` date
/// column followed by a nullable `Float64` column per output column.
pub fn write_parquet(table: &TimeSeriesTable, path: &Path) -> Result<PathBuf> {
    let (schema, batch) = to_record_batch(table)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    write_atomically(path, |file| {
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    })
}

// -- Tests -------------------------------------------------------------------
