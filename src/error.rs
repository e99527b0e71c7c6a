//! Error taxonomy for loading, compositing, reducing and exporting.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No feature in boundary dataset has {property} = {value:?}")]
    RegionNotFound { property: String, value: String },

    #[error("{count} features in boundary dataset match {property} = {value:?} (policy requires exactly one)")]
    AmbiguousRegion {
        property: String,
        value: String,
        count: usize,
    },

    #[error("Boundary feature has unsupported geometry: {0}")]
    InvalidGeometry(String),

    #[error("Source `{source_id}` unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("Scene `{scene}` is {found} but series grid is {expected}")]
    GridMismatch {
        scene: String,
        expected: String,
        found: String,
    },

    #[error("Region reduction visited more than {limit} pixels")]
    ResourceLimitExceeded { limit: u64 },

    #[error("Transform error: {0}")]
    TransformError(String),

    #[error("Invalid period: start year {start} is after end year {end}")]
    InvalidPeriod { start: i32, end: i32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Regression error: {0}")]
    Regression(String),

    #[error("{year}-{month:02}: {source}")]
    Bucket {
        year: i32,
        month: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    /// Wraps a per-bucket failure so the message names the month.
    pub fn in_bucket(self, year: i32, month: u32) -> Self {
        Error::Bucket {
            year,
            month,
            source: Box::new(self),
        }
    }

    pub fn is_resource_limit(&self) -> bool {
        match self {
            Error::ResourceLimitExceeded { .. } => true,
            Error::Bucket { source, .. } => source.is_resource_limit(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_name_bucket_in_message() {
        let e = Error::ResourceLimitExceeded { limit: 10 }.in_bucket(2020, 3);
        assert_eq!(
            e.to_string(),
            "2020-03: Region reduction visited more than 10 pixels"
        );
        assert!(e.is_resource_limit());
    }

    #[test]
    fn should_not_flag_other_errors_as_resource_limit() {
        let e = Error::TransformError("missing band B8".to_string()).in_bucket(2019, 12);
        assert!(!e.is_resource_limit());
    }
}
