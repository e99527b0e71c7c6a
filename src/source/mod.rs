//! Image series backends.
//!
//! The compositor only talks to a [`SceneSource`]. [`LocalSeries`] serves a
//! series stored on disk, either as a directory, a `.tar.gz` archive, or an
//! archive behind an `http(s)` URL.

pub mod archive;
pub mod local;
#[cfg(test)]
pub mod memory;

use geo::Rect;

use crate::{
    bucket::MonthBucket,
    error::Result,
    raster::{Scene, SeriesInfo},
};

pub use local::LocalSeries;

/// Scenes yielded one at a time, each loaded only when it is reached.
pub type Scenes<'a> = Box<dyn Iterator<Item = Result<Scene>> + 'a>;

/// Scenes captured within `bucket` whose footprint intersects `bounds`.
#[derive(Debug, Clone)]
pub struct SceneQuery {
    pub bucket: MonthBucket,
    pub bounds: Rect<f64>,
}

pub trait SceneSource: Send + Sync {
    fn describe(&self) -> &SeriesInfo;

    /// Matching scenes, ordered by capture time then id.
    fn query(&self, query: &SceneQuery) -> Result<Scenes<'_>>;
}
