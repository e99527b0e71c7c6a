//! In-memory series for tests.

use geo::Intersects;

use super::{SceneQuery, SceneSource, Scenes};
use crate::{
    error::Result,
    raster::{Scene, SeriesInfo},
};

pub struct MemorySeries {
    pub info: SeriesInfo,
    pub scenes: Vec<Scene>,
}

impl SceneSource for MemorySeries {
    fn describe(&self) -> &SeriesInfo {
        &self.info
    }

    fn query(&self, query: &SceneQuery) -> Result<Scenes<'_>> {
        let mut scenes: Vec<Scene> = self
            .scenes
            .iter()
            .filter(|s| query.bucket.contains(&s.time) && s.footprint.intersects(&query.bounds))
            .cloned()
            .collect();
        scenes.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));

        Ok(Box::new(scenes.into_iter().map(Ok)))
    }
}
