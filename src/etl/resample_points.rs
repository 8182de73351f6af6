use std::path::Path;

use log::info;

use crate::config::UserConfig;
use crate::data::topology::{ResampledPoint, SegmentedNetwork};
use crate::errors::Result;
use crate::etl::{read_cache, segment_roads, write_cache, Etl};
use crate::resampling::evenly_space_segments;

pub const ETL_NAME: &str = "resample_points";
pub const OUTPUT_FILE_NAME: &str = "points.rkyv";

pub struct ResamplePointsEtl<'a> {
    config: &'a UserConfig,
}

impl ResamplePointsEtl<'_> {
    pub fn new(config: &UserConfig) -> ResamplePointsEtl<'_> {
        ResamplePointsEtl {
            config
        }
    }
}

impl Etl for ResamplePointsEtl<'_> {
    type Input = SegmentedNetwork;
    type Output = Vec<ResampledPoint>;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_file_name(&self) -> &str {
        OUTPUT_FILE_NAME
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        read_cache(&dir.join(segment_roads::OUTPUT_FILE_NAME))
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let points = evenly_space_segments(
            &input.segments,
            &input.coordinates,
            self.config.epsilon,
            self.config.max_points,
        )?;
        info!(points = points.len(), segments = input.segments.len(), epsilon = self.config.epsilon;
            "New support points");
        Ok(points)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        write_cache(&self.output_path(dir), &output)
    }
}
