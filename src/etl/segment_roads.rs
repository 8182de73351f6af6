use std::path::Path;

use log::info;

use crate::data::RoadNetwork;
use crate::data::topology::SegmentedNetwork;
use crate::errors::Result;
use crate::etl::{parse_osm, read_cache, write_cache, Etl};
use crate::topology::{filter_out_orphan_nodes, get_crossings, invert_ways, SegmentBuilder};

pub const ETL_NAME: &str = "segment_roads";
pub const OUTPUT_FILE_NAME: &str = "segments.rkyv";

/// Splits the parsed ways into branch-free segments.
#[derive(Default)]
pub struct SegmentRoadsEtl;

impl Etl for SegmentRoadsEtl {
    type Input = RoadNetwork;
    type Output = SegmentedNetwork;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_file_name(&self) -> &str {
        OUTPUT_FILE_NAME
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        read_cache(&dir.join(parse_osm::OUTPUT_FILE_NAME))
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let RoadNetwork { coordinates, mut ways } = input;

        let mut inverted = invert_ways(&ways);
        let report = filter_out_orphan_nodes(&mut ways, &mut inverted, &coordinates);
        if report.orphan_nodes > 0 {
            info!(orphan_nodes = report.orphan_nodes, dropped_references = report.dropped_references;
                "Filtered orphan nodes");
        }

        let crossings = get_crossings(&inverted);
        info!(nodes = inverted.len(), crossings = crossings.len(); "Found crossings");

        let mut builder = SegmentBuilder::default();
        for way in tqdm::tqdm(ways.iter()) {
            builder.add_way(way, &crossings);
        }
        let (segments, node_segments) = builder.finish();
        info!(ways = ways.len(), segments = segments.len(); "Found segments");

        Ok(SegmentedNetwork {
            coordinates,
            segments,
            node_segments,
        })
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        write_cache(&self.output_path(dir), &output)
    }
}
