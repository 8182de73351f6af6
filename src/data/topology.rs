use std::collections::HashMap;

use super::osm::{Coord, NodeId, WayId};

pub type SegmentId = u64;

/// Node id to the ways referencing it, in scan order. A way visiting a node twice
/// is listed twice.
pub type InvertedWayIndex = HashMap<NodeId, Vec<WayId>>;

/// Node id to the segments containing it, in segment id order.
pub type InvertedSegmentIndex = HashMap<NodeId, Vec<SegmentId>>;

/// Maximal run of a way with no crossing strictly inside it.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    pub nodes: Vec<NodeId>,
}

/// Output of segmentation. `segments[i].id == i` for every segment.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct SegmentedNetwork {
    pub coordinates: HashMap<NodeId, Coord>,
    pub segments: Vec<Segment>,
    pub node_segments: InvertedSegmentIndex,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct ResampledPoint {
    pub x: f64,
    pub y: f64,
    pub segment_id: SegmentId,
}

impl ResampledPoint {
    pub fn new(coord: Coord, segment_id: SegmentId) -> Self {
        ResampledPoint {
            x: coord.x,
            y: coord.y,
            segment_id,
        }
    }

    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}
