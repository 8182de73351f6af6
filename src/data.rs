use std::collections::HashMap;

use self::osm::{Coord, NodeId, Way};

pub mod osm;
pub mod topology;

/// Road network as read from the .osm file. Only ways of an accepted highway class are
/// kept, in document order, together with the coordinates of the nodes they reference.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct RoadNetwork {
    pub coordinates: HashMap<NodeId, Coord>,
    pub ways: Vec<Way>,
}
