pub type NodeId = u64;
pub type WayId = u64;

/// Planar position of a node. Longitude maps to `x`, latitude to `y`; distances
/// are plain euclidean in degrees.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Coord { x, y }
    }

    pub fn distance(&self, other: &Coord) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Point `distance` away from `self` along the unit vector `direction`.
    pub fn offset(&self, direction: &Coord, distance: f64) -> Coord {
        Coord {
            x: self.x + direction.x * distance,
            y: self.y + direction.y * distance,
        }
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct Way {
    pub id: WayId,
    pub nodes: Vec<NodeId>,
}
