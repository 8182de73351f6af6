use std::collections::{HashMap, HashSet};

use log::debug;

use crate::data::osm::{Coord, NodeId, Way};
use crate::data::topology::{InvertedSegmentIndex, InvertedWayIndex, Segment, SegmentId};

/// Maps every node to the ways referencing it. A node listed twice by the same way
/// gets that way twice, which makes loops show up as crossings.
pub fn invert_ways(ways: &[Way]) -> InvertedWayIndex {
    let mut inverted = InvertedWayIndex::new();
    for way in ways {
        for node in &way.nodes {
            inverted.entry(*node).or_default().push(way.id);
        }
    }
    inverted
}

/// Nodes referenced more than once across all ways.
pub fn get_crossings(inverted: &InvertedWayIndex) -> HashSet<NodeId> {
    inverted.iter()
        .filter(|(_, way_ids)| way_ids.len() > 1)
        .map(|(node, _)| *node)
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OrphanReport {
    /// Distinct node ids dropped from the inverted way index.
    pub orphan_nodes: usize,
    /// Node references dropped from ways, duplicates included.
    pub dropped_references: usize,
}

/// Drops every node reference without a coordinate, from the ways (keeping order and
/// repeats of the survivors) and from the inverted way index.
///
/// When the index and the coordinate store have the same number of nodes they are
/// assumed to agree and nothing is touched.
pub fn filter_out_orphan_nodes(
    ways: &mut [Way],
    inverted: &mut InvertedWayIndex,
    coordinates: &HashMap<NodeId, Coord>,
) -> OrphanReport {
    if inverted.len() == coordinates.len() {
        return OrphanReport::default();
    }

    let mut report = OrphanReport::default();
    for way in ways.iter_mut() {
        let before = way.nodes.len();
        way.nodes.retain(|node| coordinates.contains_key(node));
        report.dropped_references += before - way.nodes.len();
    }

    let before = inverted.len();
    inverted.retain(|node, _| coordinates.contains_key(node));
    report.orphan_nodes = before - inverted.len();

    debug!(orphan_nodes = report.orphan_nodes, dropped_references = report.dropped_references;
        "Filtered orphan nodes");
    report
}

/// Splits ways one at a time, handing out dense segment ids and keeping the
/// inverted segment index in step.
#[derive(Default)]
pub struct SegmentBuilder {
    segments: Vec<Segment>,
    node_segments: InvertedSegmentIndex,
}

impl SegmentBuilder {
    fn close(&mut self, nodes: Vec<NodeId>) {
        let id = self.segments.len() as SegmentId;
        for node in &nodes {
            let owners = self.node_segments.entry(*node).or_default();
            // a segment revisiting a node is listed once for it
            if owners.last() != Some(&id) {
                owners.push(id);
            }
        }
        self.segments.push(Segment { id, nodes });
    }

    /// Consecutive segments of a way share their boundary crossing. A way ending on a
    /// crossing leaves that crossing behind as a trailing one-node segment, and a way
    /// without crossings is kept whole.
    pub fn add_way(&mut self, way: &Way, crossings: &HashSet<NodeId>) {
        if !way.nodes.iter().any(|node| crossings.contains(node)) {
            self.close(way.nodes.clone());
            return;
        }

        let mut segment: Vec<NodeId> = Vec::new();
        for node in &way.nodes {
            segment.push(*node);
            if crossings.contains(node) && segment.len() > 1 {
                self.close(std::mem::replace(&mut segment, vec![*node]));
            }
        }
        self.close(segment);
    }

    pub fn finish(self) -> (Vec<Segment>, InvertedSegmentIndex) {
        debug!(segments = self.segments.len(); "Built segments");
        (self.segments, self.node_segments)
    }
}

/// Splits every way at its crossings. Ids run from 0 across all ways, in way order.
pub fn get_segments(ways: &[Way], crossings: &HashSet<NodeId>) -> (Vec<Segment>, InvertedSegmentIndex) {
    let mut builder = SegmentBuilder::default();
    for way in ways {
        builder.add_way(way, crossings);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    fn way(id: u64, nodes: &[NodeId]) -> Way {
        Way { id, nodes: nodes.to_vec() }
    }

    fn coords(ids: &[NodeId]) -> HashMap<NodeId, Coord> {
        ids.iter().map(|id| (*id, Coord::new(*id as f64, 0.0))).collect()
    }

    fn segment_nodes(segments: &[Segment]) -> Vec<Vec<NodeId>> {
        segments.iter().map(|s| s.nodes.clone()).collect()
    }

    /// Joins segments back into a path, counting each shared boundary node once.
    fn stitch(segments: &[Segment]) -> Vec<NodeId> {
        let mut path = segments[0].nodes.clone();
        for segment in &segments[1..] {
            assert_eq!(path.last(), segment.nodes.first(), "segments do not share a boundary");
            path.extend_from_slice(&segment.nodes[1..]);
        }
        path
    }

    fn random_ways(rng: &mut XorShiftRng) -> Vec<Way> {
        let num_nodes = rng.gen_range(1..60);
        (0..rng.gen_range(0..25))
            .map(|id| {
                let len = rng.gen_range(0..12);
                let nodes = (0..len).map(|_| rng.gen_range(0..num_nodes)).collect::<Vec<_>>();
                way(id, &nodes)
            })
            .collect()
    }

    #[test]
    fn inverted_index_keeps_scan_order_and_repeats() {
        let ways = vec![way(7, &[1, 2, 1]), way(3, &[2, 4])];
        let inverted = invert_ways(&ways);
        assert_eq!(inverted[&1], vec![7, 7]);
        assert_eq!(inverted[&2], vec![7, 3]);
        assert_eq!(inverted[&4], vec![3]);
    }

    #[test]
    fn crossings_are_shared_nodes_and_loops() {
        let ways = vec![way(1, &[1, 2, 3]), way(2, &[4, 2, 5]), way(3, &[6, 7, 6])];
        let crossings = get_crossings(&invert_ways(&ways));
        assert_eq!(crossings, HashSet::from([2, 6]));
    }

    #[test]
    fn reconciler_is_a_no_op_when_counts_match() {
        let mut ways = vec![way(1, &[1, 2, 3])];
        let mut inverted = invert_ways(&ways);
        let report = filter_out_orphan_nodes(&mut ways, &mut inverted, &coords(&[1, 2, 3]));
        assert_eq!(report, OrphanReport::default());
        assert_eq!(ways[0].nodes, vec![1, 2, 3]);
        assert_eq!(inverted.len(), 3);
    }

    #[test]
    fn reconciler_drops_orphans_and_keeps_order() {
        let mut ways = vec![way(1, &[9, 1, 2, 9, 1, 3]), way(2, &[8, 8]), way(3, &[3, 4])];
        let mut inverted = invert_ways(&ways);
        let report = filter_out_orphan_nodes(&mut ways, &mut inverted, &coords(&[1, 2, 3, 4]));

        assert_eq!(report, OrphanReport { orphan_nodes: 2, dropped_references: 4 });
        assert_eq!(ways[0].nodes, vec![1, 2, 1, 3]);
        assert!(ways[1].nodes.is_empty());
        assert_eq!(ways[2].nodes, vec![3, 4]);
        assert!(!inverted.contains_key(&8));
        assert!(!inverted.contains_key(&9));
        assert_eq!(inverted[&1], vec![1, 1]);
    }

    #[test]
    fn splits_at_interior_crossing() {
        let ways = vec![way(1, &[1, 2, 3]), way(2, &[4, 2])];
        let crossings = get_crossings(&invert_ways(&ways));
        let (segments, node_segments) = get_segments(&ways[..1], &crossings);

        assert_eq!(segment_nodes(&segments), vec![vec![1, 2], vec![2, 3]]);
        assert_eq!(segments.iter().map(|s| s.id).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(node_segments[&1], vec![0]);
        assert_eq!(node_segments[&2], vec![0, 1]);
        assert_eq!(node_segments[&3], vec![1]);
    }

    #[test]
    fn way_without_crossings_is_one_segment() {
        let ways = vec![way(1, &[1, 2, 3, 4])];
        let (segments, node_segments) = get_segments(&ways, &HashSet::new());
        assert_eq!(segment_nodes(&segments), vec![vec![1, 2, 3, 4]]);
        for node in 1..=4u64 {
            assert_eq!(node_segments[&node], vec![0]);
        }
    }

    #[test]
    fn leading_crossing_does_not_split_alone() {
        let crossings = HashSet::from([1, 4]);
        let ways = vec![way(1, &[1, 2, 3, 4, 5])];
        let (segments, _) = get_segments(&ways, &crossings);
        assert_eq!(segment_nodes(&segments), vec![vec![1, 2, 3, 4], vec![4, 5]]);
    }

    #[test]
    fn trailing_crossing_leaves_a_singleton_segment() {
        let crossings = HashSet::from([3]);
        let ways = vec![way(1, &[1, 2, 3])];
        let (segments, node_segments) = get_segments(&ways, &crossings);
        assert_eq!(segment_nodes(&segments), vec![vec![1, 2, 3], vec![3]]);
        assert_eq!(node_segments[&3], vec![0, 1]);
    }

    #[test]
    fn way_made_only_of_crossings() {
        let crossings = HashSet::from([1, 2, 3]);
        let ways = vec![way(1, &[1, 2, 3])];
        let (segments, _) = get_segments(&ways, &crossings);
        assert_eq!(segment_nodes(&segments), vec![vec![1, 2], vec![2, 3], vec![3]]);
    }

    #[test]
    fn ids_continue_across_ways() {
        let ways = vec![way(1, &[1, 2, 3]), way(2, &[4, 2, 5]), way(3, &[6, 7])];
        let crossings = get_crossings(&invert_ways(&ways));
        let (segments, _) = get_segments(&ways, &crossings);
        assert_eq!(
            segment_nodes(&segments),
            vec![vec![1, 2], vec![2, 3], vec![4, 2], vec![2, 5], vec![6, 7]]
        );
        assert_eq!(segments.iter().map(|s| s.id).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_inputs_give_empty_outputs() {
        let inverted = invert_ways(&[]);
        assert!(inverted.is_empty());
        assert!(get_crossings(&inverted).is_empty());
        let (segments, node_segments) = get_segments(&[], &HashSet::new());
        assert!(segments.is_empty());
        assert!(node_segments.is_empty());
    }

    #[test]
    fn emptied_way_becomes_an_empty_segment() {
        let (segments, node_segments) = get_segments(&[way(1, &[])], &HashSet::new());
        assert_eq!(segments, vec![Segment { id: 0, nodes: vec![] }]);
        assert!(node_segments.is_empty());
    }

    #[test]
    fn loop_node_is_indexed_once_per_segment() {
        let ways = vec![way(1, &[1, 2, 1])];
        let crossings = get_crossings(&invert_ways(&ways));
        assert_eq!(crossings, HashSet::from([1]));
        let (segments, node_segments) = get_segments(&ways, &crossings);
        assert_eq!(segment_nodes(&segments), vec![vec![1, 2, 1], vec![1]]);
        assert_eq!(node_segments[&1], vec![0, 1]);
    }

    #[test]
    fn builder_fed_way_by_way_matches_get_segments() {
        let ways = vec![way(1, &[1, 2, 3]), way(2, &[4, 2, 5, 6]), way(3, &[6, 7]), way(4, &[])];
        let crossings = get_crossings(&invert_ways(&ways));

        let mut builder = SegmentBuilder::default();
        for way in &ways {
            builder.add_way(way, &crossings);
        }
        assert_eq!(builder.finish(), get_segments(&ways, &crossings));
    }

    #[test]
    fn orphans_are_not_crossings_once_reconciled() {
        let mut ways = vec![way(1, &[1, 9, 2]), way(2, &[3, 9, 4])];
        let mut inverted = invert_ways(&ways);
        filter_out_orphan_nodes(&mut ways, &mut inverted, &coords(&[1, 2, 3, 4]));

        let crossings = get_crossings(&inverted);
        assert!(crossings.is_empty());
        let (segments, _) = get_segments(&ways, &crossings);
        assert_eq!(segment_nodes(&segments), vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn random_networks_hold_segment_properties() {
        let mut rng = XorShiftRng::from_seed([42; 16]);
        for _ in 0..200 {
            let ways = random_ways(&mut rng);
            let inverted = invert_ways(&ways);
            let crossings = get_crossings(&inverted);

            for (node, way_ids) in &inverted {
                assert_eq!(crossings.contains(node), way_ids.len() > 1);
            }

            let (segments, node_segments) = get_segments(&ways, &crossings);

            // ids are dense
            for (idx, segment) in segments.iter().enumerate() {
                assert_eq!(segment.id, idx as SegmentId);
            }

            // node in segment <=> segment in the node's index entry
            for segment in &segments {
                for node in &segment.nodes {
                    assert!(node_segments[node].contains(&segment.id));
                }
            }
            for (node, ids) in &node_segments {
                for id in ids {
                    assert!(segments[*id as usize].nodes.contains(node));
                }
            }

            // no crossing strictly inside a segment
            for segment in &segments {
                if segment.nodes.len() > 2 {
                    let inner = &segment.nodes[1..segment.nodes.len() - 1];
                    assert!(inner.iter().all(|node| !crossings.contains(node)));
                }
            }

            // every way is reproduced by its own segments
            let mut total = 0;
            for way in &ways {
                let (own, _) = get_segments(std::slice::from_ref(way), &crossings);
                total += own.len();
                if way.nodes.is_empty() {
                    continue;
                }
                assert_eq!(stitch(&own), way.nodes);
                if !way.nodes.iter().any(|node| crossings.contains(node)) {
                    assert_eq!(own.len(), 1);
                }
            }
            assert_eq!(total, segments.len());

            let (again, again_index) = get_segments(&ways, &crossings);
            assert_eq!(again, segments);
            assert_eq!(again_index, node_segments);
        }
    }
}
