use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use log::debug;
use rayon::prelude::*;

use crate::data::osm::{Coord, NodeId};
use crate::data::topology::{ResampledPoint, Segment};
use crate::errors::{Error, Result};

const COMPONENT: &str = "resample_points";

fn check_epsilon(epsilon: f64) -> Result<()> {
    if epsilon.is_finite() && epsilon > 0.0 {
        Ok(())
    } else {
        Err(Error::in_component(COMPONENT, format!("epsilon must be a positive finite number, got {epsilon}")))
    }
}

fn over_budget(segment: &Segment, max_points: usize) -> Error {
    Error::in_component(COMPONENT, format!("segment {} pushes the output past max_points ({max_points})", segment.id))
}

/// Spaces one segment, failing as soon as it would yield more than `limit` points.
fn space_segment(
    segment: &Segment,
    coordinates: &HashMap<NodeId, Coord>,
    epsilon: f64,
    limit: usize,
    max_points: usize,
) -> Result<Vec<Coord>> {
    let lookup = |node: &NodeId| {
        coordinates.get(node).copied().ok_or_else(|| {
            Error::in_component(COMPONENT, format!("segment {} references node {node} which has no coordinate", segment.id))
        })
    };

    let mut nodes = segment.nodes.iter();
    let Some(first) = nodes.next() else {
        return Ok(Vec::new());
    };
    if limit == 0 {
        return Err(over_budget(segment, max_points));
    }
    let mut prev = lookup(first)?;
    let mut points = vec![prev];

    for node in nodes {
        let coord = lookup(node)?;
        let d = prev.distance(&coord);

        // Short hops, zero-length hops and NaN coordinates pass through untouched.
        if matches!(d.partial_cmp(&epsilon), Some(Ordering::Less) | None) {
            if points.len() == limit {
                return Err(over_budget(segment, max_points));
            }
            points.push(coord);
            prev = coord;
            continue;
        }
        if d.is_infinite() {
            return Err(Error::in_component(
                COMPONENT,
                format!("segment {} has an infinitely long step towards node {node}", segment.id),
            ));
        }

        let steps = (d / epsilon).floor() as usize;
        if steps > limit.saturating_sub(points.len()) {
            return Err(over_budget(segment, max_points));
        }
        let direction = Coord::new((coord.x - prev.x) / d, (coord.y - prev.y) / d);
        points.extend((1..=steps).map(|k| prev.offset(&direction, epsilon * k as f64)));

        // the next step starts from the real node, not from the last synthetic point
        prev = coord;
    }
    Ok(points)
}

/// Resamples one segment so that consecutive points are `epsilon` apart along it.
///
/// The first node is always emitted. A node closer than `epsilon` to the previous
/// reference is emitted as is. A farther node is replaced by `floor(d / epsilon)`
/// points stepping towards it from the reference, which lands exactly on the node
/// when `d` is a multiple of `epsilon` and otherwise drops the shorter remainder.
/// Either way the node becomes the reference for the next step.
pub fn evenly_space_one_segment(
    segment: &Segment,
    coordinates: &HashMap<NodeId, Coord>,
    epsilon: f64,
) -> Result<Vec<Coord>> {
    check_epsilon(epsilon)?;
    space_segment(segment, coordinates, epsilon, usize::MAX, usize::MAX)
}

/// Resamples every segment and concatenates the points in segment order, each point
/// tagged with its segment id.
///
/// Segments are processed in parallel against a shared running total. With
/// `max_points` set, the first segment seen to push that total past the bound fails
/// the run, and segments not yet started are skipped.
pub fn evenly_space_segments(
    segments: &[Segment],
    coordinates: &HashMap<NodeId, Coord>,
    epsilon: f64,
    max_points: Option<usize>,
) -> Result<Vec<ResampledPoint>> {
    check_epsilon(epsilon)?;
    let budget = max_points.unwrap_or(usize::MAX);
    let produced = AtomicUsize::new(0);

    let spaced = segments.par_iter()
        .map(|segment| {
            let remaining = budget.saturating_sub(produced.load(AtomicOrdering::Relaxed));
            let coords = space_segment(segment, coordinates, epsilon, remaining, budget)?;
            let total = produced.fetch_add(coords.len(), AtomicOrdering::Relaxed).saturating_add(coords.len());
            if total > budget {
                return Err(over_budget(segment, budget));
            }
            Ok(coords)
        })
        .collect::<Result<Vec<_>>>()?;

    let total = produced.into_inner();
    let mut points = Vec::with_capacity(total);
    for (segment, coords) in segments.iter().zip(spaced) {
        points.extend(coords.into_iter().map(|coord| ResampledPoint::new(coord, segment.id)));
    }
    debug!(segments = segments.len(), points = points.len(); "Resampled segments");
    Ok(points)
}
