//! Closed profile extraction
//!
//! Walks the non-construction curves of a sketch into closed polygon loops
//! that the extrude and revolve operations hand to the kernel.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use glam::DVec2;
use uuid::Uuid;

use super::{ConstraintKind, Sketch, SketchError, SketchPrimitive};
use crate::config::RebuildConfig;

/// Points closer than this are the same profile node
const MERGE_TOLERANCE: f64 = 1e-7;

/// A closed polygon in sketch coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileLoop {
    /// Counter-clockwise, without a repeated closing point
    pub points: Vec<DVec2>,
    /// Nested an odd number of times inside other loops
    pub hole: bool,
}

impl ProfileLoop {
    /// Signed area (positive for counter-clockwise)
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.points)
    }

    /// Even-odd containment test
    pub fn contains(&self, p: DVec2) -> bool {
        let n = self.points.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            if (a.y > p.y) != (b.y > p.y) && p.x < a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x) {
                inside = !inside;
            }
        }
        inside
    }
}

fn signed_area(points: &[DVec2]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| points[i].perp_dot(points[(i + 1) % n]))
        .sum::<f64>()
        * 0.5
}

/// Union-find over point ids
struct Nodes {
    parent: BTreeMap<Uuid, Uuid>,
}

impl Nodes {
    fn find(&mut self, id: Uuid) -> Uuid {
        let parent = *self.parent.entry(id).or_insert(id);
        if parent == id {
            return id;
        }
        let root = self.find(parent);
        self.parent.insert(id, root);
        root
    }

    fn union(&mut self, a: Uuid, b: Uuid) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent.insert(ra.max(rb), ra.min(rb));
        }
    }
}

/// An open curve between two profile nodes
struct Edge {
    from: Uuid,
    to: Uuid,
    polyline: Vec<DVec2>,
}

/// Extract the closed loops of `sketch`
///
/// Open chains are ignored. Fails when no closed loop remains.
pub fn profile_loops(
    sketch: &Sketch,
    config: &RebuildConfig,
) -> Result<Vec<ProfileLoop>, SketchError> {
    let position = |id: Uuid| sketch.position(id).ok_or(SketchError::EntityNotFound(id));

    let mut rings: Vec<Vec<DVec2>> = Vec::new();
    let mut curves = Vec::new();
    for primitive in sketch.primitives().filter(|p| !p.is_construction()) {
        match primitive {
            SketchPrimitive::Point { .. } => {}
            SketchPrimitive::Line { start, end, .. } => {
                curves.push((*start, *end, vec![position(*start)?, position(*end)?]));
            }
            SketchPrimitive::Circle { id, center, .. } => {
                let c = position(*center)?;
                let r = sketch.radius(*id).unwrap_or(0.0);
                let n = config.circle_segments.max(3) as usize;
                rings.push(
                    (0..n)
                        .map(|i| c + DVec2::from_angle(TAU * i as f64 / n as f64) * r)
                        .collect(),
                );
            }
            SketchPrimitive::Arc {
                center, start, end, ..
            } => {
                let (c, s, e) = (position(*center)?, position(*start)?, position(*end)?);
                curves.push((*start, *end, arc_polyline(c, s, e, config)));
            }
        }
    }

    let mut nodes = Nodes {
        parent: BTreeMap::new(),
    };
    for constraint in sketch.constraints() {
        if let (ConstraintKind::Coincident, [a, b]) =
            (constraint.kind, constraint.entities.as_slice())
        {
            nodes.union(*a, *b);
        }
    }
    let endpoints: Vec<(Uuid, DVec2)> = curves
        .iter()
        .flat_map(|(s, e, poly)| [(*s, poly[0]), (*e, poly[poly.len() - 1])])
        .collect();
    for (i, (a, pa)) in endpoints.iter().enumerate() {
        for (b, pb) in &endpoints[i + 1..] {
            if pa.distance(*pb) < MERGE_TOLERANCE {
                nodes.union(*a, *b);
            }
        }
    }

    let edges: Vec<Edge> = curves
        .into_iter()
        .map(|(s, e, polyline)| Edge {
            from: nodes.find(s),
            to: nodes.find(e),
            polyline,
        })
        .collect();
    rings.extend(walk_loops(&edges));

    let mut loops: Vec<ProfileLoop> = rings
        .into_iter()
        .filter_map(|mut points| {
            dedup_ring(&mut points);
            let area = signed_area(&points);
            if points.len() < 3 || area.abs() < 1e-12 {
                return None;
            }
            if area < 0.0 {
                points.reverse();
            }
            Some(ProfileLoop {
                points,
                hole: false,
            })
        })
        .collect();

    if loops.is_empty() {
        return Err(SketchError::InvalidGeometry(
            "sketch has no closed profile".into(),
        ));
    }

    let depths: Vec<usize> = loops
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let probe = l.points[0];
            loops
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && other.contains(probe))
                .count()
        })
        .collect();
    for (l, depth) in loops.iter_mut().zip(depths) {
        l.hole = depth % 2 == 1;
    }
    tracing::debug!("sketch {} yields {} profile loops", sketch.name, loops.len());
    Ok(loops)
}

/// Counter-clockwise polyline from `s` to `e` around `c`, ends snapped
fn arc_polyline(c: DVec2, s: DVec2, e: DVec2, config: &RebuildConfig) -> Vec<DVec2> {
    let r = s.distance(c);
    let a0 = (s - c).to_angle();
    let mut sweep = ((e - c).to_angle() - a0).rem_euclid(TAU);
    if sweep < 1e-9 {
        sweep = TAU;
    }
    let n = config.arc_segments(sweep);
    let mut points: Vec<DVec2> = (0..=n)
        .map(|i| c + DVec2::from_angle(a0 + sweep * i as f64 / n as f64) * r)
        .collect();
    points[0] = s;
    points[n] = e;
    points
}

/// Chain edges into closed rings; edges of open chains are dropped
fn walk_loops(edges: &[Edge]) -> Vec<Vec<DVec2>> {
    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let start = edges[first].from;
        let mut current = edges[first].to;
        let mut ring = edges[first].polyline.clone();

        while current != start {
            let next = (0..edges.len())
                .find(|&i| !used[i] && (edges[i].from == current || edges[i].to == current));
            let Some(i) = next else {
                break;
            };
            used[i] = true;
            let edge = &edges[i];
            if edge.from == current {
                ring.extend(edge.polyline.iter().skip(1));
                current = edge.to;
            } else {
                ring.extend(edge.polyline.iter().rev().skip(1));
                current = edge.from;
            }
        }

        if current == start {
            rings.push(ring);
        } else {
            tracing::debug!("ignoring open chain starting at {}", start);
        }
    }
    rings
}

/// Drop consecutive duplicates and the closing point
fn dedup_ring(points: &mut Vec<DVec2>) {
    points.dedup_by(|a, b| a.distance(*b) < MERGE_TOLERANCE);
    while points.len() > 1 && points[0].distance(points[points.len() - 1]) < MERGE_TOLERANCE {
        points.pop();
    }
}
