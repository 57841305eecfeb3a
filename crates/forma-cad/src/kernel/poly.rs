//! Polyhedral reference kernel
//!
//! Deterministic, faceted implementation of [`GeometryKernel`]. Curved
//! surfaces are approximated by flat facets, booleans work on bounding boxes
//! and blends (fillet/chamfer) are added as extra facets without trimming the
//! faces next to them. It lets the modeling core run and be tested without a
//! native B-rep backend; it makes no claim to solid-modeling robustness.

use std::collections::{HashMap, HashSet};
use std::f64::consts::{PI, TAU};

use glam::{DMat4, DQuat, DVec3};
use parking_lot::Mutex;

use super::{Axis3D, BooleanType, CadError, CadResult, GeometryKernel, ShapeId, TessellatedMesh};

/// Quantization scale used to weld coincident vertices
const KEY_SCALE: f64 = 1e6;
/// Distance below which two points are the same point
const EPSILON: f64 = 1e-9;
/// Maximum out-of-plane distance for a profile to count as planar
const PLANAR_TOLERANCE: f64 = 1e-6;

type Key = [i64; 3];

fn key(p: DVec3) -> Key {
    [
        (p.x * KEY_SCALE).round() as i64,
        (p.y * KEY_SCALE).round() as i64,
        (p.z * KEY_SCALE).round() as i64,
    ]
}

#[derive(Debug, Clone)]
enum PolyShape {
    Wire(Vec<DVec3>),
    Face(Vec<DVec3>),
    Edge(DVec3, DVec3),
    Vertex(DVec3),
    Solid {
        faces: Vec<ShapeId>,
        edges: Vec<ShapeId>,
        vertices: Vec<ShapeId>,
    },
}

#[derive(Debug)]
struct Entry {
    shape: PolyShape,
    /// Parent solid for sub-shapes; `None` for caller-owned shapes
    owner: Option<ShapeId>,
}

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    entries: HashMap<ShapeId, Entry>,
    rotation: usize,
    double_frees: usize,
}

impl Store {
    fn alloc(&mut self) -> ShapeId {
        self.next_id += 1;
        ShapeId(self.next_id)
    }

    fn insert(&mut self, shape: PolyShape, owner: Option<ShapeId>) -> ShapeId {
        let id = self.alloc();
        self.entries.insert(id, Entry { shape, owner });
        id
    }

    fn get(&self, id: ShapeId) -> CadResult<&PolyShape> {
        self.entries
            .get(&id)
            .map(|e| &e.shape)
            .ok_or_else(|| CadError::InvalidShape(id, "unknown shape".into()))
    }

    fn face_points(&self, id: ShapeId) -> CadResult<&[DVec3]> {
        match self.get(id)? {
            PolyShape::Face(points) => Ok(points),
            _ => Err(CadError::InvalidShape(id, "not a face".into())),
        }
    }

    /// Boundary polygons of a solid, or the single polygon of a face
    fn polygons(&self, id: ShapeId) -> CadResult<Vec<Vec<DVec3>>> {
        match self.get(id)? {
            PolyShape::Solid { faces, .. } => faces
                .iter()
                .map(|f| self.face_points(*f).map(<[DVec3]>::to_vec))
                .collect(),
            PolyShape::Face(points) => Ok(vec![points.clone()]),
            _ => Err(CadError::InvalidShape(id, "not a solid or face".into())),
        }
    }

    /// Register a solid bounded by `polygons`, deriving its edges and vertices
    fn insert_solid(&mut self, polygons: Vec<Vec<DVec3>>) -> ShapeId {
        let solid = self.alloc();

        let mut vertex_points = Vec::new();
        let mut seen_vertices = HashSet::new();
        let mut edge_points = Vec::new();
        let mut seen_edges = HashSet::new();

        for poly in &polygons {
            let n = poly.len();
            for i in 0..n {
                let (a, b) = (poly[i], poly[(i + 1) % n]);
                if seen_vertices.insert(key(a)) {
                    vertex_points.push(a);
                }
                let (ka, kb) = (key(a), key(b));
                let edge_key = if ka <= kb { (ka, kb) } else { (kb, ka) };
                if seen_edges.insert(edge_key) {
                    edge_points.push((a, b));
                }
            }
        }

        let faces = polygons
            .into_iter()
            .map(|poly| self.insert(PolyShape::Face(poly), Some(solid)))
            .collect();
        let edges = edge_points
            .into_iter()
            .map(|(a, b)| self.insert(PolyShape::Edge(a, b), Some(solid)))
            .collect();
        let vertices = vertex_points
            .into_iter()
            .map(|p| self.insert(PolyShape::Vertex(p), Some(solid)))
            .collect();

        self.entries.insert(
            solid,
            Entry {
                shape: PolyShape::Solid {
                    faces,
                    edges,
                    vertices,
                },
                owner: None,
            },
        );
        solid
    }

    fn rotated(&self, ids: &[ShapeId]) -> Vec<ShapeId> {
        let mut ids = ids.to_vec();
        if !ids.is_empty() {
            let k = self.rotation % ids.len();
            ids.rotate_left(k);
        }
        ids
    }
}

/// Deterministic faceted kernel
pub struct PolyKernel {
    store: Mutex<Store>,
    /// Facets used to approximate a full circle
    segments: u32,
}

impl Default for PolyKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl PolyKernel {
    /// Create a kernel approximating circles with 32 facets
    pub fn new() -> Self {
        Self::with_segments(32)
    }

    /// Create a kernel approximating circles with `segments` facets
    pub fn with_segments(segments: u32) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            segments: segments.max(3),
        }
    }

    /// Rotate every face/edge/vertex enumeration left by `k` positions.
    ///
    /// Simulates a kernel that renumbers topology between evaluations.
    #[cfg(test)]
    pub fn set_enumeration_rotation(&self, k: usize) {
        self.store.lock().rotation = k;
    }

    /// Number of caller-owned shapes currently alive
    #[cfg(test)]
    pub fn live_shapes(&self) -> usize {
        self.store
            .lock()
            .entries
            .values()
            .filter(|e| e.owner.is_none())
            .count()
    }

    /// Number of `free` calls on handles that were not alive
    pub fn double_frees(&self) -> usize {
        self.store.lock().double_frees
    }

    fn positive(value: f64, what: &str) -> CadResult<()> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(CadError::InvalidParameter(format!(
                "{what} must be positive, got {value}"
            )))
        }
    }

    fn unit_axis(axis: DVec3) -> CadResult<DVec3> {
        axis.try_normalize()
            .ok_or_else(|| CadError::InvalidParameter("axis must be non-zero".into()))
    }

    fn blend(
        &self,
        shape: ShapeId,
        edges: &[ShapeId],
        size: f64,
        what: &str,
    ) -> CadResult<ShapeId> {
        Self::positive(size, what)?;
        let mut store = self.store.lock();
        let owned_edges = match store.get(shape)? {
            PolyShape::Solid { edges, .. } => edges.clone(),
            _ => return Err(CadError::InvalidShape(shape, "not a solid".into())),
        };
        if edges.is_empty() {
            return Err(CadError::InvalidParameter("no edges selected".into()));
        }

        let mut polys = store.polygons(shape)?;
        let center = vertex_centroid(&polys);
        let mut blends = Vec::with_capacity(edges.len());

        for edge in edges {
            if !owned_edges.contains(edge) {
                return Err(CadError::InvalidShape(
                    *edge,
                    format!("edge does not belong to {shape}"),
                ));
            }
            let (a, b) = match store.get(*edge)? {
                PolyShape::Edge(a, b) => (*a, *b),
                _ => return Err(CadError::InvalidShape(*edge, "not an edge".into())),
            };
            let normals: Vec<DVec3> = polys
                .iter()
                .filter(|p| has_edge(p, a, b))
                .map(|p| newell(p).normalize_or_zero())
                .collect();
            let [n1, n2] = normals[..] else {
                return Err(CadError::OperationFailed(format!(
                    "{what}: edge {edge} is not shared by exactly two faces"
                )));
            };
            if n1.dot(n2).abs() > 1.0 - 1e-9 {
                return Err(CadError::OperationFailed(format!(
                    "{what}: edge {edge} lies between tangent faces"
                )));
            }
            let mut quad = vec![a - n2 * size, b - n2 * size, b - n1 * size, a - n1 * size];
            orient_away_from(&mut quad, center);
            blends.push(quad);
        }

        polys.extend(blends);
        Ok(store.insert_solid(polys))
    }
}

impl GeometryKernel for PolyKernel {
    fn name(&self) -> &str {
        "poly"
    }

    fn make_polygon(&self, points: &[DVec3]) -> CadResult<ShapeId> {
        let points = dedup_ring(points.to_vec());
        if points.len() < 3 {
            return Err(CadError::InvalidProfile(
                "Profile must have at least 3 points".into(),
            ));
        }
        Ok(self.store.lock().insert(PolyShape::Wire(points), None))
    }

    fn make_face(&self, wire: ShapeId) -> CadResult<ShapeId> {
        let mut store = self.store.lock();
        let points = match store.get(wire)? {
            PolyShape::Wire(points) => points.clone(),
            _ => return Err(CadError::InvalidShape(wire, "not a wire".into())),
        };
        let normal = newell(&points)
            .try_normalize()
            .ok_or_else(|| CadError::InvalidProfile("profile has zero area".into()))?;
        if points
            .iter()
            .any(|p| (*p - points[0]).dot(normal).abs() > PLANAR_TOLERANCE)
        {
            return Err(CadError::InvalidProfile("profile is not planar".into()));
        }
        Ok(store.insert(PolyShape::Face(points), None))
    }

    fn extrude(&self, face: ShapeId, vector: DVec3) -> CadResult<ShapeId> {
        let mut store = self.store.lock();
        let points = store.face_points(face)?.to_vec();
        let normal = newell(&points);
        let along = normal.dot(vector);
        if along.abs() < EPSILON {
            return Err(CadError::InvalidProfile(
                "extrusion direction is parallel to the profile".into(),
            ));
        }
        let ring = if along > 0.0 {
            points
        } else {
            points.into_iter().rev().collect()
        };
        Ok(store.insert_solid(prism(&ring, vector)))
    }

    fn revolve(&self, face: ShapeId, axis: &Axis3D, angle: f64) -> CadResult<ShapeId> {
        let direction = Self::unit_axis(axis.direction)?;
        if angle.abs() < EPSILON || !angle.is_finite() {
            return Err(CadError::InvalidParameter(format!(
                "revolve angle must be non-zero, got {angle}"
            )));
        }
        let mut store = self.store.lock();
        let profile = store.face_points(face)?.to_vec();

        let full = angle.abs() >= TAU - EPSILON;
        let angle = angle.clamp(-TAU, TAU);
        let steps = ((self.segments as f64 * angle.abs() / TAU).ceil() as usize).max(1);
        let rings: Vec<Vec<DVec3>> = (0..=steps)
            .map(|k| {
                if full && k == steps {
                    return profile.clone();
                }
                let q = DQuat::from_axis_angle(direction, angle * k as f64 / steps as f64);
                profile
                    .iter()
                    .map(|p| axis.origin + q * (*p - axis.origin))
                    .collect()
            })
            .collect();

        let n = profile.len();
        let mut polys = Vec::new();
        for k in 0..steps {
            let (r0, r1) = (&rings[k], &rings[k + 1]);
            for i in 0..n {
                let j = (i + 1) % n;
                let quad = dedup_ring(vec![r0[i], r0[j], r1[j], r1[i]]);
                if quad.len() >= 3 && newell(&quad).length() > EPSILON {
                    polys.push(quad);
                }
            }
        }
        if !full {
            polys.push(profile.clone());
            polys.push(rings[steps].iter().rev().copied().collect());
        }
        orient_outward(&mut polys);
        Ok(store.insert_solid(polys))
    }

    fn make_box(&self, center: DVec3, size: DVec3) -> CadResult<ShapeId> {
        Self::positive(size.x, "box width")?;
        Self::positive(size.y, "box depth")?;
        Self::positive(size.z, "box height")?;
        let h = size * 0.5;
        let ring = [
            DVec3::new(-h.x, -h.y, -h.z),
            DVec3::new(h.x, -h.y, -h.z),
            DVec3::new(h.x, h.y, -h.z),
            DVec3::new(-h.x, h.y, -h.z),
        ]
        .map(|p| p + center);
        let polys = prism(&ring, DVec3::new(0.0, 0.0, size.z));
        Ok(self.store.lock().insert_solid(polys))
    }

    fn make_cylinder(
        &self,
        base: DVec3,
        axis: DVec3,
        radius: f64,
        height: f64,
    ) -> CadResult<ShapeId> {
        Self::positive(radius, "cylinder radius")?;
        Self::positive(height, "cylinder height")?;
        let axis = Self::unit_axis(axis)?;
        let ring = circle_ring(base, axis, radius, self.segments as usize);
        let polys = prism(&ring, axis * height);
        Ok(self.store.lock().insert_solid(polys))
    }

    fn make_sphere(&self, center: DVec3, radius: f64) -> CadResult<ShapeId> {
        Self::positive(radius, "sphere radius")?;
        let slices = self.segments as usize;
        let stacks = (slices / 2).max(2);
        let point = |i: usize, j: usize| {
            let theta = PI * i as f64 / stacks as f64;
            let phi = TAU * j as f64 / slices as f64;
            center
                + DVec3::new(
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ) * radius
        };

        let mut polys = Vec::with_capacity(stacks * slices);
        for i in 0..stacks {
            for j in 0..slices {
                let jn = (j + 1) % slices;
                let quad = dedup_ring(vec![point(i, j), point(i + 1, j), point(i + 1, jn), point(i, jn)]);
                if quad.len() >= 3 {
                    polys.push(quad);
                }
            }
        }
        orient_outward(&mut polys);
        Ok(self.store.lock().insert_solid(polys))
    }

    fn make_cone(
        &self,
        base: DVec3,
        axis: DVec3,
        bottom_radius: f64,
        top_radius: f64,
        height: f64,
    ) -> CadResult<ShapeId> {
        Self::positive(height, "cone height")?;
        if bottom_radius < 0.0 || top_radius < 0.0 || bottom_radius + top_radius <= EPSILON {
            return Err(CadError::InvalidParameter(
                "cone radii must be non-negative and not both zero".into(),
            ));
        }
        let axis = Self::unit_axis(axis)?;
        let n = self.segments as usize;
        let top_center = base + axis * height;
        let bottom = circle_ring(base, axis, bottom_radius, n);
        let top = circle_ring(top_center, axis, top_radius, n);

        let mut polys = Vec::with_capacity(n + 2);
        if bottom_radius > EPSILON {
            polys.push(bottom.iter().rev().copied().collect());
        }
        if top_radius > EPSILON {
            polys.push(top.clone());
        }
        for i in 0..n {
            let j = (i + 1) % n;
            let side = dedup_ring(vec![bottom[i], bottom[j], top[j], top[i]]);
            if side.len() >= 3 {
                polys.push(side);
            }
        }
        orient_outward(&mut polys);
        Ok(self.store.lock().insert_solid(polys))
    }

    fn boolean(&self, a: ShapeId, b: ShapeId, op: BooleanType) -> CadResult<ShapeId> {
        let mut store = self.store.lock();
        let pa = store.polygons(a)?;
        let pb = store.polygons(b)?;
        let (amin, amax) = bounds(&pa);
        let (bmin, bmax) = bounds(&pb);
        let overlap = amin.cmple(bmax).all() && bmin.cmple(amax).all();

        let polys: Vec<Vec<DVec3>> = match op {
            BooleanType::Union => pa.into_iter().chain(pb).collect(),
            BooleanType::Subtract if !overlap => pa,
            BooleanType::Subtract => {
                let inner = pb
                    .into_iter()
                    .filter(|p| inside(polygon_centroid(p), amin, amax))
                    .map(|p| p.into_iter().rev().collect::<Vec<_>>());
                pa.into_iter().chain(inner).collect()
            }
            BooleanType::Intersect => {
                if !overlap {
                    return Err(CadError::BooleanFailed("shapes do not overlap".into()));
                }
                pa.into_iter()
                    .filter(|p| inside(polygon_centroid(p), bmin, bmax))
                    .chain(
                        pb.into_iter()
                            .filter(|p| inside(polygon_centroid(p), amin, amax)),
                    )
                    .collect()
            }
        };

        if polys.is_empty() {
            return Err(CadError::BooleanFailed(format!("{op:?} produced an empty solid")));
        }
        Ok(store.insert_solid(polys))
    }

    fn fillet(&self, shape: ShapeId, edges: &[ShapeId], radius: f64) -> CadResult<ShapeId> {
        self.blend(shape, edges, radius, "fillet radius")
    }

    fn chamfer(&self, shape: ShapeId, edges: &[ShapeId], distance: f64) -> CadResult<ShapeId> {
        self.blend(shape, edges, distance, "chamfer distance")
    }

    fn transform(&self, shape: ShapeId, matrix: &DMat4) -> CadResult<ShapeId> {
        let mut store = self.store.lock();
        let mirrored = matrix.determinant() < 0.0;
        let map = |poly: Vec<DVec3>| -> Vec<DVec3> {
            let moved = poly.into_iter().map(|p| matrix.transform_point3(p));
            if mirrored {
                moved.rev().collect()
            } else {
                moved.collect()
            }
        };
        match store.get(shape)? {
            PolyShape::Face(points) => {
                let points = map(points.clone());
                Ok(store.insert(PolyShape::Face(points), None))
            }
            PolyShape::Solid { .. } => {
                let polys = store.polygons(shape)?.into_iter().map(map).collect();
                Ok(store.insert_solid(polys))
            }
            _ => Err(CadError::InvalidShape(shape, "cannot transform".into())),
        }
    }

    fn faces(&self, shape: ShapeId) -> CadResult<Vec<ShapeId>> {
        let store = self.store.lock();
        match store.get(shape)? {
            PolyShape::Solid { faces, .. } => Ok(store.rotated(faces)),
            PolyShape::Face(_) => Ok(vec![shape]),
            _ => Err(CadError::InvalidShape(shape, "has no faces".into())),
        }
    }

    fn edges(&self, shape: ShapeId) -> CadResult<Vec<ShapeId>> {
        let store = self.store.lock();
        match store.get(shape)? {
            PolyShape::Solid { edges, .. } => Ok(store.rotated(edges)),
            _ => Err(CadError::InvalidShape(shape, "has no edges".into())),
        }
    }

    fn vertices(&self, shape: ShapeId) -> CadResult<Vec<ShapeId>> {
        let store = self.store.lock();
        match store.get(shape)? {
            PolyShape::Solid { vertices, .. } => Ok(store.rotated(vertices)),
            _ => Err(CadError::InvalidShape(shape, "has no vertices".into())),
        }
    }

    fn face_center(&self, face: ShapeId) -> CadResult<DVec3> {
        Ok(polygon_centroid(self.store.lock().face_points(face)?))
    }

    fn face_normal(&self, face: ShapeId) -> CadResult<DVec3> {
        Ok(newell(self.store.lock().face_points(face)?).normalize_or_zero())
    }

    fn face_area(&self, face: ShapeId) -> CadResult<f64> {
        Ok(newell(self.store.lock().face_points(face)?).length() * 0.5)
    }

    fn edge_midpoint(&self, edge: ShapeId) -> CadResult<DVec3> {
        match self.store.lock().get(edge)? {
            PolyShape::Edge(a, b) => Ok((*a + *b) * 0.5),
            _ => Err(CadError::InvalidShape(edge, "not an edge".into())),
        }
    }

    fn edge_length(&self, edge: ShapeId) -> CadResult<f64> {
        match self.store.lock().get(edge)? {
            PolyShape::Edge(a, b) => Ok(a.distance(*b)),
            _ => Err(CadError::InvalidShape(edge, "not an edge".into())),
        }
    }

    fn vertex_position(&self, vertex: ShapeId) -> CadResult<DVec3> {
        match self.store.lock().get(vertex)? {
            PolyShape::Vertex(p) => Ok(*p),
            _ => Err(CadError::InvalidShape(vertex, "not a vertex".into())),
        }
    }

    fn mesh(&self, shape: ShapeId, deflection: f64) -> CadResult<TessellatedMesh> {
        if !(deflection > 0.0) {
            return Err(CadError::TessellationFailed(format!(
                "deflection must be positive, got {deflection}"
            )));
        }
        let polys = self.store.lock().polygons(shape)?;
        let mut mesh = TessellatedMesh::new();
        for poly in polys {
            let normal = newell(&poly).normalize_or_zero().as_vec3().to_array();
            let base = mesh.positions.len() as u32;
            for p in &poly {
                mesh.positions.push(p.as_vec3().to_array());
                mesh.normals.push(normal);
            }
            // Fan triangulation; faces are convex
            for i in 1..poly.len() as u32 - 1 {
                mesh.indices.extend_from_slice(&[base, base + i, base + i + 1]);
            }
        }
        Ok(mesh)
    }

    fn free(&self, shape: ShapeId) {
        let mut store = self.store.lock();
        let entry = match store.entries.get(&shape) {
            None => {
                store.double_frees += 1;
                tracing::warn!(%shape, "free of a shape that is not alive");
                return;
            }
            Some(entry) if entry.owner.is_some() => {
                tracing::debug!(%shape, "sub-shapes are released with their parent");
                return;
            }
            Some(_) => store.entries.remove(&shape),
        };
        if let Some(Entry {
            shape: PolyShape::Solid {
                faces,
                edges,
                vertices,
            },
            ..
        }) = entry
        {
            for child in faces.iter().chain(&edges).chain(&vertices) {
                store.entries.remove(child);
            }
        }
    }
}

// ========== Facet helpers ==========

/// Newell normal; its length is twice the polygon area
fn newell(points: &[DVec3]) -> DVec3 {
    let n = points.len();
    (0..n).fold(DVec3::ZERO, |acc, i| acc + points[i].cross(points[(i + 1) % n]))
}

fn polygon_centroid(points: &[DVec3]) -> DVec3 {
    let normal = newell(points).normalize_or_zero();
    let mut weighted = DVec3::ZERO;
    let mut total = 0.0;
    for i in 1..points.len().saturating_sub(1) {
        let (a, b, c) = (points[0], points[i], points[i + 1]);
        let area = (b - a).cross(c - a).dot(normal) * 0.5;
        weighted += (a + b + c) / 3.0 * area;
        total += area;
    }
    if total.abs() > EPSILON {
        weighted / total
    } else {
        points.iter().copied().sum::<DVec3>() / points.len().max(1) as f64
    }
}

fn vertex_centroid(polys: &[Vec<DVec3>]) -> DVec3 {
    let count: usize = polys.iter().map(Vec::len).sum();
    polys.iter().flatten().copied().sum::<DVec3>() / count.max(1) as f64
}

fn bounds(polys: &[Vec<DVec3>]) -> (DVec3, DVec3) {
    polys.iter().flatten().fold(
        (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
        |(min, max), p| (min.min(*p), max.max(*p)),
    )
}

fn inside(p: DVec3, min: DVec3, max: DVec3) -> bool {
    (min - EPSILON).cmple(p).all() && p.cmple(max + EPSILON).all()
}

fn has_edge(poly: &[DVec3], a: DVec3, b: DVec3) -> bool {
    let n = poly.len();
    (0..n).any(|i| {
        let (p, q) = (poly[i], poly[(i + 1) % n]);
        (key(p) == key(a) && key(q) == key(b)) || (key(p) == key(b) && key(q) == key(a))
    })
}

/// Drop consecutive duplicate points, including across the closing seam
fn dedup_ring(mut points: Vec<DVec3>) -> Vec<DVec3> {
    points.dedup_by(|a, b| a.distance(*b) < EPSILON);
    while points.len() > 1 && points[0].distance(points[points.len() - 1]) < EPSILON {
        points.pop();
    }
    points
}

fn orient_away_from(poly: &mut [DVec3], center: DVec3) {
    if newell(poly).dot(polygon_centroid(poly) - center) < 0.0 {
        poly.reverse();
    }
}

fn orient_outward(polys: &mut [Vec<DVec3>]) {
    let center = vertex_centroid(polys);
    for poly in polys.iter_mut() {
        orient_away_from(poly, center);
    }
}

/// Circle approximation, counter-clockwise about `axis`
fn circle_ring(center: DVec3, axis: DVec3, radius: f64, segments: usize) -> Vec<DVec3> {
    let u = axis.any_orthonormal_vector();
    let w = axis.cross(u);
    (0..segments)
        .map(|i| {
            let t = TAU * i as f64 / segments as f64;
            center + (u * t.cos() + w * t.sin()) * radius
        })
        .collect()
}

/// Faces of the prism swept by `ring` along `vector`: bottom, top, then one
/// side per ring edge. `ring` must wind counter-clockwise about `vector`.
fn prism(ring: &[DVec3], vector: DVec3) -> Vec<Vec<DVec3>> {
    let n = ring.len();
    let mut polys = Vec::with_capacity(n + 2);
    polys.push(ring.iter().rev().copied().collect());
    polys.push(ring.iter().map(|p| *p + vector).collect());
    for i in 0..n {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        polys.push(vec![a, b, b + vector, a + vector]);
    }
    polys
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rectangle_face(kernel: &PolyKernel, w: f64, h: f64) -> ShapeId {
        let wire = kernel
            .make_polygon(&[
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(w, 0.0, 0.0),
                DVec3::new(w, h, 0.0),
                DVec3::new(0.0, h, 0.0),
            ])
            .unwrap();
        let face = kernel.make_face(wire).unwrap();
        kernel.free(wire);
        face
    }

    #[test]
    fn test_box_topology() {
        let kernel = PolyKernel::new();
        let solid = kernel.make_box(DVec3::ZERO, DVec3::new(2.0, 4.0, 6.0)).unwrap();

        assert_eq!(kernel.faces(solid).unwrap().len(), 6);
        assert_eq!(kernel.edges(solid).unwrap().len(), 12);
        assert_eq!(kernel.vertices(solid).unwrap().len(), 8);

        let top = kernel.faces(solid).unwrap()[1];
        assert_relative_eq!(kernel.face_normal(top).unwrap().z, 1.0);
        assert_relative_eq!(kernel.face_center(top).unwrap().z, 3.0);
        assert_relative_eq!(kernel.face_area(top).unwrap(), 8.0);
    }

    #[test]
    fn test_extrude_rectangle() {
        let kernel = PolyKernel::new();
        let face = rectangle_face(&kernel, 4.0, 2.0);
        let solid = kernel.extrude(face, DVec3::new(0.0, 0.0, 10.0)).unwrap();
        kernel.free(face);

        let faces = kernel.faces(solid).unwrap();
        assert_eq!(faces.len(), 6);
        let top = kernel.face_center(faces[1]).unwrap();
        assert_relative_eq!(top.x, 2.0);
        assert_relative_eq!(top.y, 1.0);
        assert_relative_eq!(top.z, 10.0);

        let mesh = kernel.mesh(solid, 0.1).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.positions.len(), mesh.normals.len());
    }

    #[test]
    fn test_extrude_against_normal() {
        let kernel = PolyKernel::new();
        let face = rectangle_face(&kernel, 1.0, 1.0);
        let solid = kernel.extrude(face, DVec3::new(0.0, 0.0, -5.0)).unwrap();

        let normals: Vec<DVec3> = kernel
            .faces(solid)
            .unwrap()
            .into_iter()
            .map(|f| kernel.face_normal(f).unwrap())
            .collect();
        assert_relative_eq!(normals[0].z, 1.0);
        assert_relative_eq!(normals[1].z, -1.0);
    }

    #[test]
    fn test_extrude_parallel_fails() {
        let kernel = PolyKernel::new();
        let face = rectangle_face(&kernel, 1.0, 1.0);
        assert!(kernel.extrude(face, DVec3::X).is_err());
    }

    #[test]
    fn test_non_planar_profile_rejected() {
        let kernel = PolyKernel::new();
        let wire = kernel
            .make_polygon(&[
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(1.0, 1.0, 1.0),
                DVec3::new(0.0, 1.0, 0.0),
            ])
            .unwrap();
        assert!(matches!(
            kernel.make_face(wire),
            Err(CadError::InvalidProfile(_))
        ));
    }

    #[test]
    fn test_enumeration_rotation() {
        let kernel = PolyKernel::new();
        let solid = kernel.make_box(DVec3::ZERO, DVec3::ONE).unwrap();
        let before = kernel.faces(solid).unwrap();

        kernel.set_enumeration_rotation(2);
        let after = kernel.faces(solid).unwrap();
        assert_eq!(after[0], before[2]);
        assert_eq!(after[4], before[0]);
    }

    #[test]
    fn test_free_releases_sub_shapes() {
        let kernel = PolyKernel::new();
        let solid = kernel.make_box(DVec3::ZERO, DVec3::ONE).unwrap();
        let face = kernel.faces(solid).unwrap()[0];

        kernel.free(face);
        assert!(kernel.face_area(face).is_ok(), "sub-shape survives its own free");

        kernel.free(solid);
        assert_eq!(kernel.live_shapes(), 0);
        assert!(kernel.face_area(face).is_err());
        assert_eq!(kernel.double_frees(), 0);

        kernel.free(solid);
        assert_eq!(kernel.double_frees(), 1);
    }

    #[test]
    fn test_revolve_full_turn() {
        let kernel = PolyKernel::with_segments(8);
        let wire = kernel
            .make_polygon(&[
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(2.0, 0.0, 0.0),
                DVec3::new(2.0, 0.0, 1.0),
                DVec3::new(1.0, 0.0, 1.0),
            ])
            .unwrap();
        let face = kernel.make_face(wire).unwrap();
        let solid = kernel.revolve(face, &Axis3D::z(), TAU).unwrap();

        // 8 steps x 4 profile edges, no caps
        assert_eq!(kernel.faces(solid).unwrap().len(), 32);
    }

    #[test]
    fn test_revolve_partial_has_caps() {
        let kernel = PolyKernel::with_segments(8);
        let wire = kernel
            .make_polygon(&[
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(2.0, 0.0, 0.0),
                DVec3::new(2.0, 0.0, 1.0),
            ])
            .unwrap();
        let face = kernel.make_face(wire).unwrap();
        let solid = kernel.revolve(face, &Axis3D::z(), PI).unwrap();

        // 4 steps x 3 edges + 2 caps
        assert_eq!(kernel.faces(solid).unwrap().len(), 14);
    }

    #[test]
    fn test_boolean_subtract_and_intersect() {
        let kernel = PolyKernel::new();
        let a = kernel.make_box(DVec3::ZERO, DVec3::splat(4.0)).unwrap();
        let b = kernel.make_box(DVec3::ZERO, DVec3::splat(1.0)).unwrap();
        let far = kernel.make_box(DVec3::splat(100.0), DVec3::ONE).unwrap();

        let cut = kernel.boolean(a, b, BooleanType::Subtract).unwrap();
        assert_eq!(kernel.faces(cut).unwrap().len(), 12);

        let untouched = kernel.boolean(a, far, BooleanType::Subtract).unwrap();
        assert_eq!(kernel.faces(untouched).unwrap().len(), 6);

        assert!(matches!(
            kernel.boolean(a, far, BooleanType::Intersect),
            Err(CadError::BooleanFailed(_))
        ));
    }

    #[test]
    fn test_fillet_adds_blend_faces() {
        let kernel = PolyKernel::new();
        let solid = kernel.make_box(DVec3::ZERO, DVec3::splat(2.0)).unwrap();
        let edges = kernel.edges(solid).unwrap();

        let filleted = kernel.fillet(solid, &edges[..2], 0.25).unwrap();
        assert_eq!(kernel.faces(filleted).unwrap().len(), 8);

        let blend = kernel.faces(filleted).unwrap()[6];
        let normal = kernel.face_normal(blend).unwrap();
        let center = kernel.face_center(blend).unwrap();
        assert!(normal.dot(center) > 0.0, "blend faces point outward");

        assert!(kernel.fillet(solid, &edges[..1], 0.0).is_err());
        let other = kernel.make_box(DVec3::ZERO, DVec3::ONE).unwrap();
        let foreign = kernel.edges(other).unwrap()[0];
        assert!(kernel.fillet(solid, &[foreign], 0.1).is_err());
    }

    #[test]
    fn test_transform_copies() {
        let kernel = PolyKernel::new();
        let solid = kernel.make_box(DVec3::ZERO, DVec3::ONE).unwrap();
        let moved = kernel
            .transform(solid, &DMat4::from_translation(DVec3::new(5.0, 0.0, 0.0)))
            .unwrap();

        let top = kernel.faces(moved).unwrap()[1];
        assert_relative_eq!(kernel.face_center(top).unwrap().x, 5.0);
        assert_eq!(kernel.live_shapes(), 2);
    }

    #[test]
    fn test_primitive_validation() {
        let kernel = PolyKernel::new();
        assert!(kernel.make_box(DVec3::ZERO, DVec3::new(1.0, 0.0, 1.0)).is_err());
        assert!(kernel.make_sphere(DVec3::ZERO, -1.0).is_err());
        assert!(kernel.make_cylinder(DVec3::ZERO, DVec3::ZERO, 1.0, 1.0).is_err());
        assert!(kernel.make_cone(DVec3::ZERO, DVec3::Z, 0.0, 0.0, 1.0).is_err());
        assert!(kernel.make_cone(DVec3::ZERO, DVec3::Z, 1.0, 0.0, 1.0).is_ok());
    }
}
