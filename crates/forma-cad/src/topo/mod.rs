//! Topological references
//!
//! A [`TopoRef`] names a face, edge or vertex of an op's result by index plus
//! a geometric signature captured when the reference was made. Kernel
//! numbering is not stable across rebuilds, so a reference is re-resolved
//! against the current result every time it is used: by index while the
//! index is in bounds and the entity count is unchanged, otherwise by nearest
//! signature.

use std::collections::HashMap;
use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::{CadResult, GeometryKernel, ShapeId};
use crate::op::OpResult;

/// Weight of normal misalignment in face scores
const NORMAL_WEIGHT: f64 = 100.0;

/// Kind of topological entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopoKind {
    Face,
    Edge,
    Vertex,
}

/// Geometry captured alongside a reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TopoSignature {
    /// Face centroid, edge midpoint or vertex position
    #[serde(default)]
    pub center: Option<DVec3>,
    #[serde(default)]
    pub normal: Option<DVec3>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub length: Option<f64>,
}

impl TopoSignature {
    fn is_empty(&self) -> bool {
        self.center.is_none() && self.normal.is_none() && self.area.is_none() && self.length.is_none()
    }
}

/// Persistent reference to a face, edge or vertex of an op's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopoRef {
    pub op_id: Uuid,
    pub kind: TopoKind,
    /// Position in the kernel enumeration at the time the reference was made
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<TopoSignature>,
    /// Entities of this kind in the result the reference was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl TopoRef {
    /// Reference by index only
    pub fn by_index(op_id: Uuid, kind: TopoKind, index: usize) -> Self {
        Self {
            op_id,
            kind,
            index,
            signature: None,
            count: None,
        }
    }

    /// Record how many entities of this kind the source result had
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// References to every face, edge and vertex of one result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopoMap {
    pub faces: Vec<TopoRef>,
    pub edges: Vec<TopoRef>,
    pub vertices: Vec<TopoRef>,
}

impl TopoMap {
    /// Capture the topology of `shape` as produced by op `op_id`
    pub fn capture(op_id: Uuid, shape: ShapeId, kernel: &dyn GeometryKernel) -> CadResult<Self> {
        Ok(Self {
            faces: capture_refs(op_id, kernel.faces(shape)?, kernel, build_face_ref)?,
            edges: capture_refs(op_id, kernel.edges(shape)?, kernel, build_edge_ref)?,
            vertices: capture_refs(op_id, kernel.vertices(shape)?, kernel, build_vertex_ref)?,
        })
    }

    pub fn refs(&self, kind: TopoKind) -> &[TopoRef] {
        match kind {
            TopoKind::Face => &self.faces,
            TopoKind::Edge => &self.edges,
            TopoKind::Vertex => &self.vertices,
        }
    }
}

type BuildRef = fn(Uuid, usize, ShapeId, &dyn GeometryKernel) -> CadResult<TopoRef>;

fn capture_refs(
    op_id: Uuid,
    handles: Vec<ShapeId>,
    kernel: &dyn GeometryKernel,
    build: BuildRef,
) -> CadResult<Vec<TopoRef>> {
    let count = handles.len();
    handles
        .into_iter()
        .enumerate()
        .map(|(i, h)| build(op_id, i, h, kernel).map(|r| r.with_count(count)))
        .collect()
}

/// Reference a face, capturing its centroid, normal and area
pub fn build_face_ref(
    op_id: Uuid,
    index: usize,
    face: ShapeId,
    kernel: &dyn GeometryKernel,
) -> CadResult<TopoRef> {
    Ok(TopoRef {
        op_id,
        kind: TopoKind::Face,
        index,
        signature: Some(face_signature(face, kernel)?),
        count: None,
    })
}

/// Reference an edge, capturing its midpoint and length
pub fn build_edge_ref(
    op_id: Uuid,
    index: usize,
    edge: ShapeId,
    kernel: &dyn GeometryKernel,
) -> CadResult<TopoRef> {
    Ok(TopoRef {
        op_id,
        kind: TopoKind::Edge,
        index,
        signature: Some(edge_signature(edge, kernel)?),
        count: None,
    })
}

/// Reference a vertex, capturing its position
pub fn build_vertex_ref(
    op_id: Uuid,
    index: usize,
    vertex: ShapeId,
    kernel: &dyn GeometryKernel,
) -> CadResult<TopoRef> {
    Ok(TopoRef {
        op_id,
        kind: TopoKind::Vertex,
        index,
        signature: Some(vertex_signature(vertex, kernel)?),
        count: None,
    })
}

fn face_signature(face: ShapeId, kernel: &dyn GeometryKernel) -> CadResult<TopoSignature> {
    Ok(TopoSignature {
        center: Some(kernel.face_center(face)?),
        normal: Some(kernel.face_normal(face)?),
        area: Some(kernel.face_area(face)?),
        length: None,
    })
}

fn edge_signature(edge: ShapeId, kernel: &dyn GeometryKernel) -> CadResult<TopoSignature> {
    Ok(TopoSignature {
        center: Some(kernel.edge_midpoint(edge)?),
        length: Some(kernel.edge_length(edge)?),
        ..TopoSignature::default()
    })
}

fn vertex_signature(vertex: ShapeId, kernel: &dyn GeometryKernel) -> CadResult<TopoSignature> {
    Ok(TopoSignature {
        center: Some(kernel.vertex_position(vertex)?),
        ..TopoSignature::default()
    })
}

/// How a reference was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMethod {
    ByIndex,
    BySignature,
}

/// A reference resolved against the current results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Kernel handle, valid while the owning result is alive
    pub handle: ShapeId,
    /// Current index of the entity
    pub index: usize,
    pub method: ResolveMethod,
}

/// Resolve `topo_ref` against the current result of its op
///
/// An in-bounds index wins, even when a signature is present, unless the
/// reference recorded an entity count that no longer matches. Only then, or
/// when the index is out of bounds, the nearest signature is used.
///
/// Returns `None` when the op has no solid result, the result has no entity
/// of that kind, or neither the index nor the signature is usable.
pub fn resolve_topo_ref(
    topo_ref: &TopoRef,
    results: &HashMap<Uuid, Arc<OpResult>>,
    kernel: &dyn GeometryKernel,
) -> Option<Resolved> {
    let shape = results.get(&topo_ref.op_id)?.shape()?;
    let candidates = match topo_ref.kind {
        TopoKind::Face => kernel.faces(shape),
        TopoKind::Edge => kernel.edges(shape),
        TopoKind::Vertex => kernel.vertices(shape),
    }
    .ok()?;
    if candidates.is_empty() {
        return None;
    }

    let signature = topo_ref.signature.filter(|s| !s.is_empty());
    let same_count = topo_ref.count.is_none_or(|n| n == candidates.len());
    if let Some(&handle) = candidates.get(topo_ref.index)
        && (same_count || signature.is_none())
    {
        return Some(Resolved {
            handle,
            index: topo_ref.index,
            method: ResolveMethod::ByIndex,
        });
    }

    let signature = signature?;
    let (index, handle, best) = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, h)| score(topo_ref.kind, &signature, *h, kernel).map(|s| (i, *h, s)))
        .min_by(|a, b| a.2.total_cmp(&b.2))?;
    tracing::debug!(
        "reference {:?} #{} of op {} matched #{} by signature (score {:e})",
        topo_ref.kind,
        topo_ref.index,
        topo_ref.op_id,
        index,
        best
    );
    Some(Resolved {
        handle,
        index,
        method: ResolveMethod::BySignature,
    })
}

/// Distance between a signature and a candidate, lower is closer
///
/// `None` when the candidate cannot be queried.
fn score(
    kind: TopoKind,
    signature: &TopoSignature,
    candidate: ShapeId,
    kernel: &dyn GeometryKernel,
) -> Option<f64> {
    let current = match kind {
        TopoKind::Face => face_signature(candidate, kernel),
        TopoKind::Edge => edge_signature(candidate, kernel),
        TopoKind::Vertex => vertex_signature(candidate, kernel),
    }
    .ok()?;

    let mut total = 0.0;
    if let (Some(a), Some(b)) = (signature.center, current.center) {
        total += a.distance_squared(b);
    }
    if kind == TopoKind::Face
        && let (Some(a), Some(b)) = (signature.normal, current.normal)
    {
        total += (1.0 - a.dot(b).abs()) * NORMAL_WEIGHT;
    }
    if let (Some(a), Some(b)) = (signature.area, current.area) {
        total += (a - b).abs();
    }
    if let (Some(a), Some(b)) = (signature.length, current.length) {
        total += (a - b).abs();
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BooleanType, KernelRef, OwnedShape, PolyKernel, TessellatedMesh};
    use approx::assert_relative_eq;

    fn solid_result(kernel: &KernelRef, op_id: Uuid, shape: ShapeId) -> HashMap<Uuid, Arc<OpResult>> {
        let shape = OwnedShape::adopt(kernel, Ok(shape)).unwrap();
        let topo_map = TopoMap::capture(op_id, shape.id(), kernel.as_ref()).unwrap();
        HashMap::from([(
            op_id,
            Arc::new(OpResult::Solid {
                shape,
                mesh: TessellatedMesh::new(),
                topo_map,
            }),
        )])
    }

    fn box_result(kernel: &KernelRef, op_id: Uuid) -> HashMap<Uuid, Arc<OpResult>> {
        let shape = kernel
            .make_box(DVec3::new(0.0, 0.0, 5.0), DVec3::new(20.0, 10.0, 10.0))
            .unwrap();
        solid_result(kernel, op_id, shape)
    }

    fn top_face(results: &HashMap<Uuid, Arc<OpResult>>, op_id: Uuid) -> TopoRef {
        let OpResult::Solid { topo_map, .. } = results[&op_id].as_ref() else {
            panic!("expected a solid");
        };
        topo_map
            .faces
            .iter()
            .find(|f| f.signature.and_then(|s| s.normal) == Some(DVec3::Z))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_capture_box() {
        let kernel: KernelRef = Arc::new(PolyKernel::new());
        let op_id = Uuid::new_v4();
        let results = box_result(&kernel, op_id);
        let OpResult::Solid { topo_map, .. } = results[&op_id].as_ref() else {
            panic!("expected a solid");
        };
        assert_eq!(topo_map.faces.len(), 6);
        assert_eq!(topo_map.edges.len(), 12);
        assert_eq!(topo_map.vertices.len(), 8);
        let top = top_face(&results, op_id).signature.unwrap();
        assert_relative_eq!(top.area.unwrap(), 200.0, epsilon = 1e-9);
    }

    #[test]
    fn test_index_fast_path() {
        let kernel: KernelRef = Arc::new(PolyKernel::new());
        let op_id = Uuid::new_v4();
        let results = box_result(&kernel, op_id);
        let top = top_face(&results, op_id);

        let resolved = resolve_topo_ref(&top, &results, kernel.as_ref()).unwrap();
        assert_eq!(resolved.method, ResolveMethod::ByIndex);
        assert_eq!(resolved.index, top.index);

        let bare = TopoRef::by_index(op_id, TopoKind::Edge, 3);
        let resolved = resolve_topo_ref(&bare, &results, kernel.as_ref()).unwrap();
        assert_eq!(resolved.method, ResolveMethod::ByIndex);
        assert_eq!(resolved.index, 3);
    }

    #[test]
    fn test_in_bounds_index_wins_after_resize() {
        let kernel: KernelRef = Arc::new(PolyKernel::new());
        let op_id = Uuid::new_v4();
        let cube = kernel.make_box(DVec3::new(0.0, 0.0, 0.5), DVec3::ONE).unwrap();
        let top = top_face(&solid_result(&kernel, op_id, cube), op_id);
        assert_eq!(top.count, Some(6));

        // Same op rebuilt much wider: every face moved, the count did not
        let slab = kernel
            .make_box(DVec3::new(0.0, 0.0, 0.5), DVec3::new(100.0, 100.0, 1.0))
            .unwrap();
        let results = solid_result(&kernel, op_id, slab);
        let resolved = resolve_topo_ref(&top, &results, kernel.as_ref()).unwrap();
        assert_eq!(resolved.method, ResolveMethod::ByIndex);
        assert_eq!(resolved.index, top.index);
        assert_eq!(kernel.face_normal(resolved.handle).unwrap(), DVec3::Z);
        assert_relative_eq!(kernel.face_area(resolved.handle).unwrap(), 10_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_signature_fallback_when_topology_changes() {
        let poly = Arc::new(PolyKernel::new());
        let kernel: KernelRef = poly.clone();
        let op_id = Uuid::new_v4();
        let top = top_face(&box_result(&kernel, op_id), op_id);

        // The op now yields a box with a pocket, enumerated in another order
        let outer = kernel
            .make_box(DVec3::new(0.0, 0.0, 5.0), DVec3::new(20.0, 10.0, 10.0))
            .unwrap();
        let pocket = kernel.make_box(DVec3::new(0.0, 0.0, 5.0), DVec3::splat(2.0)).unwrap();
        let cut = kernel.boolean(outer, pocket, BooleanType::Subtract).unwrap();
        kernel.free(outer);
        kernel.free(pocket);
        poly.set_enumeration_rotation(1);
        let results = solid_result(&kernel, op_id, cut);
        assert_eq!(kernel.faces(cut).unwrap().len(), 12);

        let resolved = resolve_topo_ref(&top, &results, kernel.as_ref()).unwrap();
        assert_eq!(resolved.method, ResolveMethod::BySignature);
        assert_eq!(kernel.face_normal(resolved.handle).unwrap(), DVec3::Z);
        assert_relative_eq!(kernel.face_center(resolved.handle).unwrap().z, 10.0, epsilon = 1e-9);
        assert_relative_eq!(kernel.face_area(resolved.handle).unwrap(), 200.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reordering_alone_keeps_the_index() {
        let poly = Arc::new(PolyKernel::new());
        let kernel: KernelRef = poly.clone();
        let op_id = Uuid::new_v4();
        let results = box_result(&kernel, op_id);
        let top = top_face(&results, op_id);

        poly.set_enumeration_rotation(1);
        let resolved = resolve_topo_ref(&top, &results, kernel.as_ref()).unwrap();
        assert_eq!(resolved.method, ResolveMethod::ByIndex);
        assert_eq!(resolved.index, top.index);
    }

    #[test]
    fn test_out_of_bounds_uses_signature() {
        let kernel: KernelRef = Arc::new(PolyKernel::new());
        let op_id = Uuid::new_v4();
        let results = box_result(&kernel, op_id);
        let mut top = top_face(&results, op_id);
        top.index = 99;

        let resolved = resolve_topo_ref(&top, &results, kernel.as_ref()).unwrap();
        assert_eq!(resolved.method, ResolveMethod::BySignature);
        assert_eq!(kernel.face_normal(resolved.handle).unwrap(), DVec3::Z);
    }

    #[test]
    fn test_unresolvable() {
        let kernel: KernelRef = Arc::new(PolyKernel::new());
        let op_id = Uuid::new_v4();
        let results = box_result(&kernel, op_id);

        let stale = TopoRef::by_index(op_id, TopoKind::Face, 6);
        assert!(resolve_topo_ref(&stale, &results, kernel.as_ref()).is_none());

        let empty_signature = TopoRef {
            signature: Some(TopoSignature::default()),
            ..stale.clone()
        };
        assert!(resolve_topo_ref(&empty_signature, &results, kernel.as_ref()).is_none());

        let missing = TopoRef::by_index(Uuid::new_v4(), TopoKind::Face, 0);
        assert!(resolve_topo_ref(&missing, &results, kernel.as_ref()).is_none());
    }
}
