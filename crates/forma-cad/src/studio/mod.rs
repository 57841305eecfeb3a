//! Part studio
//!
//! Owns planes, sketches and the op tree, plus the cached result and
//! evaluation state of every op. All edits return a new studio; results are
//! shared between the old and the new one through `Arc`.

mod data;

pub use data::PartStudioData;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::op::{
    EdgeSelection, EvalScope, KernelContext, Op, OpError, OpKind, OpNode, OpPatch, OpResult, evaluate,
};
use crate::param::ParamEnv;
use crate::sketch::{Plane, Sketch, SketchError};

/// Errors from op-tree edits
#[derive(Debug, Clone, Error)]
pub enum StudioError {
    #[error("Op not found: {0}")]
    OpNotFound(Uuid),

    #[error("Op already exists: {0}")]
    DuplicateOp(Uuid),

    #[error("Sketch not found: {0}")]
    SketchNotFound(Uuid),

    #[error("Sketch {0} already has a sketch op")]
    SketchAlreadyOwned(Uuid),

    #[error("Plane not found: {0}")]
    PlaneNotFound(Uuid),

    #[error("Op {op} references {reference}, which is not an earlier op")]
    UnknownReference { op: Uuid, reference: Uuid },

    #[error("Op {op} selects an edge of {edge_op}, but works on {target}")]
    ForeignEdge { op: Uuid, edge_op: Uuid, target: Uuid },

    #[error("Op {op} cannot move to index {index}")]
    InvalidMove { op: Uuid, index: usize },

    #[error("Sketch error: {0}")]
    Sketch(#[from] SketchError),
}

/// Evaluation state of one op
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpState {
    /// Not evaluated since the op or something before it changed
    Stale,
    Evaluated,
    Failed(String),
    Suppressed,
    /// A dependency has no result
    Blocked(Uuid),
}

/// Summary of one rebuild
#[derive(Debug, Default)]
pub struct RebuildReport {
    /// Index the rebuild started from
    pub start: usize,
    pub evaluated: Vec<Uuid>,
    pub failed: Vec<(Uuid, OpError)>,
    pub blocked: Vec<Uuid>,
    pub suppressed: Vec<Uuid>,
}

impl RebuildReport {
    /// Every op from `start` on produced a result or was suppressed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

/// Sketches, op tree and cached results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PartStudioData", into = "PartStudioData")]
pub struct PartStudio {
    pub id: Uuid,
    pub name: String,
    planes: BTreeMap<Uuid, Plane>,
    sketches: BTreeMap<Uuid, Arc<Sketch>>,
    op_graph: HashMap<Uuid, OpNode>,
    op_order: Vec<Uuid>,
    results: HashMap<Uuid, Arc<OpResult>>,
    status: HashMap<Uuid, OpState>,
}

impl PartStudio {
    /// Create a studio with the Top, Front and Right planes
    pub fn new(name: impl Into<String>) -> Self {
        let planes = [Plane::top(), Plane::front(), Plane::right()]
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        Self::with_planes(Uuid::new_v4(), name.into(), planes)
    }

    fn with_planes(id: Uuid, name: String, planes: BTreeMap<Uuid, Plane>) -> Self {
        Self {
            id,
            name,
            planes,
            sketches: BTreeMap::new(),
            op_graph: HashMap::new(),
            op_order: Vec::new(),
            results: HashMap::new(),
            status: HashMap::new(),
        }
    }

    // ============== Planes and Sketches ==============

    /// Add a construction plane
    pub fn add_plane(&self, plane: Plane) -> (Self, Uuid) {
        let id = plane.id;
        let mut next = self.clone();
        next.planes.insert(id, plane);
        (next, id)
    }

    /// Create an empty sketch on `plane_id` together with its sketch op
    pub fn add_sketch(
        &self,
        plane_id: Uuid,
        name: impl Into<String>,
    ) -> Result<(Self, Uuid, Uuid), StudioError> {
        if !self.planes.contains_key(&plane_id) {
            return Err(StudioError::PlaneNotFound(plane_id));
        }
        let name = name.into();
        let sketch = Sketch::new(name.clone(), plane_id);
        let sketch_id = sketch.id;
        let mut next = self.clone();
        next.sketches.insert(sketch_id, Arc::new(sketch));
        let op_id = next.push_op(Op::new(name, OpKind::Sketch { sketch_id }))?;
        Ok((next, sketch_id, op_id))
    }

    /// Replace a sketch with an edited version of it
    ///
    /// Invalidates its sketch op and everything after it.
    pub fn with_sketch(&self, sketch: Sketch) -> Result<Self, StudioError> {
        if !self.sketches.contains_key(&sketch.id) {
            return Err(StudioError::SketchNotFound(sketch.id));
        }
        if !self.planes.contains_key(&sketch.plane_id) {
            return Err(StudioError::PlaneNotFound(sketch.plane_id));
        }
        sketch.validate()?;
        let mut next = self.clone();
        if let Some(index) = self.sketch_op_index(sketch.id, self.op_order.len()) {
            next.invalidate_from(index);
        }
        next.sketches.insert(sketch.id, Arc::new(sketch));
        Ok(next)
    }

    // ============== Op Tree Editing ==============

    /// Append an op
    ///
    /// Every op it references must already be in the studio.
    pub fn add_op(&self, op: Op) -> Result<(Self, Uuid), StudioError> {
        let mut next = self.clone();
        let id = next.push_op(op)?;
        Ok((next, id))
    }

    pub(crate) fn push_op(&mut self, op: Op) -> Result<Uuid, StudioError> {
        if self.op_graph.contains_key(&op.id) {
            return Err(StudioError::DuplicateOp(op.id));
        }
        let deps = self.resolve_deps(op.id, &op.kind, self.op_order.len())?;
        let id = op.id;
        tracing::debug!("adding {} op '{}'", op.kind.type_name(), op.name);
        self.op_graph.insert(id, OpNode { op, deps });
        self.op_order.push(id);
        Ok(id)
    }

    /// Remove an op and every op that depends on it, directly or not
    ///
    /// Sketches owned by removed sketch ops are removed too.
    pub fn remove_op(&self, id: Uuid) -> Result<Self, StudioError> {
        let index = self.index_of(id).ok_or(StudioError::OpNotFound(id))?;
        let mut removed = BTreeSet::from([id]);
        for later in &self.op_order[index + 1..] {
            if self.op_graph[later].deps.iter().any(|d| removed.contains(d)) {
                removed.insert(*later);
            }
        }

        let mut next = self.clone();
        for op_id in &removed {
            if let Some(node) = next.op_graph.remove(op_id)
                && let OpKind::Sketch { sketch_id } = node.op.kind
            {
                next.sketches.remove(&sketch_id);
            }
            next.results.remove(op_id);
            next.status.remove(op_id);
        }
        next.op_order.retain(|op_id| !removed.contains(op_id));
        tracing::debug!("removed {} ops from studio {}", removed.len(), self.name);
        Ok(next)
    }

    /// Apply a partial update to an op
    ///
    /// References are re-validated; the op and everything after it become
    /// stale.
    pub fn update_op(&self, id: Uuid, patch: OpPatch) -> Result<Self, StudioError> {
        let index = self.index_of(id).ok_or(StudioError::OpNotFound(id))?;
        let mut op = self.op_graph[&id].op.clone();
        if let Some(name) = patch.name {
            op.name = name;
        }
        if let Some(suppressed) = patch.suppressed {
            op.suppressed = suppressed;
        }
        if let Some(kind) = patch.kind {
            op.kind = kind;
        }
        let deps = self.resolve_deps(id, &op.kind, index)?;

        let mut next = self.clone();
        next.op_graph.insert(id, OpNode { op, deps });

        // Later ops may now rely on a different sketch op, or on none
        for (offset, later) in self.op_order[index + 1..].iter().enumerate() {
            let kind = next.op_graph[later].op.kind.clone();
            let deps = next.resolve_deps(*later, &kind, index + 1 + offset)?;
            if let Some(node) = next.op_graph.get_mut(later) {
                node.deps = deps;
            }
        }
        next.invalidate_from(index);
        Ok(next)
    }

    /// Whether `id` could move to `new_index` without preceding any of its
    /// dependencies or following any of its dependents
    pub fn can_move_op(&self, id: Uuid, new_index: usize) -> bool {
        self.moved_order(id, new_index).is_some()
    }

    /// Move an op to `new_index`
    pub fn move_op(&self, id: Uuid, new_index: usize) -> Result<Self, StudioError> {
        let old_index = self.index_of(id).ok_or(StudioError::OpNotFound(id))?;
        let order = self
            .moved_order(id, new_index)
            .ok_or(StudioError::InvalidMove { op: id, index: new_index })?;
        let mut next = self.clone();
        next.invalidate_from(old_index.min(new_index));
        next.op_order = order;
        Ok(next)
    }

    fn moved_order(&self, id: Uuid, new_index: usize) -> Option<Vec<Uuid>> {
        let old_index = self.index_of(id)?;
        if new_index >= self.op_order.len() {
            return None;
        }
        let mut order = self.op_order.clone();
        order.remove(old_index);
        order.insert(new_index, id);

        let positions: HashMap<Uuid, usize> =
            order.iter().enumerate().map(|(i, op)| (*op, i)).collect();
        let valid = order.iter().enumerate().all(|(i, op)| {
            self.op_graph[op]
                .deps
                .iter()
                .all(|d| positions.get(d).is_some_and(|p| *p < i))
        });
        valid.then_some(order)
    }

    /// Ops `kind` reads from, all of which must come before `index`
    fn resolve_deps(&self, op: Uuid, kind: &OpKind, index: usize) -> Result<BTreeSet<Uuid>, StudioError> {
        let earlier = &self.op_order[..index.min(self.op_order.len())];
        let mut deps = BTreeSet::new();
        for reference in kind.referenced_ops() {
            if !earlier.contains(&reference) {
                return Err(StudioError::UnknownReference { op, reference });
            }
            deps.insert(reference);
        }

        match kind {
            OpKind::Sketch { sketch_id } => {
                let sketch = self
                    .sketches
                    .get(sketch_id)
                    .ok_or(StudioError::SketchNotFound(*sketch_id))?;
                if !self.planes.contains_key(&sketch.plane_id) {
                    return Err(StudioError::PlaneNotFound(sketch.plane_id));
                }
                let owner = self.op_order.iter().find(|other| {
                    **other != op
                        && matches!(self.op_graph[*other].op.kind, OpKind::Sketch { sketch_id: s } if s == *sketch_id)
                });
                if owner.is_some() {
                    return Err(StudioError::SketchAlreadyOwned(*sketch_id));
                }
            }
            OpKind::Fillet {
                target,
                edges: EdgeSelection::Refs(edges),
                ..
            }
            | OpKind::Chamfer {
                target,
                edges: EdgeSelection::Refs(edges),
                ..
            } => {
                if let Some(edge) = edges.iter().find(|e| e.op_id != *target) {
                    return Err(StudioError::ForeignEdge {
                        op,
                        edge_op: edge.op_id,
                        target: *target,
                    });
                }
            }
            _ => {
                if let Some(sketch_id) = kind.sketch_id() {
                    let owner = self
                        .sketch_op_index(sketch_id, index)
                        .ok_or(StudioError::SketchNotFound(sketch_id))?;
                    deps.insert(self.op_order[owner]);
                }
            }
        }
        Ok(deps)
    }

    /// Index of the sketch op owning `sketch_id`, searching before `limit`
    fn sketch_op_index(&self, sketch_id: Uuid, limit: usize) -> Option<usize> {
        self.op_order[..limit.min(self.op_order.len())]
            .iter()
            .position(|id| {
                matches!(self.op_graph[id].op.kind, OpKind::Sketch { sketch_id: s } if s == sketch_id)
            })
    }

    /// Drop results and status of every op from `index` on
    fn invalidate_from(&mut self, index: usize) {
        for id in self.op_order.iter().skip(index) {
            self.results.remove(id);
            self.status.remove(id);
        }
    }

    /// Copy with every cached result dropped, as after a parameter change
    pub fn invalidated(&self) -> Self {
        let mut next = self.clone();
        next.invalidate_from(0);
        next
    }

    // ============== Rebuild ==============

    /// Evaluate every op from the start
    pub fn rebuild(&self, env: &ParamEnv, ctx: &mut KernelContext) -> (Self, RebuildReport) {
        self.rebuild_from(0, env, ctx)
    }

    /// Keep the results of ops before `start` and evaluate the rest
    ///
    /// Evaluation reads only ops, sketches, planes, `env`, the kernel and the
    /// kept results, so ops from `start` on end up exactly as a full rebuild
    /// would leave them.
    #[tracing::instrument(skip_all, fields(studio = %self.name, start = start))]
    pub fn rebuild_from(
        &self,
        start: usize,
        env: &ParamEnv,
        ctx: &mut KernelContext,
    ) -> (Self, RebuildReport) {
        let start = start.min(self.op_order.len());
        let mut next = self.clone();
        next.invalidate_from(start);
        let mut report = RebuildReport {
            start,
            ..RebuildReport::default()
        };

        for index in start..next.op_order.len() {
            let id = next.op_order[index];
            let node = &next.op_graph[&id];
            if node.op.suppressed {
                next.status.insert(id, OpState::Suppressed);
                report.suppressed.push(id);
                continue;
            }

            let misplaced = node
                .deps
                .iter()
                .find(|d| !next.op_order[..index].contains(*d))
                .copied();
            debug_assert!(misplaced.is_none(), "op {id} depends on a later op");
            if let Some(dependency) = misplaced {
                let err = OpError::OrderViolation { op: id, dependency };
                next.status.insert(id, OpState::Failed(err.to_string()));
                report.failed.push((id, err));
                continue;
            }

            if let Some(missing) = node.deps.iter().find(|d| !next.results.contains_key(*d)) {
                tracing::debug!("op '{}' blocked by {}", node.op.name, missing);
                next.status.insert(id, OpState::Blocked(*missing));
                report.blocked.push(id);
                continue;
            }

            let outcome = {
                let scope = EvalScope {
                    planes: &next.planes,
                    sketches: &next.sketches,
                    results: &next.results,
                    env,
                };
                evaluate(&node.op, &scope, ctx)
            };
            match outcome {
                Ok(result) => {
                    next.results.insert(id, Arc::new(result));
                    next.status.insert(id, OpState::Evaluated);
                    report.evaluated.push(id);
                }
                Err(e) => {
                    tracing::warn!("Op {} failed: {}", next.op_graph[&id].op.name, e);
                    next.status.insert(id, OpState::Failed(e.to_string()));
                    report.failed.push((id, e));
                }
            }
        }

        tracing::info!(
            "rebuilt studio {} from op {}: {} evaluated, {} failed, {} blocked",
            next.name,
            start,
            report.evaluated.len(),
            report.failed.len(),
            report.blocked.len()
        );
        (next, report)
    }

    // ============== Queries ==============

    pub fn op(&self, id: Uuid) -> Option<&Op> {
        self.op_graph.get(&id).map(|n| &n.op)
    }

    pub fn node(&self, id: Uuid) -> Option<&OpNode> {
        self.op_graph.get(&id)
    }

    /// Ops in rebuild order
    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.op_order.iter().map(|id| &self.op_graph[id].op)
    }

    pub fn op_order(&self) -> &[Uuid] {
        &self.op_order
    }

    pub fn index_of(&self, id: Uuid) -> Option<usize> {
        self.op_order.iter().position(|op| *op == id)
    }

    pub fn len(&self) -> usize {
        self.op_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.op_order.is_empty()
    }

    pub fn op_state(&self, id: Uuid) -> Option<OpState> {
        if !self.op_graph.contains_key(&id) {
            return None;
        }
        Some(self.status.get(&id).cloned().unwrap_or(OpState::Stale))
    }

    pub fn result(&self, id: Uuid) -> Option<&Arc<OpResult>> {
        self.results.get(&id)
    }

    pub fn results(&self) -> &HashMap<Uuid, Arc<OpResult>> {
        &self.results
    }

    pub fn sketch(&self, id: Uuid) -> Option<&Arc<Sketch>> {
        self.sketches.get(&id)
    }

    pub fn sketches(&self) -> impl Iterator<Item = &Arc<Sketch>> {
        self.sketches.values()
    }

    pub fn plane(&self, id: Uuid) -> Option<&Plane> {
        self.planes.get(&id)
    }

    pub fn plane_by_name(&self, name: &str) -> Option<&Plane> {
        self.planes.values().find(|p| p.name == name)
    }

    pub fn planes(&self) -> impl Iterator<Item = &Plane> {
        self.planes.values()
    }

    /// Solid results not consumed by a later evaluated op, in op order
    pub fn visible_bodies(&self) -> Vec<(Uuid, &Arc<OpResult>)> {
        let consumed: BTreeSet<Uuid> = self
            .ops()
            .filter(|op| self.results.contains_key(&op.id))
            .flat_map(|op| op.kind.consumed_bodies())
            .collect();
        self.op_order
            .iter()
            .filter(|id| !consumed.contains(id))
            .filter_map(|id| self.results.get(id).map(|r| (*id, r)))
            .filter(|(_, r)| r.shape().is_some())
            .collect()
    }
}
