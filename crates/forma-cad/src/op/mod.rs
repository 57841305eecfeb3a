//! Operations
//!
//! One step of a part studio's feature tree. [`OpKind`] is a closed set;
//! graph bookkeeping lives in [`OpNode`] beside it, not inside the variants.

mod eval;

pub use eval::{EvalScope, KernelContext, evaluate, plane_axis};

use std::collections::BTreeSet;
use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::kernel::{Axis3D, BooleanType, CadError, OwnedShape, ShapeId, TessellatedMesh};
use crate::param::{Dimension, ParamError};
use crate::sketch::{Sketch, SketchError};
use crate::topo::{TopoMap, TopoRef};

/// Why an op produced no result
#[derive(Debug, Clone, Error)]
pub enum OpError {
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("CAD kernel error: {0}")]
    Kernel(#[from] CadError),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("Sketch error: {0}")]
    Sketch(#[from] SketchError),

    #[error("Op {op} depends on {dependency}, which does not precede it")]
    OrderViolation { op: Uuid, dependency: Uuid },
}

/// Direction for extrusion, relative to the profile normal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtrudeDirection {
    /// Along the profile normal
    #[default]
    Normal,
    /// Against the profile normal
    Reverse,
    /// Half the depth to each side
    Symmetric,
}

/// Where an extrude or revolve takes its profile from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Profile {
    /// Closed loops of a sketch
    Sketch { sketch_id: Uuid },
    /// A planar face of an earlier result
    Face(TopoRef),
}

/// Combine a new solid with an earlier body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub target: Uuid,
    pub operation: BooleanType,
}

/// Edges a fillet or chamfer applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdgeSelection {
    All,
    Refs(Vec<TopoRef>),
}

/// Primitive solids
///
/// Box, cylinder and cone sit on `origin` and grow along +Z; the sphere is
/// centered on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Box {
        width: Dimension,
        depth: Dimension,
        height: Dimension,
    },
    Cylinder {
        radius: Dimension,
        height: Dimension,
    },
    Sphere {
        radius: Dimension,
    },
    Cone {
        bottom_radius: Dimension,
        top_radius: Dimension,
        height: Dimension,
    },
}

/// Type-specific part of an op
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    /// Solve a sketch
    Sketch { sketch_id: Uuid },

    Primitive {
        shape: PrimitiveKind,
        #[serde(default)]
        origin: DVec3,
    },

    Extrude {
        profile: Profile,
        depth: Dimension,
        #[serde(default)]
        direction: ExtrudeDirection,
        #[serde(default)]
        merge: Option<Merge>,
    },

    Revolve {
        profile: Profile,
        axis: Axis3D,
        /// Degrees
        angle: Dimension,
        #[serde(default)]
        merge: Option<Merge>,
    },

    Fillet {
        target: Uuid,
        edges: EdgeSelection,
        radius: Dimension,
    },

    Chamfer {
        target: Uuid,
        edges: EdgeSelection,
        distance: Dimension,
    },

    Boolean {
        target: Uuid,
        tool: Uuid,
        operation: BooleanType,
    },

    Transform {
        target: Uuid,
        translation: DVec3,
        rotation_axis: DVec3,
        /// Degrees
        rotation_angle: Dimension,
    },
}

impl OpKind {
    /// Get the type name of this op
    pub fn type_name(&self) -> &'static str {
        match self {
            OpKind::Sketch { .. } => "Sketch",
            OpKind::Primitive { shape, .. } => match shape {
                PrimitiveKind::Box { .. } => "Box",
                PrimitiveKind::Cylinder { .. } => "Cylinder",
                PrimitiveKind::Sphere { .. } => "Sphere",
                PrimitiveKind::Cone { .. } => "Cone",
            },
            OpKind::Extrude { .. } => "Extrude",
            OpKind::Revolve { .. } => "Revolve",
            OpKind::Fillet { .. } => "Fillet",
            OpKind::Chamfer { .. } => "Chamfer",
            OpKind::Boolean { .. } => "Boolean",
            OpKind::Transform { .. } => "Transform",
        }
    }

    /// Sketch referenced as a profile or owned by a sketch op
    pub fn sketch_id(&self) -> Option<Uuid> {
        match self {
            OpKind::Sketch { sketch_id }
            | OpKind::Extrude {
                profile: Profile::Sketch { sketch_id },
                ..
            }
            | OpKind::Revolve {
                profile: Profile::Sketch { sketch_id },
                ..
            } => Some(*sketch_id),
            _ => None,
        }
    }

    /// Ops referenced directly by id (sketch profiles excluded)
    pub fn referenced_ops(&self) -> BTreeSet<Uuid> {
        let mut refs = BTreeSet::new();
        match self {
            OpKind::Sketch { .. } | OpKind::Primitive { .. } => {}
            OpKind::Extrude { profile, merge, .. } | OpKind::Revolve { profile, merge, .. } => {
                if let Profile::Face(face) = profile {
                    refs.insert(face.op_id);
                }
                if let Some(merge) = merge {
                    refs.insert(merge.target);
                }
            }
            OpKind::Fillet { target, edges, .. } | OpKind::Chamfer { target, edges, .. } => {
                refs.insert(*target);
                if let EdgeSelection::Refs(edges) = edges {
                    refs.extend(edges.iter().map(|e| e.op_id));
                }
            }
            OpKind::Boolean { target, tool, .. } => {
                refs.insert(*target);
                refs.insert(*tool);
            }
            OpKind::Transform { target, .. } => {
                refs.insert(*target);
            }
        }
        refs
    }

    /// Bodies this op consumes (its own output replaces them)
    pub fn consumed_bodies(&self) -> Vec<Uuid> {
        match self {
            OpKind::Extrude { merge, .. } | OpKind::Revolve { merge, .. } => {
                merge.iter().map(|m| m.target).collect()
            }
            OpKind::Fillet { target, .. }
            | OpKind::Chamfer { target, .. }
            | OpKind::Transform { target, .. } => vec![*target],
            OpKind::Boolean { target, tool, .. } => vec![*target, *tool],
            OpKind::Sketch { .. } | OpKind::Primitive { .. } => Vec::new(),
        }
    }
}

/// A feature-tree operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub suppressed: bool,
    pub kind: OpKind,
}

impl Op {
    pub fn new(name: impl Into<String>, kind: OpKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            suppressed: false,
            kind,
        }
    }

    /// Create a box primitive
    pub fn make_box(
        name: impl Into<String>,
        width: impl Into<Dimension>,
        depth: impl Into<Dimension>,
        height: impl Into<Dimension>,
    ) -> Self {
        Self::new(
            name,
            OpKind::Primitive {
                shape: PrimitiveKind::Box {
                    width: width.into(),
                    depth: depth.into(),
                    height: height.into(),
                },
                origin: DVec3::ZERO,
            },
        )
    }

    /// Create a cylinder primitive
    pub fn cylinder(
        name: impl Into<String>,
        radius: impl Into<Dimension>,
        height: impl Into<Dimension>,
    ) -> Self {
        Self::new(
            name,
            OpKind::Primitive {
                shape: PrimitiveKind::Cylinder {
                    radius: radius.into(),
                    height: height.into(),
                },
                origin: DVec3::ZERO,
            },
        )
    }

    /// Extrude a sketch along its plane normal
    pub fn extrude(name: impl Into<String>, sketch_id: Uuid, depth: impl Into<Dimension>) -> Self {
        Self::new(
            name,
            OpKind::Extrude {
                profile: Profile::Sketch { sketch_id },
                depth: depth.into(),
                direction: ExtrudeDirection::Normal,
                merge: None,
            },
        )
    }

    /// Fillet every edge of `target`
    pub fn fillet_all(name: impl Into<String>, target: Uuid, radius: impl Into<Dimension>) -> Self {
        Self::new(
            name,
            OpKind::Fillet {
                target,
                edges: EdgeSelection::All,
                radius: radius.into(),
            },
        )
    }

    /// Boolean of two earlier bodies
    pub fn boolean(name: impl Into<String>, target: Uuid, tool: Uuid, operation: BooleanType) -> Self {
        Self::new(
            name,
            OpKind::Boolean {
                target,
                tool,
                operation,
            },
        )
    }

    /// Translate an earlier body
    pub fn translate(name: impl Into<String>, target: Uuid, translation: DVec3) -> Self {
        Self::new(
            name,
            OpKind::Transform {
                target,
                translation,
                rotation_axis: DVec3::Z,
                rotation_angle: Dimension::new(0.0),
            },
        )
    }
}

/// An op plus its resolved predecessor set
#[derive(Debug, Clone, PartialEq)]
pub struct OpNode {
    pub op: Op,
    /// Ops this op reads results from
    pub deps: BTreeSet<Uuid>,
}

/// Partial update for an op
#[derive(Debug, Clone, Default)]
pub struct OpPatch {
    pub name: Option<String>,
    pub suppressed: Option<bool>,
    pub kind: Option<OpKind>,
}

impl OpPatch {
    pub fn suppress(suppressed: bool) -> Self {
        Self {
            suppressed: Some(suppressed),
            ..Self::default()
        }
    }

    pub fn kind(kind: OpKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }
}

/// What an evaluated op produced
///
/// Shared as `Arc<OpResult>`; the solid's kernel shape is released when the
/// last reference goes away.
#[derive(Debug)]
pub enum OpResult {
    /// The solved sketch
    Sketch(Arc<Sketch>),
    Solid {
        shape: OwnedShape,
        mesh: TessellatedMesh,
        topo_map: TopoMap,
    },
}

impl OpResult {
    /// Kernel handle of a solid result
    pub fn shape(&self) -> Option<ShapeId> {
        match self {
            OpResult::Solid { shape, .. } => Some(shape.id()),
            OpResult::Sketch(_) => None,
        }
    }

    pub fn mesh(&self) -> Option<&TessellatedMesh> {
        match self {
            OpResult::Solid { mesh, .. } => Some(mesh),
            OpResult::Sketch(_) => None,
        }
    }

    pub fn topo_map(&self) -> Option<&TopoMap> {
        match self {
            OpResult::Solid { topo_map, .. } => Some(topo_map),
            OpResult::Sketch(_) => None,
        }
    }

    pub fn sketch(&self) -> Option<&Arc<Sketch>> {
        match self {
            OpResult::Sketch(sketch) => Some(sketch),
            OpResult::Solid { .. } => None,
        }
    }

    /// Whether two results carry the same geometry (handles may differ)
    pub fn same_geometry(&self, other: &OpResult) -> bool {
        match (self, other) {
            (OpResult::Sketch(a), OpResult::Sketch(b)) => a == b,
            (
                OpResult::Solid {
                    mesh: ma,
                    topo_map: ta,
                    ..
                },
                OpResult::Solid {
                    mesh: mb,
                    topo_map: tb,
                    ..
                },
            ) => ma == mb && ta == tb,
            _ => false,
        }
    }
}
