//! Op evaluation
//!
//! Each evaluator reads the op, the studio's sketches and planes, the
//! parameter environment and the results of earlier ops, and calls the
//! kernel. Every handle the kernel returns is wrapped in an [`OwnedShape`]
//! at once; intermediates drop at the end of the evaluator and only the
//! final solid moves into the [`OpResult`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glam::{DMat4, DVec3};
use uuid::Uuid;

use super::{EdgeSelection, ExtrudeDirection, Merge, Op, OpError, OpKind, OpResult, PrimitiveKind, Profile};
use crate::config::{FormaConfig, RebuildConfig};
use crate::kernel::{
    Axis3D, BooleanType, CadError, GeometryKernel, KernelRef, OwnedShape, PolyKernel, ShapeId,
};
use crate::param::{Dimension, ParamEnv};
use crate::sketch::{Plane, Sketch, profile_loops, solve_sketch};
use crate::solver::{NewtonSolver, SolverCapability};
use crate::topo::{TopoMap, resolve_topo_ref};

/// The external capabilities a rebuild runs against
pub struct KernelContext {
    pub kernel: KernelRef,
    pub solver: Box<dyn SolverCapability>,
    pub config: RebuildConfig,
}

impl KernelContext {
    pub fn new(kernel: KernelRef, solver: Box<dyn SolverCapability>) -> Self {
        Self {
            kernel,
            solver,
            config: RebuildConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RebuildConfig) -> Self {
        self.config = config;
        self
    }

    /// [`PolyKernel`] and [`NewtonSolver`] set up from `config`
    pub fn reference(config: &FormaConfig) -> Self {
        let kernel: KernelRef = Arc::new(PolyKernel::with_segments(config.rebuild.circle_segments));
        Self {
            kernel,
            solver: Box::new(NewtonSolver::with_config(config.solver.clone())),
            config: config.rebuild.clone(),
        }
    }
}

impl std::fmt::Debug for KernelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelContext")
            .field("kernel", &self.kernel.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Read-only inputs of one op evaluation
#[derive(Clone, Copy)]
pub struct EvalScope<'a> {
    pub planes: &'a BTreeMap<Uuid, Plane>,
    pub sketches: &'a BTreeMap<Uuid, Arc<Sketch>>,
    /// Results of ops evaluated so far
    pub results: &'a HashMap<Uuid, Arc<OpResult>>,
    pub env: &'a ParamEnv,
}

impl EvalScope<'_> {
    /// Solid of an earlier op
    fn body(&self, op_id: Uuid) -> Result<ShapeId, OpError> {
        let result = self
            .results
            .get(&op_id)
            .ok_or_else(|| OpError::MissingInput(format!("op {op_id} has no result")))?;
        result
            .shape()
            .ok_or_else(|| OpError::MissingInput(format!("op {op_id} is not a solid")))
    }

    /// Solved copy of a sketch, as produced by its sketch op
    fn solved_sketch(&self, sketch_id: Uuid) -> Result<&Arc<Sketch>, OpError> {
        self.results
            .values()
            .filter_map(|r| r.sketch())
            .find(|s| s.id == sketch_id)
            .ok_or_else(|| OpError::MissingInput(format!("sketch {sketch_id} has not been solved")))
    }

    fn plane(&self, id: Uuid) -> Result<&Plane, OpError> {
        self.planes
            .get(&id)
            .ok_or_else(|| OpError::MissingInput(format!("plane {id} not found")))
    }

    fn value(&self, dim: &Dimension) -> Result<f64, OpError> {
        Ok(dim.resolve(self.env)?)
    }
}

/// Evaluate one op
pub fn evaluate(op: &Op, scope: &EvalScope<'_>, ctx: &mut KernelContext) -> Result<OpResult, OpError> {
    let kernel = Arc::clone(&ctx.kernel);
    let shape = match &op.kind {
        OpKind::Sketch { sketch_id } => return eval_sketch(*sketch_id, scope, ctx),
        OpKind::Primitive { shape, origin } => eval_primitive(shape, *origin, scope, &kernel)?,
        OpKind::Extrude {
            profile,
            depth,
            direction,
            merge,
        } => {
            let depth = scope.value(depth)?;
            if !(depth > 0.0) {
                return Err(CadError::InvalidParameter(format!("extrude depth must be positive, got {depth}")).into());
            }
            let faces = ProfileFaces::build(profile, scope, ctx)?;
            let n = faces.normal;
            let (offset, vector) = match direction {
                ExtrudeDirection::Normal => (DVec3::ZERO, n * depth),
                ExtrudeDirection::Reverse => (DVec3::ZERO, -n * depth),
                ExtrudeDirection::Symmetric => (-n * depth * 0.5, n * depth),
            };
            let faces = faces.shifted(offset, &kernel)?;
            let solid = faces.sweep(&kernel, |face| kernel.extrude(face, vector))?;
            apply_merge(solid, merge, scope, &kernel)?
        }
        OpKind::Revolve {
            profile,
            axis,
            angle,
            merge,
        } => {
            let angle = scope.value(angle)?.to_radians();
            let faces = ProfileFaces::build(profile, scope, ctx)?;
            let solid = faces.sweep(&kernel, |face| kernel.revolve(face, axis, angle))?;
            apply_merge(solid, merge, scope, &kernel)?
        }
        OpKind::Fillet {
            target,
            edges,
            radius,
        } => {
            let body = scope.body(*target)?;
            let edges = select_edges(*target, body, edges, scope, kernel.as_ref())?;
            let radius = scope.value(radius)?;
            OwnedShape::adopt(&kernel, kernel.fillet(body, &edges, radius))?
        }
        OpKind::Chamfer {
            target,
            edges,
            distance,
        } => {
            let body = scope.body(*target)?;
            let edges = select_edges(*target, body, edges, scope, kernel.as_ref())?;
            let distance = scope.value(distance)?;
            OwnedShape::adopt(&kernel, kernel.chamfer(body, &edges, distance))?
        }
        OpKind::Boolean {
            target,
            tool,
            operation,
        } => {
            let (target, tool) = (scope.body(*target)?, scope.body(*tool)?);
            OwnedShape::adopt(&kernel, kernel.boolean(target, tool, *operation))?
        }
        OpKind::Transform {
            target,
            translation,
            rotation_axis,
            rotation_angle,
        } => {
            let body = scope.body(*target)?;
            let angle = scope.value(rotation_angle)?.to_radians();
            let rotation = if angle == 0.0 {
                DMat4::IDENTITY
            } else {
                let axis = rotation_axis.try_normalize().ok_or_else(|| {
                    CadError::InvalidParameter("rotation axis must be non-zero".into())
                })?;
                DMat4::from_axis_angle(axis, angle)
            };
            let matrix = DMat4::from_translation(*translation) * rotation;
            OwnedShape::adopt(&kernel, kernel.transform(body, &matrix))?
        }
    };

    let mesh = kernel.mesh(shape.id(), ctx.config.mesh_deflection)?;
    let topo_map = TopoMap::capture(op.id, shape.id(), kernel.as_ref())?;
    tracing::debug!(
        "{} '{}' produced {} faces, {} triangles",
        op.kind.type_name(),
        op.name,
        topo_map.faces.len(),
        mesh.triangle_count()
    );
    Ok(OpResult::Solid {
        shape,
        mesh,
        topo_map,
    })
}

fn eval_sketch(
    sketch_id: Uuid,
    scope: &EvalScope<'_>,
    ctx: &mut KernelContext,
) -> Result<OpResult, OpError> {
    let sketch = scope
        .sketches
        .get(&sketch_id)
        .ok_or_else(|| OpError::MissingInput(format!("sketch {sketch_id} not found")))?;
    scope.plane(sketch.plane_id)?;
    let solution = solve_sketch(sketch, scope.env, ctx.solver.as_mut())?;
    if !solution.success {
        tracing::warn!("sketch {} solved with status {:?}", sketch.name, solution.status);
    }
    Ok(OpResult::Sketch(Arc::new(sketch.with_solution(&solution))))
}

fn eval_primitive(
    shape: &PrimitiveKind,
    origin: DVec3,
    scope: &EvalScope<'_>,
    kernel: &KernelRef,
) -> Result<OwnedShape, OpError> {
    let id = match shape {
        PrimitiveKind::Box {
            width,
            depth,
            height,
        } => {
            let size = DVec3::new(scope.value(width)?, scope.value(depth)?, scope.value(height)?);
            kernel.make_box(origin + DVec3::Z * size.z * 0.5, size)
        }
        PrimitiveKind::Cylinder { radius, height } => {
            kernel.make_cylinder(origin, DVec3::Z, scope.value(radius)?, scope.value(height)?)
        }
        PrimitiveKind::Sphere { radius } => kernel.make_sphere(origin, scope.value(radius)?),
        PrimitiveKind::Cone {
            bottom_radius,
            top_radius,
            height,
        } => kernel.make_cone(
            origin,
            DVec3::Z,
            scope.value(bottom_radius)?,
            scope.value(top_radius)?,
            scope.value(height)?,
        ),
    };
    Ok(OwnedShape::adopt(kernel, id)?)
}

/// Planar faces to sweep, split into outer boundaries and holes
struct ProfileFaces {
    /// Faces built for this evaluation
    owned: Vec<OwnedShape>,
    outer: Vec<ShapeId>,
    holes: Vec<ShapeId>,
    /// Unit normal of the profile plane
    normal: DVec3,
}

impl ProfileFaces {
    fn build(profile: &Profile, scope: &EvalScope<'_>, ctx: &KernelContext) -> Result<Self, OpError> {
        let kernel = &ctx.kernel;
        match profile {
            Profile::Sketch { sketch_id } => {
                let sketch = scope.solved_sketch(*sketch_id)?;
                let plane = scope.plane(sketch.plane_id)?;
                let mut faces = Self {
                    owned: Vec::new(),
                    outer: Vec::new(),
                    holes: Vec::new(),
                    normal: plane.normal(),
                };
                for profile in profile_loops(sketch, &ctx.config)? {
                    let points: Vec<DVec3> = profile.points.iter().map(|p| plane.to_world(*p)).collect();
                    let wire = OwnedShape::adopt(kernel, kernel.make_polygon(&points))?;
                    let face = OwnedShape::adopt(kernel, kernel.make_face(wire.id()))?;
                    if profile.hole {
                        faces.holes.push(face.id());
                    } else {
                        faces.outer.push(face.id());
                    }
                    faces.owned.push(face);
                }
                Ok(faces)
            }
            Profile::Face(face_ref) => {
                let resolved = resolve_topo_ref(face_ref, scope.results, kernel.as_ref())
                    .ok_or_else(|| {
                        OpError::UnresolvedReference(format!(
                            "face #{} of op {}",
                            face_ref.index, face_ref.op_id
                        ))
                    })?;
                Ok(Self {
                    owned: Vec::new(),
                    outer: vec![resolved.handle],
                    holes: Vec::new(),
                    normal: kernel.face_normal(resolved.handle)?,
                })
            }
        }
    }

    /// Translate every face by `offset`
    fn shifted(self, offset: DVec3, kernel: &KernelRef) -> Result<Self, OpError> {
        if offset == DVec3::ZERO {
            return Ok(self);
        }
        let matrix = DMat4::from_translation(offset);
        let mut moved = Self {
            owned: Vec::new(),
            outer: Vec::new(),
            holes: Vec::new(),
            normal: self.normal,
        };
        for (ids, hole) in [(&self.outer, false), (&self.holes, true)] {
            for id in ids {
                let face = OwnedShape::adopt(kernel, kernel.transform(*id, &matrix))?;
                if hole {
                    moved.holes.push(face.id());
                } else {
                    moved.outer.push(face.id());
                }
                moved.owned.push(face);
            }
        }
        Ok(moved)
    }

    /// Sweep every face, fuse the outer solids and cut the holes
    fn sweep(
        &self,
        kernel: &KernelRef,
        sweep: impl Fn(ShapeId) -> Result<ShapeId, CadError>,
    ) -> Result<OwnedShape, OpError> {
        let mut solid: Option<OwnedShape> = None;
        for face in &self.outer {
            let next = OwnedShape::adopt(kernel, sweep(*face))?;
            solid = Some(match solid {
                None => next,
                Some(acc) => {
                    OwnedShape::adopt(kernel, kernel.boolean(acc.id(), next.id(), BooleanType::Union))?
                }
            });
        }
        let mut solid = solid
            .ok_or_else(|| OpError::MissingInput("profile has no outer boundary".into()))?;
        for hole in &self.holes {
            let tool = OwnedShape::adopt(kernel, sweep(*hole))?;
            solid = OwnedShape::adopt(
                kernel,
                kernel.boolean(solid.id(), tool.id(), BooleanType::Subtract),
            )?;
        }
        Ok(solid)
    }
}

fn apply_merge(
    solid: OwnedShape,
    merge: &Option<Merge>,
    scope: &EvalScope<'_>,
    kernel: &KernelRef,
) -> Result<OwnedShape, OpError> {
    let Some(merge) = merge else {
        return Ok(solid);
    };
    let target = scope.body(merge.target)?;
    Ok(OwnedShape::adopt(
        kernel,
        kernel.boolean(target, solid.id(), merge.operation),
    )?)
}

/// Kernel edges of `body`, the result of op `target`
fn select_edges(
    target: Uuid,
    body: ShapeId,
    selection: &EdgeSelection,
    scope: &EvalScope<'_>,
    kernel: &dyn GeometryKernel,
) -> Result<Vec<ShapeId>, OpError> {
    match selection {
        EdgeSelection::All => Ok(kernel.edges(body)?),
        EdgeSelection::Refs(refs) => refs
            .iter()
            .map(|edge| {
                if edge.op_id != target {
                    return Err(OpError::UnresolvedReference(format!(
                        "edge #{} of op {} is not on target {}",
                        edge.index, edge.op_id, target
                    )));
                }
                resolve_topo_ref(edge, scope.results, kernel)
                    .map(|r| r.handle)
                    .ok_or_else(|| {
                        OpError::UnresolvedReference(format!(
                            "edge #{} of op {}",
                            edge.index, edge.op_id
                        ))
                    })
            })
            .collect(),
    }
}

/// Revolve axis through the origin of a plane along one of its in-plane axes
pub fn plane_axis(plane: &Plane, along_x: bool) -> Axis3D {
    Axis3D::new(plane.origin, if along_x { plane.x_axis } else { plane.y_axis })
}
