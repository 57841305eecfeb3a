//! Sketch constraint-solver bridge
//!
//! Translates a [`Sketch`] into entities and constraints of a
//! [`SolverCapability`], solves, and reads the result back.

use std::collections::BTreeMap;

use glam::DVec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConstraintKind, Sketch, SketchConstraint, SketchError, SketchPrimitive};
use crate::param::ParamEnv;
use crate::solver::{EntityHandle, GroupId, RawSolveReport, SolverCapability, SolverGroup, status};

/// Classification of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Solved and fully constrained
    Ok,
    /// Solved with remaining degrees of freedom
    UnderConstrained,
    /// Solved, but some constraints are redundant
    OverConstrained,
    /// Constraints contradict each other
    Inconsistent,
    /// The solver failed or reported something unrecognized
    Error,
}

/// Result of solving a sketch
#[derive(Debug, Clone, PartialEq)]
pub struct SketchSolution {
    pub success: bool,
    pub status: SolveStatus,
    pub dof: u32,
    /// Every point of the sketch, solved or at its pre-solve position
    pub solved_positions: BTreeMap<Uuid, DVec2>,
    /// Circles and arcs whose radius the solver reported
    pub solved_radii: BTreeMap<Uuid, f64>,
}

/// Map a raw solver report onto a [`SolveStatus`]
pub fn classify(report: &RawSolveReport, dof: u32) -> SolveStatus {
    match report.status {
        status::OKAY if report.ok => {
            if dof == 0 {
                SolveStatus::Ok
            } else {
                SolveStatus::UnderConstrained
            }
        }
        status::REDUNDANT_OKAY => SolveStatus::OverConstrained,
        status::INCONSISTENT | status::DIDNT_CONVERGE => SolveStatus::Inconsistent,
        _ => SolveStatus::Error,
    }
}

/// Closed-form DOF estimate: two per point minus a fixed deduction per
/// constraint kind, floored at zero
pub fn heuristic_dof(sketch: &Sketch) -> u32 {
    let total = 2 * sketch.point_count() as u32;
    let deducted: u32 = sketch.constraints().map(|c| c.kind.dof_deduction()).sum();
    total.saturating_sub(deducted)
}

/// Solve `sketch` with `solver`, resolving dimensions against `env`
///
/// The solver group is released on every exit path. Expected degraded
/// outcomes (under/over-constrained, inconsistent) are reported through the
/// solution's status; `Err` means the sketch could not be translated.
pub fn solve_sketch<S: SolverCapability + ?Sized>(
    sketch: &Sketch,
    env: &ParamEnv,
    solver: &mut S,
) -> Result<SketchSolution, SketchError> {
    let mut group = SolverGroup::open(solver)?;
    let gid = group.id();

    // Points first, then the curves built on them
    let mut handles: BTreeMap<Uuid, EntityHandle> = BTreeMap::new();
    let initial: BTreeMap<Uuid, DVec2> = sketch.points().collect();
    for (id, position) in &initial {
        handles.insert(*id, group.add_point(gid, *position)?);
    }

    let mut rounds = Vec::new();
    for primitive in sketch.primitives() {
        let points: Option<Vec<EntityHandle>> = primitive
            .referenced_points()
            .iter()
            .map(|p| handles.get(p).copied())
            .collect();
        let Some(points) = points else {
            tracing::debug!("skipping {} {}: missing point", primitive.type_name(), primitive.id());
            continue;
        };
        let handle = match (primitive, points.as_slice()) {
            (SketchPrimitive::Line { .. }, [start, end]) => group.add_line(gid, *start, *end)?,
            (SketchPrimitive::Circle { radius, .. }, [center]) => {
                group.add_circle(gid, *center, *radius)?
            }
            (SketchPrimitive::Arc { .. }, [center, start, end]) => {
                group.add_arc(gid, *center, *start, *end)?
            }
            _ => continue,
        };
        if primitive.is_round() {
            rounds.push((primitive.id(), handle));
        }
        handles.insert(primitive.id(), handle);
    }

    let mut origin = None;
    for constraint in sketch.constraints() {
        let value = match &constraint.dim {
            Some(dim) => Some(dim.resolve(env).map_err(|source| SketchError::Dimension {
                id: constraint.id,
                source,
            })?),
            None => None,
        };
        let translated =
            translate_constraint(&mut *group, gid, sketch, &handles, &mut origin, constraint, value)?;
        if !translated {
            tracing::debug!("constraint {} ({}) not sent to the solver", constraint.id, constraint.kind);
        }
    }

    let report = match group.solve(gid) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!("solver failed on sketch {}: {}", sketch.name, e);
            RawSolveReport {
                ok: false,
                status: -1,
                dof: None,
            }
        }
    };

    let solved_positions = initial
        .iter()
        .map(|(id, before)| {
            let position = group.point_position(gid, handles[id]).unwrap_or_else(|e| {
                tracing::debug!("read-back of point {} failed ({}), keeping it in place", id, e);
                *before
            });
            (*id, position)
        })
        .collect();
    let solved_radii = rounds
        .iter()
        .filter_map(|(id, h)| group.circle_radius(gid, *h).map(|r| (*id, r)))
        .collect();

    let dof = report
        .dof
        .and_then(|d| u32::try_from(d).ok())
        .unwrap_or_else(|| heuristic_dof(sketch));
    let status = classify(&report, dof);
    tracing::debug!("sketch {} solved: {:?}, dof {}", sketch.name, status, dof);

    Ok(SketchSolution {
        success: report.ok,
        status,
        dof,
        solved_positions,
        solved_radii,
    })
}

/// Add the solver constraints for one sketch constraint
///
/// Returns `Ok(false)` when the constraint is skipped: an entity has no
/// solver counterpart, or the kind has no translation.
fn translate_constraint<S: SolverCapability + ?Sized>(
    solver: &mut S,
    gid: GroupId,
    sketch: &Sketch,
    handles: &BTreeMap<Uuid, EntityHandle>,
    origin: &mut Option<EntityHandle>,
    constraint: &SketchConstraint,
    value: Option<f64>,
) -> Result<bool, SketchError> {
    let prim = |id: &Uuid| sketch.primitive(*id);
    let Some(h) = constraint
        .entities
        .iter()
        .map(|id| handles.get(id).copied())
        .collect::<Option<Vec<EntityHandle>>>()
    else {
        return Ok(false);
    };
    if constraint.kind.is_dimensional() && value.is_none() {
        return Err(SketchError::MissingDimension(constraint.kind));
    }
    let v = value.unwrap_or_default();
    let is_point = |i: usize| prim(&constraint.entities[i]).is_some_and(SketchPrimitive::is_point);
    let is_line = |i: usize| prim(&constraint.entities[i]).is_some_and(SketchPrimitive::is_line);

    match (constraint.kind, h.as_slice()) {
        (ConstraintKind::Coincident, [a, b]) => solver.coincident(gid, *a, *b)?,
        (ConstraintKind::Horizontal, [line]) => solver.horizontal(gid, *line)?,
        (ConstraintKind::Vertical, [line]) => solver.vertical(gid, *line)?,
        (ConstraintKind::Horizontal | ConstraintKind::Vertical, [a, b]) => {
            zero_offset(solver, gid, constraint.kind, *a, *b)?
        }
        (ConstraintKind::Parallel, [a, b]) => solver.parallel(gid, *a, *b)?,
        (ConstraintKind::Perpendicular, [a, b]) => solver.perpendicular(gid, *a, *b)?,
        (ConstraintKind::Tangent, [a, b]) => solver.tangent(gid, *a, *b)?,
        (ConstraintKind::Equal, [a, b]) if is_line(0) => solver.equal_length(gid, *a, *b)?,
        (ConstraintKind::Equal, [a, b]) => solver.equal_radius(gid, *a, *b)?,
        (ConstraintKind::Fixed, [point]) => {
            let Some(current) = sketch.position(constraint.entities[0]) else {
                return Ok(false);
            };
            let anchor = match *origin {
                Some(anchor) => anchor,
                None => {
                    let anchor = solver.add_anchor_point(gid, DVec2::ZERO)?;
                    *origin = Some(anchor);
                    anchor
                }
            };
            solver.horizontal_distance(gid, anchor, *point, current.x)?;
            solver.vertical_distance(gid, anchor, *point, current.y)?;
        }
        (ConstraintKind::Symmetric, _) => {
            tracing::warn!(
                "symmetric constraint {} is not supported by the solver bridge; ignored",
                constraint.id
            );
            return Ok(false);
        }
        (ConstraintKind::Midpoint, [point, line]) => solver.midpoint(gid, *point, *line)?,
        (ConstraintKind::PointOn, [point, curve]) => {
            if is_line(1) {
                solver.point_on_line(gid, *point, *curve)?
            } else {
                solver.point_on_circle(gid, *point, *curve)?
            }
        }
        (ConstraintKind::Distance, [_]) => {
            let Some((a, b)) = line_endpoints(sketch, handles, constraint.entities[0]) else {
                return Ok(false);
            };
            solver.distance(gid, a, b, v)?
        }
        (ConstraintKind::Distance, [a, b]) => match (is_point(0), is_point(1)) {
            (true, true) => solver.distance(gid, *a, *b, v)?,
            (true, false) => solver.point_line_distance(gid, *a, *b, v)?,
            (false, true) => solver.point_line_distance(gid, *b, *a, v)?,
            (false, false) => return Ok(false),
        },
        (ConstraintKind::Angle, [a, b]) => solver.angle(gid, *a, *b, v.to_radians())?,
        (ConstraintKind::Radius, [c]) => solver.radius(gid, *c, v)?,
        (ConstraintKind::Diameter, [c]) => solver.diameter(gid, *c, v)?,
        (ConstraintKind::HorizontalDistance, [a, b]) => solver.horizontal_distance(gid, *a, *b, v)?,
        (ConstraintKind::VerticalDistance, [a, b]) => solver.vertical_distance(gid, *a, *b, v)?,
        _ => return Ok(false),
    }
    Ok(true)
}

/// Horizontal becomes a zero vertical offset, vertical a zero horizontal one
fn zero_offset<S: SolverCapability + ?Sized>(
    solver: &mut S,
    gid: GroupId,
    kind: ConstraintKind,
    a: EntityHandle,
    b: EntityHandle,
) -> Result<(), SketchError> {
    if kind == ConstraintKind::Horizontal {
        solver.vertical_distance(gid, a, b, 0.0)?;
    } else {
        solver.horizontal_distance(gid, a, b, 0.0)?;
    }
    Ok(())
}

fn line_endpoints(
    sketch: &Sketch,
    handles: &BTreeMap<Uuid, EntityHandle>,
    line: Uuid,
) -> Option<(EntityHandle, EntityHandle)> {
    match sketch.primitive(line)? {
        SketchPrimitive::Line { start, end, .. } => {
            Some((*handles.get(start)?, *handles.get(end)?))
        }
        _ => None,
    }
}
