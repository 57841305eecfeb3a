//! 2D sketch model
//!
//! A sketch is a set of primitives (points, lines, circles, arcs) and the
//! constraints between them. Curves reference point ids, never coordinates,
//! so solved positions substitute transparently.
//!
//! Every edit returns a new sketch and clears the derived solve fields;
//! only [`Sketch::with_solution`] sets them.

mod constraint;
mod plane;
mod profile;
mod solve;

pub use constraint::{ConstraintKind, SketchConstraint};
pub use plane::Plane;
pub use profile::{ProfileLoop, profile_loops};
pub use solve::{SketchSolution, SolveStatus, classify, heuristic_dof, solve_sketch};

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::param::{Dimension, ParamError};
use crate::solver::SolverError;

/// Errors from sketch edits and solving
#[derive(Debug, Clone, Error)]
pub enum SketchError {
    #[error("Entity not found: {0}")]
    EntityNotFound(Uuid),

    #[error("Constraint not found: {0}")]
    ConstraintNotFound(Uuid),

    #[error("{kind} constraint cannot take {got} entities")]
    Arity { kind: ConstraintKind, got: usize },

    #[error("Entity {0} is not a {1}")]
    WrongEntityType(Uuid, &'static str),

    #[error("{0} constraint requires a dimension")]
    MissingDimension(ConstraintKind),

    #[error("{0} constraint takes no dimension")]
    UnexpectedDimension(ConstraintKind),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Dimension of constraint {id} failed: {source}")]
    Dimension { id: Uuid, source: ParamError },

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),
}

/// A sketch primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SketchPrimitive {
    Point {
        id: Uuid,
        position: DVec2,
        #[serde(default)]
        construction: bool,
    },
    Line {
        id: Uuid,
        start: Uuid,
        end: Uuid,
        #[serde(default)]
        construction: bool,
    },
    Circle {
        id: Uuid,
        center: Uuid,
        radius: f64,
        #[serde(default)]
        construction: bool,
    },
    /// Counter-clockwise from `start` to `end`
    Arc {
        id: Uuid,
        center: Uuid,
        start: Uuid,
        end: Uuid,
        #[serde(default)]
        construction: bool,
    },
}

impl SketchPrimitive {
    pub fn id(&self) -> Uuid {
        match self {
            SketchPrimitive::Point { id, .. }
            | SketchPrimitive::Line { id, .. }
            | SketchPrimitive::Circle { id, .. }
            | SketchPrimitive::Arc { id, .. } => *id,
        }
    }

    /// Whether this is helper geometry excluded from profiles
    pub fn is_construction(&self) -> bool {
        match self {
            SketchPrimitive::Point { construction, .. }
            | SketchPrimitive::Line { construction, .. }
            | SketchPrimitive::Circle { construction, .. }
            | SketchPrimitive::Arc { construction, .. } => *construction,
        }
    }

    fn set_construction(&mut self, value: bool) {
        match self {
            SketchPrimitive::Point { construction, .. }
            | SketchPrimitive::Line { construction, .. }
            | SketchPrimitive::Circle { construction, .. }
            | SketchPrimitive::Arc { construction, .. } => *construction = value,
        }
    }

    /// Point ids this primitive is defined by
    pub fn referenced_points(&self) -> Vec<Uuid> {
        match self {
            SketchPrimitive::Point { .. } => Vec::new(),
            SketchPrimitive::Line { start, end, .. } => vec![*start, *end],
            SketchPrimitive::Circle { center, .. } => vec![*center],
            SketchPrimitive::Arc {
                center, start, end, ..
            } => vec![*center, *start, *end],
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SketchPrimitive::Point { .. } => "point",
            SketchPrimitive::Line { .. } => "line",
            SketchPrimitive::Circle { .. } => "circle",
            SketchPrimitive::Arc { .. } => "arc",
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, SketchPrimitive::Point { .. })
    }

    pub fn is_line(&self) -> bool {
        matches!(self, SketchPrimitive::Line { .. })
    }

    /// Circle or arc
    pub fn is_round(&self) -> bool {
        matches!(
            self,
            SketchPrimitive::Circle { .. } | SketchPrimitive::Arc { .. }
        )
    }
}

/// Serialization form: maps become ordered lists
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SketchData {
    id: Uuid,
    name: String,
    plane_id: Uuid,
    primitives: Vec<SketchPrimitive>,
    constraints: Vec<SketchConstraint>,
    #[serde(default)]
    solved_positions: Option<Vec<(Uuid, DVec2)>>,
    #[serde(default)]
    solved_radii: Option<Vec<(Uuid, f64)>>,
    #[serde(default)]
    solve_status: Option<SolveStatus>,
    #[serde(default)]
    dof: Option<u32>,
}

/// A 2D sketch on a plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SketchData", into = "SketchData")]
pub struct Sketch {
    pub id: Uuid,
    pub name: String,
    pub plane_id: Uuid,
    primitives: BTreeMap<Uuid, SketchPrimitive>,
    constraints: BTreeMap<Uuid, SketchConstraint>,
    solved_positions: Option<BTreeMap<Uuid, DVec2>>,
    solved_radii: Option<BTreeMap<Uuid, f64>>,
    solve_status: Option<SolveStatus>,
    dof: Option<u32>,
}

impl From<Sketch> for SketchData {
    fn from(sketch: Sketch) -> Self {
        Self {
            id: sketch.id,
            name: sketch.name,
            plane_id: sketch.plane_id,
            primitives: sketch.primitives.into_values().collect(),
            constraints: sketch.constraints.into_values().collect(),
            solved_positions: sketch.solved_positions.map(|m| m.into_iter().collect()),
            solved_radii: sketch.solved_radii.map(|m| m.into_iter().collect()),
            solve_status: sketch.solve_status,
            dof: sketch.dof,
        }
    }
}

impl TryFrom<SketchData> for Sketch {
    type Error = SketchError;

    fn try_from(data: SketchData) -> Result<Self, Self::Error> {
        let sketch = Self {
            id: data.id,
            name: data.name,
            plane_id: data.plane_id,
            primitives: data.primitives.into_iter().map(|p| (p.id(), p)).collect(),
            constraints: data.constraints.into_iter().map(|c| (c.id, c)).collect(),
            solved_positions: data.solved_positions.map(|v| v.into_iter().collect()),
            solved_radii: data.solved_radii.map(|v| v.into_iter().collect()),
            solve_status: data.solve_status,
            dof: data.dof,
        };
        sketch.validate()?;
        Ok(sketch)
    }
}

impl Sketch {
    /// Create a new empty sketch
    pub fn new(name: impl Into<String>, plane_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            plane_id,
            primitives: BTreeMap::new(),
            constraints: BTreeMap::new(),
            solved_positions: None,
            solved_radii: None,
            solve_status: None,
            dof: None,
        }
    }

    /// Clone with derived solve fields cleared, ready for a structural edit
    fn edited(&self) -> Self {
        let mut next = self.clone();
        next.solved_positions = None;
        next.solved_radii = None;
        next.solve_status = None;
        next.dof = None;
        next
    }

    fn require(&self, id: Uuid) -> Result<&SketchPrimitive, SketchError> {
        self.primitives
            .get(&id)
            .ok_or(SketchError::EntityNotFound(id))
    }

    fn require_point(&self, id: Uuid) -> Result<DVec2, SketchError> {
        match self.require(id)? {
            SketchPrimitive::Point { position, .. } => Ok(*position),
            _ => Err(SketchError::WrongEntityType(id, "point")),
        }
    }

    // ============== Primitive Editing ==============

    /// Add a point
    pub fn add_point(&self, position: DVec2) -> (Self, Uuid) {
        let id = Uuid::new_v4();
        let mut next = self.edited();
        next.primitives.insert(
            id,
            SketchPrimitive::Point {
                id,
                position,
                construction: false,
            },
        );
        (next, id)
    }

    /// Add a line between two existing points
    pub fn add_line(&self, start: Uuid, end: Uuid) -> Result<(Self, Uuid), SketchError> {
        self.require_point(start)?;
        self.require_point(end)?;
        if start == end {
            return Err(SketchError::InvalidGeometry(
                "line endpoints must differ".into(),
            ));
        }
        Ok(self.insert(|id| SketchPrimitive::Line {
            id,
            start,
            end,
            construction: false,
        }))
    }

    /// Add a circle around an existing center point
    pub fn add_circle(&self, center: Uuid, radius: f64) -> Result<(Self, Uuid), SketchError> {
        self.require_point(center)?;
        if !(radius > 0.0) {
            return Err(SketchError::InvalidGeometry(format!(
                "circle radius must be positive, got {radius}"
            )));
        }
        Ok(self.insert(|id| SketchPrimitive::Circle {
            id,
            center,
            radius,
            construction: false,
        }))
    }

    /// Add a counter-clockwise arc from `start` to `end` around `center`
    pub fn add_arc(
        &self,
        center: Uuid,
        start: Uuid,
        end: Uuid,
    ) -> Result<(Self, Uuid), SketchError> {
        let c = self.require_point(center)?;
        let s = self.require_point(start)?;
        self.require_point(end)?;
        if center == start || center == end || c.distance(s) < 1e-12 {
            return Err(SketchError::InvalidGeometry(
                "arc needs distinct center and endpoints".into(),
            ));
        }
        Ok(self.insert(|id| SketchPrimitive::Arc {
            id,
            center,
            start,
            end,
            construction: false,
        }))
    }

    fn insert(&self, build: impl FnOnce(Uuid) -> SketchPrimitive) -> (Self, Uuid) {
        let id = Uuid::new_v4();
        let mut next = self.edited();
        next.primitives.insert(id, build(id));
        (next, id)
    }

    /// Remove a primitive, everything built on it and every constraint
    /// touching a removed primitive
    pub fn remove_primitive(&self, id: Uuid) -> Result<Self, SketchError> {
        self.require(id)?;
        let mut removed = BTreeSet::from([id]);
        loop {
            let dependents: Vec<Uuid> = self
                .primitives
                .values()
                .filter(|p| !removed.contains(&p.id()))
                .filter(|p| p.referenced_points().iter().any(|r| removed.contains(r)))
                .map(SketchPrimitive::id)
                .collect();
            if dependents.is_empty() {
                break;
            }
            removed.extend(dependents);
        }

        let mut next = self.edited();
        next.primitives.retain(|pid, _| !removed.contains(pid));
        next.constraints
            .retain(|_, c| !c.entities.iter().any(|e| removed.contains(e)));
        tracing::debug!(
            "removed {} primitives from sketch {}",
            removed.len(),
            self.name
        );
        Ok(next)
    }

    /// Move a point
    pub fn move_point(&self, id: Uuid, position: DVec2) -> Result<Self, SketchError> {
        self.require_point(id)?;
        let mut next = self.edited();
        if let Some(SketchPrimitive::Point { position: p, .. }) = next.primitives.get_mut(&id) {
            *p = position;
        }
        Ok(next)
    }

    /// Change a circle's radius
    pub fn set_circle_radius(&self, id: Uuid, radius: f64) -> Result<Self, SketchError> {
        if !(radius > 0.0) {
            return Err(SketchError::InvalidGeometry(format!(
                "circle radius must be positive, got {radius}"
            )));
        }
        let mut next = self.edited();
        match next.primitives.get_mut(&id) {
            Some(SketchPrimitive::Circle { radius: r, .. }) => *r = radius,
            Some(_) => return Err(SketchError::WrongEntityType(id, "circle")),
            None => return Err(SketchError::EntityNotFound(id)),
        }
        Ok(next)
    }

    /// Mark or unmark a primitive as construction geometry
    pub fn set_construction(&self, id: Uuid, construction: bool) -> Result<Self, SketchError> {
        self.require(id)?;
        let mut next = self.edited();
        if let Some(p) = next.primitives.get_mut(&id) {
            p.set_construction(construction);
        }
        Ok(next)
    }

    // ============== Constraint Editing ==============

    /// Add a constraint after checking its entities exist and have the
    /// types its kind expects
    pub fn add_constraint(&self, constraint: SketchConstraint) -> Result<(Self, Uuid), SketchError> {
        constraint.validate()?;
        self.check_entity_types(&constraint)?;
        let id = constraint.id;
        let mut next = self.edited();
        next.constraints.insert(id, constraint);
        Ok((next, id))
    }

    pub fn remove_constraint(&self, id: Uuid) -> Result<Self, SketchError> {
        if !self.constraints.contains_key(&id) {
            return Err(SketchError::ConstraintNotFound(id));
        }
        let mut next = self.edited();
        next.constraints.remove(&id);
        Ok(next)
    }

    /// Replace the dimension of a dimensional constraint
    pub fn set_constraint_dim(&self, id: Uuid, dim: Dimension) -> Result<Self, SketchError> {
        let constraint = self
            .constraints
            .get(&id)
            .ok_or(SketchError::ConstraintNotFound(id))?;
        if !constraint.kind.is_dimensional() {
            return Err(SketchError::UnexpectedDimension(constraint.kind));
        }
        let mut next = self.edited();
        if let Some(c) = next.constraints.get_mut(&id) {
            c.dim = Some(dim);
        }
        Ok(next)
    }

    fn check_entity_types(&self, constraint: &SketchConstraint) -> Result<(), SketchError> {
        let prims = constraint
            .entities
            .iter()
            .map(|id| self.require(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let expect = |i: usize, ok: bool, what: &'static str| {
            if ok {
                Ok(())
            } else {
                Err(SketchError::WrongEntityType(constraint.entities[i], what))
            }
        };
        let is_curve = |p: &SketchPrimitive| !p.is_point();

        match (constraint.kind, prims.as_slice()) {
            (ConstraintKind::Coincident, [a, b])
            | (ConstraintKind::Horizontal | ConstraintKind::Vertical, [a, b])
            | (ConstraintKind::HorizontalDistance | ConstraintKind::VerticalDistance, [a, b]) => {
                expect(0, a.is_point(), "point")?;
                expect(1, b.is_point(), "point")
            }
            (ConstraintKind::Horizontal | ConstraintKind::Vertical, [line]) => {
                expect(0, line.is_line(), "line")
            }
            (
                ConstraintKind::Parallel | ConstraintKind::Perpendicular | ConstraintKind::Angle,
                [a, b],
            ) => {
                expect(0, a.is_line(), "line")?;
                expect(1, b.is_line(), "line")
            }
            (ConstraintKind::Tangent, [a, b]) => {
                expect(0, is_curve(a), "curve")?;
                expect(1, is_curve(b), "curve")?;
                expect(1, a.is_round() || b.is_round(), "circle or arc")
            }
            (ConstraintKind::Equal, [a, b]) => {
                if a.is_line() {
                    expect(1, b.is_line(), "line")
                } else {
                    expect(0, a.is_round(), "line, circle or arc")?;
                    expect(1, b.is_round(), "circle or arc")
                }
            }
            (ConstraintKind::Fixed, [p]) => expect(0, p.is_point(), "point"),
            (ConstraintKind::Symmetric, [a, b, axis]) => {
                expect(0, a.is_point(), "point")?;
                expect(1, b.is_point(), "point")?;
                expect(2, axis.is_line(), "line")
            }
            (ConstraintKind::Midpoint, [p, line]) => {
                expect(0, p.is_point(), "point")?;
                expect(1, line.is_line(), "line")
            }
            (ConstraintKind::PointOn, [p, curve]) => {
                expect(0, p.is_point(), "point")?;
                expect(1, is_curve(curve), "curve")
            }
            (ConstraintKind::Distance, [line]) => expect(0, line.is_line(), "line"),
            (ConstraintKind::Distance, [a, b]) => {
                let points = usize::from(a.is_point()) + usize::from(b.is_point());
                let lines = usize::from(a.is_line()) + usize::from(b.is_line());
                match (points, lines) {
                    (2, 0) | (1, 1) => Ok(()),
                    _ => Err(SketchError::WrongEntityType(
                        constraint.entities[if a.is_point() { 1 } else { 0 }],
                        "point or line",
                    )),
                }
            }
            (ConstraintKind::Radius | ConstraintKind::Diameter, [c]) => {
                expect(0, c.is_round(), "circle or arc")
            }
            (kind, entities) => Err(SketchError::Arity {
                kind,
                got: entities.len(),
            }),
        }
    }

    // ============== Solve Results ==============

    /// Copy of this sketch carrying the derived fields of `solution`
    ///
    /// This is the only way those fields are set.
    pub fn with_solution(&self, solution: &SketchSolution) -> Self {
        let mut next = self.clone();
        next.solved_positions = Some(solution.solved_positions.clone());
        next.solved_radii = Some(solution.solved_radii.clone());
        next.solve_status = Some(solution.status);
        next.dof = Some(solution.dof);
        next
    }

    /// Write solved positions and radii back into the primitives
    ///
    /// This is a structural edit; the result carries no solve fields.
    pub fn commit_solution(&self) -> Self {
        let mut next = self.edited();
        for primitive in next.primitives.values_mut() {
            match primitive {
                SketchPrimitive::Point { id, position, .. } => {
                    if let Some(p) = self.solved_positions.as_ref().and_then(|m| m.get(id)) {
                        *position = *p;
                    }
                }
                SketchPrimitive::Circle { id, radius, .. } => {
                    if let Some(r) = self.solved_radii.as_ref().and_then(|m| m.get(id)) {
                        *radius = *r;
                    }
                }
                _ => {}
            }
        }
        next
    }

    // ============== Queries ==============

    pub fn primitive(&self, id: Uuid) -> Option<&SketchPrimitive> {
        self.primitives.get(&id)
    }

    pub fn primitives(&self) -> impl Iterator<Item = &SketchPrimitive> {
        self.primitives.values()
    }

    pub fn constraint(&self, id: Uuid) -> Option<&SketchConstraint> {
        self.constraints.get(&id)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &SketchConstraint> {
        self.constraints.values()
    }

    /// Ids and stored positions of every point
    pub fn points(&self) -> impl Iterator<Item = (Uuid, DVec2)> + '_ {
        self.primitives.values().filter_map(|p| match p {
            SketchPrimitive::Point { id, position, .. } => Some((*id, *position)),
            _ => None,
        })
    }

    pub fn point_count(&self) -> usize {
        self.points().count()
    }

    /// Solved position of a point if available, otherwise its stored one
    pub fn position(&self, id: Uuid) -> Option<DVec2> {
        self.solved_positions
            .as_ref()
            .and_then(|m| m.get(&id).copied())
            .or_else(|| self.require_point(id).ok())
    }

    /// Solved radius of a circle/arc if available, otherwise its stored one
    pub fn radius(&self, id: Uuid) -> Option<f64> {
        if let Some(r) = self.solved_radii.as_ref().and_then(|m| m.get(&id)) {
            return Some(*r);
        }
        match self.primitives.get(&id)? {
            SketchPrimitive::Circle { radius, .. } => Some(*radius),
            SketchPrimitive::Arc { center, start, .. } => {
                Some(self.position(*center)?.distance(self.position(*start)?))
            }
            _ => None,
        }
    }

    pub fn solved_positions(&self) -> Option<&BTreeMap<Uuid, DVec2>> {
        self.solved_positions.as_ref()
    }

    pub fn solved_radii(&self) -> Option<&BTreeMap<Uuid, f64>> {
        self.solved_radii.as_ref()
    }

    pub fn solve_status(&self) -> Option<SolveStatus> {
        self.solve_status
    }

    pub fn dof(&self) -> Option<u32> {
        self.dof
    }

    /// Check that nothing references a missing primitive
    pub fn check_integrity(&self) -> Result<(), SketchError> {
        for primitive in self.primitives.values() {
            for point in primitive.referenced_points() {
                self.require_point(point)?;
            }
        }
        for constraint in self.constraints.values() {
            for entity in &constraint.entities {
                self.require(*entity)?;
            }
        }
        Ok(())
    }

    /// Integrity plus per-constraint arity, dimension and entity type rules
    ///
    /// Everything the edit methods enforce one step at a time, checked over
    /// the whole sketch. Run on every sketch read from a file.
    pub fn validate(&self) -> Result<(), SketchError> {
        self.check_integrity()?;
        for constraint in self.constraints.values() {
            constraint.validate()?;
            self.check_entity_types(constraint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> (Sketch, [Uuid; 3], [Uuid; 3]) {
        let sketch = Sketch::new("test", Uuid::new_v4());
        let (sketch, a) = sketch.add_point(DVec2::new(0.0, 0.0));
        let (sketch, b) = sketch.add_point(DVec2::new(4.0, 0.0));
        let (sketch, c) = sketch.add_point(DVec2::new(0.0, 3.0));
        let (sketch, ab) = sketch.add_line(a, b).unwrap();
        let (sketch, bc) = sketch.add_line(b, c).unwrap();
        let (sketch, ca) = sketch.add_line(c, a).unwrap();
        (sketch, [a, b, c], [ab, bc, ca])
    }

    #[test]
    fn test_edits_are_persistent() {
        let (sketch, [a, ..], _) = triangle();
        let moved = sketch.move_point(a, DVec2::new(1.0, 1.0)).unwrap();
        assert_eq!(sketch.position(a), Some(DVec2::ZERO));
        assert_eq!(moved.position(a), Some(DVec2::new(1.0, 1.0)));
    }

    #[test]
    fn test_remove_point_cascades() {
        let (sketch, [a, b, c], [ab, bc, ca]) = triangle();
        let (sketch, _) = sketch
            .add_constraint(SketchConstraint::horizontal(ab))
            .unwrap();
        let (sketch, _) = sketch
            .add_constraint(SketchConstraint::perpendicular(ab, ca))
            .unwrap();
        let (sketch, keep) = sketch
            .add_constraint(SketchConstraint::distance(b, c, 5.0))
            .unwrap();

        let next = sketch.remove_primitive(a).unwrap();
        assert!(next.primitive(a).is_none());
        assert!(next.primitive(ab).is_none());
        assert!(next.primitive(ca).is_none());
        assert!(next.primitive(bc).is_some());
        assert_eq!(next.constraints().count(), 1);
        assert!(next.constraint(keep).is_some());
        next.check_integrity().unwrap();
    }

    #[test]
    fn test_remove_point_cascades_through_arc() {
        let sketch = Sketch::new("arc", Uuid::new_v4());
        let (sketch, c) = sketch.add_point(DVec2::ZERO);
        let (sketch, s) = sketch.add_point(DVec2::X);
        let (sketch, e) = sketch.add_point(DVec2::Y);
        let (sketch, far) = sketch.add_point(DVec2::new(5.0, 5.0));
        let (sketch, arc) = sketch.add_arc(c, s, e).unwrap();
        let (sketch, tail) = sketch.add_line(e, far).unwrap();
        let (sketch, _) = sketch
            .add_constraint(SketchConstraint::radius(arc, 1.0))
            .unwrap();
        let (sketch, _) = sketch
            .add_constraint(SketchConstraint::new(ConstraintKind::Tangent, vec![tail, arc], None).unwrap())
            .unwrap();

        let next = sketch.remove_primitive(c).unwrap();
        assert!(next.primitive(arc).is_none());
        assert!(next.primitive(tail).is_some());
        assert_eq!(next.constraints().count(), 0);
        next.check_integrity().unwrap();
    }

    #[test]
    fn test_entity_types_checked() {
        let (sketch, [a, b, _], [ab, ..]) = triangle();
        assert!(matches!(
            sketch.add_constraint(SketchConstraint::horizontal(a)),
            Err(SketchError::WrongEntityType(_, "line"))
        ));
        assert!(matches!(
            sketch.add_constraint(SketchConstraint::coincident(a, ab)),
            Err(SketchError::WrongEntityType(_, "point"))
        ));
        assert!(matches!(
            sketch.add_constraint(SketchConstraint::coincident(a, Uuid::new_v4())),
            Err(SketchError::EntityNotFound(_))
        ));
        let hv = SketchConstraint::new(ConstraintKind::Vertical, vec![a, b], None).unwrap();
        assert!(sketch.add_constraint(hv).is_ok());
        assert!(sketch
            .add_constraint(SketchConstraint::distance(a, ab, 1.0))
            .is_ok());
    }

    #[test]
    fn test_edit_clears_solution() {
        let (sketch, [a, ..], _) = triangle();
        let solution = SketchSolution {
            success: true,
            status: SolveStatus::UnderConstrained,
            dof: 6,
            solved_positions: BTreeMap::from([(a, DVec2::new(9.0, 9.0))]),
            solved_radii: BTreeMap::new(),
        };
        let solved = sketch.with_solution(&solution);
        assert_eq!(solved.solve_status(), Some(SolveStatus::UnderConstrained));
        assert_eq!(solved.position(a), Some(DVec2::new(9.0, 9.0)));
        assert!(sketch.solve_status().is_none());

        let (edited, _) = solved.add_point(DVec2::ONE);
        assert!(edited.solved_positions().is_none());
        assert!(edited.dof().is_none());

        let committed = solved.commit_solution();
        assert!(committed.solve_status().is_none());
        assert_eq!(committed.position(a), Some(DVec2::new(9.0, 9.0)));
    }

    #[test]
    fn test_load_rejects_broken_constraints() {
        let (sketch, [a, ..], [ab, ..]) = triangle();
        let (sketch, _) = sketch.add_constraint(SketchConstraint::fixed(a)).unwrap();
        let (sketch, _) = sketch
            .add_constraint(SketchConstraint::length(ab, 4.0))
            .unwrap();
        let json = serde_json::to_value(&sketch).unwrap();
        let loaded: Sketch = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(loaded, sketch);

        type Value = serde_json::Value;
        let edit = |f: &dyn Fn(&mut Value)| {
            let mut value = json.clone();
            for c in value["constraints"].as_array_mut().unwrap() {
                f(c);
            }
            serde_json::from_value::<Sketch>(value)
        };

        // Dangling entity
        let ghost = Uuid::new_v4().to_string();
        assert!(edit(&|c: &mut Value| c["entities"][0] = ghost.clone().into()).is_err());
        // Dimension dropped from a dimensional constraint
        assert!(edit(&|c: &mut Value| {
            c.as_object_mut().unwrap().remove("dim");
        })
        .is_err());
        // Wrong entity count
        assert!(edit(&|c: &mut Value| c["entities"].as_array_mut().unwrap().clear()).is_err());
    }

    #[test]
    fn test_invalid_geometry() {
        let (sketch, [a, ..], _) = triangle();
        assert!(sketch.add_line(a, a).is_err());
        assert!(sketch.add_circle(a, 0.0).is_err());
        assert!(sketch.add_arc(a, a, a).is_err());
    }
}
