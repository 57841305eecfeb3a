//! Sketch Constraints
//!
//! Defines geometric and dimensional constraints that can be applied
//! to sketch primitives. A constraint is a kind, an ordered list of primitive
//! ids and, for dimensional kinds, a [`Dimension`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SketchError;
use crate::param::Dimension;

/// The kind of a sketch constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintKind {
    // ============== Geometric Constraints ==============
    /// Two points are at the same location
    Coincident,
    /// A line (or the segment between two points) is horizontal
    Horizontal,
    /// A line (or the segment between two points) is vertical
    Vertical,
    /// Two lines are parallel
    Parallel,
    /// Two lines are perpendicular
    Perpendicular,
    /// Two curves touch tangentially
    Tangent,
    /// Two lines have equal length, or two circles/arcs equal radius
    Equal,
    /// A point stays where it is
    Fixed,
    /// Two points are mirror images about an axis line
    Symmetric,
    /// A point lies at the midpoint of a line
    Midpoint,
    /// A point lies on a line, circle or arc
    PointOn,

    // ============== Dimensional Constraints ==============
    /// Point-point distance, point-line distance or line length
    Distance,
    /// Angle between two lines, in degrees
    Angle,
    Radius,
    Diameter,
    /// `p2.x - p1.x`
    HorizontalDistance,
    /// `p2.y - p1.y`
    VerticalDistance,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 17] = [
        ConstraintKind::Coincident,
        ConstraintKind::Horizontal,
        ConstraintKind::Vertical,
        ConstraintKind::Parallel,
        ConstraintKind::Perpendicular,
        ConstraintKind::Tangent,
        ConstraintKind::Equal,
        ConstraintKind::Fixed,
        ConstraintKind::Symmetric,
        ConstraintKind::Midpoint,
        ConstraintKind::PointOn,
        ConstraintKind::Distance,
        ConstraintKind::Angle,
        ConstraintKind::Radius,
        ConstraintKind::Diameter,
        ConstraintKind::HorizontalDistance,
        ConstraintKind::VerticalDistance,
    ];

    /// Get the type name of this constraint
    pub fn type_name(self) -> &'static str {
        match self {
            ConstraintKind::Coincident => "Coincident",
            ConstraintKind::Horizontal => "Horizontal",
            ConstraintKind::Vertical => "Vertical",
            ConstraintKind::Parallel => "Parallel",
            ConstraintKind::Perpendicular => "Perpendicular",
            ConstraintKind::Tangent => "Tangent",
            ConstraintKind::Equal => "Equal",
            ConstraintKind::Fixed => "Fixed",
            ConstraintKind::Symmetric => "Symmetric",
            ConstraintKind::Midpoint => "Midpoint",
            ConstraintKind::PointOn => "Point On",
            ConstraintKind::Distance => "Distance",
            ConstraintKind::Angle => "Angle",
            ConstraintKind::Radius => "Radius",
            ConstraintKind::Diameter => "Diameter",
            ConstraintKind::HorizontalDistance => "Horizontal Distance",
            ConstraintKind::VerticalDistance => "Vertical Distance",
        }
    }

    /// Whether this is a dimensional constraint (has a value)
    pub fn is_dimensional(self) -> bool {
        matches!(
            self,
            ConstraintKind::Distance
                | ConstraintKind::Angle
                | ConstraintKind::Radius
                | ConstraintKind::Diameter
                | ConstraintKind::HorizontalDistance
                | ConstraintKind::VerticalDistance
        )
    }

    /// Entity counts this kind accepts
    pub fn arities(self) -> &'static [usize] {
        match self {
            ConstraintKind::Horizontal | ConstraintKind::Vertical | ConstraintKind::Distance => {
                &[1, 2]
            }
            ConstraintKind::Fixed | ConstraintKind::Radius | ConstraintKind::Diameter => &[1],
            ConstraintKind::Symmetric => &[3],
            _ => &[2],
        }
    }

    /// Degrees of freedom this kind removes in the closed-form estimate
    ///
    /// `Symmetric` counts as zero because it never reaches the solver.
    pub fn dof_deduction(self) -> u32 {
        match self {
            ConstraintKind::Coincident | ConstraintKind::Fixed | ConstraintKind::Midpoint => 2,
            ConstraintKind::Symmetric => 0,
            _ => 1,
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A constraint between sketch primitives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchConstraint {
    pub id: Uuid,
    pub kind: ConstraintKind,
    /// Constrained primitives, in the order the kind expects
    pub entities: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<Dimension>,
}

impl SketchConstraint {
    /// Build a constraint, checking entity count and dimension presence
    pub fn new(
        kind: ConstraintKind,
        entities: Vec<Uuid>,
        dim: Option<Dimension>,
    ) -> Result<Self, SketchError> {
        let constraint = Self::unchecked(kind, entities, dim);
        constraint.validate()?;
        Ok(constraint)
    }

    /// Check entity count and dimension presence for this kind
    pub fn validate(&self) -> Result<(), SketchError> {
        if !self.kind.arities().contains(&self.entities.len()) {
            return Err(SketchError::Arity {
                kind: self.kind,
                got: self.entities.len(),
            });
        }
        match (self.kind.is_dimensional(), self.dim.is_some()) {
            (true, false) => Err(SketchError::MissingDimension(self.kind)),
            (false, true) => Err(SketchError::UnexpectedDimension(self.kind)),
            _ => Ok(()),
        }
    }

    /// Check if this constraint references a specific primitive
    pub fn references(&self, id: Uuid) -> bool {
        self.entities.contains(&id)
    }

    // ============== Factory Methods ==============

    fn unchecked(kind: ConstraintKind, entities: Vec<Uuid>, dim: Option<Dimension>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            entities,
            dim,
        }
    }

    /// Create a coincident constraint
    pub fn coincident(point1: Uuid, point2: Uuid) -> Self {
        Self::unchecked(ConstraintKind::Coincident, vec![point1, point2], None)
    }

    /// Create a horizontal constraint on a line
    pub fn horizontal(line: Uuid) -> Self {
        Self::unchecked(ConstraintKind::Horizontal, vec![line], None)
    }

    /// Create a vertical constraint on a line
    pub fn vertical(line: Uuid) -> Self {
        Self::unchecked(ConstraintKind::Vertical, vec![line], None)
    }

    /// Create a fixed constraint
    pub fn fixed(point: Uuid) -> Self {
        Self::unchecked(ConstraintKind::Fixed, vec![point], None)
    }

    /// Create a perpendicular constraint
    pub fn perpendicular(line1: Uuid, line2: Uuid) -> Self {
        Self::unchecked(ConstraintKind::Perpendicular, vec![line1, line2], None)
    }

    /// Create a point-point distance constraint
    pub fn distance(entity1: Uuid, entity2: Uuid, dim: impl Into<Dimension>) -> Self {
        Self::unchecked(
            ConstraintKind::Distance,
            vec![entity1, entity2],
            Some(dim.into()),
        )
    }

    /// Create a line length constraint
    pub fn length(line: Uuid, dim: impl Into<Dimension>) -> Self {
        Self::unchecked(ConstraintKind::Distance, vec![line], Some(dim.into()))
    }

    /// Create a radius constraint
    pub fn radius(circle: Uuid, dim: impl Into<Dimension>) -> Self {
        Self::unchecked(ConstraintKind::Radius, vec![circle], Some(dim.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let c = SketchConstraint::coincident(p1, p2);

        assert!(c.references(p1));
        assert!(c.references(p2));
        assert!(!c.references(Uuid::new_v4()));
    }

    #[test]
    fn test_arity_checked() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        assert!(SketchConstraint::new(ConstraintKind::Fixed, ids.clone(), None).is_err());
        assert!(SketchConstraint::new(ConstraintKind::Horizontal, ids.clone(), None).is_ok());
        assert!(
            SketchConstraint::new(ConstraintKind::Symmetric, ids, None).is_err(),
            "symmetric needs an axis"
        );
    }

    #[test]
    fn test_dimensional() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        assert!(matches!(
            SketchConstraint::new(ConstraintKind::Distance, ids.clone(), None),
            Err(SketchError::MissingDimension(ConstraintKind::Distance))
        ));
        assert!(matches!(
            SketchConstraint::new(ConstraintKind::Parallel, ids, Some(Dimension::new(1.0))),
            Err(SketchError::UnexpectedDimension(_))
        ));

        for kind in ConstraintKind::ALL {
            let needs_dim = matches!(
                kind,
                ConstraintKind::Distance
                    | ConstraintKind::Angle
                    | ConstraintKind::Radius
                    | ConstraintKind::Diameter
                    | ConstraintKind::HorizontalDistance
                    | ConstraintKind::VerticalDistance
            );
            assert_eq!(kind.is_dimensional(), needs_dim, "{kind}");
        }
    }
}
