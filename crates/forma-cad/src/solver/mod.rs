//! 2D constraint solver capability
//!
//! The sketch bridge talks to a geometric constraint solver only through
//! [`SolverCapability`]. Entities and constraints live inside a solver
//! "group"; a group is a scoped resource acquired through [`SolverGroup`].

mod newton;

pub use newton::NewtonSolver;

use std::ops::{Deref, DerefMut};

use glam::DVec2;
use thiserror::Error;

/// Raw status codes reported by a solver
pub mod status {
    pub const OKAY: i32 = 0;
    pub const INCONSISTENT: i32 = 1;
    pub const DIDNT_CONVERGE: i32 = 2;
    pub const TOO_MANY_UNKNOWNS: i32 = 3;
    pub const REDUNDANT_OKAY: i32 = 4;
}

/// Handle to a solver group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

/// Handle to an entity (point, line, circle, arc) inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(pub u32);

/// Error type for solver capability calls
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    #[error("Unknown solver group {0:?}")]
    UnknownGroup(GroupId),

    #[error("Unknown solver entity {0:?}")]
    UnknownEntity(EntityHandle),

    #[error("Solver entity {handle:?} is not a {expected}")]
    WrongEntityKind {
        handle: EntityHandle,
        expected: &'static str,
    },

    #[error("Solver failure: {0}")]
    Failed(String),
}

/// Result type for solver calls
pub type SolverResult<T> = Result<T, SolverError>;

/// What a solver reports after `solve`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSolveReport {
    /// Whether the solver considers the result usable
    pub ok: bool,
    /// One of the [`status`] codes (or anything else the solver invents)
    pub status: i32,
    /// Remaining degrees of freedom, when the solver computes them
    pub dof: Option<i32>,
}

/// A 2D geometric constraint solver
///
/// Dimensional values are in sketch units; angles are in radians.
pub trait SolverCapability {
    // ========== Group Lifecycle ==========

    fn create_group(&mut self) -> SolverResult<GroupId>;

    /// Release a group and everything in it
    fn free_group(&mut self, group: GroupId);

    // ========== Entities ==========

    /// Add a point the solver may move
    fn add_point(&mut self, group: GroupId, position: DVec2) -> SolverResult<EntityHandle>;

    /// Add a point the solver must not move
    fn add_anchor_point(&mut self, group: GroupId, position: DVec2)
    -> SolverResult<EntityHandle>;

    fn add_line(
        &mut self,
        group: GroupId,
        start: EntityHandle,
        end: EntityHandle,
    ) -> SolverResult<EntityHandle>;

    fn add_circle(
        &mut self,
        group: GroupId,
        center: EntityHandle,
        radius: f64,
    ) -> SolverResult<EntityHandle>;

    /// Counter-clockwise arc from `start` to `end` around `center`
    fn add_arc(
        &mut self,
        group: GroupId,
        center: EntityHandle,
        start: EntityHandle,
        end: EntityHandle,
    ) -> SolverResult<EntityHandle>;

    // ========== Constraints ==========

    fn coincident(&mut self, group: GroupId, a: EntityHandle, b: EntityHandle)
    -> SolverResult<()>;

    fn horizontal(&mut self, group: GroupId, line: EntityHandle) -> SolverResult<()>;

    fn vertical(&mut self, group: GroupId, line: EntityHandle) -> SolverResult<()>;

    fn parallel(&mut self, group: GroupId, a: EntityHandle, b: EntityHandle) -> SolverResult<()>;

    fn perpendicular(&mut self, group: GroupId, a: EntityHandle, b: EntityHandle)
    -> SolverResult<()>;

    fn tangent(&mut self, group: GroupId, a: EntityHandle, b: EntityHandle) -> SolverResult<()>;

    fn equal_length(&mut self, group: GroupId, a: EntityHandle, b: EntityHandle)
    -> SolverResult<()>;

    fn equal_radius(&mut self, group: GroupId, a: EntityHandle, b: EntityHandle)
    -> SolverResult<()>;

    fn midpoint(&mut self, group: GroupId, point: EntityHandle, line: EntityHandle)
    -> SolverResult<()>;

    fn point_on_line(
        &mut self,
        group: GroupId,
        point: EntityHandle,
        line: EntityHandle,
    ) -> SolverResult<()>;

    /// Point on a circle or arc
    fn point_on_circle(
        &mut self,
        group: GroupId,
        point: EntityHandle,
        circle: EntityHandle,
    ) -> SolverResult<()>;

    fn distance(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
        value: f64,
    ) -> SolverResult<()>;

    fn point_line_distance(
        &mut self,
        group: GroupId,
        point: EntityHandle,
        line: EntityHandle,
        value: f64,
    ) -> SolverResult<()>;

    fn angle(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
        radians: f64,
    ) -> SolverResult<()>;

    fn radius(&mut self, group: GroupId, circle: EntityHandle, value: f64) -> SolverResult<()>;

    fn diameter(&mut self, group: GroupId, circle: EntityHandle, value: f64) -> SolverResult<()>;

    /// `b.x - a.x == value`
    fn horizontal_distance(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
        value: f64,
    ) -> SolverResult<()>;

    /// `b.y - a.y == value`
    fn vertical_distance(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
        value: f64,
    ) -> SolverResult<()>;

    // ========== Solve and Read-back ==========

    fn solve(&mut self, group: GroupId) -> SolverResult<RawSolveReport>;

    fn point_position(&self, group: GroupId, point: EntityHandle) -> SolverResult<DVec2>;

    /// Solved radius of a circle or arc, for solvers that expose it
    fn circle_radius(&self, _group: GroupId, _circle: EntityHandle) -> Option<f64> {
        None
    }
}

/// A solver group that is freed when dropped
///
/// Dereferences to the underlying solver so calls read naturally:
/// `group.add_point(group.id(), p)`.
pub struct SolverGroup<'a, S: SolverCapability + ?Sized> {
    solver: &'a mut S,
    id: GroupId,
}

impl<'a, S: SolverCapability + ?Sized> SolverGroup<'a, S> {
    /// Create a fresh group on `solver`
    pub fn open(solver: &'a mut S) -> SolverResult<Self> {
        let id = solver.create_group()?;
        tracing::trace!("opened solver group {:?}", id);
        Ok(Self { solver, id })
    }

    pub fn id(&self) -> GroupId {
        self.id
    }
}

impl<S: SolverCapability + ?Sized> Deref for SolverGroup<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.solver
    }
}

impl<S: SolverCapability + ?Sized> DerefMut for SolverGroup<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.solver
    }
}

impl<S: SolverCapability + ?Sized> Drop for SolverGroup<'_, S> {
    fn drop(&mut self) {
        tracing::trace!("freeing solver group {:?}", self.id);
        self.solver.free_group(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_freed_on_drop() {
        let mut solver = NewtonSolver::new();
        {
            let group = SolverGroup::open(&mut solver).unwrap();
            assert_eq!(group.live_groups(), 1);
        }
        assert_eq!(solver.live_groups(), 0);
    }

    #[test]
    fn test_group_freed_on_early_return() {
        fn failing(solver: &mut NewtonSolver) -> SolverResult<()> {
            let mut group = SolverGroup::open(solver)?;
            let gid = group.id();
            group.add_line(gid, EntityHandle(99), EntityHandle(100))?;
            Ok(())
        }

        let mut solver = NewtonSolver::new();
        assert!(failing(&mut solver).is_err());
        assert_eq!(solver.live_groups(), 0);
    }

    #[test]
    fn test_group_freed_on_panic() {
        let mut solver = NewtonSolver::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _group = SolverGroup::open(&mut solver).unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(solver.live_groups(), 0);
    }
}
