//! Reference constraint solver
//!
//! Pure Rust Gauss-Newton solver implementing [`SolverCapability`]. Every
//! point coordinate and circle/arc radius is a variable; each constraint adds
//! one or more residual equations. The Jacobian is computed numerically and
//! each step solves the normal equations with Gaussian elimination.

use std::collections::BTreeMap;

use glam::DVec2;

use super::{
    EntityHandle, GroupId, RawSolveReport, SolverCapability, SolverError, SolverResult, status,
};
use crate::config::SolverConfig;

/// Variable indices of a point's x and y
type Pt = [usize; 2];
/// Start and end of a line
type Seg = [Pt; 2];

#[derive(Debug, Clone, Copy)]
enum Entity {
    Point(Pt),
    Line(Seg),
    Circle { center: Pt, radius: usize },
    Arc { center: Pt, radius: usize },
}

#[derive(Debug, Clone, Copy)]
enum Equation {
    Coincident(Pt, Pt),
    Horizontal(Seg),
    Vertical(Seg),
    Parallel(Seg, Seg),
    Perpendicular(Seg, Seg),
    Angle(Seg, Seg, f64),
    EqualLength(Seg, Seg),
    EqualRadius(usize, usize),
    LineTangent { line: Seg, center: Pt, radius: usize },
    CircleTangent { c1: Pt, r1: usize, c2: Pt, r2: usize },
    Midpoint(Pt, Seg),
    PointOnLine(Pt, Seg),
    PointOnCircle(Pt, Pt, usize),
    Distance(Pt, Pt, f64),
    PointLineDistance(Pt, Seg, f64),
    Radius(usize, f64),
    HorizontalDistance(Pt, Pt, f64),
    VerticalDistance(Pt, Pt, f64),
}

fn wrap_angle(a: f64) -> f64 {
    let wrapped = (a + std::f64::consts::PI).rem_euclid(std::f64::consts::TAU);
    wrapped - std::f64::consts::PI
}

impl Equation {
    fn residuals(&self, x: &[f64], out: &mut Vec<f64>) {
        let p = |pt: Pt| DVec2::new(x[pt[0]], x[pt[1]]);
        let dir = |seg: Seg| p(seg[1]) - p(seg[0]);
        // Signed distance from `q` to the infinite line through `seg`
        let line_distance = |q: DVec2, seg: Seg| {
            let d = dir(seg);
            d.perp_dot(q - p(seg[0])) / d.length().max(1e-12)
        };

        match *self {
            Equation::Coincident(a, b) => {
                let d = p(a) - p(b);
                out.extend([d.x, d.y]);
            }
            Equation::Horizontal(seg) => out.push(dir(seg).y),
            Equation::Vertical(seg) => out.push(dir(seg).x),
            Equation::Parallel(a, b) => {
                let (da, db) = (dir(a), dir(b));
                out.push(da.perp_dot(db) / (da.length() * db.length()).max(1e-12));
            }
            Equation::Perpendicular(a, b) => {
                let (da, db) = (dir(a), dir(b));
                out.push(da.dot(db) / (da.length() * db.length()).max(1e-12));
            }
            Equation::Angle(a, b, value) => {
                let (da, db) = (dir(a), dir(b));
                out.push(wrap_angle(da.perp_dot(db).atan2(da.dot(db)) - value));
            }
            Equation::EqualLength(a, b) => out.push(dir(a).length() - dir(b).length()),
            Equation::EqualRadius(r1, r2) => out.push(x[r1] - x[r2]),
            Equation::LineTangent {
                line,
                center,
                radius,
            } => out.push(line_distance(p(center), line).abs() - x[radius]),
            Equation::CircleTangent { c1, r1, c2, r2 } => {
                out.push(p(c1).distance(p(c2)) - (x[r1] + x[r2]))
            }
            Equation::Midpoint(point, seg) => {
                let d = p(point) - (p(seg[0]) + p(seg[1])) * 0.5;
                out.extend([d.x, d.y]);
            }
            Equation::PointOnLine(point, seg) => out.push(line_distance(p(point), seg)),
            Equation::PointOnCircle(point, center, radius) => {
                out.push(p(point).distance(p(center)) - x[radius])
            }
            Equation::Distance(a, b, value) => out.push(p(a).distance(p(b)) - value),
            Equation::PointLineDistance(point, seg, value) => {
                let d = line_distance(p(point), seg);
                // Signed for zero so the residual stays smooth
                if value == 0.0 {
                    out.push(d);
                } else {
                    out.push(d.abs() - value);
                }
            }
            Equation::Radius(radius, value) => out.push(x[radius] - value),
            Equation::HorizontalDistance(a, b, value) => out.push(p(b).x - p(a).x - value),
            Equation::VerticalDistance(a, b, value) => out.push(p(b).y - p(a).y - value),
        }
    }
}

/// Entities, variables and equations of one group
#[derive(Debug, Clone, Default)]
struct System {
    values: Vec<f64>,
    free: Vec<bool>,
    entities: Vec<Entity>,
    equations: Vec<Equation>,
}

impl System {
    fn var(&mut self, value: f64, free: bool) -> usize {
        self.values.push(value);
        self.free.push(free);
        self.values.len() - 1
    }

    fn push_entity(&mut self, entity: Entity) -> EntityHandle {
        self.entities.push(entity);
        EntityHandle(self.entities.len() as u32 - 1)
    }

    fn entity(&self, handle: EntityHandle) -> SolverResult<Entity> {
        self.entities
            .get(handle.0 as usize)
            .copied()
            .ok_or(SolverError::UnknownEntity(handle))
    }

    fn point(&self, handle: EntityHandle) -> SolverResult<Pt> {
        match self.entity(handle)? {
            Entity::Point(pt) => Ok(pt),
            _ => Err(SolverError::WrongEntityKind {
                handle,
                expected: "point",
            }),
        }
    }

    fn line(&self, handle: EntityHandle) -> SolverResult<Seg> {
        match self.entity(handle)? {
            Entity::Line(seg) => Ok(seg),
            _ => Err(SolverError::WrongEntityKind {
                handle,
                expected: "line",
            }),
        }
    }

    /// Center and radius variable of a circle or arc
    fn round(&self, handle: EntityHandle) -> SolverResult<(Pt, usize)> {
        match self.entity(handle)? {
            Entity::Circle { center, radius } | Entity::Arc { center, radius } => {
                Ok((center, radius))
            }
            _ => Err(SolverError::WrongEntityKind {
                handle,
                expected: "circle or arc",
            }),
        }
    }

    fn position(&self, pt: Pt) -> DVec2 {
        DVec2::new(self.values[pt[0]], self.values[pt[1]])
    }

    fn residuals(&self, x: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.equations.len() * 2);
        for equation in &self.equations {
            equation.residuals(x, &mut out);
        }
        out
    }

    /// Central-difference Jacobian with respect to the `unknowns`, row-major
    fn jacobian(&self, x: &[f64], unknowns: &[usize], rows: usize) -> Vec<Vec<f64>> {
        let mut jacobian = vec![vec![0.0; unknowns.len()]; rows];
        let mut probe = x.to_vec();
        for (col, &var) in unknowns.iter().enumerate() {
            let h = 1e-6 * (1.0 + x[var].abs());
            probe[var] = x[var] + h;
            let f_plus = self.residuals(&probe);
            probe[var] = x[var] - h;
            let f_minus = self.residuals(&probe);
            probe[var] = x[var];
            for row in 0..rows {
                jacobian[row][col] = (f_plus[row] - f_minus[row]) / (2.0 * h);
            }
        }
        jacobian
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|e| e * e).sum::<f64>().sqrt()
}

/// Solve `J * dx = -f` in the least-squares sense via regularized normal equations
#[allow(clippy::needless_range_loop)]
fn least_squares_step(j: &[Vec<f64>], f: &[f64], n: usize) -> Option<Vec<f64>> {
    let mut jtj = vec![vec![0.0; n]; n];
    let mut jtf = vec![0.0; n];
    for (row, residual) in j.iter().zip(f) {
        for a in 0..n {
            if row[a] == 0.0 {
                continue;
            }
            jtf[a] -= row[a] * residual;
            for b in 0..n {
                jtj[a][b] += row[a] * row[b];
            }
        }
    }
    for i in 0..n {
        jtj[i][i] += 1e-8;
    }
    gaussian_elimination(&mut jtj, &mut jtf)
}

/// Gaussian elimination with partial pivoting
#[allow(clippy::needless_range_loop)]
fn gaussian_elimination(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<Vec<f64>> {
    let n = b.len();
    for i in 0..n {
        let mut max_row = i;
        let mut max_val = a[i][i].abs();
        for k in (i + 1)..n {
            if a[k][i].abs() > max_val {
                max_val = a[k][i].abs();
                max_row = k;
            }
        }
        if max_val < 1e-14 {
            return None;
        }
        if max_row != i {
            a.swap(i, max_row);
            b.swap(i, max_row);
        }
        for k in (i + 1)..n {
            let factor = a[k][i] / a[i][i];
            for col in i..n {
                a[k][col] -= factor * a[i][col];
            }
            b[k] -= factor * b[i];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        x[i] = b[i];
        for col in (i + 1)..n {
            x[i] -= a[i][col] * x[col];
        }
        x[i] /= a[i][i];
    }
    Some(x)
}

/// Numerical rank by row reduction
fn rank(mut m: Vec<Vec<f64>>, cols: usize) -> usize {
    let scale = m
        .iter()
        .flatten()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let threshold = 1e-7 * scale;
    let mut rank = 0;
    for col in 0..cols {
        if rank == m.len() {
            break;
        }
        let Some(pivot) = (rank..m.len()).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
        else {
            break;
        };
        if m[pivot][col].abs() < threshold {
            continue;
        }
        m.swap(rank, pivot);
        for row in (rank + 1)..m.len() {
            let factor = m[row][col] / m[rank][col];
            for c in col..cols {
                m[row][c] -= factor * m[rank][c];
            }
        }
        rank += 1;
    }
    rank
}

/// Gauss-Newton solver with numeric Jacobian
#[derive(Debug, Default)]
pub struct NewtonSolver {
    config: SolverConfig,
    groups: BTreeMap<GroupId, System>,
    next_group: u32,
}

impl NewtonSolver {
    /// Create a new solver with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver from a configuration
    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the convergence tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Set the maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the damping factor (0-1)
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.config.damping = damping.clamp(0.1, 1.0);
        self
    }

    /// Number of groups created and not yet freed
    pub fn live_groups(&self) -> usize {
        self.groups.len()
    }

    fn system(&mut self, group: GroupId) -> SolverResult<&mut System> {
        self.groups
            .get_mut(&group)
            .ok_or(SolverError::UnknownGroup(group))
    }

    fn constrain(
        &mut self,
        group: GroupId,
        build: impl FnOnce(&System) -> SolverResult<Equation>,
    ) -> SolverResult<()> {
        let system = self.system(group)?;
        let equation = build(system)?;
        system.equations.push(equation);
        Ok(())
    }

    fn add_point_var(
        &mut self,
        group: GroupId,
        position: DVec2,
        free: bool,
    ) -> SolverResult<EntityHandle> {
        let system = self.system(group)?;
        let x = system.var(position.x, free);
        let y = system.var(position.y, free);
        Ok(system.push_entity(Entity::Point([x, y])))
    }
}

impl SolverCapability for NewtonSolver {
    fn create_group(&mut self) -> SolverResult<GroupId> {
        self.next_group += 1;
        let id = GroupId(self.next_group);
        self.groups.insert(id, System::default());
        Ok(id)
    }

    fn free_group(&mut self, group: GroupId) {
        if self.groups.remove(&group).is_none() {
            tracing::warn!("freeing unknown solver group {:?}", group);
        }
    }

    fn add_point(&mut self, group: GroupId, position: DVec2) -> SolverResult<EntityHandle> {
        self.add_point_var(group, position, true)
    }

    fn add_anchor_point(
        &mut self,
        group: GroupId,
        position: DVec2,
    ) -> SolverResult<EntityHandle> {
        self.add_point_var(group, position, false)
    }

    fn add_line(
        &mut self,
        group: GroupId,
        start: EntityHandle,
        end: EntityHandle,
    ) -> SolverResult<EntityHandle> {
        let system = self.system(group)?;
        let seg = [system.point(start)?, system.point(end)?];
        Ok(system.push_entity(Entity::Line(seg)))
    }

    fn add_circle(
        &mut self,
        group: GroupId,
        center: EntityHandle,
        radius: f64,
    ) -> SolverResult<EntityHandle> {
        let system = self.system(group)?;
        let center = system.point(center)?;
        let radius = system.var(radius, true);
        Ok(system.push_entity(Entity::Circle { center, radius }))
    }

    fn add_arc(
        &mut self,
        group: GroupId,
        center: EntityHandle,
        start: EntityHandle,
        end: EntityHandle,
    ) -> SolverResult<EntityHandle> {
        let system = self.system(group)?;
        let (center, start, end) = (system.point(center)?, system.point(start)?, system.point(end)?);
        let initial = system.position(start).distance(system.position(center));
        let radius = system.var(initial, true);
        // Both endpoints stay on the arc's circle
        system
            .equations
            .push(Equation::PointOnCircle(start, center, radius));
        system
            .equations
            .push(Equation::PointOnCircle(end, center, radius));
        Ok(system.push_entity(Entity::Arc { center, radius }))
    }

    fn coincident(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
    ) -> SolverResult<()> {
        self.constrain(group, |s| Ok(Equation::Coincident(s.point(a)?, s.point(b)?)))
    }

    fn horizontal(&mut self, group: GroupId, line: EntityHandle) -> SolverResult<()> {
        self.constrain(group, |s| Ok(Equation::Horizontal(s.line(line)?)))
    }

    fn vertical(&mut self, group: GroupId, line: EntityHandle) -> SolverResult<()> {
        self.constrain(group, |s| Ok(Equation::Vertical(s.line(line)?)))
    }

    fn parallel(&mut self, group: GroupId, a: EntityHandle, b: EntityHandle) -> SolverResult<()> {
        self.constrain(group, |s| Ok(Equation::Parallel(s.line(a)?, s.line(b)?)))
    }

    fn perpendicular(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::Perpendicular(s.line(a)?, s.line(b)?))
        })
    }

    fn tangent(&mut self, group: GroupId, a: EntityHandle, b: EntityHandle) -> SolverResult<()> {
        self.constrain(group, |s| match (s.entity(a)?, s.entity(b)?) {
            (Entity::Line(line), _) => {
                let (center, radius) = s.round(b)?;
                Ok(Equation::LineTangent {
                    line,
                    center,
                    radius,
                })
            }
            (_, Entity::Line(line)) => {
                let (center, radius) = s.round(a)?;
                Ok(Equation::LineTangent {
                    line,
                    center,
                    radius,
                })
            }
            _ => {
                let ((c1, r1), (c2, r2)) = (s.round(a)?, s.round(b)?);
                Ok(Equation::CircleTangent { c1, r1, c2, r2 })
            }
        })
    }

    fn equal_length(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
    ) -> SolverResult<()> {
        self.constrain(group, |s| Ok(Equation::EqualLength(s.line(a)?, s.line(b)?)))
    }

    fn equal_radius(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::EqualRadius(s.round(a)?.1, s.round(b)?.1))
        })
    }

    fn midpoint(
        &mut self,
        group: GroupId,
        point: EntityHandle,
        line: EntityHandle,
    ) -> SolverResult<()> {
        self.constrain(group, |s| Ok(Equation::Midpoint(s.point(point)?, s.line(line)?)))
    }

    fn point_on_line(
        &mut self,
        group: GroupId,
        point: EntityHandle,
        line: EntityHandle,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::PointOnLine(s.point(point)?, s.line(line)?))
        })
    }

    fn point_on_circle(
        &mut self,
        group: GroupId,
        point: EntityHandle,
        circle: EntityHandle,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            let (center, radius) = s.round(circle)?;
            Ok(Equation::PointOnCircle(s.point(point)?, center, radius))
        })
    }

    fn distance(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
        value: f64,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::Distance(s.point(a)?, s.point(b)?, value))
        })
    }

    fn point_line_distance(
        &mut self,
        group: GroupId,
        point: EntityHandle,
        line: EntityHandle,
        value: f64,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::PointLineDistance(s.point(point)?, s.line(line)?, value))
        })
    }

    fn angle(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
        radians: f64,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::Angle(s.line(a)?, s.line(b)?, radians))
        })
    }

    fn radius(&mut self, group: GroupId, circle: EntityHandle, value: f64) -> SolverResult<()> {
        self.constrain(group, |s| Ok(Equation::Radius(s.round(circle)?.1, value)))
    }

    fn diameter(&mut self, group: GroupId, circle: EntityHandle, value: f64) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::Radius(s.round(circle)?.1, value * 0.5))
        })
    }

    fn horizontal_distance(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
        value: f64,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::HorizontalDistance(s.point(a)?, s.point(b)?, value))
        })
    }

    fn vertical_distance(
        &mut self,
        group: GroupId,
        a: EntityHandle,
        b: EntityHandle,
        value: f64,
    ) -> SolverResult<()> {
        self.constrain(group, |s| {
            Ok(Equation::VerticalDistance(s.point(a)?, s.point(b)?, value))
        })
    }

    fn solve(&mut self, group: GroupId) -> SolverResult<RawSolveReport> {
        let config = self.config.clone();
        let system = self.system(group)?;

        let unknowns: Vec<usize> = (0..system.values.len())
            .filter(|&i| system.free[i])
            .collect();
        if unknowns.len() > config.max_unknowns {
            return Ok(RawSolveReport {
                ok: false,
                status: status::TOO_MANY_UNKNOWNS,
                dof: None,
            });
        }

        let mut x = system.values.clone();
        let mut stalled = false;
        for _ in 0..config.max_iterations {
            let f = system.residuals(&x);
            if norm(&f) < config.tolerance {
                break;
            }
            let j = system.jacobian(&x, &unknowns, f.len());
            let Some(dx) = least_squares_step(&j, &f, unknowns.len()) else {
                stalled = true;
                break;
            };
            for (k, &var) in unknowns.iter().enumerate() {
                x[var] += config.damping * dx[k];
            }
            if norm(&dx) < config.tolerance * 1e-3 {
                stalled = true;
                break;
            }
        }

        let f = system.residuals(&x);
        let residual = norm(&f);
        if residual >= config.tolerance {
            let code = if stalled {
                status::INCONSISTENT
            } else {
                status::DIDNT_CONVERGE
            };
            tracing::debug!(
                "solver group {:?} failed with status {} (residual {:e})",
                group,
                code,
                residual
            );
            return Ok(RawSolveReport {
                ok: false,
                status: code,
                dof: None,
            });
        }

        let j = system.jacobian(&x, &unknowns, f.len());
        let rank = rank(j, unknowns.len());
        let dof = (unknowns.len() - rank) as i32;
        system.values = x;

        Ok(RawSolveReport {
            ok: true,
            status: if rank < f.len() {
                status::REDUNDANT_OKAY
            } else {
                status::OKAY
            },
            dof: Some(dof),
        })
    }

    fn point_position(&self, group: GroupId, point: EntityHandle) -> SolverResult<DVec2> {
        let system = self
            .groups
            .get(&group)
            .ok_or(SolverError::UnknownGroup(group))?;
        Ok(system.position(system.point(point)?))
    }

    fn circle_radius(&self, group: GroupId, circle: EntityHandle) -> Option<f64> {
        let system = self.groups.get(&group)?;
        let (_, radius) = system.round(circle).ok()?;
        Some(system.values[radius])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_horizontal_constraint() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let p1 = solver.add_point(g, DVec2::new(0.0, 0.0)).unwrap();
        let p2 = solver.add_point(g, DVec2::new(10.0, 5.0)).unwrap();
        let line = solver.add_line(g, p1, p2).unwrap();
        solver.horizontal(g, line).unwrap();

        let report = solver.solve(g).unwrap();
        assert!(report.ok);
        assert_eq!(report.status, status::OKAY);
        assert_eq!(report.dof, Some(3));

        let a = solver.point_position(g, p1).unwrap();
        let b = solver.point_position(g, p2).unwrap();
        assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
    }

    #[test]
    fn test_anchored_distance() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let origin = solver.add_anchor_point(g, DVec2::ZERO).unwrap();
        let p = solver.add_point(g, DVec2::new(5.0, 0.0)).unwrap();
        solver.distance(g, origin, p, 10.0).unwrap();

        let report = solver.solve(g).unwrap();
        assert!(report.ok);
        assert_eq!(report.dof, Some(1));
        assert_relative_eq!(solver.point_position(g, p).unwrap().length(), 10.0, epsilon = 1e-9);
        assert_eq!(solver.point_position(g, origin).unwrap(), DVec2::ZERO);
    }

    #[test]
    fn test_pinned_point_fully_constrained() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let origin = solver.add_anchor_point(g, DVec2::ZERO).unwrap();
        let p = solver.add_point(g, DVec2::new(3.0, 4.0)).unwrap();
        solver.horizontal_distance(g, origin, p, 3.0).unwrap();
        solver.vertical_distance(g, origin, p, 4.0).unwrap();

        let report = solver.solve(g).unwrap();
        assert_eq!(report.status, status::OKAY);
        assert_eq!(report.dof, Some(0));
    }

    #[test]
    fn test_redundant_constraints() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let p1 = solver.add_point(g, DVec2::new(0.0, 0.0)).unwrap();
        let p2 = solver.add_point(g, DVec2::new(4.0, 1.0)).unwrap();
        let line = solver.add_line(g, p1, p2).unwrap();
        solver.horizontal(g, line).unwrap();
        solver.vertical_distance(g, p1, p2, 0.0).unwrap();

        let report = solver.solve(g).unwrap();
        assert!(report.ok);
        assert_eq!(report.status, status::REDUNDANT_OKAY);
    }

    #[test]
    fn test_inconsistent_constraints() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let a = solver.add_anchor_point(g, DVec2::ZERO).unwrap();
        let b = solver.add_anchor_point(g, DVec2::new(1.0, 0.0)).unwrap();
        solver.distance(g, a, b, 5.0).unwrap();

        let report = solver.solve(g).unwrap();
        assert!(!report.ok);
        assert!(matches!(
            report.status,
            status::INCONSISTENT | status::DIDNT_CONVERGE
        ));
    }

    #[test]
    fn test_too_many_unknowns() {
        let mut solver = NewtonSolver::with_config(SolverConfig {
            max_unknowns: 2,
            ..SolverConfig::default()
        });
        let g = solver.create_group().unwrap();
        solver.add_point(g, DVec2::ZERO).unwrap();
        solver.add_point(g, DVec2::ONE).unwrap();

        let report = solver.solve(g).unwrap();
        assert_eq!(report.status, status::TOO_MANY_UNKNOWNS);
    }

    #[test]
    fn test_circle_radius_readback() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let c = solver.add_anchor_point(g, DVec2::ZERO).unwrap();
        let circle = solver.add_circle(g, c, 2.0).unwrap();
        solver.diameter(g, circle, 10.0).unwrap();

        let report = solver.solve(g).unwrap();
        assert_eq!(report.dof, Some(0));
        assert_relative_eq!(solver.circle_radius(g, circle).unwrap(), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_arc_keeps_endpoints_on_circle() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let c = solver.add_anchor_point(g, DVec2::ZERO).unwrap();
        let s = solver.add_point(g, DVec2::new(1.0, 0.0)).unwrap();
        let e = solver.add_point(g, DVec2::new(0.0, 1.5)).unwrap();
        let arc = solver.add_arc(g, c, s, e).unwrap();
        solver.radius(g, arc, 2.0).unwrap();

        let report = solver.solve(g).unwrap();
        assert!(report.ok);
        assert_relative_eq!(solver.point_position(g, s).unwrap().length(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(solver.point_position(g, e).unwrap().length(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tangent_line_circle() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let p1 = solver.add_anchor_point(g, DVec2::new(-5.0, 3.0)).unwrap();
        let p2 = solver.add_anchor_point(g, DVec2::new(5.0, 3.0)).unwrap();
        let line = solver.add_line(g, p1, p2).unwrap();
        let c = solver.add_anchor_point(g, DVec2::ZERO).unwrap();
        let circle = solver.add_circle(g, c, 1.0).unwrap();
        solver.tangent(g, line, circle).unwrap();

        let report = solver.solve(g).unwrap();
        assert!(report.ok);
        assert_relative_eq!(solver.circle_radius(g, circle).unwrap(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wrong_entity_kind() {
        let mut solver = NewtonSolver::new();
        let g = solver.create_group().unwrap();
        let p = solver.add_point(g, DVec2::ZERO).unwrap();
        assert!(matches!(
            solver.horizontal(g, p),
            Err(SolverError::WrongEntityKind { .. })
        ));
        assert!(matches!(
            solver.solve(GroupId(42)),
            Err(SolverError::UnknownGroup(_))
        ));
    }
}
