//! Geometry kernel capability
//!
//! The modeling core never touches B-rep data directly. Every solid, face,
//! edge and vertex lives inside a kernel and is addressed through an opaque
//! [`ShapeId`]; this trait is the whole surface the core relies on.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle to a shape owned by a geometry kernel
///
/// Handles to solids, standalone wires and faces are owned by the caller and
/// must be released with [`GeometryKernel::free`]. Handles returned by the
/// enumeration methods (`faces`, `edges`, `vertices`) are views into their
/// parent and stay valid exactly as long as the parent does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(pub u64);

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shape#{}", self.0)
    }
}

/// Error type for CAD kernel operations
#[derive(Debug, Clone, Error)]
pub enum CadError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid shape {0}: {1}")]
    InvalidShape(ShapeId, String),

    #[error("Boolean operation failed: {0}")]
    BooleanFailed(String),

    #[error("Tessellation failed: {0}")]
    TessellationFailed(String),

    #[error("Kernel not available: {0}")]
    KernelNotAvailable(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for CAD operations
pub type CadResult<T> = Result<T, CadError>;

/// A tessellated mesh output from the CAD kernel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TessellatedMesh {
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals, one per position
    pub normals: Vec<[f32; 3]>,
    /// Triangle indices (3 indices per triangle)
    pub indices: Vec<u32>,
}

impl TessellatedMesh {
    /// Create an empty tessellated mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Get the number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Axis definition for revolve operations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis3D {
    /// Origin point of the axis
    pub origin: DVec3,
    /// Direction of the axis (normalized)
    pub direction: DVec3,
}

impl Axis3D {
    /// Create an axis from origin and direction
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// X axis at origin
    pub fn x() -> Self {
        Self::new(DVec3::ZERO, DVec3::X)
    }

    /// Y axis at origin
    pub fn y() -> Self {
        Self::new(DVec3::ZERO, DVec3::Y)
    }

    /// Z axis at origin
    pub fn z() -> Self {
        Self::new(DVec3::ZERO, DVec3::Z)
    }
}

/// Boolean operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanType {
    /// Union (fuse)
    Union,
    /// Subtraction (cut)
    Subtract,
    /// Intersection (common)
    Intersect,
}

/// The geometry kernel capability
///
/// Implementations wrap a concrete B-rep backend. All calls are synchronous
/// from the core's point of view; a backend that is asynchronous underneath
/// must hide that behind this interface.
pub trait GeometryKernel: Send + Sync {
    /// Get the name of this kernel
    fn name(&self) -> &str;

    // ========== Construction ==========

    /// Build a closed polygonal wire through `points`
    fn make_polygon(&self, points: &[DVec3]) -> CadResult<ShapeId>;

    /// Build a planar face bounded by a closed wire
    fn make_face(&self, wire: ShapeId) -> CadResult<ShapeId>;

    /// Sweep a planar face along `vector` into a solid
    fn extrude(&self, face: ShapeId, vector: DVec3) -> CadResult<ShapeId>;

    /// Revolve a planar face around `axis` by `angle` radians
    fn revolve(&self, face: ShapeId, axis: &Axis3D, angle: f64) -> CadResult<ShapeId>;

    /// Create a box centered at `center`
    fn make_box(&self, center: DVec3, size: DVec3) -> CadResult<ShapeId>;

    /// Create a cylinder whose base circle is centered at `base`
    fn make_cylinder(
        &self,
        base: DVec3,
        axis: DVec3,
        radius: f64,
        height: f64,
    ) -> CadResult<ShapeId>;

    /// Create a sphere
    fn make_sphere(&self, center: DVec3, radius: f64) -> CadResult<ShapeId>;

    /// Create a (possibly truncated) cone whose base circle is centered at `base`
    fn make_cone(
        &self,
        base: DVec3,
        axis: DVec3,
        bottom_radius: f64,
        top_radius: f64,
        height: f64,
    ) -> CadResult<ShapeId>;

    // ========== Modification ==========

    /// Perform a boolean operation, producing a new solid
    fn boolean(&self, a: ShapeId, b: ShapeId, op: BooleanType) -> CadResult<ShapeId>;

    /// Round the given edges of `shape`
    fn fillet(&self, shape: ShapeId, edges: &[ShapeId], radius: f64) -> CadResult<ShapeId>;

    /// Bevel the given edges of `shape`
    fn chamfer(&self, shape: ShapeId, edges: &[ShapeId], distance: f64) -> CadResult<ShapeId>;

    /// Produce a transformed copy of `shape`
    fn transform(&self, shape: ShapeId, matrix: &DMat4) -> CadResult<ShapeId>;

    // ========== Topology Queries ==========

    /// Faces of a shape, in kernel order
    fn faces(&self, shape: ShapeId) -> CadResult<Vec<ShapeId>>;

    /// Edges of a shape, in kernel order
    fn edges(&self, shape: ShapeId) -> CadResult<Vec<ShapeId>>;

    /// Vertices of a shape, in kernel order
    fn vertices(&self, shape: ShapeId) -> CadResult<Vec<ShapeId>>;

    /// Area centroid of a face
    fn face_center(&self, face: ShapeId) -> CadResult<DVec3>;

    /// Outward unit normal of a face
    fn face_normal(&self, face: ShapeId) -> CadResult<DVec3>;

    /// Area of a face
    fn face_area(&self, face: ShapeId) -> CadResult<f64>;

    /// Midpoint of an edge
    fn edge_midpoint(&self, edge: ShapeId) -> CadResult<DVec3>;

    /// Length of an edge
    fn edge_length(&self, edge: ShapeId) -> CadResult<f64>;

    /// Position of a vertex
    fn vertex_position(&self, vertex: ShapeId) -> CadResult<DVec3>;

    // ========== Output ==========

    /// Triangulate a shape with the given linear deflection
    fn mesh(&self, shape: ShapeId, deflection: f64) -> CadResult<TessellatedMesh>;

    /// Release a shape. Each owned handle must be freed exactly once.
    fn free(&self, shape: ShapeId);
}

/// A null kernel that always returns errors (used when no kernel is available)
#[derive(Debug, Default)]
pub struct NullKernel;

impl NullKernel {
    fn unavailable<T>() -> CadResult<T> {
        Err(CadError::KernelNotAvailable(
            "No CAD kernel available".into(),
        ))
    }
}

impl GeometryKernel for NullKernel {
    fn name(&self) -> &str {
        "null"
    }

    fn make_polygon(&self, _points: &[DVec3]) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn make_face(&self, _wire: ShapeId) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn extrude(&self, _face: ShapeId, _vector: DVec3) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn revolve(&self, _face: ShapeId, _axis: &Axis3D, _angle: f64) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn make_box(&self, _center: DVec3, _size: DVec3) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn make_cylinder(
        &self,
        _base: DVec3,
        _axis: DVec3,
        _radius: f64,
        _height: f64,
    ) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn make_sphere(&self, _center: DVec3, _radius: f64) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn make_cone(
        &self,
        _base: DVec3,
        _axis: DVec3,
        _bottom_radius: f64,
        _top_radius: f64,
        _height: f64,
    ) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn boolean(&self, _a: ShapeId, _b: ShapeId, _op: BooleanType) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn fillet(&self, _shape: ShapeId, _edges: &[ShapeId], _radius: f64) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn chamfer(&self, _shape: ShapeId, _edges: &[ShapeId], _distance: f64) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn transform(&self, _shape: ShapeId, _matrix: &DMat4) -> CadResult<ShapeId> {
        Self::unavailable()
    }

    fn faces(&self, _shape: ShapeId) -> CadResult<Vec<ShapeId>> {
        Self::unavailable()
    }

    fn edges(&self, _shape: ShapeId) -> CadResult<Vec<ShapeId>> {
        Self::unavailable()
    }

    fn vertices(&self, _shape: ShapeId) -> CadResult<Vec<ShapeId>> {
        Self::unavailable()
    }

    fn face_center(&self, _face: ShapeId) -> CadResult<DVec3> {
        Self::unavailable()
    }

    fn face_normal(&self, _face: ShapeId) -> CadResult<DVec3> {
        Self::unavailable()
    }

    fn face_area(&self, _face: ShapeId) -> CadResult<f64> {
        Self::unavailable()
    }

    fn edge_midpoint(&self, _edge: ShapeId) -> CadResult<DVec3> {
        Self::unavailable()
    }

    fn edge_length(&self, _edge: ShapeId) -> CadResult<f64> {
        Self::unavailable()
    }

    fn vertex_position(&self, _vertex: ShapeId) -> CadResult<DVec3> {
        Self::unavailable()
    }

    fn mesh(&self, _shape: ShapeId, _deflection: f64) -> CadResult<TessellatedMesh> {
        Self::unavailable()
    }

    fn free(&self, _shape: ShapeId) {}
}
