//! Parametric Modeling Core
//!
//! This crate provides:
//! - A geometry kernel abstraction with an in-process polyhedral kernel
//! - Named parameters and expression-driven dimensions
//! - 2D sketches solved through a pluggable constraint solver
//! - An operation tree with incremental rebuild
//! - Topological references that survive re-enumeration

pub mod config;
pub mod kernel;
pub mod op;
pub mod param;
pub mod sketch;
pub mod solver;
pub mod studio;
pub mod topo;

// Re-exports for convenience
pub use config::{FormaConfig, HistoryConfig, RebuildConfig, SolverConfig};
pub use kernel::{
    Axis3D, BooleanType, CadError, CadResult, GeometryKernel, KernelRef, OwnedShape, PolyKernel,
    ShapeId, TessellatedMesh,
};
pub use op::{KernelContext, Op, OpError, OpKind, OpPatch, OpResult};
pub use param::{Dimension, ParamEnv, ParamError, ParamPatch, Parameter};
pub use sketch::{Plane, Sketch, SketchConstraint, SketchError, SolveStatus};
pub use solver::{NewtonSolver, SolverCapability};
pub use studio::{OpState, PartStudio, RebuildReport, StudioError};
pub use topo::{TopoKind, TopoMap, TopoRef, TopoSignature, resolve_topo_ref};
