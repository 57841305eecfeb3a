//! Forma document model
//!
//! Aggregates parameters, part studios, exported parts and assemblies, and
//! provides undo/redo over document snapshots.

pub mod assembly;
pub mod document;
pub mod history;

pub use assembly::{
    Assembly, AssemblyConstraint, AssemblyError, AssemblySolveStatus, MateKind, PartInstance,
};
pub use document::{Document, DocumentError, FORMAT_VERSION, Part};
pub use history::History;

pub use forma_cad;
