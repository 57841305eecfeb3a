//! Geometry kernel abstraction
//!
//! The capability trait the modeling core is written against, the owning
//! handle wrapper, and a faceted reference implementation.

mod handle;
mod poly;
mod traits;

pub use handle::{KernelRef, OwnedShape};
pub use poly::PolyKernel;
pub use traits::*;
