//! Owned kernel handles
//!
//! Every owned handle the core receives from a kernel is wrapped in an
//! [`OwnedShape`] immediately. The wrapper is not `Clone` and releases the
//! handle on drop, so a handle is freed exactly once: intermediates at the end
//! of the evaluator that built them, final solids when the `OpResult` holding
//! them goes away.

use std::sync::Arc;

use super::{CadResult, GeometryKernel, ShapeId};

/// Shared reference to a geometry kernel
pub type KernelRef = Arc<dyn GeometryKernel>;

/// A kernel shape whose lifetime is tied to this value
pub struct OwnedShape {
    id: ShapeId,
    kernel: KernelRef,
}

impl OwnedShape {
    /// Take ownership of a handle freshly returned by `kernel`
    pub fn new(kernel: &KernelRef, id: ShapeId) -> Self {
        Self {
            id,
            kernel: Arc::clone(kernel),
        }
    }

    /// Wrap the result of a kernel call, propagating its error
    pub fn adopt(kernel: &KernelRef, result: CadResult<ShapeId>) -> CadResult<Self> {
        result.map(|id| Self::new(kernel, id))
    }

    /// The raw handle. Valid only while `self` is alive.
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// The kernel that owns the shape
    pub fn kernel(&self) -> &KernelRef {
        &self.kernel
    }
}

impl Drop for OwnedShape {
    fn drop(&mut self) {
        tracing::trace!(shape = %self.id, "releasing kernel shape");
        self.kernel.free(self.id);
    }
}

impl std::fmt::Debug for OwnedShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedShape")
            .field("id", &self.id)
            .field("kernel", &self.kernel.name())
            .finish()
    }
}
