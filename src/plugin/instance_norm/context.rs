//! Execution context binding and per-shape descriptors

use crate::error::{Error, Result};
use crate::ops::{InstanceNormShape, WorkspaceLayout};
use crate::plugin::AuxHandle;
use crate::runtime::Runtime;
use std::sync::{Arc, Weak};

/// Handles recorded between attach and detach
///
/// Nothing here is owned: the client and allocator belong to the host and
/// are only upgraded for the duration of a call.
pub struct BoundContext<R: Runtime> {
    client: Weak<R::Client>,
    aux: Option<AuxHandle>,
    allocator: Option<Weak<R::Allocator>>,
    descriptors: ShapeDescriptors,
}

impl<R: Runtime> BoundContext<R> {
    /// Record the handles and allocate empty descriptors
    pub fn attach(
        client: &Arc<R::Client>,
        aux: Option<AuxHandle>,
        allocator: Option<&Arc<R::Allocator>>,
    ) -> Self {
        Self {
            client: Arc::downgrade(client),
            aux,
            allocator: allocator.map(Arc::downgrade),
            descriptors: ShapeDescriptors::default(),
        }
    }

    /// The bound client, if the host still holds it
    pub fn client(&self) -> Result<Arc<R::Client>> {
        self.client
            .upgrade()
            .ok_or_else(|| Error::invalid_state("enqueue", "attached context has been dropped"))
    }

    /// The auxiliary linear-algebra handle, if one was supplied
    pub fn aux(&self) -> Option<AuxHandle> {
        self.aux
    }

    /// The bound allocator, if one was supplied and is still alive
    pub fn allocator(&self) -> Option<Arc<R::Allocator>> {
        self.allocator.as_ref().and_then(Weak::upgrade)
    }

    /// Descriptors for the current shape
    pub fn descriptors(&self) -> &ShapeDescriptors {
        &self.descriptors
    }

    /// Mutable access for rebuilding
    pub fn descriptors_mut(&mut self) -> &mut ShapeDescriptors {
        &mut self.descriptors
    }
}

/// Shape descriptor handed to the normalization primitive
///
/// Records the concrete problem shape (`N * C` instances of `S` elements) the
/// primitive is launched with. Empty until the first concrete shape is seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapeDescriptors {
    shape: Option<InstanceNormShape>,
    rebuilds: usize,
}

impl ShapeDescriptors {
    /// Shape the descriptors currently describe
    pub fn shape(&self) -> Option<&InstanceNormShape> {
        self.shape.as_ref()
    }

    /// Times the descriptors were rebuilt for a new shape
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Rebuild for `shape` unless already current
    pub fn update(&mut self, shape: &InstanceNormShape) -> Result<&InstanceNormShape> {
        if self.shape.as_ref() != Some(shape) {
            tracing::debug!(
                batch = shape.batch,
                channels = shape.channels,
                spatial = shape.spatial,
                dtype = %shape.dtype,
                format = %shape.format,
                workspace = WorkspaceLayout::for_shape(shape)?.size,
                "rebuilt instance norm descriptors"
            );
            self.rebuilds += 1;
        }
        Ok(self.shape.insert(*shape))
    }
}
