// Scoped device handles
//
// `Owned` keeps the device alive and destroys its handle on drop. Structs
// that hold several of them declare fields in reverse creation order, so a
// half-built struct unwinds correctly on an early `?` return too.

use super::gpu::{DeviceObject, Gpu};
use std::fmt;
use std::sync::Arc;

pub struct Owned<G: Gpu, H: Copy + Into<DeviceObject>> {
    handle: H,
    gpu: Arc<G>,
}

impl<G: Gpu, H: Copy + Into<DeviceObject>> Owned<G, H> {
    pub fn new(gpu: &Arc<G>, handle: H) -> Self {
        Self {
            handle,
            gpu: Arc::clone(gpu),
        }
    }

    #[inline]
    pub fn handle(&self) -> H {
        self.handle
    }
}

impl<G: Gpu, H: Copy + Into<DeviceObject>> Drop for Owned<G, H> {
    fn drop(&mut self) {
        self.gpu.destroy(self.handle.into());
    }
}

impl<G: Gpu, H: Copy + Into<DeviceObject> + fmt::Debug> fmt::Debug for Owned<G, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}
