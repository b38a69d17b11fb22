//! Deferred resource deletion
//!
//! Any thread may mark a resource for collection, typically from a `Drop`
//! impl. Only the thread that owns the device collects, after the front
//! command queue has drained.
//!
//! A mark may arrive while the resource's creation command still sits in
//! the back queue. Each mark is therefore stamped with the current swap
//! epoch and only collected once a later swap has moved that back queue
//! to the front and executed it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::commands::delete_resource;
use super::device::{GpuResource, GraphicsDevice};

/// Mutex-guarded list of resources waiting for deletion
#[derive(Debug, Default)]
pub struct GarbageList {
    pending: Mutex<Vec<(u64, GpuResource)>>,
    epoch: AtomicU64,
}

impl GarbageList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Request deletion. Safe to call from any thread.
    pub fn mark_for_collection(&self, resource: GpuResource) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push((self.epoch.load(Ordering::Acquire), resource));
    }

    /// Number of resources waiting
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Record a queue swap; marks made before it become collectable once
    /// the swapped-in front queue has executed
    pub fn advance_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Delete every resource marked before the last swap. Returns how many
    /// were deleted.
    pub fn collect_garbage(&self, device: &mut dyn GraphicsDevice) -> usize {
        let epoch = self.epoch.load(Ordering::Acquire);
        let ready: Vec<GpuResource> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut *pending).into_iter().partition(|(marked, _)| *marked < epoch);
            *pending = waiting;
            ready.into_iter().map(|(_, resource)| resource).collect()
        };
        Self::delete_all(device, ready)
    }

    /// Delete everything regardless of epoch; used at shutdown once no
    /// queued command will run any more
    pub fn collect_all(&self, device: &mut dyn GraphicsDevice) -> usize {
        let resources = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        Self::delete_all(device, resources.into_iter().map(|(_, resource)| resource).collect())
    }

    fn delete_all(device: &mut dyn GraphicsDevice, resources: Vec<GpuResource>) -> usize {
        let mut deleted = 0;
        for resource in resources {
            match delete_resource(device, resource) {
                Ok(()) => deleted += 1,
                Err(e) => log::debug!("Garbage {:?} already gone: {}", resource, e),
            }
        }
        if deleted > 0 {
            log::trace!("Collected {} GPU resources", deleted);
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::software::SoftwareDevice;
    use crate::render::device::{TextureDesc, TextureFormat, TextureId};
    use std::sync::Arc;

    #[test]
    fn test_mark_from_other_thread_then_collect() {
        let mut device = SoftwareDevice::new();
        device.create_texture_2d(TextureId(1), &TextureDesc::new(2, 2, TextureFormat::Rgba8)).unwrap();

        let garbage = Arc::new(GarbageList::new());
        let remote = Arc::clone(&garbage);
        std::thread::spawn(move || remote.mark_for_collection(GpuResource::Texture(TextureId(1))))
            .join()
            .unwrap();

        assert_eq!(garbage.pending(), 1);
        assert_eq!(garbage.collect_garbage(&mut device), 0);
        garbage.advance_epoch();
        assert_eq!(garbage.collect_garbage(&mut device), 1);
        assert_eq!(garbage.pending(), 0);
        assert!(device.texture_size(TextureId(1)).is_none());
    }

    #[test]
    fn test_unknown_resource_is_ignored() {
        let mut device = SoftwareDevice::new();
        let garbage = GarbageList::new();
        garbage.mark_for_collection(GpuResource::Shader(crate::render::ShaderId(42)));
        garbage.advance_epoch();
        assert_eq!(garbage.collect_garbage(&mut device), 0);
        assert_eq!(garbage.pending(), 0);
    }
}
