/// Central resource pool - build/fill/destroy resources by slot index
///
/// Application code addresses resources by small integer indices chosen at
/// build time; building into an occupied index destroys the old resource
/// (releases the pool's strong reference) and creates the new one.

use std::sync::Arc;

use crate::device::{
    BufferAllocationDesc, BufferUsageFlags, Extent2d, GraphicsDevice, QueueKind, SamplerDesc,
};
use crate::error::Result;
use crate::frame::FlightSlot;
use crate::resource::{
    record_and_wait, BufferDesc, BufferResource, ImageDesc, ImageResource, SamplerResource,
};
use crate::engine_debug;

/// Owns the engine's strong references to built resources
pub struct ResourcePool {
    device: Arc<dyn GraphicsDevice>,
    frames_in_flight: usize,
    buffers: Vec<Option<Arc<BufferResource>>>,
    images: Vec<Option<Arc<ImageResource>>>,
    samplers: Vec<Option<Arc<SamplerResource>>>,
}

impl ResourcePool {
    /// Create an empty pool
    pub fn new(device: Arc<dyn GraphicsDevice>, frames_in_flight: usize) -> Self {
        Self {
            device,
            frames_in_flight,
            buffers: Vec::new(),
            images: Vec::new(),
            samplers: Vec::new(),
        }
    }

    /// Number of flight slots resources are replicated across
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    // ===== Buffers =====

    /// Build (or rebuild) the buffer at `index`
    ///
    /// Initial contents are written directly for host-visible buffers and
    /// staged through a temporary host-visible buffer for device-local
    /// ones; the staging path waits for the copy to complete before the
    /// staging buffer is freed.
    pub fn build_buffer(&mut self, index: usize, desc: BufferDesc) -> Result<Arc<BufferResource>> {
        if index >= self.buffers.len() {
            self.buffers.resize_with(index + 1, || None);
        }
        if self.buffers[index].take().is_some() {
            engine_debug!("nebula::Pool", "Rebuilding buffer at index {}", index);
        }

        let resource = BufferResource::build(Arc::clone(&self.device), self.frames_in_flight, &desc)?;

        if let Some(data) = &desc.data {
            for allocation in 0..resource.allocation_count() {
                let slot = FlightSlot::new(allocation);
                if resource.is_host_visible() {
                    resource.write(slot, 0, data)?;
                } else {
                    self.staged_upload(resource.handle_for_slot(slot, 0), data)?;
                }
            }
        }

        self.buffers[index] = Some(Arc::clone(&resource));
        Ok(resource)
    }

    /// The buffer at `index`, if built
    pub fn buffer(&self, index: usize) -> Option<Arc<BufferResource>> {
        self.buffers.get(index).and_then(|slot| slot.clone())
    }

    /// Release the pool's reference to the buffer at `index`
    ///
    /// The GPU objects live on until every binding set holding the
    /// resource releases it as well.
    pub fn destroy_buffer(&mut self, index: usize) {
        if let Some(slot) = self.buffers.get_mut(index) {
            *slot = None;
        }
    }

    /// Copy `data` into a device-local buffer through a staging buffer
    fn staged_upload(&self, dst: crate::device::BufferHandle, data: &[u8]) -> Result<()> {
        let staging = self.device.create_buffer(&BufferAllocationDesc {
            size: data.len() as u64,
            usage: BufferUsageFlags::TRANSFER_SRC,
            host_visible: true,
        })?;
        let result = self
            .device
            .write_buffer(staging, 0, data)
            .and_then(|_| {
                record_and_wait(&self.device, QueueKind::Graphics, |rec| {
                    rec.copy_buffer(staging, dst, data.len() as u64)
                })
            });
        self.device.destroy_buffer(staging);
        result
    }

    // ===== Images =====

    /// Build (or rebuild) the image at `index`
    ///
    /// `surface_extent` resolves surface-matched sizing; the engine passes
    /// the current swapchain extent here.
    pub fn build_image(
        &mut self,
        index: usize,
        desc: ImageDesc,
        surface_extent: Extent2d,
    ) -> Result<Arc<ImageResource>> {
        if index >= self.images.len() {
            self.images.resize_with(index + 1, || None);
        }
        if self.images[index].take().is_some() {
            engine_debug!("nebula::Pool", "Rebuilding image at index {}", index);
        }

        let resource = ImageResource::build(
            Arc::clone(&self.device),
            self.frames_in_flight,
            desc,
            surface_extent,
        )?;
        self.images[index] = Some(Arc::clone(&resource));
        Ok(resource)
    }

    /// The image at `index`, if built
    pub fn image(&self, index: usize) -> Option<Arc<ImageResource>> {
        self.images.get(index).and_then(|slot| slot.clone())
    }

    /// Release the pool's reference to the image at `index`
    pub fn destroy_image(&mut self, index: usize) {
        if let Some(slot) = self.images.get_mut(index) {
            *slot = None;
        }
    }

    /// Every built surface-matched image (resize cascade input)
    pub fn surface_matched_images(&self) -> Vec<Arc<ImageResource>> {
        self.images
            .iter()
            .flatten()
            .filter(|image| image.is_surface_matched())
            .cloned()
            .collect()
    }

    // ===== Samplers =====

    /// Build (or rebuild) the sampler at `index`
    pub fn build_sampler(
        &mut self,
        index: usize,
        desc: &SamplerDesc,
    ) -> Result<Arc<SamplerResource>> {
        if index >= self.samplers.len() {
            self.samplers.resize_with(index + 1, || None);
        }
        if self.samplers[index].take().is_some() {
            engine_debug!("nebula::Pool", "Rebuilding sampler at index {}", index);
        }

        let resource = SamplerResource::build(Arc::clone(&self.device), desc)?;
        self.samplers[index] = Some(Arc::clone(&resource));
        Ok(resource)
    }

    /// The sampler at `index`, if built
    pub fn sampler(&self, index: usize) -> Option<Arc<SamplerResource>> {
        self.samplers.get(index).and_then(|slot| slot.clone())
    }

    /// Release the pool's reference to the sampler at `index`
    pub fn destroy_sampler(&mut self, index: usize) {
        if let Some(slot) = self.samplers.get_mut(index) {
            *slot = None;
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
