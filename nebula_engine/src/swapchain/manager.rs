/// Swapchain lifecycle manager
///
/// Owns the presentable chain and everything whose size is tied to the
/// presentation surface: per-image framebuffers, the shared depth image,
/// and the per-image render-finished semaphores. `rebuild` replaces all of
/// it wholesale - there is no partially-rebuilt observable state - and then
/// drives the resize cascade over surface-matched resources.

use std::sync::Arc;
use std::time::Duration;

use crate::binding::DescriptorBindingSet;
use crate::device::{
    AttachmentDesc, Extent2d, FramebufferAttachment, FramebufferDesc, FramebufferHandle,
    GraphicsDevice, ImageAllocationDesc, ImageFormat, ImageUsageFlags, LoadOp, RenderPassDesc,
    RenderPassHandle, SemaphoreHandle, StoreOp, SwapchainProperties,
};
use crate::error::Result;
use crate::resource::{ImageResource, ResourceId};
use crate::target::RenderTarget;
use crate::engine_info;

/// Queries the current drawable size of the presentation surface
pub type SurfaceExtentFn = Box<dyn Fn() -> Extent2d + Send + Sync>;

/// How long to sleep between surface-size polls while minimized
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Owns the presentable chain and its surface-sized dependents
pub struct SwapchainManager {
    device: Arc<dyn GraphicsDevice>,
    extent_fn: SurfaceExtentFn,
    with_depth: bool,
    props: SwapchainProperties,
    present_pass: RenderPassHandle,
    depth: Option<crate::device::ImageHandle>,
    /// One framebuffer per presentable image
    framebuffers: Vec<FramebufferHandle>,
    /// One render-finished semaphore per presentable image
    render_finished: Vec<SemaphoreHandle>,
}

impl SwapchainManager {
    /// Create the chain and its dependents at the current surface size
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        extent_fn: SurfaceExtentFn,
        with_depth: bool,
    ) -> Result<Self> {
        let extent = Self::wait_for_nonzero_extent(&extent_fn);
        let props = device.create_swapchain(extent)?;

        let present_pass = device.create_render_pass(&RenderPassDesc {
            color: vec![AttachmentDesc {
                format: props.format,
                load_op: LoadOp::Clear,
                store_op: StoreOp::Store,
            }],
            depth: with_depth.then_some(AttachmentDesc {
                format: ImageFormat::D32_FLOAT,
                load_op: LoadOp::Clear,
                store_op: StoreOp::DontCare,
            }),
            presentable: true,
        })?;

        let mut manager = Self {
            device,
            extent_fn,
            with_depth,
            props,
            present_pass,
            depth: None,
            framebuffers: Vec::new(),
            render_finished: Vec::new(),
        };
        manager.create_dependents()?;
        Ok(manager)
    }

    /// Poll the surface size until it is non-zero
    ///
    /// A minimized window reports a zero extent; this deliberately stalls
    /// the caller until the window is restored.
    fn wait_for_nonzero_extent(extent_fn: &SurfaceExtentFn) -> Extent2d {
        loop {
            let extent = extent_fn();
            if !extent.is_zero() {
                return extent;
            }
            std::thread::sleep(MINIMIZED_POLL_INTERVAL);
        }
    }

    /// Create depth image, per-image framebuffers and semaphores
    fn create_dependents(&mut self) -> Result<()> {
        let extent = self.props.extent;

        self.depth = if self.with_depth {
            Some(self.device.create_image(&ImageAllocationDesc {
                extent,
                format: ImageFormat::D32_FLOAT,
                usage: ImageUsageFlags::DEPTH_ATTACHMENT,
                mip_levels: 1,
                array_layers: 1,
                cube: false,
            })?)
        } else {
            None
        };

        let mut framebuffers = Vec::with_capacity(self.props.image_count);
        let mut render_finished = Vec::with_capacity(self.props.image_count);
        for image_index in 0..self.props.image_count {
            let mut attachments = vec![FramebufferAttachment::SwapchainImage(image_index as u32)];
            if let Some(depth) = self.depth {
                attachments.push(FramebufferAttachment::Image(depth));
            }
            framebuffers.push(self.device.create_framebuffer(&FramebufferDesc {
                render_pass: self.present_pass,
                attachments,
                extent,
            })?);
            render_finished.push(self.device.create_semaphore()?);
        }
        self.framebuffers = framebuffers;
        self.render_finished = render_finished;
        Ok(())
    }

    /// Destroy depth image, framebuffers and semaphores
    fn destroy_dependents(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(framebuffer);
        }
        for semaphore in self.render_finished.drain(..) {
            self.device.destroy_semaphore(semaphore);
        }
        if let Some(depth) = self.depth.take() {
            self.device.destroy_image(depth);
        }
    }

    /// Rebuild the chain and run the resize cascade
    ///
    /// Blocks while the surface reports a zero extent, then waits for full
    /// device idle (the one place all flight slots synchronize at once),
    /// replaces the chain and its dependents, rebuilds every surface-matched
    /// image and render target at the new extent, and finally clears the
    /// validity of bindings referencing the rebuilt images. Resources are
    /// rebuilt before bindings are invalidated so no table can reference a
    /// freed GPU object mid-draw.
    pub fn rebuild(
        &mut self,
        surface_images: &[Arc<ImageResource>],
        targets: &[Arc<RenderTarget>],
        binding_sets: &[Arc<DescriptorBindingSet>],
    ) -> Result<()> {
        let extent = Self::wait_for_nonzero_extent(&self.extent_fn);

        self.device.wait_idle()?;
        self.destroy_dependents();

        self.props = self.device.create_swapchain(extent)?;
        self.create_dependents()?;

        let extent = self.props.extent;
        let mut rebuilt: Vec<ResourceId> = Vec::new();
        for image in surface_images {
            image.rebuild(extent)?;
            rebuilt.push(image.id());
        }
        for target in targets {
            if target.is_surface_matched() {
                target.rebuild(extent)?;
            }
        }
        for set in binding_sets {
            set.invalidate_resources(&rebuilt);
        }

        engine_info!(
            "nebula::Swapchain",
            "Swapchain rebuilt at {}x{} ({} images, {} surface-matched resources)",
            extent.width,
            extent.height,
            self.props.image_count,
            rebuilt.len()
        );
        Ok(())
    }

    /// Current chain extent
    pub fn extent(&self) -> Extent2d {
        self.props.extent
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.props.image_count
    }

    /// Presentable image format
    pub fn format(&self) -> ImageFormat {
        self.props.format
    }

    /// The on-screen render pass (pipeline compatibility)
    pub fn present_pass(&self) -> RenderPassHandle {
        self.present_pass
    }

    /// True when the on-screen pass carries a depth attachment
    pub fn has_depth(&self) -> bool {
        self.with_depth
    }

    /// Framebuffer for a presentable image
    pub fn framebuffer(&self, image_index: u32) -> FramebufferHandle {
        self.framebuffers[image_index as usize]
    }

    /// Render-finished semaphore for a presentable image
    pub fn render_finished(&self, image_index: u32) -> SemaphoreHandle {
        self.render_finished[image_index as usize]
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        self.destroy_dependents();
        self.device.destroy_render_pass(self.present_pass);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
