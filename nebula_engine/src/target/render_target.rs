/// Off-screen render targets
///
/// A render target owns one framebuffer per flight slot, each referencing
/// the matching replica of its color image plus an internal depth image.
/// The color image lives in the resource pool so binding sets can sample
/// the target's output; surface-matched targets are rebuilt by the resize
/// cascade after their color image was.

use std::sync::{Arc, Mutex};

use crate::device::{
    AttachmentDesc, Extent2d, FramebufferAttachment, FramebufferDesc, FramebufferHandle,
    GraphicsDevice, ImageFormat, ImageUsageFlags, LoadOp, RenderPassDesc, RenderPassHandle,
    StoreOp,
};
use crate::error::Result;
use crate::frame::FlightSlot;
use crate::resource::{ImageDesc, ImageResource, ImageSizing, ImageSource};
use crate::engine_bail_invalid;

/// Blueprint for a render target
#[derive(Debug, Clone)]
pub struct RenderTargetDesc {
    /// Pool index of the color image the target draws into.
    /// The image must be built with `COLOR_ATTACHMENT` usage; its sizing
    /// policy decides whether the target follows surface resizes.
    pub color_image: usize,
    /// Attach an internal depth image
    pub with_depth: bool,
    /// Color load op at pass start
    pub load_op: LoadOp,
}

struct TargetInner {
    extent: Extent2d,
    /// One framebuffer per flight slot
    framebuffers: Vec<FramebufferHandle>,
}

/// A built off-screen render target
pub struct RenderTarget {
    device: Arc<dyn GraphicsDevice>,
    frames_in_flight: usize,
    render_pass: RenderPassHandle,
    color: Arc<ImageResource>,
    depth: Option<Arc<ImageResource>>,
    inner: Mutex<TargetInner>,
}

impl RenderTarget {
    /// Build a render target over an already-built color image
    pub(crate) fn build(
        device: Arc<dyn GraphicsDevice>,
        frames_in_flight: usize,
        desc: &RenderTargetDesc,
        color: Arc<ImageResource>,
    ) -> Result<Arc<Self>> {
        let extent = color.extent();
        if extent.is_zero() {
            engine_bail_invalid!("nebula::RenderTarget", "Render target extent must be non-zero");
        }

        let depth = if desc.with_depth {
            Some(ImageResource::build(
                Arc::clone(&device),
                frames_in_flight,
                ImageDesc {
                    sizing: if color.is_surface_matched() {
                        ImageSizing::SurfaceMatched
                    } else {
                        ImageSizing::Fixed(extent)
                    },
                    format: ImageFormat::D32_FLOAT,
                    usage: ImageUsageFlags::DEPTH_ATTACHMENT,
                    source: ImageSource::Uninitialized,
                    per_slot: false,
                },
                extent,
            )?)
        } else {
            None
        };

        let render_pass = device.create_render_pass(&RenderPassDesc {
            color: vec![AttachmentDesc {
                format: color.format(),
                load_op: desc.load_op,
                store_op: StoreOp::Store,
            }],
            depth: depth.as_ref().map(|d| AttachmentDesc {
                format: d.format(),
                load_op: LoadOp::Clear,
                store_op: StoreOp::DontCare,
            }),
            presentable: false,
        })?;

        let target = Self {
            device,
            frames_in_flight,
            render_pass,
            color,
            depth,
            inner: Mutex::new(TargetInner {
                extent,
                framebuffers: Vec::new(),
            }),
        };
        target.create_framebuffers(extent)?;
        Ok(Arc::new(target))
    }

    fn create_framebuffers(&self, extent: Extent2d) -> Result<()> {
        let mut framebuffers = Vec::with_capacity(self.frames_in_flight);
        for slot_index in 0..self.frames_in_flight {
            let slot = FlightSlot::new(slot_index);
            let mut attachments = vec![FramebufferAttachment::Image(
                self.color.handle_for_slot(slot),
            )];
            if let Some(depth) = &self.depth {
                attachments.push(FramebufferAttachment::Image(depth.handle_for_slot(slot)));
            }
            framebuffers.push(self.device.create_framebuffer(&FramebufferDesc {
                render_pass: self.render_pass,
                attachments,
                extent,
            })?);
        }

        let mut inner = self.inner.lock().unwrap();
        inner.extent = extent;
        inner.framebuffers = framebuffers;
        Ok(())
    }

    /// True when the target follows surface resizes
    pub fn is_surface_matched(&self) -> bool {
        self.color.is_surface_matched()
    }

    /// Current target dimensions
    pub fn extent(&self) -> Extent2d {
        self.inner.lock().unwrap().extent
    }

    /// The target's render pass (pipeline compatibility)
    pub fn render_pass(&self) -> RenderPassHandle {
        self.render_pass
    }

    /// True when the target carries a depth attachment
    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// The color image the target draws into
    pub fn color_image(&self) -> &Arc<ImageResource> {
        &self.color
    }

    /// Framebuffer for the given flight slot
    pub fn framebuffer(&self, slot: FlightSlot) -> FramebufferHandle {
        self.inner.lock().unwrap().framebuffers[slot.index()]
    }

    /// Rebuild framebuffers (and the internal depth image) at a new extent
    ///
    /// The resize cascade rebuilds the color image first (it lives in the
    /// pool), then calls this; the ordering keeps framebuffers from ever
    /// referencing freed image handles.
    pub(crate) fn rebuild(&self, extent: Extent2d) -> Result<()> {
        {
            let inner = self.inner.lock().unwrap();
            for &framebuffer in &inner.framebuffers {
                self.device.destroy_framebuffer(framebuffer);
            }
        }
        if let Some(depth) = &self.depth {
            depth.rebuild(extent)?;
        }
        self.create_framebuffers(extent)
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        let inner = self.inner.lock().unwrap();
        for &framebuffer in &inner.framebuffers {
            self.device.destroy_framebuffer(framebuffer);
        }
        self.device.destroy_render_pass(self.render_pass);
    }
}

#[cfg(test)]
#[path = "render_target_tests.rs"]
mod tests;
