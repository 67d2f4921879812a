/// Unit tests for off-screen render targets.

use std::sync::Arc;

use crate::device::mock_device::MockDevice;
use crate::device::{Extent2d, GraphicsDevice, ImageFormat, ImageUsageFlags, LoadOp};
use crate::frame::FlightSlot;
use crate::resource::{ImageDesc, ImageResource, ImageSizing, ImageSource};
use crate::target::{RenderTarget, RenderTargetDesc};

fn color_image(
    device: &Arc<dyn GraphicsDevice>,
    frames: usize,
    sizing: ImageSizing,
) -> Arc<ImageResource> {
    ImageResource::build(
        Arc::clone(device),
        frames,
        ImageDesc {
            sizing,
            format: ImageFormat::B8G8R8A8_UNORM,
            usage: ImageUsageFlags::COLOR_ATTACHMENT | ImageUsageFlags::SAMPLED,
            source: ImageSource::Uninitialized,
            per_slot: true,
        },
        Extent2d::new(800, 600),
    )
    .unwrap()
}

#[test]
fn test_target_owns_one_framebuffer_per_slot() {
    let mock = Arc::new(MockDevice::new());
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    let color = color_image(&device, 3, ImageSizing::Fixed(Extent2d::new(512, 512)));

    let target = RenderTarget::build(
        device,
        3,
        &RenderTargetDesc {
            color_image: 0,
            with_depth: true,
            load_op: LoadOp::Clear,
        },
        color,
    )
    .unwrap();

    assert_eq!(target.extent(), Extent2d::new(512, 512));
    assert!(target.has_depth());
    assert!(!target.is_surface_matched());
    assert_eq!(mock.live_framebuffers(), 3);

    let fb0 = target.framebuffer(FlightSlot::new(0));
    let fb1 = target.framebuffer(FlightSlot::new(1));
    let fb2 = target.framebuffer(FlightSlot::new(2));
    assert_ne!(fb0, fb1);
    assert_ne!(fb1, fb2);
}

#[test]
fn test_rebuild_recreates_framebuffers_and_depth() {
    let mock = Arc::new(MockDevice::new());
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    let color = color_image(&device, 2, ImageSizing::SurfaceMatched);

    let target = RenderTarget::build(
        device,
        2,
        &RenderTargetDesc {
            color_image: 0,
            with_depth: true,
            load_op: LoadOp::Clear,
        },
        Arc::clone(&color),
    )
    .unwrap();
    assert!(target.is_surface_matched());
    let old_fb = target.framebuffer(FlightSlot::ZERO);

    // Cascade order: the color image is rebuilt first, then the target.
    color.rebuild(Extent2d::new(1024, 768)).unwrap();
    target.rebuild(Extent2d::new(1024, 768)).unwrap();

    assert_eq!(target.extent(), Extent2d::new(1024, 768));
    assert_ne!(target.framebuffer(FlightSlot::ZERO), old_fb);
    assert_eq!(mock.live_framebuffers(), 2);
}

#[test]
fn test_drop_releases_framebuffers_and_pass() {
    let mock = Arc::new(MockDevice::new());
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    let color = color_image(&device, 2, ImageSizing::Fixed(Extent2d::new(128, 128)));

    let target = RenderTarget::build(
        device,
        2,
        &RenderTargetDesc {
            color_image: 0,
            with_depth: false,
            load_op: LoadOp::Load,
        },
        Arc::clone(&color),
    )
    .unwrap();
    drop(target);

    assert_eq!(mock.live_framebuffers(), 0);
    // Only the color image replicas remain (still held by the test).
    assert_eq!(mock.live_images(), 2);
}
