/// Unit tests for the swapchain lifecycle manager and the resize cascade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::binding::{BindingDeclaration, BindingKind, DescriptorBindingSet};
use crate::device::mock_device::MockDevice;
use crate::device::{Extent2d, GraphicsDevice, ImageFormat, ImageUsageFlags, ShaderStageFlags};
use crate::resource::{ImageDesc, ImageSizing, ImageSource, ResourcePool};
use crate::swapchain::SwapchainManager;
use crate::target::{RenderTarget, RenderTargetDesc};
use crate::device::LoadOp;

fn mock_pair() -> (Arc<MockDevice>, Arc<dyn GraphicsDevice>) {
    let mock = Arc::new(MockDevice::new());
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    (mock, device)
}

fn fixed_extent(width: u32, height: u32) -> Box<dyn Fn() -> Extent2d + Send + Sync> {
    Box::new(move || Extent2d::new(width, height))
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_creation_builds_per_image_dependents() {
    let (mock, device) = mock_pair();
    mock.set_swapchain_image_count(3);
    let manager = SwapchainManager::new(device, fixed_extent(800, 600), true).unwrap();

    assert_eq!(manager.extent(), Extent2d::new(800, 600));
    assert_eq!(manager.image_count(), 3);
    assert!(manager.has_depth());
    // One framebuffer per presentable image, plus the shared depth image.
    assert_eq!(mock.live_framebuffers(), 3);
    assert_eq!(mock.live_images(), 1);
}

#[test]
fn test_creation_without_depth() {
    let (mock, device) = mock_pair();
    let manager = SwapchainManager::new(device, fixed_extent(800, 600), false).unwrap();
    assert!(!manager.has_depth());
    assert_eq!(mock.live_images(), 0);
    drop(manager);
    assert_eq!(mock.live_framebuffers(), 0);
}

// ============================================================================
// Rebuild
// ============================================================================

#[test]
fn test_rebuild_waits_idle_then_replaces_everything() {
    let (mock, device) = mock_pair();
    let mut manager = SwapchainManager::new(device, fixed_extent(800, 600), true).unwrap();

    mock.clear_journal();
    manager.rebuild(&[], &[], &[]).unwrap();

    let journal = mock.journal();
    let idle = journal.iter().position(|l| l == "wait_idle").unwrap();
    let destroy = journal
        .iter()
        .position(|l| l.starts_with("destroy_framebuffer"))
        .unwrap();
    let create = journal
        .iter()
        .position(|l| l.starts_with("create_swapchain"))
        .unwrap();
    // Idle first, then teardown, then the new chain.
    assert!(idle < destroy && destroy < create);

    // No leaked dependents: still one framebuffer per image.
    assert_eq!(mock.live_framebuffers(), manager.image_count());
}

#[test]
fn test_rebuild_stalls_while_minimized() {
    // Extent queries report (0,0) twice before the window is restored.
    let (_, device) = mock_pair();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let extent_fn = Box::new(move || {
        let n = calls_clone.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            Extent2d::new(0, 0)
        } else {
            Extent2d::new(640, 480)
        }
    });

    let mut manager = SwapchainManager::new(device, extent_fn, false).unwrap();
    // Creation consumed queries until non-zero; force another round.
    calls.store(0, Ordering::SeqCst);
    manager.rebuild(&[], &[], &[]).unwrap();

    assert_eq!(manager.extent(), Extent2d::new(640, 480));
    assert!(calls.load(Ordering::SeqCst) >= 3);
}

#[test]
fn test_rebuild_follows_a_new_surface_size() {
    let (_, device) = mock_pair();
    let size = Arc::new(Mutex::new(Extent2d::new(800, 600)));
    let size_clone = Arc::clone(&size);
    let extent_fn = Box::new(move || *size_clone.lock().unwrap());

    let mut manager = SwapchainManager::new(device, extent_fn, false).unwrap();
    assert_eq!(manager.extent(), Extent2d::new(800, 600));

    *size.lock().unwrap() = Extent2d::new(1920, 1080);
    manager.rebuild(&[], &[], &[]).unwrap();
    assert_eq!(manager.extent(), Extent2d::new(1920, 1080));
}

// ============================================================================
// Resize cascade
// ============================================================================

#[test]
fn test_cascade_rebuilds_resources_then_invalidates_bindings() {
    let (_, device) = mock_pair();
    let size = Arc::new(Mutex::new(Extent2d::new(800, 600)));
    let size_clone = Arc::clone(&size);
    let extent_fn = Box::new(move || *size_clone.lock().unwrap());

    let mut pool = ResourcePool::new(Arc::clone(&device), 2);
    let image = pool
        .build_image(
            0,
            ImageDesc {
                sizing: ImageSizing::SurfaceMatched,
                format: ImageFormat::B8G8R8A8_UNORM,
                usage: ImageUsageFlags::COLOR_ATTACHMENT | ImageUsageFlags::SAMPLED,
                source: ImageSource::Uninitialized,
                per_slot: true,
            },
            Extent2d::new(800, 600),
        )
        .unwrap();

    let set = DescriptorBindingSet::build(
        Arc::clone(&device),
        2,
        0,
        vec![BindingDeclaration {
            set: 0,
            binding: 0,
            stages: ShaderStageFlags::FRAGMENT,
            kind: BindingKind::SampledImages { images: vec![0] },
        }],
    )
    .unwrap();
    set.update(&pool, 0, 1).unwrap();
    assert!(set.is_fully_valid());

    let mut manager = SwapchainManager::new(device, extent_fn, false).unwrap();
    *size.lock().unwrap() = Extent2d::new(1024, 768);
    manager
        .rebuild(&pool.surface_matched_images(), &[], &[Arc::clone(&set)])
        .unwrap();

    // Resize atomicity: after rebuild returns, the image reflects the new
    // extent and the referencing set is invalid - both or neither.
    assert_eq!(image.extent(), Extent2d::new(1024, 768));
    assert!(!set.is_fully_valid());

    // Revalidation picks up the rebuilt handles.
    set.update(&pool, 0, 1).unwrap();
    assert!(set.is_fully_valid());
}

#[test]
fn test_cascade_rebuilds_surface_matched_targets_only() {
    let (_, device) = mock_pair();
    let mut pool = ResourcePool::new(Arc::clone(&device), 2);

    let surface_color = pool
        .build_image(
            0,
            ImageDesc {
                sizing: ImageSizing::SurfaceMatched,
                format: ImageFormat::B8G8R8A8_UNORM,
                usage: ImageUsageFlags::COLOR_ATTACHMENT,
                source: ImageSource::Uninitialized,
                per_slot: true,
            },
            Extent2d::new(800, 600),
        )
        .unwrap();
    let fixed_color = pool
        .build_image(
            1,
            ImageDesc {
                sizing: ImageSizing::Fixed(Extent2d::new(256, 256)),
                format: ImageFormat::R8G8B8A8_UNORM,
                usage: ImageUsageFlags::COLOR_ATTACHMENT,
                source: ImageSource::Uninitialized,
                per_slot: true,
            },
            Extent2d::new(800, 600),
        )
        .unwrap();

    let desc = RenderTargetDesc {
        color_image: 0,
        with_depth: false,
        load_op: LoadOp::Clear,
    };
    let surface_target =
        RenderTarget::build(Arc::clone(&device), 2, &desc, surface_color).unwrap();
    let fixed_target = RenderTarget::build(
        Arc::clone(&device),
        2,
        &RenderTargetDesc {
            color_image: 1,
            with_depth: false,
            load_op: LoadOp::Clear,
        },
        fixed_color,
    )
    .unwrap();

    let size = Arc::new(Mutex::new(Extent2d::new(800, 600)));
    let size_clone = Arc::clone(&size);
    let mut manager = SwapchainManager::new(
        device,
        Box::new(move || *size_clone.lock().unwrap()),
        false,
    )
    .unwrap();

    *size.lock().unwrap() = Extent2d::new(1600, 900);
    manager
        .rebuild(
            &pool.surface_matched_images(),
            &[Arc::clone(&surface_target), Arc::clone(&fixed_target)],
            &[],
        )
        .unwrap();

    assert_eq!(surface_target.extent(), Extent2d::new(1600, 900));
    assert_eq!(fixed_target.extent(), Extent2d::new(256, 256));
}
