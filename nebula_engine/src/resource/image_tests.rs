/// Unit tests for image resources: mip chains, cubemaps, rebuilds.

use std::sync::Arc;

use crate::device::mock_device::MockDevice;
use crate::device::{Extent2d, GraphicsDevice, ImageFormat, ImageUsageFlags};
use crate::error::Error;
use crate::resource::{mip_level_count, ImageDesc, ImageResource, ImageSizing, ImageSource};

fn mock_pair() -> (Arc<MockDevice>, Arc<dyn GraphicsDevice>) {
    let mock = Arc::new(MockDevice::new());
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    (mock, device)
}

/// Index of the first journal line containing `pattern` at or after `from`
fn find(journal: &[String], from: usize, pattern: &str) -> usize {
    journal
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, line)| line.contains(pattern))
        .unwrap_or_else(|| panic!("'{}' not found after index {}", pattern, from))
        .0
}

fn rgba_pixels(extent: Extent2d) -> Vec<u8> {
    vec![0u8; (extent.width * extent.height * 4) as usize]
}

// ============================================================================
// Mip chain length
// ============================================================================

#[test]
fn test_mip_level_count_follows_largest_dimension() {
    // floor(log2(257)) + 1 = 9
    assert_eq!(mip_level_count(Extent2d::new(257, 130)), 9);
    assert_eq!(mip_level_count(Extent2d::new(256, 256)), 9);
    assert_eq!(mip_level_count(Extent2d::new(1, 1)), 1);
    assert_eq!(mip_level_count(Extent2d::new(512, 2)), 10);
    assert_eq!(mip_level_count(Extent2d::new(2, 3)), 2);
}

// ============================================================================
// Pixel upload and mip generation
// ============================================================================

#[test]
fn test_pixel_image_without_mips_transitions_to_shader_read() {
    let (mock, device) = mock_pair();
    let extent = Extent2d::new(8, 8);
    ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::Fixed(extent),
            format: ImageFormat::R8G8B8A8_SRGB,
            usage: ImageUsageFlags::SAMPLED,
            source: ImageSource::Pixels {
                data: rgba_pixels(extent),
                generate_mips: false,
            },
            per_slot: false,
        },
        Extent2d::new(800, 600),
    )
    .unwrap();

    let journal = mock.journal();
    let to_dst = find(&journal, 0, "mips 0..1 Undefined->TransferDst");
    let copy = find(&journal, to_dst, "copy_buffer_to_image");
    let to_read = find(&journal, copy, "mips 0..1 TransferDst->ShaderRead");
    let wait = find(&journal, to_read, "wait_fence");
    // Staging buffer outlives the copy: freed only after the wait.
    let staging_free = find(&journal, wait, "destroy_buffer");
    assert!(to_dst < copy && copy < to_read && to_read < wait && wait < staging_free);
}

#[test]
fn test_mip_generation_barrier_sequence() {
    // 4x4 -> 3 levels: 4x4, 2x2, 1x1
    let (mock, device) = mock_pair();
    let extent = Extent2d::new(4, 4);
    let image = ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::Fixed(extent),
            format: ImageFormat::R8G8B8A8_UNORM,
            usage: ImageUsageFlags::SAMPLED,
            source: ImageSource::Pixels {
                data: rgba_pixels(extent),
                generate_mips: true,
            },
            per_slot: false,
        },
        Extent2d::new(800, 600),
    )
    .unwrap();
    assert_eq!(image.mip_levels(), 3);

    let journal = mock.journal();
    // Every level: source to TransferSrc, blit, source to ShaderRead.
    let mut at = find(&journal, 0, "mips 0..3 Undefined->TransferDst");
    at = find(&journal, at, "copy_buffer_to_image");
    at = find(&journal, at, "mips 0..1 TransferDst->TransferSrc");
    at = find(&journal, at, "blit");
    assert!(journal[at].contains("0->1 4x4->2x2"));
    at = find(&journal, at, "mips 0..1 TransferSrc->ShaderRead");
    at = find(&journal, at, "mips 1..2 TransferDst->TransferSrc");
    at = find(&journal, at, "blit");
    assert!(journal[at].contains("1->2 2x2->1x1"));
    at = find(&journal, at, "mips 1..2 TransferSrc->ShaderRead");
    // The last level was never blitted from; it transitions directly.
    find(&journal, at, "mips 2..3 TransferDst->ShaderRead");
}

#[test]
fn test_non_power_of_two_blit_extents_floor_at_one() {
    let (mock, device) = mock_pair();
    let extent = Extent2d::new(5, 2);
    ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::Fixed(extent),
            format: ImageFormat::R8G8B8A8_UNORM,
            usage: ImageUsageFlags::SAMPLED,
            source: ImageSource::Pixels {
                data: rgba_pixels(extent),
                generate_mips: true,
            },
            per_slot: false,
        },
        Extent2d::new(800, 600),
    )
    .unwrap();

    let journal = mock.journal();
    // 5x2 -> 2x1 -> 1x1 (floor, minimum 1)
    find(&journal, 0, "0->1 5x2->2x1");
    find(&journal, 0, "1->2 2x1->1x1");
}

// ============================================================================
// Cubemaps
// ============================================================================

#[test]
fn test_cubemap_copies_one_region_per_face() {
    let (mock, device) = mock_pair();
    let extent = Extent2d::new(16, 16);
    let faces: Vec<Vec<u8>> = (0..6).map(|_| rgba_pixels(extent)).collect();
    ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::Fixed(extent),
            format: ImageFormat::R8G8B8A8_SRGB,
            usage: ImageUsageFlags::SAMPLED,
            source: ImageSource::CubeFaces(faces),
            per_slot: false,
        },
        Extent2d::new(800, 600),
    )
    .unwrap();

    let journal = mock.journal();
    for layer in 0..6 {
        let pattern = format!("layer={}", layer);
        assert!(
            journal
                .iter()
                .any(|l| l.contains("copy_buffer_to_image") && l.contains(&pattern)),
            "no copy for face {}",
            layer
        );
    }
    // Faces land in one array-layered image
    assert!(journal.iter().any(|l| l.contains("create_image") && l.contains("layers=6")));
}

#[test]
fn test_cubemap_rejects_wrong_face_count() {
    let (_, device) = mock_pair();
    let extent = Extent2d::new(16, 16);
    let result = ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::Fixed(extent),
            format: ImageFormat::R8G8B8A8_SRGB,
            usage: ImageUsageFlags::SAMPLED,
            source: ImageSource::CubeFaces(vec![rgba_pixels(extent); 5]),
            per_slot: false,
        },
        Extent2d::new(800, 600),
    );
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_cubemap_rejects_unequal_faces() {
    let (_, device) = mock_pair();
    let extent = Extent2d::new(16, 16);
    let mut faces: Vec<Vec<u8>> = (0..6).map(|_| rgba_pixels(extent)).collect();
    faces[3].truncate(100);
    let result = ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::Fixed(extent),
            format: ImageFormat::R8G8B8A8_SRGB,
            usage: ImageUsageFlags::SAMPLED,
            source: ImageSource::CubeFaces(faces),
            per_slot: false,
        },
        Extent2d::new(800, 600),
    );
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

// ============================================================================
// Sizing and rebuild
// ============================================================================

#[test]
fn test_surface_matched_image_takes_surface_extent() {
    let (_, device) = mock_pair();
    let image = ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::SurfaceMatched,
            format: ImageFormat::B8G8R8A8_UNORM,
            usage: ImageUsageFlags::COLOR_ATTACHMENT,
            source: ImageSource::Uninitialized,
            per_slot: true,
        },
        Extent2d::new(1280, 720),
    )
    .unwrap();
    assert_eq!(image.extent(), Extent2d::new(1280, 720));
    assert!(image.is_surface_matched());
}

#[test]
fn test_surface_matched_pixels_rejected() {
    let (_, device) = mock_pair();
    let result = ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::SurfaceMatched,
            format: ImageFormat::R8G8B8A8_SRGB,
            usage: ImageUsageFlags::SAMPLED,
            source: ImageSource::Pixels {
                data: rgba_pixels(Extent2d::new(800, 600)),
                generate_mips: false,
            },
            per_slot: false,
        },
        Extent2d::new(800, 600),
    );
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_rebuild_keeps_identity_and_changes_extent() {
    let (mock, device) = mock_pair();
    let image = ImageResource::build(
        device,
        2,
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
    let id = image.id();
    let old_live = mock.live_images();

    image.rebuild(Extent2d::new(1024, 768)).unwrap();

    assert_eq!(image.id(), id);
    assert_eq!(image.extent(), Extent2d::new(1024, 768));
    // Old allocations destroyed, same replica count recreated.
    assert_eq!(mock.live_images(), old_live);
}

#[test]
fn test_storage_image_starts_in_general_state() {
    let (mock, device) = mock_pair();
    ImageResource::build(
        device,
        2,
        ImageDesc {
            sizing: ImageSizing::Fixed(Extent2d::new(64, 64)),
            format: ImageFormat::R16G16B16A16_FLOAT,
            usage: ImageUsageFlags::STORAGE,
            source: ImageSource::Uninitialized,
            per_slot: true,
        },
        Extent2d::new(800, 600),
    )
    .unwrap();

    let journal = mock.journal();
    assert!(journal.iter().any(|l| l.contains("Undefined->General")));
}
