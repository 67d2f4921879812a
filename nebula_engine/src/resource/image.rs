/// Image resources - sampled textures, cubemaps, storage and attachment images
///
/// Surface-matched images are torn down and rebuilt in place during the
/// resize cascade; their `ResourceId` is stable across rebuilds so binding
/// sets can be told exactly which resources went stale.

use std::sync::{Arc, Mutex};

use crate::device::{
    Extent2d, GraphicsDevice, ImageAllocationDesc, ImageFormat, ImageHandle, ImageRange,
    ImageState, ImageUsageFlags, QueueKind,
};
use crate::error::Result;
use crate::frame::FlightSlot;
use crate::resource::{next_resource_id, record_and_wait, ResourceId};
use crate::{engine_bail_invalid, engine_debug};
use crate::device::{BufferAllocationDesc, BufferUsageFlags};

/// Sizing policy of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSizing {
    /// Fixed dimensions, unaffected by surface resizes
    Fixed(Extent2d),
    /// Dimensions always equal the presentation surface; rebuilt by the
    /// resize cascade
    SurfaceMatched,
}

/// Initial contents of an image
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Decoded pixel data for mip level 0, tightly packed
    Pixels {
        data: Vec<u8>,
        /// Generate the full mip chain by iterative downsampling blits
        generate_mips: bool,
    },
    /// Six equally sized cubemap faces (+X, -X, +Y, -Y, +Z, -Z)
    CubeFaces(Vec<Vec<u8>>),
    /// No initial contents (render targets, storage images)
    Uninitialized,
}

/// Blueprint for building an image resource
#[derive(Debug, Clone)]
pub struct ImageDesc {
    /// Sizing policy
    pub sizing: ImageSizing,
    /// Texel format
    pub format: ImageFormat,
    /// Usage flags (transfer flags are added as needed by the build)
    pub usage: ImageUsageFlags,
    /// Initial contents
    pub source: ImageSource,
    /// One allocation per flight slot (per-frame-mutable, e.g. storage
    /// images written by compute) or a single shared allocation
    pub per_slot: bool,
}

/// Number of mip levels for a full chain down to 1x1:
/// `floor(log2(max(width, height))) + 1`
pub fn mip_level_count(extent: Extent2d) -> u32 {
    let largest = extent.width.max(extent.height).max(1);
    32 - largest.leading_zeros()
}

struct ImageInner {
    /// One handle per flight slot, or exactly one when not replicated.
    /// Replaced wholesale on rebuild; length never changes.
    handles: Vec<ImageHandle>,
    extent: Extent2d,
    mip_levels: u32,
}

/// A built image resource
pub struct ImageResource {
    id: ResourceId,
    device: Arc<dyn GraphicsDevice>,
    desc: ImageDesc,
    frames_in_flight: usize,
    inner: Mutex<ImageInner>,
}

impl ImageResource {
    /// Build an image resource from its blueprint
    ///
    /// `surface_extent` resolves `ImageSizing::SurfaceMatched`; fixed-size
    /// images ignore it.
    pub(crate) fn build(
        device: Arc<dyn GraphicsDevice>,
        frames_in_flight: usize,
        desc: ImageDesc,
        surface_extent: Extent2d,
    ) -> Result<Arc<Self>> {
        let extent = match desc.sizing {
            ImageSizing::Fixed(extent) => extent,
            ImageSizing::SurfaceMatched => surface_extent,
        };
        if extent.is_zero() {
            engine_bail_invalid!("nebula::Image", "Image extent must be non-zero");
        }
        if matches!(desc.source, ImageSource::Pixels { .. } | ImageSource::CubeFaces(_))
            && matches!(desc.sizing, ImageSizing::SurfaceMatched)
        {
            engine_bail_invalid!(
                "nebula::Image",
                "Surface-matched images cannot carry pixel contents"
            );
        }

        let resource = Self {
            id: next_resource_id(),
            device,
            desc,
            frames_in_flight,
            inner: Mutex::new(ImageInner {
                handles: Vec::new(),
                extent,
                mip_levels: 1,
            }),
        };
        resource.create_allocations(extent)?;
        Ok(Arc::new(resource))
    }

    /// Create device allocations and upload initial contents at `extent`
    fn create_allocations(&self, extent: Extent2d) -> Result<()> {
        let desc = &self.desc;
        let (mip_levels, array_layers, cube) = match &desc.source {
            ImageSource::Pixels { generate_mips, .. } => {
                let levels = if *generate_mips {
                    mip_level_count(extent)
                } else {
                    1
                };
                (levels, 1, false)
            }
            ImageSource::CubeFaces(_) => (1, 6, true),
            ImageSource::Uninitialized => (1, 1, false),
        };

        let mut usage = desc.usage;
        match &desc.source {
            ImageSource::Pixels { generate_mips, .. } => {
                usage |= ImageUsageFlags::TRANSFER_DST;
                if *generate_mips && mip_levels > 1 {
                    usage |= ImageUsageFlags::TRANSFER_SRC;
                }
            }
            ImageSource::CubeFaces(_) => {
                usage |= ImageUsageFlags::TRANSFER_DST;
            }
            ImageSource::Uninitialized => {}
        }

        let alloc_desc = ImageAllocationDesc {
            extent,
            format: desc.format,
            usage,
            mip_levels,
            array_layers,
            cube,
        };

        let count = if desc.per_slot { self.frames_in_flight } else { 1 };
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            let image = self.device.create_image(&alloc_desc)?;
            self.fill(image, extent, mip_levels)?;
            handles.push(image);
        }

        let mut inner = self.inner.lock().unwrap();
        inner.handles = handles;
        inner.extent = extent;
        inner.mip_levels = mip_levels;
        Ok(())
    }

    /// Upload initial contents into one allocation
    fn fill(&self, image: ImageHandle, extent: Extent2d, mip_levels: u32) -> Result<()> {
        match &self.desc.source {
            ImageSource::Pixels { data, .. } => {
                self.upload_pixels(image, extent, mip_levels, std::slice::from_ref(data), 1)
            }
            ImageSource::CubeFaces(faces) => {
                if faces.len() != 6 {
                    engine_bail_invalid!(
                        "nebula::Image",
                        "Cubemap requires exactly 6 faces, got {}",
                        faces.len()
                    );
                }
                let face_size = faces[0].len();
                if faces.iter().any(|f| f.len() != face_size) {
                    engine_bail_invalid!(
                        "nebula::Image",
                        "Cubemap faces must be equally sized"
                    );
                }
                self.upload_pixels(image, extent, 1, faces, 6)
            }
            ImageSource::Uninitialized => {
                if self.desc.usage.contains(ImageUsageFlags::STORAGE) {
                    // Storage images start in General so compute can write
                    // them before any render pass touches them.
                    record_and_wait(&self.device, QueueKind::Graphics, |rec| {
                        rec.transition_image(
                            image,
                            ImageRange::all(1, 1),
                            ImageState::Undefined,
                            ImageState::General,
                        )
                    })?;
                }
                Ok(())
            }
        }
    }

    /// Copy pixel layers through a staging buffer, then generate mips
    ///
    /// The staging buffer is freed only after the copy queue has fully
    /// executed the batch.
    fn upload_pixels(
        &self,
        image: ImageHandle,
        extent: Extent2d,
        mip_levels: u32,
        layers: &[Vec<u8>],
        layer_count: u32,
    ) -> Result<()> {
        let expected = extent.width as u64 * extent.height as u64 * self.desc.format.texel_size();
        for (layer, data) in layers.iter().enumerate() {
            if data.len() as u64 != expected {
                engine_bail_invalid!(
                    "nebula::Image",
                    "Layer {} pixel data is {} bytes, expected {} for {}x{} {:?}",
                    layer,
                    data.len(),
                    expected,
                    extent.width,
                    extent.height,
                    self.desc.format
                );
            }
        }

        let total: u64 = layers.iter().map(|l| l.len() as u64).sum();
        let staging = self.device.create_buffer(&BufferAllocationDesc {
            size: total,
            usage: BufferUsageFlags::TRANSFER_SRC,
            host_visible: true,
        })?;

        let mut offset = 0u64;
        let mut offsets = Vec::with_capacity(layers.len());
        for data in layers {
            self.device.write_buffer(staging, offset, data)?;
            offsets.push(offset);
            offset += data.len() as u64;
        }

        let result = record_and_wait(&self.device, QueueKind::Graphics, |rec| {
            // All levels and layers to transfer-dst for the copies
            rec.transition_image(
                image,
                ImageRange::all(mip_levels, layer_count),
                ImageState::Undefined,
                ImageState::TransferDst,
            )?;

            // One region copy per layer into mip 0
            for (layer, &buffer_offset) in offsets.iter().enumerate() {
                rec.copy_buffer_to_image(
                    staging,
                    buffer_offset,
                    image,
                    0,
                    layer as u32,
                    extent,
                )?;
            }

            if mip_levels > 1 {
                Self::record_mip_chain(rec, image, extent, mip_levels, layer_count)?;
            } else {
                rec.transition_image(
                    image,
                    ImageRange::all(1, layer_count),
                    ImageState::TransferDst,
                    ImageState::ShaderRead,
                )?;
            }
            Ok(())
        });

        self.device.destroy_buffer(staging);
        result
    }

    /// Record the downsampling blit chain for levels 1..mip_levels
    ///
    /// Each source level must be transfer-src while the destination level
    /// is still transfer-dst, which forces the strict per-level barrier
    /// sequence below. The last level is never blitted from, so it
    /// transitions straight from transfer-dst.
    fn record_mip_chain(
        rec: &mut dyn crate::device::CommandRecorder,
        image: ImageHandle,
        extent: Extent2d,
        mip_levels: u32,
        layer_count: u32,
    ) -> Result<()> {
        let mut src_extent = extent;
        for level in 1..mip_levels {
            let dst_extent = src_extent.half();

            rec.transition_image(
                image,
                ImageRange::mip(level - 1, layer_count),
                ImageState::TransferDst,
                ImageState::TransferSrc,
            )?;

            rec.blit_image_mip(image, level - 1, src_extent, level, dst_extent, layer_count)?;

            rec.transition_image(
                image,
                ImageRange::mip(level - 1, layer_count),
                ImageState::TransferSrc,
                ImageState::ShaderRead,
            )?;

            src_extent = dst_extent;
        }

        rec.transition_image(
            image,
            ImageRange::mip(mip_levels - 1, layer_count),
            ImageState::TransferDst,
            ImageState::ShaderRead,
        )
    }

    /// Stable resource identity (survives rebuilds)
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Texel format
    pub fn format(&self) -> ImageFormat {
        self.desc.format
    }

    /// True when the image tracks the presentation surface size
    pub fn is_surface_matched(&self) -> bool {
        matches!(self.desc.sizing, ImageSizing::SurfaceMatched)
    }

    /// Current dimensions of mip level 0
    pub fn extent(&self) -> Extent2d {
        self.inner.lock().unwrap().extent
    }

    /// Current mip level count
    pub fn mip_levels(&self) -> u32 {
        self.inner.lock().unwrap().mip_levels
    }

    /// Device handle backing the given flight slot
    pub fn handle_for_slot(&self, slot: FlightSlot) -> ImageHandle {
        let inner = self.inner.lock().unwrap();
        if inner.handles.len() == 1 {
            inner.handles[0]
        } else {
            inner.handles[slot.index() % inner.handles.len()]
        }
    }

    /// Tear down and recreate the allocations at a new extent
    ///
    /// Part of the resize cascade; the caller must have waited for device
    /// idle and must clear the validity of every binding referencing this
    /// image afterwards.
    pub(crate) fn rebuild(&self, extent: Extent2d) -> Result<()> {
        let old: Vec<ImageHandle> = {
            let inner = self.inner.lock().unwrap();
            inner.handles.clone()
        };
        for handle in old {
            self.device.destroy_image(handle);
        }
        engine_debug!(
            "nebula::Image",
            "Rebuilding surface-matched image at {}x{}",
            extent.width,
            extent.height
        );
        self.create_allocations(extent)
    }
}

impl Drop for ImageResource {
    fn drop(&mut self) {
        let inner = self.inner.lock().unwrap();
        for &handle in &inner.handles {
            self.device.destroy_image(handle);
        }
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
