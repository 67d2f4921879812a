/// Device-level resource allocation descriptors
///
/// These are the raw blueprints handed to [`crate::device::GraphicsDevice`]
/// when allocating GPU objects. The higher-level resource pool wraps them in
/// engine blueprints that add flight-slot replication and sizing policy.

use bitflags::bitflags;
use crate::device::Extent2d;

/// Pixel / texel formats supported by the engine core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ImageFormat {
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    R16G16B16A16_FLOAT,
    D32_FLOAT,
}

impl ImageFormat {
    /// Bytes per texel (tightly packed)
    pub fn texel_size(&self) -> u64 {
        match self {
            ImageFormat::R8G8B8A8_SRGB
            | ImageFormat::R8G8B8A8_UNORM
            | ImageFormat::B8G8R8A8_SRGB
            | ImageFormat::B8G8R8A8_UNORM
            | ImageFormat::D32_FLOAT => 4,
            ImageFormat::R16G16B16A16_FLOAT => 8,
        }
    }

    /// True for depth formats (depth aspect instead of color)
    pub fn is_depth(&self) -> bool {
        matches!(self, ImageFormat::D32_FLOAT)
    }
}

bitflags! {
    /// Shader stages a binding or push-constant range is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x01;
        const FRAGMENT = 0x02;
        const COMPUTE = 0x04;
    }
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsageFlags: u32 {
        const UNIFORM = 0x01;
        const STORAGE = 0x02;
        const VERTEX = 0x04;
        const INDEX = 0x08;
        const TRANSFER_SRC = 0x10;
        const TRANSFER_DST = 0x20;
    }
}

bitflags! {
    /// Image usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ImageUsageFlags: u32 {
        const SAMPLED = 0x01;
        const COLOR_ATTACHMENT = 0x02;
        const DEPTH_ATTACHMENT = 0x04;
        const STORAGE = 0x08;
        const TRANSFER_SRC = 0x10;
        const TRANSFER_DST = 0x20;
    }
}

/// Blueprint for one device buffer allocation
#[derive(Debug, Clone)]
pub struct BufferAllocationDesc {
    /// Size in bytes
    pub size: u64,
    /// Usage flags
    pub usage: BufferUsageFlags,
    /// Allocate in persistently host-mapped memory.
    /// Host-visible buffers accept `write_buffer`; device-local buffers
    /// are filled through the staged-upload path.
    pub host_visible: bool,
}

/// Blueprint for one device image allocation
#[derive(Debug, Clone)]
pub struct ImageAllocationDesc {
    /// Dimensions of mip level 0
    pub extent: Extent2d,
    /// Texel format
    pub format: ImageFormat,
    /// Usage flags
    pub usage: ImageUsageFlags,
    /// Number of mip levels (>= 1)
    pub mip_levels: u32,
    /// Number of array layers (6 for cubemaps)
    pub array_layers: u32,
    /// Create with cubemap-compatible view
    pub cube: bool,
}

/// Texture filtering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Linear,
    Nearest,
}

/// Texture coordinate addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerAddressMode {
    Repeat,
    ClampToEdge,
    ClampToBorder,
}

/// Blueprint for an immutable sampler
///
/// Also used as the cache key by backends that deduplicate samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: SamplerFilter,
    pub address_mode: SamplerAddressMode,
    /// Max anisotropy in whole samples (None = disabled)
    pub anisotropy: Option<u32>,
    /// Depth-compare sampler (shadow maps)
    pub compare_depth: bool,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: SamplerFilter::Linear,
            address_mode: SamplerAddressMode::Repeat,
            anisotropy: Some(16),
            compare_depth: false,
        }
    }
}
