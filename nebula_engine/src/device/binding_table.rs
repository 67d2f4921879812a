/// Binding-table layout and write primitives
///
/// A binding table is the device-side object a shader reads resource
/// references from (a descriptor set, in Vulkan terms). The engine resolves
/// its logical bindings into [`BindingTableWrite`] records per flight slot;
/// the backend turns them into API descriptor writes.

use crate::device::{BufferHandle, ImageHandle, SamplerHandle, ShaderStageFlags};

/// Device-level kind of one binding-table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingTableKind {
    /// Uniform buffer, fixed offset
    UniformBuffer,
    /// Uniform buffer selected by a dynamic offset at bind time
    DynamicUniformBuffer,
    /// Read/write structured buffer
    StorageBuffer,
    /// Sampled image (no sampler)
    SampledImage,
    /// Standalone sampler
    Sampler,
    /// Image and sampler in one binding
    CombinedImageSampler,
    /// Read/write storage image
    StorageImage,
}

/// Description of a single slot within a binding-table layout
#[derive(Debug, Clone, Copy)]
pub struct TableLayoutEntry {
    /// Binding number (corresponds to `layout(binding = N)` in GLSL)
    pub binding: u32,
    /// Kind of resource at this binding
    pub kind: BindingTableKind,
    /// Number of descriptors at this binding (>1 for arrays)
    pub count: u32,
    /// Shader stages that access this binding
    pub stages: ShaderStageFlags,
}

/// A buffer sub-range referenced by a table write
#[derive(Debug, Clone, Copy)]
pub struct BufferRegion {
    pub buffer: BufferHandle,
    pub offset: u64,
    /// Range in bytes visible to the shader
    pub range: u64,
}

/// Resolved resource references for one table write
#[derive(Debug, Clone)]
pub enum TableWriteData {
    /// Uniform / dynamic-uniform / storage buffers
    Buffers(Vec<BufferRegion>),
    /// Sampled or storage images
    Images(Vec<ImageHandle>),
    /// Standalone samplers
    Samplers(Vec<SamplerHandle>),
    /// Combined image+sampler pairs
    CombinedImageSamplers(Vec<(ImageHandle, SamplerHandle)>),
}

/// One write record targeting a binding of a table
#[derive(Debug, Clone)]
pub struct BindingTableWrite {
    /// Destination binding number
    pub binding: u32,
    /// Kind the destination layout declares for this binding
    pub kind: BindingTableKind,
    /// Resolved resources, one element per array slot
    pub data: TableWriteData,
}
