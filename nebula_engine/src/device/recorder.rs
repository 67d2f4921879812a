/// CommandRecorder trait - command buffer recording primitives
///
/// One recorder wraps one reusable command buffer. The frame scheduler owns
/// one graphics and one compute recorder per flight slot; the resource pool
/// creates transient recorders for uploads.

use std::any::Any;

use crate::device::{
    BindingTableHandle, BufferHandle, Extent2d, FramebufferHandle, ImageHandle, IndexType,
    PipelineBindPoint, PipelineHandle, RenderPassHandle, ShaderStageFlags,
};
use crate::error::Result;

/// Clear value for a render pass attachment
#[derive(Debug, Clone, Copy)]
pub enum ClearValue {
    /// RGBA color
    Color([f32; 4]),
    /// Depth + stencil
    DepthStencil { depth: f32, stencil: u32 },
}

/// Viewport rectangle with depth range
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with the standard [0, 1] depth range
    pub fn full(extent: Extent2d) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle
#[derive(Debug, Clone, Copy)]
pub struct Rect2d {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2d {
    /// Full-extent scissor
    pub fn full(extent: Extent2d) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Logical layout/access state of an image subresource range
///
/// Backends map these onto API image layouts plus the matching access and
/// stage masks for the transition barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    /// Freshly created, contents undefined
    Undefined,
    /// Blit/copy source
    TransferSrc,
    /// Blit/copy destination
    TransferDst,
    /// Sampled from shaders
    ShaderRead,
    /// Written as a color attachment
    ColorAttachment,
    /// Written as a depth attachment
    DepthAttachment,
    /// Storage image access
    General,
    /// Ready for presentation
    PresentSrc,
}

/// Mip/layer sub-range of an image
#[derive(Debug, Clone, Copy)]
pub struct ImageRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ImageRange {
    /// One mip level across `layer_count` layers
    pub fn mip(level: u32, layer_count: u32) -> Self {
        Self {
            base_mip: level,
            mip_count: 1,
            base_layer: 0,
            layer_count,
        }
    }

    /// All `mip_count` levels across `layer_count` layers
    pub fn all(mip_count: u32, layer_count: u32) -> Self {
        Self {
            base_mip: 0,
            mip_count,
            base_layer: 0,
            layer_count,
        }
    }
}

/// Command recording interface
///
/// Recording follows the usual bracket discipline: `begin` resets the
/// underlying buffer, render-pass commands are only legal between
/// `begin_render_pass`/`end_render_pass`, and `end` closes the buffer for
/// submission. Implementations must reject out-of-order calls.
pub trait CommandRecorder: Send {
    /// Reset the command buffer and start recording
    fn begin(&mut self) -> Result<()>;

    /// Finish recording; the buffer may then be submitted
    fn end(&mut self) -> Result<()>;

    /// Begin a render pass on the given framebuffer
    fn begin_render_pass(
        &mut self,
        pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2d,
        clear_values: &[ClearValue],
    ) -> Result<()>;

    /// End the current render pass
    fn end_render_pass(&mut self) -> Result<()>;

    /// Bind a graphics or compute pipeline
    fn bind_pipeline(&mut self, bind_point: PipelineBindPoint, pipeline: PipelineHandle)
        -> Result<()>;

    /// Bind a binding table at `set_index` of the pipeline's layout
    ///
    /// `dynamic_offsets` carries one byte offset per dynamic-uniform binding
    /// in the table, in binding order.
    fn bind_binding_table(
        &mut self,
        bind_point: PipelineBindPoint,
        pipeline: PipelineHandle,
        set_index: u32,
        table: BindingTableHandle,
        dynamic_offsets: &[u32],
    ) -> Result<()>;

    /// Bind a vertex buffer at binding 0
    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64) -> Result<()>;

    /// Bind an index buffer
    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType)
        -> Result<()>;

    /// Set the viewport
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Set the scissor rectangle
    fn set_scissor(&mut self, scissor: Rect2d) -> Result<()>;

    /// Upload push constant data
    fn push_constants(
        &mut self,
        pipeline: PipelineHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()>;

    /// Draw non-indexed geometry
    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()>;

    /// Draw indexed geometry
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32)
        -> Result<()>;

    /// Dispatch compute work groups
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32)
        -> Result<()>;

    /// Copy `size` bytes between buffers (offsets 0)
    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: u64) -> Result<()>;

    /// Copy a tightly packed buffer into one mip level / array layer
    fn copy_buffer_to_image(
        &mut self,
        src: BufferHandle,
        buffer_offset: u64,
        image: ImageHandle,
        mip_level: u32,
        array_layer: u32,
        extent: Extent2d,
    ) -> Result<()>;

    /// Transition an image sub-range between logical states
    fn transition_image(
        &mut self,
        image: ImageHandle,
        range: ImageRange,
        from: ImageState,
        to: ImageState,
    ) -> Result<()>;

    /// Downsample-blit one mip level of an image into another
    ///
    /// The source level must be in `TransferSrc` state and the destination
    /// level in `TransferDst` state when the blit executes.
    fn blit_image_mip(
        &mut self,
        image: ImageHandle,
        src_level: u32,
        src_extent: Extent2d,
        dst_level: u32,
        dst_extent: Extent2d,
        layer_count: u32,
    ) -> Result<()>;

    /// Downcast support for backend submission paths
    fn as_any(&self) -> &dyn Any;
}
