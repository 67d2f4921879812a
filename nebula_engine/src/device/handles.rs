/// Opaque device object handles
///
/// Backends mint these identifiers when creating GPU objects and resolve
/// them back to API objects on use. The engine core treats them as opaque
/// tokens; a handle is only meaningful to the device that created it.

/// Surface / image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (e.g. minimized window)
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Extent of the next smaller mip level (floor, minimum 1)
    pub fn half(&self) -> Self {
        Self {
            width: (self.width / 2).max(1),
            height: (self.height / 2).max(1),
        }
    }
}

/// Queue selector for recording and submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Graphics + presentation queue
    Graphics,
    /// Asynchronous compute queue
    Compute,
}

/// GPU->CPU completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceHandle(pub u64);

/// GPU->GPU ordering signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreHandle(pub u64);

/// Device buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Device image allocation (all mips/layers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

/// Immutable sampler object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub u64);

/// Compiled render pass object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassHandle(pub u64);

/// Framebuffer (render pass + concrete attachments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

/// Binding-table layout (descriptor set layout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableLayoutHandle(pub u64);

/// Allocated binding table (descriptor set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingTableHandle(pub u64);

/// Compiled graphics or compute pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u64);
