/// GraphicsDevice trait - the capability surface of the device layer
///
/// The engine core drives GPU work exclusively through this trait. Queue
/// discovery, memory allocation and surface plumbing live behind it in
/// backend crates; the core sees opaque handles and blocking waits.

use crate::device::{
    BindingTableHandle, BindingTableWrite, BufferAllocationDesc, BufferHandle, CommandRecorder,
    ComputePipelineDesc, Extent2d, FenceHandle, FramebufferHandle, GraphicsPipelineDesc,
    ImageAllocationDesc, ImageFormat, ImageHandle, PipelineHandle, QueueKind, RenderPassHandle,
    SamplerDesc, SamplerHandle, SemaphoreHandle, TableLayoutEntry, TableLayoutHandle,
};
use crate::error::Result;

/// Static device properties the engine needs for layout decisions
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    /// Minimum alignment for dynamic uniform buffer offsets
    pub min_uniform_offset_alignment: u64,
    /// Maximum total push constant size in bytes
    pub max_push_constant_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_offset_alignment: 256,
            max_push_constant_size: 128,
        }
    }
}

/// Result of a presentable-image acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired; index into the presentable chain
    Acquired(u32),
    /// Surface is stale or suboptimal; the swapchain must be rebuilt
    Stale,
}

/// Result of a presentation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Image queued for presentation
    Presented,
    /// Surface is stale or suboptimal; the swapchain must be rebuilt
    Stale,
}

/// Properties of the created presentable chain
#[derive(Debug, Clone, Copy)]
pub struct SwapchainProperties {
    /// Number of presentable images
    pub image_count: usize,
    /// Format of the presentable images
    pub format: ImageFormat,
    /// Actual extent the chain was created with
    pub extent: Extent2d,
}

/// Pipeline stage a submission waits at for each wait semaphore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    TopOfPipe,
    VertexInput,
    ComputeShader,
    FragmentShader,
    ColorAttachmentOutput,
    Transfer,
}

/// Synchronization description for one queue submission
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitSync<'a> {
    /// Semaphores to wait on, each with the stage the wait applies to
    pub wait: &'a [(SemaphoreHandle, WaitStage)],
    /// Semaphores signaled when the submission completes
    pub signal: &'a [SemaphoreHandle],
    /// Fence signaled when the submission completes
    pub fence: Option<FenceHandle>,
}

// ===== RENDER PASS DESCRIPTORS =====

/// What happens to an attachment's contents at pass start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Clear,
    Load,
    DontCare,
}

/// What happens to an attachment's contents at pass end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// One attachment of a render pass
#[derive(Debug, Clone, Copy)]
pub struct AttachmentDesc {
    pub format: ImageFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

/// Descriptor for creating a render pass object
#[derive(Debug, Clone)]
pub struct RenderPassDesc {
    /// Color attachments
    pub color: Vec<AttachmentDesc>,
    /// Optional depth attachment
    pub depth: Option<AttachmentDesc>,
    /// Color attachments transition to present-src at pass end
    /// (on-screen pass) instead of shader-read (off-screen pass)
    pub presentable: bool,
}

/// One concrete attachment of a framebuffer
#[derive(Debug, Clone, Copy)]
pub enum FramebufferAttachment {
    /// A presentable image of the device's swapchain
    SwapchainImage(u32),
    /// A device image created by the engine
    Image(ImageHandle),
}

/// Descriptor for creating a framebuffer
#[derive(Debug, Clone)]
pub struct FramebufferDesc {
    pub render_pass: RenderPassHandle,
    pub attachments: Vec<FramebufferAttachment>,
    pub extent: Extent2d,
}

// ===== GRAPHICS DEVICE TRAIT =====

/// Main device trait
///
/// Implemented by backend crates (e.g. the Vulkan device). All methods take
/// `&self`; backends guard their internal tables with locks where needed.
///
/// Blocking behavior: `wait_for_fence` and `wait_idle` block the calling
/// thread until the GPU signals; everything else returns once the request
/// is recorded or queued.
pub trait GraphicsDevice: Send + Sync {
    /// Static device limits
    fn limits(&self) -> DeviceLimits;

    // ===== Synchronization primitives =====

    /// Create a fence, optionally in the signaled state
    fn create_fence(&self, signaled: bool) -> Result<FenceHandle>;

    /// Block until the fence is signaled
    fn wait_for_fence(&self, fence: FenceHandle) -> Result<()>;

    /// Return the fence to the unsignaled state
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    /// Destroy a fence
    fn destroy_fence(&self, fence: FenceHandle);

    /// Create a semaphore
    fn create_semaphore(&self) -> Result<SemaphoreHandle>;

    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Block until all queues are idle
    fn wait_idle(&self) -> Result<()>;

    // ===== Swapchain =====

    /// Create (or replace) the presentable chain at the given extent
    ///
    /// Replacing an existing chain destroys it together with its images;
    /// the caller is responsible for having waited for device idle first.
    fn create_swapchain(&self, extent: Extent2d) -> Result<SwapchainProperties>;

    /// Acquire the next presentable image, signaling `signal` when ready
    fn acquire_image(&self, signal: SemaphoreHandle) -> Result<AcquireOutcome>;

    /// Present an acquired image after `wait` is signaled
    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentOutcome>;

    // ===== Resources =====

    /// Allocate a buffer
    fn create_buffer(&self, desc: &BufferAllocationDesc) -> Result<BufferHandle>;

    /// Write into a persistently host-mapped buffer
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Allocate an image
    fn create_image(&self, desc: &ImageAllocationDesc) -> Result<ImageHandle>;

    /// Destroy an image
    fn destroy_image(&self, image: ImageHandle);

    /// Create (or fetch from cache) an immutable sampler
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: SamplerHandle);

    // ===== Binding tables =====

    /// Create a binding-table layout from its entries
    fn create_table_layout(&self, entries: &[TableLayoutEntry]) -> Result<TableLayoutHandle>;

    /// Destroy a binding-table layout
    fn destroy_table_layout(&self, layout: TableLayoutHandle);

    /// Allocate a binding table with the given layout
    fn allocate_binding_table(&self, layout: TableLayoutHandle) -> Result<BindingTableHandle>;

    /// Write resolved resource references into a table
    fn write_binding_table(
        &self,
        table: BindingTableHandle,
        writes: &[BindingTableWrite],
    ) -> Result<()>;

    /// Free a binding table
    fn free_binding_table(&self, table: BindingTableHandle);

    // ===== Render passes and framebuffers =====

    /// Create a render pass object
    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle>;

    /// Destroy a render pass object
    fn destroy_render_pass(&self, pass: RenderPassHandle);

    /// Create a framebuffer
    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FramebufferHandle>;

    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    // ===== Pipelines =====

    /// Compile a graphics pipeline
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle>;

    /// Compile a compute pipeline
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<PipelineHandle>;

    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    // ===== Recording and submission =====

    /// Create a command recorder for the given queue
    fn create_recorder(&self, queue: QueueKind) -> Result<Box<dyn CommandRecorder>>;

    /// Submit a finished recorder to a queue with the given synchronization
    fn submit(
        &self,
        queue: QueueKind,
        recorder: &dyn CommandRecorder,
        sync: SubmitSync<'_>,
    ) -> Result<()>;
}
