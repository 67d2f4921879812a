/// GpuContext - shared device state for all Vulkan backend objects
///
/// Holds the logical device, queues, allocator and the handle tables that
/// map engine handles onto Vulkan objects. Shared (via `Arc`) between the
/// device frontend and every command recorder so recorders can resolve
/// handles while recording.

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::vulkan::Allocator;
use rustc_hash::FxHashMap;

use nebula_engine::engine_err;
use nebula_engine::nebula::device::{
    BufferHandle, FenceHandle, FramebufferHandle, ImageHandle, PipelineHandle, QueueKind,
    RenderPassHandle, SemaphoreHandle, TableLayoutHandle, BindingTableHandle,
};
use nebula_engine::nebula::Result;

use crate::vulkan_swapchain::SwapchainState;

/// One tracked buffer allocation
pub(crate) struct BufferEntry {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub host_visible: bool,
}

/// One tracked image allocation (with its default full view)
pub(crate) struct ImageEntry {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub view: vk::ImageView,
    pub aspect: vk::ImageAspectFlags,
}

/// One tracked pipeline (the layout is needed for binds/push constants)
#[derive(Clone, Copy)]
pub(crate) struct PipelineEntry {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// Shared GPU context for the Vulkan backend
pub(crate) struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator (shared, requires mutex for thread safety).
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is
    /// destroyed.
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub compute_queue: vk::Queue,
    pub compute_queue_family: u32,
    pub present_queue: vk::Queue,

    /// Monotonic engine-handle source
    next_handle: AtomicU64,

    // Handle tables
    pub fences: Mutex<FxHashMap<u64, vk::Fence>>,
    pub semaphores: Mutex<FxHashMap<u64, vk::Semaphore>>,
    pub buffers: Mutex<FxHashMap<u64, BufferEntry>>,
    pub images: Mutex<FxHashMap<u64, ImageEntry>>,
    pub render_passes: Mutex<FxHashMap<u64, vk::RenderPass>>,
    pub framebuffers: Mutex<FxHashMap<u64, vk::Framebuffer>>,
    pub table_layouts: Mutex<FxHashMap<u64, vk::DescriptorSetLayout>>,
    pub tables: Mutex<FxHashMap<u64, vk::DescriptorSet>>,
    pub pipelines: Mutex<FxHashMap<u64, PipelineEntry>>,

    /// Presentable chain (at most one)
    pub swapchain: Mutex<Option<SwapchainState>>,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: ash::Device,
        allocator: Arc<Mutex<Allocator>>,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        compute_queue: vk::Queue,
        compute_queue_family: u32,
        present_queue: vk::Queue,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(allocator),
            graphics_queue,
            graphics_queue_family,
            compute_queue,
            compute_queue_family,
            present_queue,
            next_handle: AtomicU64::new(1),
            fences: Mutex::new(FxHashMap::default()),
            semaphores: Mutex::new(FxHashMap::default()),
            buffers: Mutex::new(FxHashMap::default()),
            images: Mutex::new(FxHashMap::default()),
            render_passes: Mutex::new(FxHashMap::default()),
            framebuffers: Mutex::new(FxHashMap::default()),
            table_layouts: Mutex::new(FxHashMap::default()),
            tables: Mutex::new(FxHashMap::default()),
            pipelines: Mutex::new(FxHashMap::default()),
            swapchain: Mutex::new(None),
        }
    }

    /// Mint a fresh engine handle value
    pub(crate) fn mint(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue for the given kind
    pub(crate) fn queue(&self, kind: QueueKind) -> vk::Queue {
        match kind {
            QueueKind::Graphics => self.graphics_queue,
            QueueKind::Compute => self.compute_queue,
        }
    }

    /// Queue family for the given kind
    pub(crate) fn queue_family(&self, kind: QueueKind) -> u32 {
        match kind {
            QueueKind::Graphics => self.graphics_queue_family,
            QueueKind::Compute => self.compute_queue_family,
        }
    }

    // ===== Handle resolution =====

    pub(crate) fn fence(&self, handle: FenceHandle) -> Result<vk::Fence> {
        self.fences
            .lock()
            .unwrap()
            .get(&handle.0)
            .copied()
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown fence handle {}", handle.0))
    }

    pub(crate) fn semaphore(&self, handle: SemaphoreHandle) -> Result<vk::Semaphore> {
        self.semaphores
            .lock()
            .unwrap()
            .get(&handle.0)
            .copied()
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown semaphore handle {}", handle.0))
    }

    pub(crate) fn buffer(&self, handle: BufferHandle) -> Result<vk::Buffer> {
        self.buffers
            .lock()
            .unwrap()
            .get(&handle.0)
            .map(|e| e.buffer)
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown buffer handle {}", handle.0))
    }

    pub(crate) fn image(&self, handle: ImageHandle) -> Result<(vk::Image, vk::ImageAspectFlags)> {
        self.images
            .lock()
            .unwrap()
            .get(&handle.0)
            .map(|e| (e.image, e.aspect))
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown image handle {}", handle.0))
    }

    pub(crate) fn image_view(&self, handle: ImageHandle) -> Result<vk::ImageView> {
        self.images
            .lock()
            .unwrap()
            .get(&handle.0)
            .map(|e| e.view)
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown image handle {}", handle.0))
    }

    pub(crate) fn render_pass(&self, handle: RenderPassHandle) -> Result<vk::RenderPass> {
        self.render_passes
            .lock()
            .unwrap()
            .get(&handle.0)
            .copied()
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown render pass handle {}", handle.0))
    }

    pub(crate) fn framebuffer(&self, handle: FramebufferHandle) -> Result<vk::Framebuffer> {
        self.framebuffers
            .lock()
            .unwrap()
            .get(&handle.0)
            .copied()
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown framebuffer handle {}", handle.0))
    }

    pub(crate) fn table_layout(&self, handle: TableLayoutHandle) -> Result<vk::DescriptorSetLayout> {
        self.table_layouts
            .lock()
            .unwrap()
            .get(&handle.0)
            .copied()
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown table layout handle {}", handle.0))
    }

    pub(crate) fn table(&self, handle: BindingTableHandle) -> Result<vk::DescriptorSet> {
        self.tables
            .lock()
            .unwrap()
            .get(&handle.0)
            .copied()
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown binding table handle {}", handle.0))
    }

    pub(crate) fn pipeline(&self, handle: PipelineHandle) -> Result<PipelineEntry> {
        self.pipelines
            .lock()
            .unwrap()
            .get(&handle.0)
            .copied()
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown pipeline handle {}", handle.0))
    }
}
