/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Journals every capability call as a line of text so tests can assert
/// ordering invariants (fence waits before slot reuse, barrier sequencing
/// around blits, no draws after a failed bind). Fences are simulated:
/// a submission's fence "signals" when the test (or the engine) waits on
/// it, which also retires the submission from the outstanding count.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::device::{
    AcquireOutcome, BindingTableHandle, BindingTableWrite, BufferAllocationDesc, BufferHandle,
    CommandRecorder, ComputePipelineDesc, DeviceLimits, Extent2d, FenceHandle, FramebufferDesc,
    FramebufferHandle, GraphicsDevice, GraphicsPipelineDesc, ImageAllocationDesc, ImageFormat,
    ImageHandle, ImageRange, ImageState, IndexType, PipelineBindPoint, PipelineHandle,
    PresentOutcome, QueueKind, Rect2d, RenderPassDesc, RenderPassHandle, SamplerDesc,
    SamplerHandle, SemaphoreHandle, ShaderStageFlags, SubmitSync, SwapchainProperties,
    TableLayoutEntry, TableLayoutHandle, TableWriteData, Viewport, ClearValue,
};
use crate::error::{Error, Result};

// ============================================================================
// Shared mock state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FenceState {
    signaled: bool,
    /// A submission references this fence and has not been waited on yet
    pending: bool,
}

struct MockSwapchainState {
    image_count: usize,
    extent: Extent2d,
    next_image: u32,
}

struct MockState {
    journal: Vec<String>,
    next_handle: u64,

    fences: FxHashMap<u64, FenceState>,
    semaphores: FxHashSet<u64>,
    buffers: FxHashSet<u64>,
    host_visible: FxHashSet<u64>,
    images: FxHashSet<u64>,
    samplers: FxHashSet<u64>,
    table_layouts: FxHashSet<u64>,
    tables: FxHashSet<u64>,
    render_passes: FxHashSet<u64>,
    framebuffers: FxHashSet<u64>,
    pipelines: FxHashSet<u64>,

    swapchain: Option<MockSwapchainState>,
    swapchain_image_count: usize,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,

    /// Submissions whose fence has not been waited on yet
    outstanding: usize,
    max_outstanding: usize,
}

impl MockState {
    fn new() -> Self {
        Self {
            journal: Vec::new(),
            next_handle: 0,
            fences: FxHashMap::default(),
            semaphores: FxHashSet::default(),
            buffers: FxHashSet::default(),
            host_visible: FxHashSet::default(),
            images: FxHashSet::default(),
            samplers: FxHashSet::default(),
            table_layouts: FxHashSet::default(),
            tables: FxHashSet::default(),
            render_passes: FxHashSet::default(),
            framebuffers: FxHashSet::default(),
            pipelines: FxHashSet::default(),
            swapchain: None,
            swapchain_image_count: 3,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            outstanding: 0,
            max_outstanding: 0,
        }
    }

    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn record(&mut self, line: String) {
        self.journal.push(line);
    }
}

// ============================================================================
// Mock device
// ============================================================================

/// Mock GraphicsDevice that journals calls and simulates synchronization
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
    limits: DeviceLimits,
}

impl MockDevice {
    /// Create a mock device with default limits
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
            limits: DeviceLimits::default(),
        }
    }

    /// Create a mock device with specific limits
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
            limits,
        }
    }

    /// Number of presentable images the next created swapchain will have
    pub fn set_swapchain_image_count(&self, count: usize) {
        self.state.lock().unwrap().swapchain_image_count = count;
    }

    /// Queue an outcome for a future `acquire_image` call
    pub fn script_acquire(&self, outcome: AcquireOutcome) {
        self.state.lock().unwrap().acquire_script.push_back(outcome);
    }

    /// Queue an outcome for a future `present` call
    pub fn script_present(&self, outcome: PresentOutcome) {
        self.state.lock().unwrap().present_script.push_back(outcome);
    }

    /// Snapshot of the call journal
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    /// Drop all journal entries recorded so far
    pub fn clear_journal(&self) {
        self.state.lock().unwrap().journal.clear();
    }

    /// Highest number of simultaneously outstanding submissions observed
    pub fn max_outstanding(&self) -> usize {
        self.state.lock().unwrap().max_outstanding
    }

    /// Currently live (created and not destroyed) framebuffers
    pub fn live_framebuffers(&self) -> usize {
        self.state.lock().unwrap().framebuffers.len()
    }

    /// Currently live images
    pub fn live_images(&self) -> usize {
        self.state.lock().unwrap().images.len()
    }

    /// Currently live buffers
    pub fn live_buffers(&self) -> usize {
        self.state.lock().unwrap().buffers.len()
    }

    /// Index of the first journal entry equal to `line`, after `from`
    pub fn journal_index_after(&self, from: usize, line: &str) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .journal
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, l)| l.as_str() == line)
            .map(|(i, _)| i)
    }
}

impl GraphicsDevice for MockDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.fences.insert(
            id,
            FenceState {
                signaled,
                pending: false,
            },
        );
        s.record(format!("create_fence #{} signaled={}", id, signaled));
        Ok(FenceHandle(id))
    }

    fn wait_for_fence(&self, fence: FenceHandle) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let state = match s.fences.get(&fence.0) {
            Some(state) => *state,
            None => {
                return Err(Error::BackendError(format!(
                    "wait on unknown fence #{}",
                    fence.0
                )))
            }
        };
        if !state.signaled && !state.pending {
            // Nothing will ever signal this fence; a real device would
            // deadlock here.
            return Err(Error::BackendError(format!(
                "wait on fence #{} with no pending submission",
                fence.0
            )));
        }
        if state.pending {
            s.outstanding -= 1;
        }
        s.fences.insert(
            fence.0,
            FenceState {
                signaled: true,
                pending: false,
            },
        );
        s.record(format!("wait_fence #{}", fence.0));
        Ok(())
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        match s.fences.get_mut(&fence.0) {
            Some(state) => {
                state.signaled = false;
            }
            None => {
                return Err(Error::BackendError(format!(
                    "reset of unknown fence #{}",
                    fence.0
                )))
            }
        }
        s.record(format!("reset_fence #{}", fence.0));
        Ok(())
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut s = self.state.lock().unwrap();
        s.fences.remove(&fence.0);
        s.record(format!("destroy_fence #{}", fence.0));
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.semaphores.insert(id);
        s.record(format!("create_semaphore #{}", id));
        Ok(SemaphoreHandle(id))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut s = self.state.lock().unwrap();
        s.semaphores.remove(&semaphore.0);
        s.record(format!("destroy_semaphore #{}", semaphore.0));
    }

    fn wait_idle(&self) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        // Retire every pending submission
        let pending: Vec<u64> = s
            .fences
            .iter()
            .filter(|(_, st)| st.pending)
            .map(|(id, _)| *id)
            .collect();
        for id in pending {
            s.fences.insert(
                id,
                FenceState {
                    signaled: true,
                    pending: false,
                },
            );
        }
        s.outstanding = 0;
        s.record("wait_idle".to_string());
        Ok(())
    }

    fn create_swapchain(&self, extent: Extent2d) -> Result<SwapchainProperties> {
        let mut s = self.state.lock().unwrap();
        let image_count = s.swapchain_image_count;
        s.swapchain = Some(MockSwapchainState {
            image_count,
            extent,
            next_image: 0,
        });
        s.record(format!(
            "create_swapchain {}x{} images={}",
            extent.width, extent.height, image_count
        ));
        Ok(SwapchainProperties {
            image_count,
            format: ImageFormat::B8G8R8A8_SRGB,
            extent,
        })
    }

    fn acquire_image(&self, signal: SemaphoreHandle) -> Result<AcquireOutcome> {
        let mut s = self.state.lock().unwrap();
        if s.swapchain.is_none() {
            return Err(Error::BackendError("acquire without swapchain".to_string()));
        }
        let outcome = match s.acquire_script.pop_front() {
            Some(outcome) => outcome,
            None => {
                let chain = s.swapchain.as_mut().unwrap();
                let index = chain.next_image;
                chain.next_image = (chain.next_image + 1) % chain.image_count as u32;
                AcquireOutcome::Acquired(index)
            }
        };
        match outcome {
            AcquireOutcome::Acquired(index) => {
                s.record(format!("acquire #{} -> image {}", signal.0, index));
            }
            AcquireOutcome::Stale => {
                s.record(format!("acquire #{} -> stale", signal.0));
            }
        }
        Ok(outcome)
    }

    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentOutcome> {
        let mut s = self.state.lock().unwrap();
        if s.swapchain.is_none() {
            return Err(Error::BackendError("present without swapchain".to_string()));
        }
        let outcome = s
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented);
        match outcome {
            PresentOutcome::Presented => {
                s.record(format!("present image {} wait #{}", image_index, wait.0));
            }
            PresentOutcome::Stale => {
                s.record(format!("present image {} -> stale", image_index));
            }
        }
        Ok(outcome)
    }

    fn create_buffer(&self, desc: &BufferAllocationDesc) -> Result<BufferHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.buffers.insert(id);
        if desc.host_visible {
            s.host_visible.insert(id);
        }
        s.record(format!(
            "create_buffer #{} size={} host_visible={}",
            id, desc.size, desc.host_visible
        ));
        Ok(BufferHandle(id))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if !s.buffers.contains(&buffer.0) {
            return Err(Error::BackendError(format!(
                "write to unknown buffer #{}",
                buffer.0
            )));
        }
        if !s.host_visible.contains(&buffer.0) {
            return Err(Error::BackendError(format!(
                "write to non-host-visible buffer #{}",
                buffer.0
            )));
        }
        s.record(format!(
            "write_buffer #{} offset={} len={}",
            buffer.0,
            offset,
            data.len()
        ));
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut s = self.state.lock().unwrap();
        s.buffers.remove(&buffer.0);
        s.host_visible.remove(&buffer.0);
        s.record(format!("destroy_buffer #{}", buffer.0));
    }

    fn create_image(&self, desc: &ImageAllocationDesc) -> Result<ImageHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.images.insert(id);
        s.record(format!(
            "create_image #{} {}x{} mips={} layers={}",
            id, desc.extent.width, desc.extent.height, desc.mip_levels, desc.array_layers
        ));
        Ok(ImageHandle(id))
    }

    fn destroy_image(&self, image: ImageHandle) {
        let mut s = self.state.lock().unwrap();
        s.images.remove(&image.0);
        s.record(format!("destroy_image #{}", image.0));
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<SamplerHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.samplers.insert(id);
        s.record(format!("create_sampler #{}", id));
        Ok(SamplerHandle(id))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        let mut s = self.state.lock().unwrap();
        s.samplers.remove(&sampler.0);
        s.record(format!("destroy_sampler #{}", sampler.0));
    }

    fn create_table_layout(&self, entries: &[TableLayoutEntry]) -> Result<TableLayoutHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.table_layouts.insert(id);
        s.record(format!("create_table_layout #{} entries={}", id, entries.len()));
        Ok(TableLayoutHandle(id))
    }

    fn destroy_table_layout(&self, layout: TableLayoutHandle) {
        let mut s = self.state.lock().unwrap();
        s.table_layouts.remove(&layout.0);
        s.record(format!("destroy_table_layout #{}", layout.0));
    }

    fn allocate_binding_table(&self, layout: TableLayoutHandle) -> Result<BindingTableHandle> {
        let mut s = self.state.lock().unwrap();
        if !s.table_layouts.contains(&layout.0) {
            return Err(Error::BackendError(format!(
                "allocate from unknown table layout #{}",
                layout.0
            )));
        }
        let id = s.mint();
        s.tables.insert(id);
        s.record(format!("allocate_table #{}", id));
        Ok(BindingTableHandle(id))
    }

    fn write_binding_table(
        &self,
        table: BindingTableHandle,
        writes: &[BindingTableWrite],
    ) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if !s.tables.contains(&table.0) {
            return Err(Error::BackendError(format!(
                "write to unknown table #{}",
                table.0
            )));
        }
        let parts: Vec<String> = writes
            .iter()
            .map(|w| {
                let data = match &w.data {
                    TableWriteData::Buffers(regions) => regions
                        .iter()
                        .map(|r| format!("b{}@{}:{}", r.buffer.0, r.offset, r.range))
                        .collect::<Vec<_>>()
                        .join(","),
                    TableWriteData::Images(images) => images
                        .iter()
                        .map(|i| format!("i{}", i.0))
                        .collect::<Vec<_>>()
                        .join(","),
                    TableWriteData::Samplers(samplers) => samplers
                        .iter()
                        .map(|s| format!("s{}", s.0))
                        .collect::<Vec<_>>()
                        .join(","),
                    TableWriteData::CombinedImageSamplers(pairs) => pairs
                        .iter()
                        .map(|(i, s)| format!("i{}/s{}", i.0, s.0))
                        .collect::<Vec<_>>()
                        .join(","),
                };
                format!("{}={}", w.binding, data)
            })
            .collect();
        s.record(format!("write_table #{} [{}]", table.0, parts.join(" ")));
        Ok(())
    }

    fn free_binding_table(&self, table: BindingTableHandle) {
        let mut s = self.state.lock().unwrap();
        s.tables.remove(&table.0);
        s.record(format!("free_table #{}", table.0));
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.render_passes.insert(id);
        s.record(format!(
            "create_render_pass #{} color={} depth={} presentable={}",
            id,
            desc.color.len(),
            desc.depth.is_some(),
            desc.presentable
        ));
        Ok(RenderPassHandle(id))
    }

    fn destroy_render_pass(&self, pass: RenderPassHandle) {
        let mut s = self.state.lock().unwrap();
        s.render_passes.remove(&pass.0);
        s.record(format!("destroy_render_pass #{}", pass.0));
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.framebuffers.insert(id);
        s.record(format!(
            "create_framebuffer #{} {}x{}",
            id, desc.extent.width, desc.extent.height
        ));
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        let mut s = self.state.lock().unwrap();
        s.framebuffers.remove(&framebuffer.0);
        s.record(format!("destroy_framebuffer #{}", framebuffer.0));
    }

    fn create_graphics_pipeline(&self, _desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.pipelines.insert(id);
        s.record(format!("create_graphics_pipeline #{}", id));
        Ok(PipelineHandle(id))
    }

    fn create_compute_pipeline(&self, _desc: &ComputePipelineDesc) -> Result<PipelineHandle> {
        let mut s = self.state.lock().unwrap();
        let id = s.mint();
        s.pipelines.insert(id);
        s.record(format!("create_compute_pipeline #{}", id));
        Ok(PipelineHandle(id))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        let mut s = self.state.lock().unwrap();
        s.pipelines.remove(&pipeline.0);
        s.record(format!("destroy_pipeline #{}", pipeline.0));
    }

    fn create_recorder(&self, queue: QueueKind) -> Result<Box<dyn CommandRecorder>> {
        Ok(Box::new(MockRecorder {
            state: Arc::clone(&self.state),
            queue,
            recording: false,
            in_pass: false,
        }))
    }

    fn submit(
        &self,
        queue: QueueKind,
        _recorder: &dyn CommandRecorder,
        sync: SubmitSync<'_>,
    ) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if let Some(fence) = sync.fence {
            let state = s.fences.get(&fence.0).copied().ok_or_else(|| {
                Error::BackendError(format!("submit with unknown fence #{}", fence.0))
            })?;
            if state.pending {
                return Err(Error::BackendError(format!(
                    "submit with fence #{} still pending (slot reused before wait)",
                    fence.0
                )));
            }
            if state.signaled {
                return Err(Error::BackendError(format!(
                    "submit with fence #{} not reset",
                    fence.0
                )));
            }
            s.fences.insert(
                fence.0,
                FenceState {
                    signaled: false,
                    pending: true,
                },
            );
            s.outstanding += 1;
            s.max_outstanding = s.max_outstanding.max(s.outstanding);
        }
        let queue_name = match queue {
            QueueKind::Graphics => "graphics",
            QueueKind::Compute => "compute",
        };
        let waits: Vec<String> = sync
            .wait
            .iter()
            .map(|(sem, stage)| format!("#{}@{:?}", sem.0, stage))
            .collect();
        let signals: Vec<String> = sync.signal.iter().map(|sem| format!("#{}", sem.0)).collect();
        let fence = match sync.fence {
            Some(f) => format!("#{}", f.0),
            None => "none".to_string(),
        };
        s.record(format!(
            "submit {} wait=[{}] signal=[{}] fence={}",
            queue_name,
            waits.join(","),
            signals.join(","),
            fence
        ));
        Ok(())
    }
}

// ============================================================================
// Mock recorder
// ============================================================================

/// Mock CommandRecorder journaling into the shared device journal
pub struct MockRecorder {
    state: Arc<Mutex<MockState>>,
    queue: QueueKind,
    recording: bool,
    in_pass: bool,
}

impl MockRecorder {
    fn record(&self, line: String) {
        self.state.lock().unwrap().record(line);
    }

    fn check_recording(&self, op: &str) -> Result<()> {
        if !self.recording {
            return Err(Error::BackendError(format!(
                "{} outside begin/end",
                op
            )));
        }
        Ok(())
    }
}

impl CommandRecorder for MockRecorder {
    fn begin(&mut self) -> Result<()> {
        if self.recording {
            return Err(Error::BackendError("recorder already recording".to_string()));
        }
        self.recording = true;
        self.in_pass = false;
        let queue = match self.queue {
            QueueKind::Graphics => "graphics",
            QueueKind::Compute => "compute",
        };
        self.record(format!("begin {}", queue));
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.check_recording("end")?;
        if self.in_pass {
            return Err(Error::BackendError(
                "render pass not ended before end".to_string(),
            ));
        }
        self.recording = false;
        self.record("end".to_string());
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        _pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        _extent: Extent2d,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.check_recording("begin_render_pass")?;
        if self.in_pass {
            return Err(Error::BackendError("render pass already open".to_string()));
        }
        self.in_pass = true;
        self.record(format!(
            "begin_render_pass fb=#{} clears={}",
            framebuffer.0,
            clear_values.len()
        ));
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.check_recording("end_render_pass")?;
        if !self.in_pass {
            return Err(Error::BackendError("no render pass open".to_string()));
        }
        self.in_pass = false;
        self.record("end_render_pass".to_string());
        Ok(())
    }

    fn bind_pipeline(
        &mut self,
        _bind_point: PipelineBindPoint,
        pipeline: PipelineHandle,
    ) -> Result<()> {
        self.check_recording("bind_pipeline")?;
        self.record(format!("bind_pipeline #{}", pipeline.0));
        Ok(())
    }

    fn bind_binding_table(
        &mut self,
        _bind_point: PipelineBindPoint,
        _pipeline: PipelineHandle,
        set_index: u32,
        table: BindingTableHandle,
        dynamic_offsets: &[u32],
    ) -> Result<()> {
        self.check_recording("bind_binding_table")?;
        let offsets: Vec<String> = dynamic_offsets.iter().map(|o| o.to_string()).collect();
        self.record(format!(
            "bind_table set={} table=#{} offsets=[{}]",
            set_index,
            table.0,
            offsets.join(",")
        ));
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64) -> Result<()> {
        self.check_recording("bind_vertex_buffer")?;
        self.record(format!("bind_vertex_buffer #{} offset={}", buffer.0, offset));
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        _index_type: IndexType,
    ) -> Result<()> {
        self.check_recording("bind_index_buffer")?;
        self.record(format!("bind_index_buffer #{} offset={}", buffer.0, offset));
        Ok(())
    }

    fn set_viewport(&mut self, _viewport: Viewport) -> Result<()> {
        self.check_recording("set_viewport")?;
        self.record("set_viewport".to_string());
        Ok(())
    }

    fn set_scissor(&mut self, _scissor: Rect2d) -> Result<()> {
        self.check_recording("set_scissor")?;
        self.record("set_scissor".to_string());
        Ok(())
    }

    fn push_constants(
        &mut self,
        _pipeline: PipelineHandle,
        _stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.check_recording("push_constants")?;
        self.record(format!("push_constants offset={} len={}", offset, data.len()));
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.check_recording("draw")?;
        self.record(format!("draw {} first={}", vertex_count, first_vertex));
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<()> {
        self.check_recording("draw_indexed")?;
        self.record(format!(
            "draw_indexed {} first={} vertex_offset={}",
            index_count, first_index, vertex_offset
        ));
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.check_recording("dispatch")?;
        self.record(format!("dispatch {}x{}x{}", x, y, z));
        Ok(())
    }

    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: u64) -> Result<()> {
        self.check_recording("copy_buffer")?;
        self.record(format!("copy_buffer #{}->#{} size={}", src.0, dst.0, size));
        Ok(())
    }

    fn copy_buffer_to_image(
        &mut self,
        src: BufferHandle,
        buffer_offset: u64,
        image: ImageHandle,
        mip_level: u32,
        array_layer: u32,
        _extent: Extent2d,
    ) -> Result<()> {
        self.check_recording("copy_buffer_to_image")?;
        self.record(format!(
            "copy_buffer_to_image #{}->#{} offset={} mip={} layer={}",
            src.0, image.0, buffer_offset, mip_level, array_layer
        ));
        Ok(())
    }

    fn transition_image(
        &mut self,
        image: ImageHandle,
        range: ImageRange,
        from: ImageState,
        to: ImageState,
    ) -> Result<()> {
        self.check_recording("transition_image")?;
        self.record(format!(
            "transition #{} mips {}..{} {:?}->{:?}",
            image.0,
            range.base_mip,
            range.base_mip + range.mip_count,
            from,
            to
        ));
        Ok(())
    }

    fn blit_image_mip(
        &mut self,
        image: ImageHandle,
        src_level: u32,
        src_extent: Extent2d,
        dst_level: u32,
        dst_extent: Extent2d,
        _layer_count: u32,
    ) -> Result<()> {
        self.check_recording("blit_image_mip")?;
        self.record(format!(
            "blit #{} {}->{} {}x{}->{}x{}",
            image.0,
            src_level,
            dst_level,
            src_extent.width,
            src_extent.height,
            dst_extent.width,
            dst_extent.height
        ));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
