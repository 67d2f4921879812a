/// Engine - top-level driver tying the subsystems together
///
/// Owns the device handle, resource pool, frame scheduler and swapchain
/// manager, exposes the per-frame loop calls, and keeps the registry of
/// binding sets the resize cascade must invalidate. Also hosts the global
/// logging entry points used by the engine_* macros.

use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use rustc_hash::FxHashMap;

use crate::binding::{BindOutcome, DescriptorBindingSet};
use crate::device::{
    ClearValue, Extent2d, GraphicsDevice, PipelineBindPoint, Rect2d, RenderPassHandle, Viewport,
    WaitStage, IndexType,
};
use crate::error::Result;
use crate::frame::{BeginOutcome, EndOutcome, FlightSlot, FrameHandle, FrameScheduler};
use crate::log::{LogEntry, LogSeverity, Logger, DefaultLogger};
use crate::pipeline::{ComputeDesc, Pipeline, PipelineDesc};
use crate::resource::{
    BufferDesc, BufferResource, ImageDesc, ImageResource, ResourcePool, SamplerResource,
};
use crate::swapchain::{SurfaceExtentFn, SwapchainManager};
use crate::target::{RenderTarget, RenderTargetDesc};
use crate::device::SamplerDesc;
use crate::{engine_bail_invalid, engine_info};

// ===== GLOBAL LOGGER =====

static LOGGER: RwLock<Option<Arc<dyn Logger>>> = RwLock::new(None);

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineDesc {
    /// Number of flight slots N; fixed for the engine's lifetime
    pub frames_in_flight: usize,
    /// Attach a depth image to the on-screen pass
    pub swapchain_depth: bool,
}

impl Default for EngineDesc {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            swapchain_depth: true,
        }
    }
}

/// Top-level engine instance
pub struct Engine {
    device: Arc<dyn GraphicsDevice>,
    pool: ResourcePool,
    scheduler: FrameScheduler,
    swapchain: SwapchainManager,
    targets: FxHashMap<String, Arc<RenderTarget>>,
    /// Every binding set built through this engine; the resize cascade
    /// walks this registry to clear validity of affected bindings
    binding_sets: Vec<Arc<DescriptorBindingSet>>,
}

impl Engine {
    // ===== Logging =====

    /// Install a custom logger (replaces the colored console default)
    pub fn set_logger(logger: Arc<dyn Logger>) {
        *LOGGER.write().unwrap() = Some(logger);
    }

    /// Log a message (used by the engine_* macros)
    pub fn log(severity: LogSeverity, source: impl Into<String>, message: String) {
        Self::emit(LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.into(),
            message,
            file: None,
            line: None,
        });
    }

    /// Log a message with file:line details (used by engine_error!)
    pub fn log_detailed(
        severity: LogSeverity,
        source: impl Into<String>,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        Self::emit(LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.into(),
            message,
            file: Some(file),
            line: Some(line),
        });
    }

    fn emit(entry: LogEntry) {
        let guard = LOGGER.read().unwrap();
        match guard.as_ref() {
            Some(logger) => logger.log(&entry),
            None => DefaultLogger.log(&entry),
        }
    }

    // ===== Lifecycle =====

    /// Create an engine over a device capability and a surface-size query
    ///
    /// Builds the swapchain at the current surface size and the N-slot
    /// frame scheduler. All state is in-memory; nothing persists between
    /// runs.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        surface_extent: SurfaceExtentFn,
        desc: EngineDesc,
    ) -> Result<Self> {
        let scheduler = FrameScheduler::new(Arc::clone(&device), desc.frames_in_flight)?;
        let swapchain =
            SwapchainManager::new(Arc::clone(&device), surface_extent, desc.swapchain_depth)?;
        let pool = ResourcePool::new(Arc::clone(&device), desc.frames_in_flight);

        engine_info!(
            "nebula::Engine",
            "Engine created ({} flight slots, swapchain {}x{})",
            desc.frames_in_flight,
            swapchain.extent().width,
            swapchain.extent().height
        );

        Ok(Self {
            device,
            pool,
            scheduler,
            swapchain,
            targets: FxHashMap::default(),
            binding_sets: Vec::new(),
        })
    }

    /// The device capability the engine runs on
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Number of flight slots
    pub fn frames_in_flight(&self) -> usize {
        self.scheduler.frames_in_flight()
    }

    /// Current presentation surface extent
    pub fn surface_extent(&self) -> Extent2d {
        self.swapchain.extent()
    }

    /// The on-screen render pass (for pipelines drawing to the swapchain)
    pub fn present_pass(&self) -> RenderPassHandle {
        self.swapchain.present_pass()
    }

    /// The resource pool (binding-set updates resolve through it)
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    // ===== Resource builds =====

    /// Build (or rebuild) the buffer at `index`
    pub fn build_buffer(
        &mut self,
        index: usize,
        desc: BufferDesc,
    ) -> Result<Arc<BufferResource>> {
        self.pool.build_buffer(index, desc)
    }

    /// Build (or rebuild) the image at `index`
    ///
    /// Surface-matched images are sized to the current swapchain extent
    /// and rebuilt automatically by the resize cascade.
    pub fn build_image(&mut self, index: usize, desc: ImageDesc) -> Result<Arc<ImageResource>> {
        let extent = self.swapchain.extent();
        self.pool.build_image(index, desc, extent)
    }

    /// Build (or rebuild) the sampler at `index`
    pub fn build_sampler(
        &mut self,
        index: usize,
        desc: &SamplerDesc,
    ) -> Result<Arc<SamplerResource>> {
        self.pool.build_sampler(index, desc)
    }

    /// Release the pool's reference to the buffer at `index`
    pub fn destroy_buffer(&mut self, index: usize) {
        self.pool.destroy_buffer(index);
    }

    /// Release the pool's reference to the image at `index`
    pub fn destroy_image(&mut self, index: usize) {
        self.pool.destroy_image(index);
    }

    /// Release the pool's reference to the sampler at `index`
    pub fn destroy_sampler(&mut self, index: usize) {
        self.pool.destroy_sampler(index);
    }

    // ===== Render targets =====

    /// Create a named off-screen render target
    ///
    /// The color image referenced by the blueprint must be built first.
    pub fn create_render_target(
        &mut self,
        name: &str,
        desc: &RenderTargetDesc,
    ) -> Result<Arc<RenderTarget>> {
        if self.targets.contains_key(name) {
            engine_bail_invalid!(
                "nebula::Engine",
                "RenderTarget '{}' already exists",
                name
            );
        }
        let Some(color) = self.pool.image(desc.color_image) else {
            engine_bail_invalid!(
                "nebula::Engine",
                "RenderTarget '{}' references unbuilt image {}",
                name,
                desc.color_image
            );
        };
        let target = RenderTarget::build(
            Arc::clone(&self.device),
            self.frames_in_flight(),
            desc,
            color,
        )?;
        self.targets.insert(name.to_string(), Arc::clone(&target));
        Ok(target)
    }

    /// Get a render target by name
    pub fn render_target(&self, name: &str) -> Option<Arc<RenderTarget>> {
        self.targets.get(name).cloned()
    }

    /// Remove a render target by name
    pub fn remove_render_target(&mut self, name: &str) -> Option<Arc<RenderTarget>> {
        self.targets.remove(name)
    }

    // ===== Pipelines =====

    /// Compile a graphics pipeline and register its binding sets
    pub fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<Arc<Pipeline>> {
        let pipeline =
            Pipeline::build_graphics(Arc::clone(&self.device), self.frames_in_flight(), desc)?;
        self.binding_sets
            .extend(pipeline.binding_sets().iter().cloned());
        Ok(pipeline)
    }

    /// Compile a compute pipeline and register its binding sets
    pub fn create_compute_pipeline(&mut self, desc: &ComputeDesc) -> Result<Arc<Pipeline>> {
        let pipeline =
            Pipeline::build_compute(Arc::clone(&self.device), self.frames_in_flight(), desc)?;
        self.binding_sets
            .extend(pipeline.binding_sets().iter().cloned());
        Ok(pipeline)
    }

    // ===== Frame loop =====

    /// Flag that the surface was resized (consumed by the next begin_frame)
    pub fn on_surface_resized(&self) {
        self.scheduler.request_resize();
    }

    /// Begin a frame; `None` means a rebuild happened and no frame is drawn
    ///
    /// The caller's loop is expected to simply try again next iteration.
    pub fn begin_frame(&mut self) -> Result<Option<FrameHandle>> {
        match self.scheduler.begin_frame()? {
            BeginOutcome::Frame(frame) => Ok(Some(frame)),
            BeginOutcome::NeedsRebuild => {
                self.rebuild_surface()?;
                Ok(None)
            }
        }
    }

    /// Submit and present the current frame
    ///
    /// Pass a stage to gate the graphics submission on this slot's
    /// compute-finished semaphore.
    pub fn end_frame_and_present(&mut self, compute_wait: Option<WaitStage>) -> Result<()> {
        match self
            .scheduler
            .end_frame_and_present(&self.swapchain, compute_wait)?
        {
            EndOutcome::Presented => Ok(()),
            EndOutcome::NeedsRebuild => self.rebuild_surface(),
        }
    }

    /// Begin compute recording for the current slot
    pub fn begin_compute(&mut self) -> Result<FlightSlot> {
        self.scheduler.begin_compute()
    }

    /// Submit the current slot's compute work
    pub fn end_compute(&mut self) -> Result<()> {
        self.scheduler.end_compute()
    }

    /// Rebuild the swapchain and run the resize cascade
    fn rebuild_surface(&mut self) -> Result<()> {
        let images = self.pool.surface_matched_images();
        let targets: Vec<Arc<RenderTarget>> = self.targets.values().cloned().collect();
        self.swapchain
            .rebuild(&images, &targets, &self.binding_sets)
    }

    // ===== Pass recording =====

    /// Begin the on-screen pass on the acquired presentable image
    pub fn begin_present_pass(
        &mut self,
        frame: FrameHandle,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        let pass = self.swapchain.present_pass();
        let framebuffer = self.swapchain.framebuffer(frame.image_index);
        let extent = self.swapchain.extent();
        let recorder = self.scheduler.recorder(frame.slot)?;
        recorder.begin_render_pass(pass, framebuffer, extent, clear_values)?;
        recorder.set_viewport(Viewport::full(extent))?;
        recorder.set_scissor(Rect2d::full(extent))
    }

    /// Begin an off-screen pass on a named render target
    pub fn begin_target_pass(
        &mut self,
        frame: FrameHandle,
        target_name: &str,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        let Some(target) = self.targets.get(target_name) else {
            engine_bail_invalid!(
                "nebula::Engine",
                "Unknown render target '{}'",
                target_name
            );
        };
        let pass = target.render_pass();
        let framebuffer = target.framebuffer(frame.slot);
        let extent = target.extent();
        let recorder = self.scheduler.recorder(frame.slot)?;
        recorder.begin_render_pass(pass, framebuffer, extent, clear_values)?;
        recorder.set_viewport(Viewport::full(extent))?;
        recorder.set_scissor(Rect2d::full(extent))
    }

    /// End the open pass
    pub fn end_pass(&mut self, frame: FrameHandle) -> Result<()> {
        self.scheduler.recorder(frame.slot)?.end_render_pass()
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, frame: FrameHandle, pipeline: &Pipeline) -> Result<()> {
        pipeline.bind(self.scheduler.recorder(frame.slot)?)
    }

    /// Update and bind one of a pipeline's binding sets for drawing
    ///
    /// Returns `NotReady` (and records no bind) when a referenced resource
    /// is not built yet; the caller must skip the draw for this pass.
    pub fn bind_for_draw(
        &mut self,
        frame: FrameHandle,
        pipeline: &Pipeline,
        set_index: usize,
        first: usize,
        count: usize,
        dynamic_repeat_indices: &[u32],
    ) -> Result<BindOutcome> {
        let Some(set) = pipeline.binding_set(set_index) else {
            engine_bail_invalid!(
                "nebula::Engine",
                "Pipeline has no binding set {}",
                set_index
            );
        };
        let pool = &self.pool;
        let recorder = self.scheduler.recorder(frame.slot)?;
        set.bind(
            pool,
            recorder,
            pipeline.bind_point(),
            pipeline.handle(),
            frame.slot,
            first,
            count,
            dynamic_repeat_indices,
        )
    }

    /// Upload a named push-constant block
    pub fn push_constants(
        &mut self,
        frame: FrameHandle,
        pipeline: &Pipeline,
        block_name: &str,
        data: &[u8],
    ) -> Result<()> {
        pipeline.push_constants(self.scheduler.recorder(frame.slot)?, block_name, data)
    }

    /// Bind a vertex buffer (slot-resolved)
    pub fn bind_vertex_buffer(
        &mut self,
        frame: FrameHandle,
        buffer: &BufferResource,
        offset: u64,
    ) -> Result<()> {
        let handle = buffer.handle_for_slot(frame.slot, 0);
        self.scheduler
            .recorder(frame.slot)?
            .bind_vertex_buffer(handle, offset)
    }

    /// Bind an index buffer (slot-resolved)
    pub fn bind_index_buffer(
        &mut self,
        frame: FrameHandle,
        buffer: &BufferResource,
        offset: u64,
        index_type: IndexType,
    ) -> Result<()> {
        let handle = buffer.handle_for_slot(frame.slot, 0);
        self.scheduler
            .recorder(frame.slot)?
            .bind_index_buffer(handle, offset, index_type)
    }

    /// Draw non-indexed geometry
    pub fn draw(&mut self, frame: FrameHandle, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.scheduler
            .recorder(frame.slot)?
            .draw(vertex_count, first_vertex)
    }

    /// Draw indexed geometry
    pub fn draw_indexed(
        &mut self,
        frame: FrameHandle,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<()> {
        self.scheduler
            .recorder(frame.slot)?
            .draw_indexed(index_count, first_index, vertex_offset)
    }

    // ===== Compute recording =====

    /// Bind a compute pipeline on the slot's compute recorder
    pub fn bind_compute_pipeline(&mut self, slot: FlightSlot, pipeline: &Pipeline) -> Result<()> {
        pipeline.bind(self.scheduler.compute_recorder(slot)?)
    }

    /// Update and bind one of a compute pipeline's binding sets
    pub fn bind_for_dispatch(
        &mut self,
        slot: FlightSlot,
        pipeline: &Pipeline,
        set_index: usize,
        first: usize,
        count: usize,
        dynamic_repeat_indices: &[u32],
    ) -> Result<BindOutcome> {
        let Some(set) = pipeline.binding_set(set_index) else {
            engine_bail_invalid!(
                "nebula::Engine",
                "Pipeline has no binding set {}",
                set_index
            );
        };
        let pool = &self.pool;
        let recorder = self.scheduler.compute_recorder(slot)?;
        set.bind(
            pool,
            recorder,
            PipelineBindPoint::Compute,
            pipeline.handle(),
            slot,
            first,
            count,
            dynamic_repeat_indices,
        )
    }

    /// Dispatch compute work groups on the slot's compute recorder
    pub fn dispatch(&mut self, slot: FlightSlot, x: u32, y: u32, z: u32) -> Result<()> {
        self.scheduler.compute_recorder(slot)?.dispatch(x, y, z)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Nothing may still be executing when resources start dropping.
        self.device.wait_idle().ok();
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
