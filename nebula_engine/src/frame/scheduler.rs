/// Frame scheduler - N-buffered frame pacing over the device queues
///
/// Drives the per-slot state machine `Idle -> Recording -> Submitted ->
/// (GPU executing) -> Idle`. A slot cannot re-enter `Recording` until its
/// frame-complete fence signals, which bounds CPU-ahead-of-GPU drift to N
/// frames; the N-slot partitioning of per-frame resources is the
/// concurrency-control mechanism, not a lock.
///
/// The compute sub-protocol mirrors the graphics begin/end pair on a
/// separate queue with separate per-slot fence and semaphore, so compute
/// and graphics work for the same slot can overlap on the GPU.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::device::{
    CommandRecorder, FenceHandle, GraphicsDevice, QueueKind, SemaphoreHandle, SubmitSync,
    WaitStage, AcquireOutcome, PresentOutcome,
};
use crate::error::Result;
use crate::frame::FlightSlot;
use crate::swapchain::SwapchainManager;
use crate::{engine_bail, engine_bail_invalid, engine_trace};

/// Identifies the frame being recorded: flight slot plus acquired image
#[derive(Debug, Clone, Copy)]
pub struct FrameHandle {
    /// Flight slot owning this frame's per-frame resources
    pub slot: FlightSlot,
    /// Index of the acquired presentable image
    pub image_index: u32,
}

/// What `begin_frame` produced
#[derive(Debug, Clone, Copy)]
pub enum BeginOutcome {
    /// A frame is ready for recording
    Frame(FrameHandle),
    /// The surface is stale or a resize was flagged; no frame this
    /// iteration - rebuild the swapchain and retry next loop iteration
    NeedsRebuild,
}

/// What `end_frame_and_present` produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// Frame submitted and queued for presentation
    Presented,
    /// Frame submitted, but presentation reported a stale surface;
    /// rebuild the swapchain before the next frame
    NeedsRebuild,
}

/// Recording/submission state of one flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Idle,
    Recording,
    Submitted,
}

/// Per-slot synchronization objects and recorders
struct SlotSync {
    /// Signaled when the slot's graphics submission completes
    render_fence: FenceHandle,
    /// Signaled when the slot's presentable image is ready
    image_available: SemaphoreHandle,
    /// Signaled when the slot's compute submission completes
    compute_fence: FenceHandle,
    /// GPU-side signal that the slot's compute work finished
    compute_finished: SemaphoreHandle,
    graphics: Box<dyn CommandRecorder>,
    compute: Box<dyn CommandRecorder>,
    state: SlotState,
    compute_recording: bool,
    /// A compute submission for this slot has not been fence-waited yet
    compute_submitted: bool,
    /// Compute was submitted since this slot last began a frame
    compute_ready_this_frame: bool,
}

/// Top-level frame driver
pub struct FrameScheduler {
    device: Arc<dyn GraphicsDevice>,
    frames_in_flight: usize,
    slots: Vec<SlotSync>,
    current: FlightSlot,
    /// Set by `request_resize`, consumed by the next `begin_frame`
    resize_requested: AtomicBool,
    /// Image acquired for the frame currently recording
    acquired_image: Option<u32>,
}

impl FrameScheduler {
    /// Create the scheduler with N flight slots
    ///
    /// Fences start signaled so the first use of each slot does not wait.
    pub fn new(device: Arc<dyn GraphicsDevice>, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            engine_bail_invalid!("nebula::Frame", "frames_in_flight must be at least 1");
        }

        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            slots.push(SlotSync {
                render_fence: device.create_fence(true)?,
                image_available: device.create_semaphore()?,
                compute_fence: device.create_fence(true)?,
                compute_finished: device.create_semaphore()?,
                graphics: device.create_recorder(QueueKind::Graphics)?,
                compute: device.create_recorder(QueueKind::Compute)?,
                state: SlotState::Idle,
                compute_recording: false,
                compute_submitted: false,
                compute_ready_this_frame: false,
            });
        }

        Ok(Self {
            device,
            frames_in_flight,
            slots,
            current: FlightSlot::ZERO,
            resize_requested: AtomicBool::new(false),
            acquired_image: None,
        })
    }

    /// Number of flight slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// The slot the next (or currently recording) frame uses
    pub fn current_slot(&self) -> FlightSlot {
        self.current
    }

    /// Flag that the surface was resized; consumed by the next `begin_frame`
    pub fn request_resize(&self) {
        self.resize_requested.store(true, Ordering::Relaxed);
    }

    /// Begin a frame on the current slot
    ///
    /// Blocks until the slot's previous submission completed (the fence
    /// wait that enforces slot mutual exclusion), then acquires a
    /// presentable image. Returns `NeedsRebuild` instead of a frame when a
    /// resize was flagged or acquisition reports a stale surface; the slot
    /// is left `Idle` with its fence still signaled, so retrying is safe.
    pub fn begin_frame(&mut self) -> Result<BeginOutcome> {
        let slot = self.current;
        let sync = &mut self.slots[slot.index()];

        if sync.state == SlotState::Recording {
            engine_bail!(
                "nebula::Frame",
                "begin_frame called while slot {} is still recording",
                slot.index()
            );
        }

        // Backpressure point: the slot about to be reused must be GPU-idle.
        if sync.state == SlotState::Submitted {
            self.device.wait_for_fence(sync.render_fence)?;
            sync.state = SlotState::Idle;
        }

        if self.resize_requested.swap(false, Ordering::Relaxed) {
            return Ok(BeginOutcome::NeedsRebuild);
        }

        let image_index = match self.device.acquire_image(sync.image_available)? {
            AcquireOutcome::Acquired(index) => index,
            AcquireOutcome::Stale => return Ok(BeginOutcome::NeedsRebuild),
        };

        self.device.reset_fence(sync.render_fence)?;
        sync.graphics.begin()?;
        sync.state = SlotState::Recording;
        sync.compute_ready_this_frame = false;
        self.acquired_image = Some(image_index);

        engine_trace!(
            "nebula::Frame",
            "Frame begun on slot {} (image {})",
            slot.index(),
            image_index
        );
        Ok(BeginOutcome::Frame(FrameHandle { slot, image_index }))
    }

    /// The graphics recorder of a slot currently recording
    pub fn recorder(&mut self, slot: FlightSlot) -> Result<&mut dyn CommandRecorder> {
        let sync = &mut self.slots[slot.index()];
        if sync.state != SlotState::Recording {
            engine_bail!(
                "nebula::Frame",
                "Slot {} is not recording a frame",
                slot.index()
            );
        }
        Ok(sync.graphics.as_mut())
    }

    /// The compute recorder of a slot between begin_compute/end_compute
    pub fn compute_recorder(&mut self, slot: FlightSlot) -> Result<&mut dyn CommandRecorder> {
        let sync = &mut self.slots[slot.index()];
        if !sync.compute_recording {
            engine_bail!(
                "nebula::Frame",
                "Slot {} is not recording compute work",
                slot.index()
            );
        }
        Ok(sync.compute.as_mut())
    }

    /// Finalize recording, submit and present the current frame
    ///
    /// The graphics submission waits on image-acquired (and, when
    /// `compute_wait` is given, on this slot's compute-finished semaphore
    /// at that stage), signals the per-image render-finished semaphore and
    /// the slot fence, then presents gated on render-finished. The flight
    /// slot advances unconditionally after submission - a stale surface at
    /// present does not retry the rotation.
    pub fn end_frame_and_present(
        &mut self,
        swapchain: &SwapchainManager,
        compute_wait: Option<WaitStage>,
    ) -> Result<EndOutcome> {
        let slot = self.current;
        let sync = &mut self.slots[slot.index()];

        if sync.state != SlotState::Recording {
            engine_bail!(
                "nebula::Frame",
                "end_frame_and_present called while slot {} is not recording",
                slot.index()
            );
        }
        let Some(image_index) = self.acquired_image.take() else {
            engine_bail!(
                "nebula::Frame",
                "end_frame_and_present called with no acquired image"
            );
        };
        if compute_wait.is_some() && !sync.compute_ready_this_frame {
            engine_bail!(
                "nebula::Frame",
                "Graphics asked to wait for compute, but no compute work was \
                 submitted for slot {} this frame",
                slot.index()
            );
        }

        sync.graphics.end()?;

        let render_finished = swapchain.render_finished(image_index);
        let mut waits = vec![(sync.image_available, WaitStage::ColorAttachmentOutput)];
        if let Some(stage) = compute_wait {
            waits.push((sync.compute_finished, stage));
        }
        let signals = [render_finished];

        self.device.submit(
            QueueKind::Graphics,
            sync.graphics.as_ref(),
            SubmitSync {
                wait: &waits,
                signal: &signals,
                fence: Some(sync.render_fence),
            },
        )?;
        sync.state = SlotState::Submitted;

        // Slot rotation is not retried even if present reports stale.
        self.current = slot.next(self.frames_in_flight);

        match self.device.present(image_index, render_finished)? {
            PresentOutcome::Presented => Ok(EndOutcome::Presented),
            PresentOutcome::Stale => Ok(EndOutcome::NeedsRebuild),
        }
    }

    /// Begin compute recording for the current slot
    ///
    /// Blocks until the slot's previous compute submission completed, so
    /// at most one compute batch per slot is outstanding.
    pub fn begin_compute(&mut self) -> Result<FlightSlot> {
        let slot = self.current;
        let sync = &mut self.slots[slot.index()];

        if sync.compute_recording {
            engine_bail!(
                "nebula::Frame",
                "begin_compute called while slot {} is already recording compute",
                slot.index()
            );
        }
        if sync.compute_submitted {
            self.device.wait_for_fence(sync.compute_fence)?;
            sync.compute_submitted = false;
        }

        self.device.reset_fence(sync.compute_fence)?;
        sync.compute.begin()?;
        sync.compute_recording = true;
        Ok(slot)
    }

    /// Finalize and submit the current slot's compute work
    ///
    /// Signals the slot's compute-finished semaphore; pass a stage to
    /// `end_frame_and_present` to make the graphics submission wait on it.
    pub fn end_compute(&mut self) -> Result<()> {
        let slot = self.current;
        let sync = &mut self.slots[slot.index()];

        if !sync.compute_recording {
            engine_bail!(
                "nebula::Frame",
                "end_compute called while slot {} is not recording compute",
                slot.index()
            );
        }
        sync.compute.end()?;

        let signals = [sync.compute_finished];
        self.device.submit(
            QueueKind::Compute,
            sync.compute.as_ref(),
            SubmitSync {
                wait: &[],
                signal: &signals,
                fence: Some(sync.compute_fence),
            },
        )?;
        sync.compute_recording = false;
        sync.compute_submitted = true;
        sync.compute_ready_this_frame = true;
        Ok(())
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        for sync in &self.slots {
            self.device.destroy_fence(sync.render_fence);
            self.device.destroy_fence(sync.compute_fence);
            self.device.destroy_semaphore(sync.image_available);
            self.device.destroy_semaphore(sync.compute_finished);
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
