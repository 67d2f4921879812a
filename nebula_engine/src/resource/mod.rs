/// Resource module - engine-level GPU resources with flight-slot replication
///
/// Resources wrap raw device allocations in blueprints that know about
/// flight-slot replication, surface-matched sizing and content upload.
/// They are shared via `Arc`; the pool holds one strong reference and
/// binding sets pin additional references, so a resource's GPU objects
/// live until the last holder releases them.

// Module declarations
pub mod buffer;
pub mod image;
pub mod sampler;
pub mod pool;

// Re-export from modules
pub use buffer::*;
pub use image::*;
pub use sampler::*;
pub use pool::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::device::{CommandRecorder, GraphicsDevice, QueueKind, SubmitSync};
use crate::error::Result;

/// Stable identity of a resource, independent of its device handles
///
/// Survives in-place rebuilds (resize cascade), so binding sets can match
/// "which resources were rebuilt" against what they have pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u64);

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_resource_id() -> ResourceId {
    ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Round `value` up to the next multiple of `alignment`
pub(crate) fn round_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);
    value.div_ceil(alignment) * alignment
}

/// Record a one-shot command batch and block until the GPU has executed it
///
/// This is the fully serializing path used for uploads: the caller's
/// staging objects may be freed as soon as this returns.
pub(crate) fn record_and_wait<F>(
    device: &Arc<dyn GraphicsDevice>,
    queue: QueueKind,
    record: F,
) -> Result<()>
where
    F: FnOnce(&mut dyn CommandRecorder) -> Result<()>,
{
    let mut recorder = device.create_recorder(queue)?;
    recorder.begin()?;
    record(recorder.as_mut())?;
    recorder.end()?;

    let fence = device.create_fence(false)?;
    let submit = device.submit(
        queue,
        recorder.as_ref(),
        SubmitSync {
            wait: &[],
            signal: &[],
            fence: Some(fence),
        },
    );
    let result = submit.and_then(|_| device.wait_for_fence(fence));
    device.destroy_fence(fence);
    result
}
