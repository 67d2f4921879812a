/// Buffer resources - uniform, dynamic-uniform, storage, vertex and index
///
/// Per-frame-mutable buffers own one device allocation per flight slot so
/// the CPU can write slot S while the GPU reads another slot; static
/// buffers own a single device-local allocation filled through the staged
/// upload path.

use std::sync::Arc;

use crate::device::{
    BufferAllocationDesc, BufferHandle, BufferUsageFlags, DeviceLimits, GraphicsDevice,
};
use crate::error::Result;
use crate::frame::FlightSlot;
use crate::resource::{next_resource_id, round_up, ResourceId};
use crate::{engine_bail_invalid, engine_err};

/// Logical kind of a buffer resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Per-frame uniform data, persistently host-mapped
    Uniform,
    /// Uniform block repeated `repeats` times in one allocation, selected
    /// at bind time by a dynamic offset multiplier
    DynamicUniform { element_size: u64, repeats: u32 },
    /// Read/write structured data (compute producers/consumers)
    Storage,
    /// Static vertex data, device-local
    Vertex,
    /// Static index data, device-local
    Index,
}

/// Blueprint for building a buffer resource
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Logical kind
    pub kind: BufferKind,
    /// Size in bytes; for `DynamicUniform` the size is derived from the
    /// aligned element size times the repeat count and this field is ignored
    pub size: u64,
    /// One allocation per flight slot (per-frame-mutable) or a single
    /// shared allocation (immutable / GPU-internal)
    pub per_slot: bool,
    /// Initial contents uploaded at build time
    pub data: Option<Vec<u8>>,
}

/// A built buffer resource
pub struct BufferResource {
    id: ResourceId,
    device: Arc<dyn GraphicsDevice>,
    kind: BufferKind,
    /// Size in bytes of each allocation
    size: u64,
    /// Aligned repeat stride for dynamic uniform blocks, else equal to size
    alignment: u64,
    host_visible: bool,
    /// One handle per flight slot, or exactly one when not replicated.
    /// Sized once at build; never changes length.
    handles: Vec<BufferHandle>,
}

impl BufferResource {
    /// Build a buffer resource from its blueprint
    pub(crate) fn build(
        device: Arc<dyn GraphicsDevice>,
        frames_in_flight: usize,
        desc: &BufferDesc,
    ) -> Result<Arc<Self>> {
        let limits = device.limits();
        let (size, alignment) = Self::layout(&limits, desc)?;

        let (usage, host_visible) = match desc.kind {
            BufferKind::Uniform | BufferKind::DynamicUniform { .. } => {
                (BufferUsageFlags::UNIFORM, true)
            }
            BufferKind::Storage => (BufferUsageFlags::STORAGE, false),
            BufferKind::Vertex => {
                (BufferUsageFlags::VERTEX | BufferUsageFlags::TRANSFER_DST, false)
            }
            BufferKind::Index => {
                (BufferUsageFlags::INDEX | BufferUsageFlags::TRANSFER_DST, false)
            }
        };

        let count = if desc.per_slot { frames_in_flight } else { 1 };
        let alloc_desc = BufferAllocationDesc {
            size,
            usage,
            host_visible,
        };

        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            handles.push(device.create_buffer(&alloc_desc)?);
        }

        Ok(Arc::new(Self {
            id: next_resource_id(),
            device,
            kind: desc.kind,
            size,
            alignment,
            host_visible,
            handles,
        }))
    }

    /// Compute (size, alignment) for a blueprint
    fn layout(limits: &DeviceLimits, desc: &BufferDesc) -> Result<(u64, u64)> {
        match desc.kind {
            BufferKind::DynamicUniform {
                element_size,
                repeats,
            } => {
                if repeats < 1 {
                    engine_bail_invalid!(
                        "nebula::Buffer",
                        "Dynamic uniform block must have at least one repeat"
                    );
                }
                if element_size == 0 {
                    engine_bail_invalid!(
                        "nebula::Buffer",
                        "Dynamic uniform block element size must be non-zero"
                    );
                }
                let alignment = round_up(element_size, limits.min_uniform_offset_alignment);
                Ok((alignment * repeats as u64, alignment))
            }
            _ => {
                if desc.size == 0 {
                    engine_bail_invalid!("nebula::Buffer", "Buffer size must be non-zero");
                }
                Ok((desc.size, desc.size))
            }
        }
    }

    /// Stable resource identity
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Size in bytes of each allocation
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Repeat stride for dynamic uniform blocks (`>= element_size`)
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Repeat count for dynamic uniform blocks, 1 otherwise
    pub fn repeats(&self) -> u32 {
        match self.kind {
            BufferKind::DynamicUniform { repeats, .. } => repeats,
            _ => 1,
        }
    }

    /// True for dynamic uniform blocks
    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, BufferKind::DynamicUniform { .. })
    }

    /// Logical kind
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// True when the buffer accepts direct host writes
    pub fn is_host_visible(&self) -> bool {
        self.host_visible
    }

    /// Byte offset of one repeat within a dynamic uniform block
    pub fn offset_of_repeat(&self, repeat: u32) -> u64 {
        repeat as u64 * self.alignment
    }

    /// Device handle backing the given flight slot
    ///
    /// Replicated buffers resolve `(slot + slot_offset) % N`, which lets a
    /// consumer read the slot a producer wrote on a previous frame
    /// (e.g. compute writes slot S, graphics reads slot S-1).
    pub fn handle_for_slot(&self, slot: FlightSlot, slot_offset: usize) -> BufferHandle {
        if self.handles.len() == 1 {
            self.handles[0]
        } else {
            self.handles[(slot.index() + slot_offset) % self.handles.len()]
        }
    }

    /// Number of device allocations (N for replicated, 1 otherwise)
    pub fn allocation_count(&self) -> usize {
        self.handles.len()
    }

    /// Write raw bytes into the allocation backing `slot`
    ///
    /// Only valid for host-visible buffers; device-local buffers are filled
    /// through the pool's staged upload.
    pub fn write(&self, slot: FlightSlot, offset: u64, data: &[u8]) -> Result<()> {
        if !self.host_visible {
            return Err(engine_err!(
                "nebula::Buffer",
                "Direct write to device-local buffer (use staged upload)"
            ));
        }
        if offset + data.len() as u64 > self.size {
            return Err(engine_err!(
                "nebula::Buffer",
                "Buffer write out of bounds: offset {} + len {} > size {}",
                offset,
                data.len(),
                self.size
            ));
        }
        self.device
            .write_buffer(self.handle_for_slot(slot, 0), offset, data)
    }

    /// Write one plain-old-data value into the allocation backing `slot`
    pub fn write_value<T: bytemuck::Pod>(
        &self,
        slot: FlightSlot,
        offset: u64,
        value: &T,
    ) -> Result<()> {
        self.write(slot, offset, bytemuck::bytes_of(value))
    }

    /// Write one repeat of a dynamic uniform block for `slot`
    pub fn write_repeat<T: bytemuck::Pod>(
        &self,
        slot: FlightSlot,
        repeat: u32,
        value: &T,
    ) -> Result<()> {
        self.write(slot, self.offset_of_repeat(repeat), bytemuck::bytes_of(value))
    }
}

impl Drop for BufferResource {
    fn drop(&mut self) {
        for &handle in &self.handles {
            self.device.destroy_buffer(handle);
        }
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
