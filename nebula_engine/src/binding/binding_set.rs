/// DescriptorBindingSet - resource references, binding tables and validity
///
/// A binding set owns one device binding table per flight slot plus a
/// validity bit per binding. A binding is valid only once every referenced
/// resource is built and a table write has been issued for every slot; the
/// set may be bound for drawing only when all of its bindings are valid.
/// The resize cascade clears validity for bindings whose images were
/// rebuilt, forcing a table rewrite before the next use.

use std::sync::{Arc, Mutex};

use crate::binding::{BindingDeclaration, BindingKind};
use crate::device::{
    BindingTableHandle, BindingTableWrite, BufferRegion, CommandRecorder, GraphicsDevice,
    PipelineBindPoint, PipelineHandle, TableLayoutHandle, TableWriteData,
};
use crate::error::Result;
use crate::frame::FlightSlot;
use crate::resource::{BufferResource, ImageResource, ResourceId, ResourcePool, SamplerResource};
use crate::{engine_bail_invalid, engine_debug, engine_trace};

/// Whether a bind/update left the set usable for drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// All requested bindings are valid; drawing may proceed
    Ready,
    /// At least one referenced resource is not built yet; the caller must
    /// skip drawing with this set for the current pass
    NotReady,
}

/// Per-binding runtime state: validity plus pinned resource references
///
/// Pinned `Arc`s extend resource lifetimes to the longest holder, so a
/// resource released from the pool stays alive while any set still
/// references it.
#[derive(Default)]
struct BindingRuntime {
    valid: bool,
    pinned_buffer: Option<Arc<BufferResource>>,
    pinned_images: Vec<Arc<ImageResource>>,
    pinned_samplers: Vec<Arc<SamplerResource>>,
}

impl BindingRuntime {
    fn references(&self, ids: &[ResourceId]) -> bool {
        if let Some(buffer) = &self.pinned_buffer {
            if ids.contains(&buffer.id()) {
                return true;
            }
        }
        self.pinned_images.iter().any(|i| ids.contains(&i.id()))
            || self.pinned_samplers.iter().any(|s| ids.contains(&s.id()))
    }
}

/// Resolved references for one binding, for one flight slot
struct ResolvedBinding {
    write: BindingTableWrite,
    pinned_buffer: Option<Arc<BufferResource>>,
    pinned_images: Vec<Arc<ImageResource>>,
    pinned_samplers: Vec<Arc<SamplerResource>>,
}

/// A named group of resource references exposed to shaders as one set
pub struct DescriptorBindingSet {
    device: Arc<dyn GraphicsDevice>,
    frames_in_flight: usize,
    set_index: u32,
    /// Ordered binding declarations (immutable after build)
    bindings: Vec<BindingDeclaration>,
    /// Position (in `bindings`) of the dynamic-uniform-backed binding
    dynamic_position: Option<usize>,
    layout: TableLayoutHandle,
    /// One table per flight slot
    tables: Vec<BindingTableHandle>,
    runtime: Mutex<Vec<BindingRuntime>>,
}

impl DescriptorBindingSet {
    /// Build a set from validated declarations
    ///
    /// Configuration constraints are enforced here even when the caller
    /// pre-validated: at most one dynamic-uniform binding and equally long
    /// combined image/sampler lists.
    pub(crate) fn build(
        device: Arc<dyn GraphicsDevice>,
        frames_in_flight: usize,
        set_index: u32,
        bindings: Vec<BindingDeclaration>,
    ) -> Result<Arc<Self>> {
        let mut dynamic_position = None;
        for (position, decl) in bindings.iter().enumerate() {
            if decl.kind.is_dynamic() {
                if dynamic_position.is_some() {
                    engine_bail_invalid!(
                        "nebula::BindingSet",
                        "Set {} declares more than one dynamic uniform binding",
                        set_index
                    );
                }
                dynamic_position = Some(position);
            }
            if let BindingKind::CombinedImageSamplers { images, samplers } = &decl.kind {
                if images.len() != samplers.len() {
                    engine_bail_invalid!(
                        "nebula::BindingSet",
                        "Set {} binding {} has {} images but {} samplers",
                        set_index,
                        decl.binding,
                        images.len(),
                        samplers.len()
                    );
                }
            }
        }

        let entries: Vec<_> = bindings.iter().map(|d| d.layout_entry()).collect();
        let layout = device.create_table_layout(&entries)?;

        let mut tables = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            tables.push(device.allocate_binding_table(layout)?);
        }

        let runtime = (0..bindings.len()).map(|_| BindingRuntime::default()).collect();

        Ok(Arc::new(Self {
            device,
            frames_in_flight,
            set_index,
            bindings,
            dynamic_position,
            layout,
            tables,
            runtime: Mutex::new(runtime),
        }))
    }

    /// Set index within the pipeline layout
    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    /// Number of bindings in the set
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// True when every binding is valid
    pub fn is_fully_valid(&self) -> bool {
        self.runtime.lock().unwrap().iter().all(|r| r.valid)
    }

    /// The table bound for the given flight slot
    pub(crate) fn table_for_slot(&self, slot: FlightSlot) -> BindingTableHandle {
        self.tables[slot.index()]
    }

    /// The device layout handle (pipeline layout construction)
    pub(crate) fn layout_handle(&self) -> TableLayoutHandle {
        self.layout
    }

    /// Refresh the binding tables for a sub-range of bindings
    ///
    /// `first` and `count` address positions in the ordered binding list.
    /// When the whole range is already valid this is a no-op that issues no
    /// table writes. Otherwise each invalid binding in range is resolved
    /// for every flight slot; a binding whose referenced resources are not
    /// all built stays invalid and the outcome is `NotReady`.
    pub fn update(&self, pool: &ResourcePool, first: usize, count: usize) -> Result<BindOutcome> {
        if first + count > self.bindings.len() {
            engine_bail_invalid!(
                "nebula::BindingSet",
                "Update range {}..{} out of bounds ({} bindings)",
                first,
                first + count,
                self.bindings.len()
            );
        }

        let mut runtime = self.runtime.lock().unwrap();

        if runtime[first..first + count].iter().all(|r| r.valid) {
            return Ok(BindOutcome::Ready);
        }

        // Per-slot batched writes for the bindings that resolve
        let mut writes: Vec<Vec<BindingTableWrite>> =
            (0..self.frames_in_flight).map(|_| Vec::new()).collect();
        let mut resolved_positions: Vec<(usize, ResolvedBinding)> = Vec::new();
        let mut all_resolved = true;

        for position in first..first + count {
            if runtime[position].valid {
                continue;
            }
            let decl = &self.bindings[position];

            let mut per_slot = Vec::with_capacity(self.frames_in_flight);
            let mut resolvable = true;
            for slot_index in 0..self.frames_in_flight {
                let slot = FlightSlot::new(slot_index);
                match self.resolve_binding(pool, decl, slot)? {
                    Some(resolved) => per_slot.push(resolved),
                    None => {
                        resolvable = false;
                        break;
                    }
                }
            }

            if !resolvable {
                engine_trace!(
                    "nebula::BindingSet",
                    "Set {} binding {} not ready (resource not built)",
                    self.set_index,
                    decl.binding
                );
                all_resolved = false;
                continue;
            }

            // Keep the last slot's pins as the binding's pinned references;
            // all slots resolve through the same resource objects.
            for (slot_index, resolved) in per_slot.into_iter().enumerate() {
                if slot_index + 1 == self.frames_in_flight {
                    writes[slot_index].push(resolved.write.clone());
                    resolved_positions.push((position, resolved));
                } else {
                    writes[slot_index].push(resolved.write);
                }
            }
        }

        for (slot_index, slot_writes) in writes.iter().enumerate() {
            if !slot_writes.is_empty() {
                self.device
                    .write_binding_table(self.tables[slot_index], slot_writes)?;
            }
        }

        for (position, resolved) in resolved_positions {
            let entry = &mut runtime[position];
            entry.valid = true;
            entry.pinned_buffer = resolved.pinned_buffer;
            entry.pinned_images = resolved.pinned_images;
            entry.pinned_samplers = resolved.pinned_samplers;
        }

        if all_resolved && runtime[first..first + count].iter().all(|r| r.valid) {
            Ok(BindOutcome::Ready)
        } else {
            Ok(BindOutcome::NotReady)
        }
    }

    /// Resolve one binding's resources for one flight slot
    ///
    /// Returns `Ok(None)` when a referenced resource is not built yet.
    fn resolve_binding(
        &self,
        pool: &ResourcePool,
        decl: &BindingDeclaration,
        slot: FlightSlot,
    ) -> Result<Option<ResolvedBinding>> {
        let resolved = match &decl.kind {
            BindingKind::UniformBuffer {
                buffer,
                slot_offset,
                dynamic,
            } => {
                let Some(resource) = pool.buffer(*buffer) else {
                    return Ok(None);
                };
                if *dynamic != resource.is_dynamic() {
                    engine_bail_invalid!(
                        "nebula::BindingSet",
                        "Set {} binding {} dynamic flag does not match buffer kind",
                        self.set_index,
                        decl.binding
                    );
                }
                let range = if *dynamic {
                    resource.alignment()
                } else {
                    resource.size()
                };
                ResolvedBinding {
                    write: BindingTableWrite {
                        binding: decl.binding,
                        kind: decl.kind.table_kind(),
                        data: TableWriteData::Buffers(vec![BufferRegion {
                            buffer: resource.handle_for_slot(slot, *slot_offset),
                            offset: 0,
                            range,
                        }]),
                    },
                    pinned_buffer: Some(resource),
                    pinned_images: Vec::new(),
                    pinned_samplers: Vec::new(),
                }
            }
            BindingKind::StorageBuffer {
                buffer,
                slot_offset,
            } => {
                let Some(resource) = pool.buffer(*buffer) else {
                    return Ok(None);
                };
                ResolvedBinding {
                    write: BindingTableWrite {
                        binding: decl.binding,
                        kind: decl.kind.table_kind(),
                        data: TableWriteData::Buffers(vec![BufferRegion {
                            buffer: resource.handle_for_slot(slot, *slot_offset),
                            offset: 0,
                            range: resource.size(),
                        }]),
                    },
                    pinned_buffer: Some(resource),
                    pinned_images: Vec::new(),
                    pinned_samplers: Vec::new(),
                }
            }
            BindingKind::SampledImages { images } | BindingKind::StorageImages { images } => {
                let mut pinned = Vec::with_capacity(images.len());
                let mut handles = Vec::with_capacity(images.len());
                for &index in images {
                    let Some(resource) = pool.image(index) else {
                        return Ok(None);
                    };
                    handles.push(resource.handle_for_slot(slot));
                    pinned.push(resource);
                }
                ResolvedBinding {
                    write: BindingTableWrite {
                        binding: decl.binding,
                        kind: decl.kind.table_kind(),
                        data: TableWriteData::Images(handles),
                    },
                    pinned_buffer: None,
                    pinned_images: pinned,
                    pinned_samplers: Vec::new(),
                }
            }
            BindingKind::Samplers { samplers } => {
                let mut pinned = Vec::with_capacity(samplers.len());
                let mut handles = Vec::with_capacity(samplers.len());
                for &index in samplers {
                    let Some(resource) = pool.sampler(index) else {
                        return Ok(None);
                    };
                    handles.push(resource.handle());
                    pinned.push(resource);
                }
                ResolvedBinding {
                    write: BindingTableWrite {
                        binding: decl.binding,
                        kind: decl.kind.table_kind(),
                        data: TableWriteData::Samplers(handles),
                    },
                    pinned_buffer: None,
                    pinned_images: Vec::new(),
                    pinned_samplers: pinned,
                }
            }
            BindingKind::CombinedImageSamplers { images, samplers } => {
                let mut pinned_images = Vec::with_capacity(images.len());
                let mut pinned_samplers = Vec::with_capacity(samplers.len());
                let mut pairs = Vec::with_capacity(images.len());
                for (&image_index, &sampler_index) in images.iter().zip(samplers) {
                    let Some(image) = pool.image(image_index) else {
                        return Ok(None);
                    };
                    let Some(sampler) = pool.sampler(sampler_index) else {
                        return Ok(None);
                    };
                    pairs.push((image.handle_for_slot(slot), sampler.handle()));
                    pinned_images.push(image);
                    pinned_samplers.push(sampler);
                }
                ResolvedBinding {
                    write: BindingTableWrite {
                        binding: decl.binding,
                        kind: decl.kind.table_kind(),
                        data: TableWriteData::CombinedImageSamplers(pairs),
                    },
                    pinned_buffer: None,
                    pinned_images,
                    pinned_samplers,
                }
            }
        };
        Ok(Some(resolved))
    }

    /// Update, then bind the set for drawing or dispatch
    ///
    /// Implicitly updates the requested range; if any binding of the set is
    /// still invalid afterwards the bind is not recorded and the caller
    /// must skip the draw for this pass. For a set with a dynamic-uniform
    /// binding, `dynamic_repeat_indices` must hold exactly one repeat
    /// index, converted to a byte offset as `index * block.alignment()`.
    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        &self,
        pool: &ResourcePool,
        recorder: &mut dyn CommandRecorder,
        bind_point: PipelineBindPoint,
        pipeline: PipelineHandle,
        slot: FlightSlot,
        first: usize,
        count: usize,
        dynamic_repeat_indices: &[u32],
    ) -> Result<BindOutcome> {
        if self.update(pool, first, count)? == BindOutcome::NotReady {
            return Ok(BindOutcome::NotReady);
        }
        if !self.is_fully_valid() {
            engine_debug!(
                "nebula::BindingSet",
                "Set {} has invalid bindings outside the updated range; skipping bind",
                self.set_index
            );
            return Ok(BindOutcome::NotReady);
        }

        let offsets = self.dynamic_offsets(dynamic_repeat_indices)?;
        recorder.bind_binding_table(
            bind_point,
            pipeline,
            self.set_index,
            self.tables[slot.index()],
            &offsets,
        )?;
        Ok(BindOutcome::Ready)
    }

    /// Compute the dynamic offset list for a bind
    fn dynamic_offsets(&self, repeat_indices: &[u32]) -> Result<Vec<u32>> {
        match self.dynamic_position {
            None => {
                if !repeat_indices.is_empty() {
                    engine_bail_invalid!(
                        "nebula::BindingSet",
                        "Set {} has no dynamic binding but {} repeat indices were passed",
                        self.set_index,
                        repeat_indices.len()
                    );
                }
                Ok(Vec::new())
            }
            Some(position) => {
                if repeat_indices.len() != 1 {
                    engine_bail_invalid!(
                        "nebula::BindingSet",
                        "Set {} requires exactly one repeat index, got {}",
                        self.set_index,
                        repeat_indices.len()
                    );
                }
                let runtime = self.runtime.lock().unwrap();
                let buffer = runtime[position]
                    .pinned_buffer
                    .as_ref()
                    .expect("valid dynamic binding must have a pinned buffer");
                let repeat = repeat_indices[0];
                if repeat >= buffer.repeats() {
                    engine_bail_invalid!(
                        "nebula::BindingSet",
                        "Repeat index {} out of range (block has {} repeats)",
                        repeat,
                        buffer.repeats()
                    );
                }
                Ok(vec![(repeat as u64 * buffer.alignment()) as u32])
            }
        }
    }

    /// Clear validity for every binding referencing one of `ids`
    ///
    /// Called by the resize cascade after the resources were rebuilt, so
    /// the next update rewrites the tables with the new handles.
    pub fn invalidate_resources(&self, ids: &[ResourceId]) {
        let mut runtime = self.runtime.lock().unwrap();
        for entry in runtime.iter_mut() {
            if entry.valid && entry.references(ids) {
                entry.valid = false;
            }
        }
    }

    /// Clear validity for every binding
    pub fn invalidate_all(&self) {
        let mut runtime = self.runtime.lock().unwrap();
        for entry in runtime.iter_mut() {
            entry.valid = false;
        }
    }
}

impl Drop for DescriptorBindingSet {
    fn drop(&mut self) {
        for &table in &self.tables {
            self.device.free_binding_table(table);
        }
        self.device.destroy_table_layout(self.layout);
    }
}

#[cfg(test)]
#[path = "binding_set_tests.rs"]
mod tests;
