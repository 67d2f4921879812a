/// Pipeline - compiled graphics/compute program with binding sets and
/// a named push-constant table
///
/// Compilation glue: the declarative binding list is validated and grouped
/// into per-set DescriptorBindingSets, their table layouts feed the device
/// pipeline, and named push-constant blocks become byte ranges uploadable
/// by name at record time.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::binding::{validate_declarations, BindingDeclaration, DescriptorBindingSet};
use crate::device::{
    ColorBlendState, CommandRecorder, DepthStencilState, GraphicsDevice, GraphicsPipelineDesc,
    PipelineBindPoint, PipelineHandle, PrimitiveTopology, PushConstantRange, RasterizationState,
    RenderPassHandle, ShaderStageFlags, VertexLayout,
};
use crate::error::Result;
use crate::engine_bail_invalid;

/// A named push-constant byte range
#[derive(Debug, Clone)]
pub struct PushConstantBlockDesc {
    /// Name used to address the block at record time
    pub name: String,
    /// Shader stages that read the block
    pub stages: ShaderStageFlags,
    /// Offset in bytes
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

/// Blueprint for a graphics pipeline
#[derive(Clone)]
pub struct PipelineDesc {
    /// Vertex shader bytecode (SPIR-V words)
    pub vertex_shader: Vec<u32>,
    /// Fragment shader bytecode (SPIR-V words)
    pub fragment_shader: Vec<u32>,
    /// Vertex input layout
    pub vertex_layout: VertexLayout,
    /// Primitive topology
    pub topology: PrimitiveTopology,
    /// Declarative shader interface (validated at build)
    pub bindings: Vec<BindingDeclaration>,
    /// Named push-constant blocks
    pub push_constant_blocks: Vec<PushConstantBlockDesc>,
    /// Rasterization state
    pub rasterization: RasterizationState,
    /// Depth testing state
    pub depth_stencil: DepthStencilState,
    /// Color blending state
    pub color_blend: ColorBlendState,
    /// Render pass the pipeline draws inside (a render target's pass or
    /// the swapchain's present pass)
    pub render_pass: RenderPassHandle,
}

/// Blueprint for a compute pipeline
#[derive(Clone)]
pub struct ComputeDesc {
    /// Compute shader bytecode (SPIR-V words)
    pub shader: Vec<u32>,
    /// Declarative shader interface (validated at build)
    pub bindings: Vec<BindingDeclaration>,
    /// Named push-constant blocks
    pub push_constant_blocks: Vec<PushConstantBlockDesc>,
}

/// A compiled pipeline with its binding sets
pub struct Pipeline {
    device: Arc<dyn GraphicsDevice>,
    handle: PipelineHandle,
    bind_point: PipelineBindPoint,
    sets: Vec<Arc<DescriptorBindingSet>>,
    push_blocks: FxHashMap<String, PushConstantBlockDesc>,
}

impl Pipeline {
    /// Compile a graphics pipeline from its blueprint
    pub(crate) fn build_graphics(
        device: Arc<dyn GraphicsDevice>,
        frames_in_flight: usize,
        desc: &PipelineDesc,
    ) -> Result<Arc<Self>> {
        let sets = Self::build_sets(&device, frames_in_flight, &desc.bindings)?;
        let push_blocks = Self::index_push_blocks(&device, &desc.push_constant_blocks)?;
        let ranges = Self::push_ranges(&desc.push_constant_blocks);

        let handle = device.create_graphics_pipeline(&GraphicsPipelineDesc {
            vertex_shader: desc.vertex_shader.clone(),
            fragment_shader: desc.fragment_shader.clone(),
            vertex_layout: desc.vertex_layout.clone(),
            topology: desc.topology,
            table_layouts: sets.iter().map(|s| s.layout_handle()).collect(),
            push_constant_ranges: ranges,
            rasterization: desc.rasterization,
            depth_stencil: desc.depth_stencil,
            color_blend: desc.color_blend,
            render_pass: desc.render_pass,
        })?;

        Ok(Arc::new(Self {
            device,
            handle,
            bind_point: PipelineBindPoint::Graphics,
            sets,
            push_blocks,
        }))
    }

    /// Compile a compute pipeline from its blueprint
    pub(crate) fn build_compute(
        device: Arc<dyn GraphicsDevice>,
        frames_in_flight: usize,
        desc: &ComputeDesc,
    ) -> Result<Arc<Self>> {
        let sets = Self::build_sets(&device, frames_in_flight, &desc.bindings)?;
        let push_blocks = Self::index_push_blocks(&device, &desc.push_constant_blocks)?;
        let ranges = Self::push_ranges(&desc.push_constant_blocks);

        let handle = device.create_compute_pipeline(&crate::device::ComputePipelineDesc {
            shader: desc.shader.clone(),
            table_layouts: sets.iter().map(|s| s.layout_handle()).collect(),
            push_constant_ranges: ranges,
        })?;

        Ok(Arc::new(Self {
            device,
            handle,
            bind_point: PipelineBindPoint::Compute,
            sets,
            push_blocks,
        }))
    }

    /// Validate declarations and build one binding set per set index
    fn build_sets(
        device: &Arc<dyn GraphicsDevice>,
        frames_in_flight: usize,
        bindings: &[BindingDeclaration],
    ) -> Result<Vec<Arc<DescriptorBindingSet>>> {
        let grouped = validate_declarations(bindings)?;
        let mut sets = Vec::with_capacity(grouped.len());
        for (set_index, declarations) in grouped.into_iter().enumerate() {
            sets.push(DescriptorBindingSet::build(
                Arc::clone(device),
                frames_in_flight,
                set_index as u32,
                declarations,
            )?);
        }
        Ok(sets)
    }

    /// Check push-constant blocks and index them by name
    fn index_push_blocks(
        device: &Arc<dyn GraphicsDevice>,
        blocks: &[PushConstantBlockDesc],
    ) -> Result<FxHashMap<String, PushConstantBlockDesc>> {
        let limit = device.limits().max_push_constant_size;
        let mut indexed = FxHashMap::default();
        for block in blocks {
            if block.offset + block.size > limit {
                engine_bail_invalid!(
                    "nebula::Pipeline",
                    "Push constant block '{}' exceeds device limit ({} + {} > {})",
                    block.name,
                    block.offset,
                    block.size,
                    limit
                );
            }
            if indexed.insert(block.name.clone(), block.clone()).is_some() {
                engine_bail_invalid!(
                    "nebula::Pipeline",
                    "Duplicate push constant block '{}'",
                    block.name
                );
            }
        }
        Ok(indexed)
    }

    fn push_ranges(blocks: &[PushConstantBlockDesc]) -> Vec<PushConstantRange> {
        blocks
            .iter()
            .map(|b| PushConstantRange {
                stages: b.stages,
                offset: b.offset,
                size: b.size,
            })
            .collect()
    }

    /// Device pipeline handle
    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    /// Graphics or compute
    pub fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    /// The pipeline's binding sets, ordered by set index
    pub fn binding_sets(&self) -> &[Arc<DescriptorBindingSet>] {
        &self.sets
    }

    /// One binding set by set index
    pub fn binding_set(&self, set_index: usize) -> Option<&Arc<DescriptorBindingSet>> {
        self.sets.get(set_index)
    }

    /// Record the pipeline bind
    pub fn bind(&self, recorder: &mut dyn CommandRecorder) -> Result<()> {
        recorder.bind_pipeline(self.bind_point, self.handle)
    }

    /// Upload a named push-constant block
    ///
    /// `data` must be at most the declared block size.
    pub fn push_constants(
        &self,
        recorder: &mut dyn CommandRecorder,
        block_name: &str,
        data: &[u8],
    ) -> Result<()> {
        let Some(block) = self.push_blocks.get(block_name) else {
            engine_bail_invalid!(
                "nebula::Pipeline",
                "Unknown push constant block '{}'",
                block_name
            );
        };
        if data.len() as u32 > block.size {
            engine_bail_invalid!(
                "nebula::Pipeline",
                "Push constant data for '{}' is {} bytes, block holds {}",
                block_name,
                data.len(),
                block.size
            );
        }
        recorder.push_constants(self.handle, block.stages, block.offset, data)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.handle);
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
