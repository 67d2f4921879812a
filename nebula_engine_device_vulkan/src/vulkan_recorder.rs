/// Recorder - Vulkan implementation of the CommandRecorder trait
///
/// One recorder owns one command pool and one primary command buffer,
/// reset on every `begin`. Recording-state checks mirror the engine's
/// bracket discipline so misuse fails before reaching the driver.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use nebula_engine::nebula::device::{
    BindingTableHandle, BufferHandle, ClearValue, CommandRecorder, Extent2d, FramebufferHandle,
    ImageHandle, ImageRange, ImageState, IndexType, PipelineBindPoint, PipelineHandle, QueueKind,
    Rect2d, RenderPassHandle, ShaderStageFlags, Viewport,
};
use nebula_engine::nebula::{Error, Result};
use nebula_engine::engine_error;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{image_state_to_vk, index_type_to_vk, stage_flags_to_vk};

/// Vulkan command recorder
pub struct Recorder {
    ctx: Arc<GpuContext>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    is_recording: bool,
    in_render_pass: bool,
}

impl Recorder {
    /// Create a recorder targeting the given queue's family
    pub(crate) fn new(ctx: Arc<GpuContext>, queue: QueueKind) -> Result<Self> {
        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.queue_family(queue))
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = ctx.device.create_command_pool(&pool_info, None).map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create command pool: {:?}", e);
                Error::BackendError(format!("Failed to create command pool: {:?}", e))
            })?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers =
                ctx.device.allocate_command_buffers(&allocate_info).map_err(|e| {
                    engine_error!("nebula::vulkan", "Failed to allocate command buffer: {:?}", e);
                    Error::BackendError(format!("Failed to allocate command buffers: {:?}", e))
                })?;

            Ok(Self {
                ctx,
                command_pool,
                command_buffer: command_buffers[0],
                is_recording: false,
                in_render_pass: false,
            })
        }
    }

    /// The underlying Vulkan command buffer (submission path)
    pub(crate) fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn check_recording(&self, op: &str) -> Result<()> {
        if !self.is_recording {
            return Err(Error::BackendError(format!("{} outside begin/end", op)));
        }
        Ok(())
    }

    fn bind_point_to_vk(bind_point: PipelineBindPoint) -> vk::PipelineBindPoint {
        match bind_point {
            PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }
}

impl CommandRecorder for Recorder {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(Error::BackendError("Recorder already recording".to_string()));
        }

        unsafe {
            self.ctx
                .device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| {
                    Error::BackendError(format!("Failed to reset command buffer: {:?}", e))
                })?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            self.ctx
                .device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| {
                    Error::BackendError(format!("Failed to begin command buffer: {:?}", e))
                })?;
        }

        self.is_recording = true;
        self.in_render_pass = false;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.check_recording("end")?;
        if self.in_render_pass {
            return Err(Error::BackendError(
                "Render pass not ended before ending recorder".to_string(),
            ));
        }

        unsafe {
            self.ctx
                .device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| {
                    Error::BackendError(format!("Failed to end command buffer: {:?}", e))
                })?;
        }

        self.is_recording = false;
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2d,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.check_recording("begin_render_pass")?;
        if self.in_render_pass {
            return Err(Error::BackendError("Render pass already open".to_string()));
        }

        let render_pass = self.ctx.render_pass(pass)?;
        let framebuffer = self.ctx.framebuffer(framebuffer)?;

        let clears: Vec<vk::ClearValue> = clear_values
            .iter()
            .map(|clear| match clear {
                ClearValue::Color(rgba) => vk::ClearValue {
                    color: vk::ClearColorValue { float32: *rgba },
                },
                ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: *depth,
                        stencil: *stencil,
                    },
                },
            })
            .collect();

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                },
            })
            .clear_values(&clears);

        unsafe {
            self.ctx.device.cmd_begin_render_pass(
                self.command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }

        self.in_render_pass = true;
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.check_recording("end_render_pass")?;
        if !self.in_render_pass {
            return Err(Error::BackendError("No render pass open".to_string()));
        }

        unsafe {
            self.ctx.device.cmd_end_render_pass(self.command_buffer);
        }

        self.in_render_pass = false;
        Ok(())
    }

    fn bind_pipeline(
        &mut self,
        bind_point: PipelineBindPoint,
        pipeline: PipelineHandle,
    ) -> Result<()> {
        self.check_recording("bind_pipeline")?;
        let entry = self.ctx.pipeline(pipeline)?;
        unsafe {
            self.ctx.device.cmd_bind_pipeline(
                self.command_buffer,
                Self::bind_point_to_vk(bind_point),
                entry.pipeline,
            );
        }
        Ok(())
    }

    fn bind_binding_table(
        &mut self,
        bind_point: PipelineBindPoint,
        pipeline: PipelineHandle,
        set_index: u32,
        table: BindingTableHandle,
        dynamic_offsets: &[u32],
    ) -> Result<()> {
        self.check_recording("bind_binding_table")?;
        let entry = self.ctx.pipeline(pipeline)?;
        let descriptor_set = self.ctx.table(table)?;
        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                Self::bind_point_to_vk(bind_point),
                entry.layout,
                set_index,
                &[descriptor_set],
                dynamic_offsets,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64) -> Result<()> {
        self.check_recording("bind_vertex_buffer")?;
        let buffer = self.ctx.buffer(buffer)?;
        unsafe {
            self.ctx
                .device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer], &[offset]);
        }
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        index_type: IndexType,
    ) -> Result<()> {
        self.check_recording("bind_index_buffer")?;
        let buffer = self.ctx.buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(
                self.command_buffer,
                buffer,
                offset,
                index_type_to_vk(index_type),
            );
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.check_recording("set_viewport")?;
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe {
            self.ctx
                .device
                .cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2d) -> Result<()> {
        self.check_recording("set_scissor")?;
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x,
                y: scissor.y,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        unsafe {
            self.ctx
                .device
                .cmd_set_scissor(self.command_buffer, 0, &[rect]);
        }
        Ok(())
    }

    fn push_constants(
        &mut self,
        pipeline: PipelineHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.check_recording("push_constants")?;
        let entry = self.ctx.pipeline(pipeline)?;
        unsafe {
            self.ctx.device.cmd_push_constants(
                self.command_buffer,
                entry.layout,
                stage_flags_to_vk(stages),
                offset,
                data,
            );
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.check_recording("draw")?;
        unsafe {
            self.ctx
                .device
                .cmd_draw(self.command_buffer, vertex_count, 1, first_vertex, 0);
        }
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<()> {
        self.check_recording("draw_indexed")?;
        unsafe {
            self.ctx.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                1,
                first_index,
                vertex_offset,
                0,
            );
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.check_recording("dispatch")?;
        unsafe {
            self.ctx.device.cmd_dispatch(self.command_buffer, x, y, z);
        }
        Ok(())
    }

    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: u64) -> Result<()> {
        self.check_recording("copy_buffer")?;
        let src = self.ctx.buffer(src)?;
        let dst = self.ctx.buffer(dst)?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.ctx
                .device
                .cmd_copy_buffer(self.command_buffer, src, dst, &[region]);
        }
        Ok(())
    }

    fn copy_buffer_to_image(
        &mut self,
        src: BufferHandle,
        buffer_offset: u64,
        image: ImageHandle,
        mip_level: u32,
        array_layer: u32,
        extent: Extent2d,
    ) -> Result<()> {
        self.check_recording("copy_buffer_to_image")?;
        let buffer = self.ctx.buffer(src)?;
        let (image, aspect) = self.ctx.image(image)?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(buffer_offset)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level,
                base_array_layer: array_layer,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
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
        let (image, aspect) = self.ctx.image(image)?;
        let (old_layout, src_access, src_stage) = image_state_to_vk(from);
        let (new_layout, dst_access, dst_stage) = image_state_to_vk(to);

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: range.base_mip,
                level_count: range.mip_count,
                base_array_layer: range.base_layer,
                layer_count: range.layer_count,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        Ok(())
    }

    fn blit_image_mip(
        &mut self,
        image: ImageHandle,
        src_level: u32,
        src_extent: Extent2d,
        dst_level: u32,
        dst_extent: Extent2d,
        layer_count: u32,
    ) -> Result<()> {
        self.check_recording("blit_image_mip")?;
        let (image, aspect) = self.ctx.image(image)?;

        let blit = vk::ImageBlit::default()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: src_level,
                base_array_layer: 0,
                layer_count,
            })
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: src_extent.width as i32,
                    y: src_extent.height as i32,
                    z: 1,
                },
            ])
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: dst_level,
                base_array_layer: 0,
                layer_count,
            })
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst_extent.width as i32,
                    y: dst_extent.height as i32,
                    z: 1,
                },
            ]);

        unsafe {
            self.ctx.device.cmd_blit_image(
                self.command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
