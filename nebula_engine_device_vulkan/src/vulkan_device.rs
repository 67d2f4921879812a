/// VulkanDevice - ash implementation of the engine's GraphicsDevice trait
///
/// Owns instance, surface, logical device, queues and the GPU allocator,
/// and maps engine handles onto Vulkan objects through the shared
/// GpuContext. Queue discovery picks a graphics+present family plus a
/// compute family (preferring a dedicated one) so graphics and compute
/// submissions can genuinely overlap.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use nebula_engine::nebula::device::{
    AcquireOutcome, BindingTableHandle, BindingTableWrite, BufferAllocationDesc, BufferHandle,
    CommandRecorder, ComputePipelineDesc, DeviceLimits, Extent2d, FenceHandle, FramebufferAttachment,
    FramebufferDesc, FramebufferHandle, GraphicsDevice, GraphicsPipelineDesc, ImageAllocationDesc,
    ImageHandle, LoadOp, PipelineHandle, PresentOutcome, QueueKind, RenderPassDesc,
    RenderPassHandle, SamplerDesc, SamplerHandle, SemaphoreHandle, SubmitSync, SwapchainProperties,
    TableLayoutEntry, TableLayoutHandle, TableWriteData,
};
use nebula_engine::nebula::{Error, Result};
use nebula_engine::{engine_bail, engine_err, engine_error, engine_info};

use crate::vulkan_context::{BufferEntry, GpuContext, ImageEntry, PipelineEntry};
use crate::vulkan_format::{
    blend_factor_to_vk, blend_op_to_vk, buffer_usage_to_vk, compare_op_to_vk, cull_mode_to_vk,
    format_to_vk, front_face_to_vk, image_usage_to_vk, load_op_to_vk, polygon_mode_to_vk,
    stage_flags_to_vk, store_op_to_vk, table_kind_to_vk, topology_to_vk, vertex_format_to_vk,
    wait_stage_to_vk,
};
use crate::vulkan_recorder::Recorder;
use crate::vulkan_sampler::SamplerCache;
use crate::vulkan_swapchain::SwapchainState;

/// Vulkan device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Enable validation/debug layers (requires the `vulkan-validation`
    /// feature to have any effect)
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Nebula Application".to_string(),
            app_version: (1, 0, 0),
        }
    }
}

/// Vulkan implementation of the GraphicsDevice capability surface
pub struct VulkanDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    ctx: Arc<GpuContext>,
    limits: DeviceLimits,
    descriptor_pools: Mutex<Vec<vk::DescriptorPool>>,
    sampler_cache: Mutex<SamplerCache>,
    #[cfg(feature = "vulkan-validation")]
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanDevice {
    /// Create a Vulkan device for the given window
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        config: DeviceConfig,
    ) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let app_name = std::ffi::CString::new(config.app_name.clone()).unwrap_or_default();
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(
                    0,
                    config.app_version.0,
                    config.app_version.1,
                    config.app_version.2,
                ))
                .engine_name(c"Nebula")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle().map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to get display handle: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
            #[allow(unused_mut)]
            let mut extension_names =
                ash_window::enumerate_required_extensions(display_handle.as_raw())
                    .map_err(|e| {
                        engine_error!("nebula::vulkan", "Failed to get required extensions: {}", e);
                        Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                    })?
                    .to_vec();

            #[allow(unused_mut)]
            let mut layer_names: Vec<*const std::os::raw::c_char> = Vec::new();
            #[cfg(feature = "vulkan-validation")]
            if config.enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create Vulkan instance: {:?}", e);
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            #[cfg(feature = "vulkan-validation")]
            let debug = if config.enable_validation {
                match crate::vulkan_debug::create_messenger(&entry, &instance) {
                    Ok(pair) => Some(pair),
                    Err(e) => {
                        engine_error!("nebula::vulkan", "Failed to create debug messenger: {:?}", e);
                        return Err(Error::InitializationFailed(format!(
                            "Failed to create debug messenger: {:?}",
                            e
                        )));
                    }
                }
            } else {
                None
            };
            #[cfg(not(feature = "vulkan-validation"))]
            let _ = &config;

            // Surface
            let window_handle = window.window_handle().map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to get window handle: {}", e);
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            // Physical device
            let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;
            let physical_device = physical_devices.into_iter().next().ok_or_else(|| {
                engine_error!("nebula::vulkan", "No Vulkan-capable GPU found");
                Error::InitializationFailed("No Vulkan-capable GPU found".to_string())
            })?;

            // Queue families: graphics (with present support) + compute,
            // preferring a dedicated compute family for real overlap.
            let queue_families =
                instance.get_physical_device_queue_family_properties(physical_device);

            let graphics_family = queue_families
                .iter()
                .enumerate()
                .find(|(index, qf)| {
                    qf.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                        && surface_loader
                            .get_physical_device_surface_support(
                                physical_device,
                                *index as u32,
                                surface,
                            )
                            .unwrap_or(false)
                })
                .map(|(index, _)| index as u32)
                .ok_or_else(|| {
                    engine_error!("nebula::vulkan", "No graphics+present queue family found");
                    Error::InitializationFailed("No graphics+present queue family found".to_string())
                })?;

            let compute_family = queue_families
                .iter()
                .enumerate()
                .find(|(index, qf)| {
                    qf.queue_flags.contains(vk::QueueFlags::COMPUTE)
                        && *index as u32 != graphics_family
                })
                .map(|(index, _)| index as u32)
                .unwrap_or(graphics_family);

            let queue_priorities = [1.0];
            let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> =
                if graphics_family == compute_family {
                    vec![vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(graphics_family)
                        .queue_priorities(&queue_priorities)]
                } else {
                    vec![
                        vk::DeviceQueueCreateInfo::default()
                            .queue_family_index(graphics_family)
                            .queue_priorities(&queue_priorities),
                        vk::DeviceQueueCreateInfo::default()
                            .queue_family_index(compute_family)
                            .queue_priorities(&queue_priorities),
                    ]
                };

            let device_extension_names = vec![ash::khr::swapchain::NAME.as_ptr()];
            let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("nebula::vulkan", "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(graphics_family, 0);
            let compute_queue = device.get_device_queue(compute_family, 0);
            let present_queue = graphics_queue;

            // GPU allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let properties = instance.get_physical_device_properties(physical_device);
            let limits = DeviceLimits {
                min_uniform_offset_alignment: properties
                    .limits
                    .min_uniform_buffer_offset_alignment,
                max_push_constant_size: properties.limits.max_push_constants_size,
            };

            let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
            let descriptor_pool = Self::create_descriptor_pool(&device)?;

            let ctx = Arc::new(GpuContext::new(
                device,
                Arc::new(Mutex::new(allocator)),
                graphics_queue,
                graphics_family,
                compute_queue,
                compute_family,
                present_queue,
            ));

            engine_info!(
                "nebula::vulkan",
                "Vulkan device initialized (graphics family {}, compute family {})",
                graphics_family,
                compute_family
            );

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                surface,
                surface_loader,
                swapchain_loader,
                ctx,
                limits,
                descriptor_pools: Mutex::new(vec![descriptor_pool]),
                sampler_cache: Mutex::new(SamplerCache::new()),
                #[cfg(feature = "vulkan-validation")]
                debug,
            })
        }
    }

    /// Create a descriptor pool with fixed capacity.
    /// Called during init and when the current pool is exhausted.
    fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2048,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1024,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 256,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 1024,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: 1024,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: 256,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: 256,
            },
        ];
        let info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(1024);

        unsafe {
            device.create_descriptor_pool(&info, None).map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create descriptor pool: {:?}", e);
                Error::InitializationFailed(format!("Failed to create descriptor pool: {:?}", e))
            })
        }
    }

    fn aspect_for(format: vk::Format) -> vk::ImageAspectFlags {
        if format == vk::Format::D32_SFLOAT {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe {
            self.ctx
                .device
                .create_shader_module(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create shader module: {:?}", e))
        }
    }

    fn create_pipeline_layout(
        &self,
        table_layouts: &[TableLayoutHandle],
        push_constant_ranges: &[nebula_engine::nebula::device::PushConstantRange],
    ) -> Result<vk::PipelineLayout> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = table_layouts
            .iter()
            .map(|&handle| self.ctx.table_layout(handle))
            .collect::<Result<Vec<_>>>()?;

        let ranges: Vec<vk::PushConstantRange> = push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: stage_flags_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&ranges);

        unsafe {
            self.ctx
                .device
                .create_pipeline_layout(&layout_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create pipeline layout: {:?}", e))
        }
    }
}

impl GraphicsDevice for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    // ===== Synchronization primitives =====

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe {
            self.ctx
                .device
                .create_fence(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create fence: {:?}", e))?
        };
        let handle = self.ctx.mint();
        self.ctx.fences.lock().unwrap().insert(handle, fence);
        Ok(FenceHandle(handle))
    }

    fn wait_for_fence(&self, fence: FenceHandle) -> Result<()> {
        let fence = self.ctx.fence(fence)?;
        unsafe {
            self.ctx
                .device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to wait for fence: {:?}", e))
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        let fence = self.ctx.fence(fence)?;
        unsafe {
            self.ctx
                .device
                .reset_fences(&[fence])
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to reset fence: {:?}", e))
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        if let Some(fence) = self.ctx.fences.lock().unwrap().remove(&fence.0) {
            unsafe {
                self.ctx.device.destroy_fence(fence, None);
            }
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe {
            self.ctx
                .device
                .create_semaphore(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create semaphore: {:?}", e))?
        };
        let handle = self.ctx.mint();
        self.ctx.semaphores.lock().unwrap().insert(handle, semaphore);
        Ok(SemaphoreHandle(handle))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        if let Some(semaphore) = self.ctx.semaphores.lock().unwrap().remove(&semaphore.0) {
            unsafe {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to wait device idle: {:?}", e))
        }
    }

    // ===== Swapchain =====

    fn create_swapchain(&self, extent: Extent2d) -> Result<SwapchainProperties> {
        let mut guard = self.ctx.swapchain.lock().unwrap();
        let old = guard.take();
        let state = SwapchainState::create(
            &self.ctx.device,
            self.physical_device,
            self.surface,
            &self.surface_loader,
            &self.swapchain_loader,
            extent,
            old,
        )?;
        let properties = state.properties();
        *guard = Some(state);
        Ok(properties)
    }

    fn acquire_image(&self, signal: SemaphoreHandle) -> Result<AcquireOutcome> {
        let semaphore = self.ctx.semaphore(signal)?;
        let guard = self.ctx.swapchain.lock().unwrap();
        let Some(state) = guard.as_ref() else {
            engine_bail!("nebula::vulkan", "acquire_image called without a swapchain");
        };

        unsafe {
            match self.swapchain_loader.acquire_next_image(
                state.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            ) {
                Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    Ok(AcquireOutcome::Stale)
                }
                Ok((index, false)) => Ok(AcquireOutcome::Acquired(index)),
                Err(e) => Err(engine_err!(
                    "nebula::vulkan",
                    "Failed to acquire swapchain image: {:?}",
                    e
                )),
            }
        }
    }

    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentOutcome> {
        let semaphore = self.ctx.semaphore(wait)?;
        let guard = self.ctx.swapchain.lock().unwrap();
        let Some(state) = guard.as_ref() else {
            engine_bail!("nebula::vulkan", "present called without a swapchain");
        };

        let swapchains = [state.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            match self
                .swapchain_loader
                .queue_present(self.ctx.present_queue, &present_info)
            {
                Ok(false) => Ok(PresentOutcome::Presented),
                Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
                Err(e) => Err(engine_err!(
                    "nebula::vulkan",
                    "Failed to present swapchain image: {:?}",
                    e
                )),
            }
        }
    }

    // ===== Resources =====

    fn create_buffer(&self, desc: &BufferAllocationDesc) -> Result<BufferHandle> {
        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = self
                .ctx
                .device
                .create_buffer(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create buffer: {:?}", e))?;

            let requirements = self.ctx.device.get_buffer_memory_requirements(buffer);
            let location = if desc.host_visible {
                gpu_allocator::MemoryLocation::CpuToGpu
            } else {
                gpu_allocator::MemoryLocation::GpuOnly
            };

            let allocation = self
                .ctx
                .allocator
                .lock()
                .unwrap()
                .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                    name: "buffer",
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!(
                        "nebula::vulkan",
                        "Out of GPU memory for buffer ({:.2} MB)",
                        size_mb
                    );
                    Error::OutOfMemory
                })?;

            self.ctx
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to bind buffer memory: {:?}", e))?;

            let handle = self.ctx.mint();
            self.ctx.buffers.lock().unwrap().insert(
                handle,
                BufferEntry {
                    buffer,
                    allocation: Some(allocation),
                    host_visible: desc.host_visible,
                },
            );
            Ok(BufferHandle(handle))
        }
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let buffers = self.ctx.buffers.lock().unwrap();
        let Some(entry) = buffers.get(&buffer.0) else {
            engine_bail!("nebula::vulkan", "Write to unknown buffer handle {}", buffer.0);
        };
        if !entry.host_visible {
            engine_bail!(
                "nebula::vulkan",
                "Write to non-host-visible buffer {}",
                buffer.0
            );
        }
        let mapped = entry
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or_else(|| engine_err!("nebula::vulkan", "Buffer {} is not mapped", buffer.0))?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (mapped.as_ptr() as *mut u8).add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if let Some(mut entry) = self.ctx.buffers.lock().unwrap().remove(&buffer.0) {
            if let Some(allocation) = entry.allocation.take() {
                self.ctx.allocator.lock().unwrap().free(allocation).ok();
            }
            unsafe {
                self.ctx.device.destroy_buffer(entry.buffer, None);
            }
        }
    }

    fn create_image(&self, desc: &ImageAllocationDesc) -> Result<ImageHandle> {
        unsafe {
            let format = format_to_vk(desc.format);
            let aspect = Self::aspect_for(format);

            let mut flags = vk::ImageCreateFlags::empty();
            if desc.cube {
                flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
            }

            let create_info = vk::ImageCreateInfo::default()
                .flags(flags)
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                    depth: 1,
                })
                .mip_levels(desc.mip_levels)
                .array_layers(desc.array_layers)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(image_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = self
                .ctx
                .device
                .create_image(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create image: {:?}", e))?;

            let requirements = self.ctx.device.get_image_memory_requirements(image);
            let allocation = self
                .ctx
                .allocator
                .lock()
                .unwrap()
                .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                    name: "image",
                    requirements,
                    location: gpu_allocator::MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!(
                        "nebula::vulkan",
                        "Out of GPU memory for image ({}x{}, {:.2} MB)",
                        desc.extent.width,
                        desc.extent.height,
                        size_mb
                    );
                    Error::OutOfMemory
                })?;

            self.ctx
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to bind image memory: {:?}", e))?;

            let view_type = if desc.cube {
                vk::ImageViewType::CUBE
            } else if desc.array_layers > 1 {
                vk::ImageViewType::TYPE_2D_ARRAY
            } else {
                vk::ImageViewType::TYPE_2D
            };

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(view_type)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: desc.mip_levels,
                    base_array_layer: 0,
                    layer_count: desc.array_layers,
                });

            let view = self
                .ctx
                .device
                .create_image_view(&view_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create image view: {:?}", e))?;

            let handle = self.ctx.mint();
            self.ctx.images.lock().unwrap().insert(
                handle,
                ImageEntry {
                    image,
                    allocation: Some(allocation),
                    view,
                    aspect,
                },
            );
            Ok(ImageHandle(handle))
        }
    }

    fn destroy_image(&self, image: ImageHandle) {
        if let Some(mut entry) = self.ctx.images.lock().unwrap().remove(&image.0) {
            if let Some(allocation) = entry.allocation.take() {
                self.ctx.allocator.lock().unwrap().free(allocation).ok();
            }
            unsafe {
                self.ctx.device.destroy_image_view(entry.view, None);
                self.ctx.device.destroy_image(entry.image, None);
            }
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let handle = self.ctx.mint();
        self.sampler_cache
            .lock()
            .unwrap()
            .acquire(&self.ctx.device, handle, desc)?;
        Ok(SamplerHandle(handle))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.sampler_cache
            .lock()
            .unwrap()
            .release(&self.ctx.device, sampler.0);
    }

    // ===== Binding tables =====

    fn create_table_layout(&self, entries: &[TableLayoutEntry]) -> Result<TableLayoutHandle> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = entries
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(entry.binding)
                    .descriptor_type(table_kind_to_vk(entry.kind))
                    .descriptor_count(entry.count)
                    .stage_flags(stage_flags_to_vk(entry.stages))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            self.ctx
                .device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| {
                    engine_err!("nebula::vulkan", "Failed to create descriptor set layout: {:?}", e)
                })?
        };

        let handle = self.ctx.mint();
        self.ctx.table_layouts.lock().unwrap().insert(handle, layout);
        Ok(TableLayoutHandle(handle))
    }

    fn destroy_table_layout(&self, layout: TableLayoutHandle) {
        if let Some(layout) = self.ctx.table_layouts.lock().unwrap().remove(&layout.0) {
            unsafe {
                self.ctx.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }

    fn allocate_binding_table(&self, layout: TableLayoutHandle) -> Result<BindingTableHandle> {
        let ds_layout = self.ctx.table_layout(layout)?;
        let layouts = [ds_layout];

        // Allocate from the newest pool, growing when exhausted.
        let descriptor_set = {
            let mut pools = self.descriptor_pools.lock().unwrap();
            let current_pool = *pools.last().unwrap();
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(current_pool)
                .set_layouts(&layouts);

            unsafe {
                match self.ctx.device.allocate_descriptor_sets(&allocate_info) {
                    Ok(sets) => sets[0],
                    Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => {
                        let new_pool = Self::create_descriptor_pool(&self.ctx.device)?;
                        pools.push(new_pool);
                        engine_info!(
                            "nebula::vulkan",
                            "Descriptor pool exhausted, created new pool (total: {})",
                            pools.len()
                        );
                        let retry_info = vk::DescriptorSetAllocateInfo::default()
                            .descriptor_pool(new_pool)
                            .set_layouts(&layouts);
                        self.ctx
                            .device
                            .allocate_descriptor_sets(&retry_info)
                            .map_err(|e| {
                                engine_err!(
                                    "nebula::vulkan",
                                    "Failed to allocate descriptor set after pool growth: {:?}",
                                    e
                                )
                            })?[0]
                    }
                    Err(e) => {
                        return Err(engine_err!(
                            "nebula::vulkan",
                            "Failed to allocate descriptor set: {:?}",
                            e
                        ))
                    }
                }
            }
        };

        let handle = self.ctx.mint();
        self.ctx.tables.lock().unwrap().insert(handle, descriptor_set);
        Ok(BindingTableHandle(handle))
    }

    fn write_binding_table(
        &self,
        table: BindingTableHandle,
        writes: &[BindingTableWrite],
    ) -> Result<()> {
        let descriptor_set = self.ctx.table(table)?;

        // Collect all info arrays first so their addresses stay stable
        // while the write structs reference them.
        let mut buffer_infos: Vec<Vec<vk::DescriptorBufferInfo>> = Vec::with_capacity(writes.len());
        let mut image_infos: Vec<Vec<vk::DescriptorImageInfo>> = Vec::with_capacity(writes.len());

        for write in writes {
            match &write.data {
                TableWriteData::Buffers(regions) => {
                    let mut infos = Vec::with_capacity(regions.len());
                    for region in regions {
                        infos.push(
                            vk::DescriptorBufferInfo::default()
                                .buffer(self.ctx.buffer(region.buffer)?)
                                .offset(region.offset)
                                .range(region.range),
                        );
                    }
                    buffer_infos.push(infos);
                    image_infos.push(Vec::new());
                }
                TableWriteData::Images(images) => {
                    let layout = match write.kind {
                        nebula_engine::nebula::device::BindingTableKind::StorageImage => {
                            vk::ImageLayout::GENERAL
                        }
                        _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    };
                    let mut infos = Vec::with_capacity(images.len());
                    for &image in images {
                        infos.push(
                            vk::DescriptorImageInfo::default()
                                .image_layout(layout)
                                .image_view(self.ctx.image_view(image)?),
                        );
                    }
                    image_infos.push(infos);
                    buffer_infos.push(Vec::new());
                }
                TableWriteData::Samplers(samplers) => {
                    let cache = self.sampler_cache.lock().unwrap();
                    let mut infos = Vec::with_capacity(samplers.len());
                    for sampler in samplers {
                        infos.push(
                            vk::DescriptorImageInfo::default().sampler(cache.resolve(sampler.0)?),
                        );
                    }
                    image_infos.push(infos);
                    buffer_infos.push(Vec::new());
                }
                TableWriteData::CombinedImageSamplers(pairs) => {
                    let cache = self.sampler_cache.lock().unwrap();
                    let mut infos = Vec::with_capacity(pairs.len());
                    for (image, sampler) in pairs {
                        infos.push(
                            vk::DescriptorImageInfo::default()
                                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                                .image_view(self.ctx.image_view(*image)?)
                                .sampler(cache.resolve(sampler.0)?),
                        );
                    }
                    image_infos.push(infos);
                    buffer_infos.push(Vec::new());
                }
            }
        }

        let mut vk_writes: Vec<vk::WriteDescriptorSet> = Vec::with_capacity(writes.len());
        for (index, write) in writes.iter().enumerate() {
            let mut vk_write = vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(write.binding)
                .dst_array_element(0)
                .descriptor_type(table_kind_to_vk(write.kind));
            if !buffer_infos[index].is_empty() {
                vk_write = vk_write.buffer_info(&buffer_infos[index]);
            } else {
                vk_write = vk_write.image_info(&image_infos[index]);
            }
            vk_writes.push(vk_write);
        }

        unsafe {
            self.ctx.device.update_descriptor_sets(&vk_writes, &[]);
        }
        Ok(())
    }

    fn free_binding_table(&self, table: BindingTableHandle) {
        // Descriptor sets are pool-allocated; dropping the handle is
        // enough, the pool reclaims everything at destruction.
        self.ctx.tables.lock().unwrap().remove(&table.0);
    }

    // ===== Render passes and framebuffers =====

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let mut attachments: Vec<vk::AttachmentDescription> = Vec::new();
        let mut color_refs: Vec<vk::AttachmentReference> = Vec::new();

        for color in &desc.color {
            let initial_layout = if color.load_op == LoadOp::Load {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::UNDEFINED
            };
            let final_layout = if desc.presentable {
                vk::ImageLayout::PRESENT_SRC_KHR
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            };
            color_refs.push(vk::AttachmentReference {
                attachment: attachments.len() as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            });
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format_to_vk(color.format))
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(load_op_to_vk(color.load_op))
                    .store_op(store_op_to_vk(color.store_op))
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(initial_layout)
                    .final_layout(final_layout),
            );
        }

        let depth_ref = desc.depth.as_ref().map(|depth| {
            let reference = vk::AttachmentReference {
                attachment: attachments.len() as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            };
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format_to_vk(depth.format))
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(load_op_to_vk(depth.load_op))
                    .store_op(store_op_to_vk(depth.store_op))
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
            reference
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = &depth_ref {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass];

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );
        let dependencies = [dependency];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe {
            self.ctx
                .device
                .create_render_pass(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create render pass: {:?}", e))?
        };

        let handle = self.ctx.mint();
        self.ctx.render_passes.lock().unwrap().insert(handle, render_pass);
        Ok(RenderPassHandle(handle))
    }

    fn destroy_render_pass(&self, pass: RenderPassHandle) {
        if let Some(pass) = self.ctx.render_passes.lock().unwrap().remove(&pass.0) {
            unsafe {
                self.ctx.device.destroy_render_pass(pass, None);
            }
        }
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        let render_pass = self.ctx.render_pass(desc.render_pass)?;

        let mut views: Vec<vk::ImageView> = Vec::with_capacity(desc.attachments.len());
        for attachment in &desc.attachments {
            let view = match attachment {
                FramebufferAttachment::SwapchainImage(index) => {
                    let guard = self.ctx.swapchain.lock().unwrap();
                    let Some(state) = guard.as_ref() else {
                        engine_bail!(
                            "nebula::vulkan",
                            "Framebuffer references a swapchain image but no swapchain exists"
                        );
                    };
                    let Some(&view) = state.views.get(*index as usize) else {
                        engine_bail!(
                            "nebula::vulkan",
                            "Swapchain image index {} out of range ({} images)",
                            index,
                            state.views.len()
                        );
                    };
                    view
                }
                FramebufferAttachment::Image(handle) => self.ctx.image_view(*handle)?,
            };
            views.push(view);
        }

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(desc.extent.width)
            .height(desc.extent.height)
            .layers(1);

        let framebuffer = unsafe {
            self.ctx
                .device
                .create_framebuffer(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create framebuffer: {:?}", e))?
        };

        let handle = self.ctx.mint();
        self.ctx.framebuffers.lock().unwrap().insert(handle, framebuffer);
        Ok(FramebufferHandle(handle))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        if let Some(framebuffer) = self.ctx.framebuffers.lock().unwrap().remove(&framebuffer.0) {
            unsafe {
                self.ctx.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }

    // ===== Pipelines =====

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        unsafe {
            let vertex_module = self.create_shader_module(&desc.vertex_shader)?;
            let fragment_module = self.create_shader_module(&desc.fragment_shader)?;

            let stages = [
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::VERTEX)
                    .module(vertex_module)
                    .name(c"main"),
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(fragment_module)
                    .name(c"main"),
            ];

            let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
                .vertex_layout
                .bindings
                .iter()
                .map(|binding| vk::VertexInputBindingDescription {
                    binding: binding.binding,
                    stride: binding.stride,
                    input_rate: match binding.input_rate {
                        nebula_engine::nebula::device::VertexInputRate::Vertex => {
                            vk::VertexInputRate::VERTEX
                        }
                        nebula_engine::nebula::device::VertexInputRate::Instance => {
                            vk::VertexInputRate::INSTANCE
                        }
                    },
                })
                .collect();
            let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
                .vertex_layout
                .attributes
                .iter()
                .map(|attr| vk::VertexInputAttributeDescription {
                    location: attr.location,
                    binding: attr.binding,
                    format: vertex_format_to_vk(attr.format),
                    offset: attr.offset,
                })
                .collect();

            let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&vertex_bindings)
                .vertex_attribute_descriptions(&vertex_attributes);

            let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(topology_to_vk(desc.topology))
                .primitive_restart_enable(false);

            // Viewport and scissor are dynamic; the pass recording sets them.
            let viewport_state = vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(1)
                .scissor_count(1);
            let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
            let dynamic_state =
                vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

            let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(polygon_mode_to_vk(desc.rasterization.polygon_mode))
                .cull_mode(cull_mode_to_vk(desc.rasterization.cull_mode))
                .front_face(front_face_to_vk(desc.rasterization.front_face))
                .depth_bias_enable(false)
                .line_width(1.0);

            let multisample = vk::PipelineMultisampleStateCreateInfo::default()
                .rasterization_samples(vk::SampleCountFlags::TYPE_1);

            let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(desc.depth_stencil.depth_test_enable)
                .depth_write_enable(desc.depth_stencil.depth_write_enable)
                .depth_compare_op(compare_op_to_vk(desc.depth_stencil.depth_compare_op))
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false);

            let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(desc.color_blend.blend_enable)
                .src_color_blend_factor(blend_factor_to_vk(desc.color_blend.src_color_factor))
                .dst_color_blend_factor(blend_factor_to_vk(desc.color_blend.dst_color_factor))
                .color_blend_op(blend_op_to_vk(desc.color_blend.color_blend_op))
                .src_alpha_blend_factor(blend_factor_to_vk(desc.color_blend.src_alpha_factor))
                .dst_alpha_blend_factor(blend_factor_to_vk(desc.color_blend.dst_alpha_factor))
                .alpha_blend_op(blend_op_to_vk(desc.color_blend.alpha_blend_op))
                .color_write_mask(vk::ColorComponentFlags::RGBA);
            let blend_attachments = [blend_attachment];
            let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
                .attachments(&blend_attachments);

            let layout =
                self.create_pipeline_layout(&desc.table_layouts, &desc.push_constant_ranges)?;
            let render_pass = self.ctx.render_pass(desc.render_pass)?;

            let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&stages)
                .vertex_input_state(&vertex_input)
                .input_assembly_state(&input_assembly)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization)
                .multisample_state(&multisample)
                .depth_stencil_state(&depth_stencil)
                .color_blend_state(&color_blend)
                .dynamic_state(&dynamic_state)
                .layout(layout)
                .render_pass(render_pass)
                .subpass(0);

            let result = self.ctx.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            );

            self.ctx.device.destroy_shader_module(vertex_module, None);
            self.ctx.device.destroy_shader_module(fragment_module, None);

            let pipeline = match result {
                Ok(pipelines) => pipelines[0],
                Err((_, e)) => {
                    self.ctx.device.destroy_pipeline_layout(layout, None);
                    return Err(engine_err!(
                        "nebula::vulkan",
                        "Failed to create graphics pipeline: {:?}",
                        e
                    ));
                }
            };

            let handle = self.ctx.mint();
            self.ctx
                .pipelines
                .lock()
                .unwrap()
                .insert(handle, PipelineEntry { pipeline, layout });
            Ok(PipelineHandle(handle))
        }
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<PipelineHandle> {
        unsafe {
            let module = self.create_shader_module(&desc.shader)?;
            let stage = vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::COMPUTE)
                .module(module)
                .name(c"main");

            let layout =
                self.create_pipeline_layout(&desc.table_layouts, &desc.push_constant_ranges)?;

            let pipeline_info = vk::ComputePipelineCreateInfo::default()
                .stage(stage)
                .layout(layout);

            let result = self.ctx.device.create_compute_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            );

            self.ctx.device.destroy_shader_module(module, None);

            let pipeline = match result {
                Ok(pipelines) => pipelines[0],
                Err((_, e)) => {
                    self.ctx.device.destroy_pipeline_layout(layout, None);
                    return Err(engine_err!(
                        "nebula::vulkan",
                        "Failed to create compute pipeline: {:?}",
                        e
                    ));
                }
            };

            let handle = self.ctx.mint();
            self.ctx
                .pipelines
                .lock()
                .unwrap()
                .insert(handle, PipelineEntry { pipeline, layout });
            Ok(PipelineHandle(handle))
        }
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        if let Some(entry) = self.ctx.pipelines.lock().unwrap().remove(&pipeline.0) {
            unsafe {
                self.ctx.device.destroy_pipeline(entry.pipeline, None);
                self.ctx.device.destroy_pipeline_layout(entry.layout, None);
            }
        }
    }

    // ===== Recording and submission =====

    fn create_recorder(&self, queue: QueueKind) -> Result<Box<dyn CommandRecorder>> {
        Ok(Box::new(Recorder::new(Arc::clone(&self.ctx), queue)?))
    }

    fn submit(
        &self,
        queue: QueueKind,
        recorder: &dyn CommandRecorder,
        sync: SubmitSync<'_>,
    ) -> Result<()> {
        let Some(recorder) = recorder.as_any().downcast_ref::<Recorder>() else {
            engine_bail!("nebula::vulkan", "Submitted recorder is not a Vulkan recorder");
        };

        let mut wait_semaphores = Vec::with_capacity(sync.wait.len());
        let mut wait_stages = Vec::with_capacity(sync.wait.len());
        for (semaphore, stage) in sync.wait {
            wait_semaphores.push(self.ctx.semaphore(*semaphore)?);
            wait_stages.push(wait_stage_to_vk(*stage));
        }
        let signal_semaphores: Vec<vk::Semaphore> = sync
            .signal
            .iter()
            .map(|&semaphore| self.ctx.semaphore(semaphore))
            .collect::<Result<Vec<_>>>()?;
        let fence = match sync.fence {
            Some(fence) => self.ctx.fence(fence)?,
            None => vk::Fence::null(),
        };

        let command_buffers = [recorder.command_buffer()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.queue(queue), &[submit_info], fence)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to submit to queue: {:?}", e))
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            // Engine-side objects should already be gone; sweep leftovers.
            for (_, entry) in self.ctx.pipelines.lock().unwrap().drain() {
                self.ctx.device.destroy_pipeline(entry.pipeline, None);
                self.ctx.device.destroy_pipeline_layout(entry.layout, None);
            }
            for (_, framebuffer) in self.ctx.framebuffers.lock().unwrap().drain() {
                self.ctx.device.destroy_framebuffer(framebuffer, None);
            }
            for (_, pass) in self.ctx.render_passes.lock().unwrap().drain() {
                self.ctx.device.destroy_render_pass(pass, None);
            }
            for (_, layout) in self.ctx.table_layouts.lock().unwrap().drain() {
                self.ctx.device.destroy_descriptor_set_layout(layout, None);
            }
            self.ctx.tables.lock().unwrap().clear();
            for pool in self.descriptor_pools.lock().unwrap().drain(..) {
                self.ctx.device.destroy_descriptor_pool(pool, None);
            }
            for (_, mut entry) in self.ctx.buffers.lock().unwrap().drain() {
                if let Some(allocation) = entry.allocation.take() {
                    self.ctx.allocator.lock().unwrap().free(allocation).ok();
                }
                self.ctx.device.destroy_buffer(entry.buffer, None);
            }
            for (_, mut entry) in self.ctx.images.lock().unwrap().drain() {
                if let Some(allocation) = entry.allocation.take() {
                    self.ctx.allocator.lock().unwrap().free(allocation).ok();
                }
                self.ctx.device.destroy_image_view(entry.view, None);
                self.ctx.device.destroy_image(entry.image, None);
            }
            for (_, fence) in self.ctx.fences.lock().unwrap().drain() {
                self.ctx.device.destroy_fence(fence, None);
            }
            for (_, semaphore) in self.ctx.semaphores.lock().unwrap().drain() {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            self.sampler_cache.lock().unwrap().shutdown(&self.ctx.device);
            if let Some(state) = self.ctx.swapchain.lock().unwrap().take() {
                state.destroy(&self.ctx.device, &self.swapchain_loader);
            }

            // Free allocator pages BEFORE destroying the device. All
            // recorders are gone at this point, so the Arc is unique.
            if let Some(ctx) = Arc::get_mut(&mut self.ctx) {
                ManuallyDrop::drop(&mut ctx.allocator);
            }

            self.ctx.device.destroy_device(None);
            #[cfg(feature = "vulkan-validation")]
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}
