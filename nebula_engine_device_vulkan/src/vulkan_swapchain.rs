/// Swapchain state for the Vulkan device backend
///
/// Creation and wholesale replacement of the presentable chain. The engine
/// core decides WHEN to rebuild (and waits for device idle first); this
/// module only knows HOW.

use ash::vk;

use nebula_engine::nebula::device::{Extent2d, SwapchainProperties};
use nebula_engine::nebula::{Error, Result};
use nebula_engine::{engine_err, engine_error};

use crate::vulkan_format::vk_format_to_format;

/// The live presentable chain plus its image views
pub(crate) struct SwapchainState {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl SwapchainState {
    /// Create a chain at the requested extent, replacing `old` if present
    ///
    /// The old chain is passed as `oldSwapchain` so the driver can recycle
    /// its images, then destroyed together with its views.
    pub(crate) fn create(
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        swapchain_loader: &ash::khr::swapchain::Device,
        requested: Extent2d,
        old: Option<SwapchainState>,
    ) -> Result<SwapchainState> {
        unsafe {
            let capabilities = surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(|e| {
                    engine_error!("nebula::vulkan", "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?;

            let surface_formats = surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| {
                    engine_error!("nebula::vulkan", "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?;

            let surface_format = surface_formats
                .iter()
                .find(|f| {
                    f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB
                })
                .unwrap_or(&surface_formats[0]);

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: requested.width.clamp(
                        capabilities.min_image_extent.width,
                        capabilities.max_image_extent.width,
                    ),
                    height: requested.height.clamp(
                        capabilities.min_image_extent.height,
                        capabilities.max_image_extent.height,
                    ),
                }
            };

            let image_count = capabilities.min_image_count + 1;
            let image_count = if capabilities.max_image_count > 0 {
                image_count.min(capabilities.max_image_count)
            } else {
                image_count
            };

            let mut create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(surface)
                .min_image_count(image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(vk::PresentModeKHR::FIFO)
                .clipped(true);
            if let Some(old) = &old {
                create_info = create_info.old_swapchain(old.swapchain);
            }

            let swapchain = swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create swapchain: {:?}", e))?;

            // The old chain and its views are no longer presentable.
            if let Some(old) = old {
                old.destroy(device, swapchain_loader);
            }

            let images = swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to get swapchain images: {:?}", e))?;

            let views: Vec<vk::ImageView> = images
                .iter()
                .map(|&image| {
                    let view_info = vk::ImageViewCreateInfo::default()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(surface_format.format)
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            base_mip_level: 0,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: 1,
                        });
                    device.create_image_view(&view_info, None)
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    engine_err!("nebula::vulkan", "Failed to create swapchain image views: {:?}", e)
                })?;

            Ok(SwapchainState {
                swapchain,
                images,
                views,
                format: surface_format.format,
                extent,
            })
        }
    }

    /// Engine-level properties of this chain
    pub(crate) fn properties(&self) -> SwapchainProperties {
        SwapchainProperties {
            image_count: self.images.len(),
            format: vk_format_to_format(self.format),
            extent: Extent2d::new(self.extent.width, self.extent.height),
        }
    }

    /// Destroy views and the chain object
    pub(crate) fn destroy(
        self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        unsafe {
            for view in &self.views {
                device.destroy_image_view(*view, None);
            }
            swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
