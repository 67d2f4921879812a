/// SamplerCache - internal VkSampler management for the Vulkan backend
///
/// Creates and caches VkSampler objects by blueprint on first use. Typical
/// engines only need a handful of samplers total, so repeated builds of the
/// same blueprint share one GPU object; a reference count per blueprint
/// keeps shared samplers alive until the last engine handle is destroyed.

use std::collections::HashMap;

use ash::vk;

use nebula_engine::engine_err;
use nebula_engine::nebula::device::{SamplerAddressMode, SamplerDesc, SamplerFilter};
use nebula_engine::nebula::Result;

struct CacheEntry {
    sampler: vk::Sampler,
    refs: usize,
}

/// Internal sampler cache, keyed by blueprint
pub(crate) struct SamplerCache {
    cache: HashMap<SamplerDesc, CacheEntry>,
    /// Engine handle -> blueprint it was created from
    handles: HashMap<u64, SamplerDesc>,
}

impl SamplerCache {
    pub(crate) fn new() -> Self {
        Self {
            cache: HashMap::new(),
            handles: HashMap::new(),
        }
    }

    /// Get or create the VkSampler for `desc`, registering `handle` for it
    pub(crate) fn acquire(
        &mut self,
        device: &ash::Device,
        handle: u64,
        desc: &SamplerDesc,
    ) -> Result<vk::Sampler> {
        if let Some(entry) = self.cache.get_mut(desc) {
            entry.refs += 1;
            self.handles.insert(handle, *desc);
            return Ok(entry.sampler);
        }

        let sampler = Self::create_vk_sampler(device, desc)?;
        self.cache.insert(
            *desc,
            CacheEntry {
                sampler,
                refs: 1,
            },
        );
        self.handles.insert(handle, *desc);
        Ok(sampler)
    }

    /// Resolve an engine handle to its VkSampler
    pub(crate) fn resolve(&self, handle: u64) -> Result<vk::Sampler> {
        self.handles
            .get(&handle)
            .and_then(|desc| self.cache.get(desc))
            .map(|entry| entry.sampler)
            .ok_or_else(|| engine_err!("nebula::vulkan", "Unknown sampler handle {}", handle))
    }

    /// Release an engine handle; destroys the VkSampler at zero references
    pub(crate) fn release(&mut self, device: &ash::Device, handle: u64) {
        let Some(desc) = self.handles.remove(&handle) else {
            return;
        };
        if let Some(entry) = self.cache.get_mut(&desc) {
            entry.refs -= 1;
            if entry.refs == 0 {
                let entry = self.cache.remove(&desc).unwrap();
                unsafe {
                    device.destroy_sampler(entry.sampler, None);
                }
            }
        }
    }

    /// Destroy every remaining sampler (device shutdown)
    pub(crate) fn shutdown(&mut self, device: &ash::Device) {
        for (_, entry) in self.cache.drain() {
            unsafe {
                device.destroy_sampler(entry.sampler, None);
            }
        }
        self.handles.clear();
    }

    fn create_vk_sampler(device: &ash::Device, desc: &SamplerDesc) -> Result<vk::Sampler> {
        let filter = match desc.filter {
            SamplerFilter::Linear => vk::Filter::LINEAR,
            SamplerFilter::Nearest => vk::Filter::NEAREST,
        };
        let mipmap_mode = match desc.filter {
            SamplerFilter::Linear => vk::SamplerMipmapMode::LINEAR,
            SamplerFilter::Nearest => vk::SamplerMipmapMode::NEAREST,
        };
        let address = match desc.address_mode {
            SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            SamplerAddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            SamplerAddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        };
        let border = if desc.compare_depth {
            vk::BorderColor::FLOAT_OPAQUE_WHITE
        } else {
            vk::BorderColor::FLOAT_OPAQUE_BLACK
        };

        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(border)
            .unnormalized_coordinates(false);

        if desc.compare_depth {
            create_info = create_info
                .compare_enable(true)
                .compare_op(vk::CompareOp::LESS_OR_EQUAL);
        } else {
            create_info = create_info
                .compare_enable(false)
                .compare_op(vk::CompareOp::ALWAYS);
        }

        if let Some(max_aniso) = desc.anisotropy {
            create_info = create_info
                .anisotropy_enable(true)
                .max_anisotropy(max_aniso as f32);
        } else {
            create_info = create_info
                .anisotropy_enable(false)
                .max_anisotropy(1.0);
        }

        unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create sampler: {:?}", e))
        }
    }
}
