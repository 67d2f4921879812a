/// Sampler resources
///
/// Samplers are immutable and never replicated per flight slot; backends
/// may deduplicate identical descriptors behind the handle.

use std::sync::Arc;

use crate::device::{GraphicsDevice, SamplerDesc, SamplerHandle};
use crate::error::Result;
use crate::resource::{next_resource_id, ResourceId};

/// A built sampler resource
pub struct SamplerResource {
    id: ResourceId,
    device: Arc<dyn GraphicsDevice>,
    desc: SamplerDesc,
    handle: SamplerHandle,
}

impl SamplerResource {
    /// Build a sampler resource from its blueprint
    pub(crate) fn build(
        device: Arc<dyn GraphicsDevice>,
        desc: &SamplerDesc,
    ) -> Result<Arc<Self>> {
        let handle = device.create_sampler(desc)?;
        Ok(Arc::new(Self {
            id: next_resource_id(),
            device,
            desc: *desc,
            handle,
        }))
    }

    /// Stable resource identity
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The blueprint this sampler was built from
    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    /// Device handle
    pub fn handle(&self) -> SamplerHandle {
        self.handle
    }
}

impl Drop for SamplerResource {
    fn drop(&mut self) {
        self.device.destroy_sampler(self.handle);
    }
}
