use std::sync::Arc;

use crate::error::GfxResult;
use crate::extension::resources::capability::AllocatorFeatures;
use crate::extension::resources::{FacilityFactory, ResourcesExtension};
use crate::foundation::context::GfxContext;
use crate::foundation::mem_allocator::MemAllocator;
use crate::resources::resource_allocator::ResourceAllocator;
use crate::resources::staging_manager::StagingManager;
use crate::sampler::SamplerPool;

/// 基于 vulkan + vma 的设施实现
#[derive(Debug, Clone, Copy, Default)]
pub struct VkFacilityFactory;

impl FacilityFactory for VkFacilityFactory {
    type Context = GfxContext;
    type MemoryAllocator = MemAllocator;
    type ResourceAllocator = ResourceAllocator;
    type SamplerPool = SamplerPool;
    type StagingManager = StagingManager;

    fn create_memory_allocator(&self, context: &Arc<GfxContext>, features: AllocatorFeatures) -> GfxResult<MemAllocator> {
        MemAllocator::new(context.clone(), features)
    }

    fn create_resource_allocator(
        &self,
        _context: &Arc<GfxContext>,
        memory_allocator: Arc<MemAllocator>,
    ) -> GfxResult<ResourceAllocator> {
        Ok(ResourceAllocator::new(memory_allocator))
    }

    fn create_sampler_pool(&self, context: &Arc<GfxContext>) -> GfxResult<SamplerPool> {
        Ok(SamplerPool::new(context.clone()))
    }

    fn create_staging_manager(
        &self,
        _context: &Arc<GfxContext>,
        resource_allocator: Arc<ResourceAllocator>,
    ) -> GfxResult<StagingManager> {
        Ok(StagingManager::new(resource_allocator))
    }
}

/// vulkan 下的资源扩展
pub type GfxResourcesExtension = ResourcesExtension<VkFacilityFactory>;

impl GfxResourcesExtension {
    #[inline]
    pub fn vulkan() -> Self {
        Self::new(VkFacilityFactory)
    }
}
