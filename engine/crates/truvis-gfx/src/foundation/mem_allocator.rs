use std::ops::Deref;
use std::sync::Arc;

use crate::error::GfxResult;
use crate::extension::resources::capability::AllocatorFeatures;
use crate::foundation::context::GfxContext;

/// VMA 的封装
///
/// vma 需要引用 instance 以及 device，并且在其生命周期之内这两者必须有效，
/// 因此这里持有 context 的强引用。字段顺序保证 vma 先于 context 释放。
pub struct MemAllocator {
    inner: vk_mem::Allocator,
    features: AllocatorFeatures,

    context: Arc<GfxContext>,
}

impl MemAllocator {
    pub fn new(context: Arc<GfxContext>, features: AllocatorFeatures) -> GfxResult<Self> {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(context.instance(), context.device(), context.physical_device());
        vma_ci.vulkan_api_version = context.api_version();
        vma_ci.flags = Self::vma_flags(features);

        let inner = unsafe { vk_mem::Allocator::new(vma_ci)? };
        log::info!("vma created with {:?}", features);

        Ok(Self {
            inner,
            features,
            context,
        })
    }

    /// 协商出的能力到 vma 创建参数的映射
    pub fn vma_flags(features: AllocatorFeatures) -> vk_mem::AllocatorCreateFlags {
        let mut flags = vk_mem::AllocatorCreateFlags::empty();
        if features.contains(AllocatorFeatures::BUFFER_DEVICE_ADDRESS) {
            flags |= vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;
        }
        if features.contains(AllocatorFeatures::MEMORY_BUDGET) {
            flags |= vk_mem::AllocatorCreateFlags::EXT_MEMORY_BUDGET;
        }
        if features.contains(AllocatorFeatures::MEMORY_PRIORITY) {
            flags |= vk_mem::AllocatorCreateFlags::EXT_MEMORY_PRIORITY;
        }
        flags
    }
}

// getters
impl MemAllocator {
    #[inline]
    pub fn features(&self) -> AllocatorFeatures {
        self.features
    }

    #[inline]
    pub fn context(&self) -> &Arc<GfxContext> {
        &self.context
    }
}

impl Deref for MemAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Drop for MemAllocator {
    fn drop(&mut self) {
        log::info!("destroying vma");
    }
}
