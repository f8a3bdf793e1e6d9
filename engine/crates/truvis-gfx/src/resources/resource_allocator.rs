use std::sync::Arc;

use ash::vk;

use crate::error::{GfxError, GfxResult};
use crate::extension::resources::capability::AllocatorFeatures;
use crate::foundation::mem_allocator::MemAllocator;
use crate::resources::buffer::{GfxBuffer, MemoryLocation};
use crate::resources::image::{GfxImage, GfxImageCreateInfo};

/// 基于 [`MemAllocator`] 创建 buffer 以及 image
///
/// 多个 resource allocator 可以共享同一个 memory allocator
pub struct ResourceAllocator {
    mem_allocator: Arc<MemAllocator>,
}

impl ResourceAllocator {
    #[inline]
    pub fn new(mem_allocator: Arc<MemAllocator>) -> Self {
        Self { mem_allocator }
    }

    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: impl AsRef<str>,
    ) -> GfxResult<GfxBuffer> {
        Self::check_buffer_usage(self.mem_allocator.features(), usage, || {
            self.mem_allocator.context().physical_device_info().name().to_string()
        })?;
        GfxBuffer::new(self.mem_allocator.clone(), size, usage, location, name)
    }

    #[inline]
    pub fn create_stage_buffer(&self, size: vk::DeviceSize, name: impl AsRef<str>) -> GfxResult<GfxBuffer> {
        self.create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC, MemoryLocation::CpuToGpu, name)
    }

    pub fn create_image(&self, image_info: &GfxImageCreateInfo, name: impl AsRef<str>) -> GfxResult<GfxImage> {
        GfxImage::new(self.mem_allocator.clone(), image_info, name)
    }

    /// 申请 device address 之前，allocator 必须已经开启了对应能力
    fn check_buffer_usage(
        features: AllocatorFeatures,
        usage: vk::BufferUsageFlags,
        device_name: impl FnOnce() -> String,
    ) -> GfxResult<()> {
        if usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
            && !features.contains(AllocatorFeatures::BUFFER_DEVICE_ADDRESS)
        {
            return Err(GfxError::DeviceCapabilityUnsatisfied {
                extension: "ExtensionResources",
                device: device_name(),
                missing: "buffer device address".to_string(),
            });
        }
        Ok(())
    }
}

// getters
impl ResourceAllocator {
    #[inline]
    pub fn mem_allocator(&self) -> &Arc<MemAllocator> {
        &self.mem_allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_address_needs_allocator_feature() {
        let usage = vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;

        let err = ResourceAllocator::check_buffer_usage(AllocatorFeatures::MEMORY_BUDGET, usage, || "gpu".to_string())
            .unwrap_err();
        assert!(matches!(err, GfxError::DeviceCapabilityUnsatisfied { device, .. } if device == "gpu"));

        assert!(
            ResourceAllocator::check_buffer_usage(AllocatorFeatures::BUFFER_DEVICE_ADDRESS, usage, || unreachable!())
                .is_ok()
        );
        assert!(
            ResourceAllocator::check_buffer_usage(
                AllocatorFeatures::empty(),
                vk::BufferUsageFlags::STORAGE_BUFFER,
                || unreachable!()
            )
            .is_ok()
        );
    }
}
