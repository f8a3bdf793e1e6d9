use std::ffi::CStr;

use ash::vk;

use crate::error::{GfxError, GfxResult};
use crate::extension::resources::config::ResourcesConfig;
use crate::foundation::physical_device::{DeviceFeatures, PhysicalDeviceInfo};

bitflags::bitflags! {
    /// 创建 memory allocator 时可以开启的能力，与 VMA 的 `AllocatorCreateFlags` 对应
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AllocatorFeatures: u32 {
        const BUFFER_DEVICE_ADDRESS = 1 << 0;
        const MEMORY_BUDGET = 1 << 1;
        const MEMORY_PRIORITY = 1 << 2;
    }
}

/// 资源扩展对一张显卡提出的请求，在选择显卡阶段计算一次，之后不再改变
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityRequest {
    pub device_extensions: Vec<&'static CStr>,
    pub device_features: DeviceFeatures,
    pub allocator_features: AllocatorFeatures,
}

/// 根据显卡能力决定要开启哪些可选功能
///
/// 所有方法都是纯函数，不会修改任何状态
#[derive(Debug, Clone, Copy)]
pub struct CapabilityNegotiator<'a> {
    config: &'a ResourcesConfig,
}

impl<'a> CapabilityNegotiator<'a> {
    pub const EXTENSION_NAME: &'static str = "ExtensionResources";

    #[inline]
    pub fn new(config: &'a ResourcesConfig) -> Self {
        Self { config }
    }

    /// 显卡缺少必需能力时拒绝它
    pub fn verify(&self, device: &PhysicalDeviceInfo) -> GfxResult<()> {
        if self.config.require_buffer_device_address && !Self::supports_buffer_device_address(device) {
            return Err(GfxError::DeviceCapabilityUnsatisfied {
                extension: Self::EXTENSION_NAME,
                device: device.name().to_string(),
                missing: "buffer device address".to_string(),
            });
        }
        Ok(())
    }

    /// 计算要开启的 device extension、device feature 以及 allocator 能力
    pub fn negotiate(&self, device: &PhysicalDeviceInfo) -> CapabilityRequest {
        let mut request = CapabilityRequest::default();

        // buffer device address 已经提升到 core-1.2.0，不需要额外的 extension
        if Self::supports_buffer_device_address(device) {
            request.device_features |= DeviceFeatures::BUFFER_DEVICE_ADDRESS;
            request.allocator_features |= AllocatorFeatures::BUFFER_DEVICE_ADDRESS;
        }

        if self.config.use_memory_budget && device.supports_extension(ash::ext::memory_budget::NAME) {
            request.device_extensions.push(ash::ext::memory_budget::NAME);
            request.allocator_features |= AllocatorFeatures::MEMORY_BUDGET;
        }

        if self.config.use_memory_priority
            && device.supports_extension(ash::ext::memory_priority::NAME)
            && device.supports_features(DeviceFeatures::MEMORY_PRIORITY)
        {
            request.device_extensions.push(ash::ext::memory_priority::NAME);
            request.device_features |= DeviceFeatures::MEMORY_PRIORITY;
            request.allocator_features |= AllocatorFeatures::MEMORY_PRIORITY;
        }

        // sampler pool 只有在 feature 开启时才会创建各向异性采样器
        if device.supports_features(DeviceFeatures::SAMPLER_ANISOTROPY) {
            request.device_features |= DeviceFeatures::SAMPLER_ANISOTROPY;
        }

        request
    }

    fn supports_buffer_device_address(device: &PhysicalDeviceInfo) -> bool {
        let api_version = device.api_version();
        let is_vk12 = vk::api_version_major(api_version) > 1 || vk::api_version_minor(api_version) >= 2;
        is_vk12 && device.supports_features(DeviceFeatures::BUFFER_DEVICE_ADDRESS)
    }
}
