use std::ffi::{CStr, CString};

use ash::vk;
use itertools::Itertools;

use crate::error::GfxResult;

bitflags::bitflags! {
    /// 扩展关心的可选 device features
    ///
    /// 既用来描述 physical device 支持什么，也用来描述创建 device 时需要开启什么
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFeatures: u32 {
        /// `VkPhysicalDeviceVulkan12Features::bufferDeviceAddress`
        const BUFFER_DEVICE_ADDRESS = 1 << 0;
        /// `VkPhysicalDeviceMemoryPriorityFeaturesEXT::memoryPriority`
        const MEMORY_PRIORITY = 1 << 1;
        const SAMPLER_ANISOTROPY = 1 << 2;
    }
}

/// 一张候选显卡的能力描述
///
/// 只包含纯数据，不持有任何 vulkan 句柄，因此可以在没有 GPU 的环境下构造
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub(crate) name: String,
    pub(crate) device_type: vk::PhysicalDeviceType,
    pub(crate) api_version: u32,

    /// 当前 gpu 支持的 device extensions
    pub(crate) extensions: Vec<CString>,

    /// 当前 gpu 支持的 features（只记录关心的部分）
    pub(crate) features: DeviceFeatures,

    pub(crate) max_sampler_anisotropy: f32,

    /// 同时支持 graphics、compute 以及 transfer 的第一个 queue family，没有时这张显卡不可用
    pub(crate) gfx_queue_family_index: Option<u32>,
}

// 构造
impl PhysicalDeviceInfo {
    pub fn new(name: impl Into<String>, device_type: vk::PhysicalDeviceType) -> Self {
        Self {
            name: name.into(),
            device_type,
            api_version: vk::API_VERSION_1_3,
            extensions: Vec::new(),
            features: DeviceFeatures::empty(),
            max_sampler_anisotropy: 1.0,
            gfx_queue_family_index: Some(0),
        }
    }

    #[inline]
    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    pub fn with_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a CStr>) -> Self {
        self.extensions.extend(extensions.into_iter().map(CStr::to_owned));
        self
    }

    #[inline]
    pub fn with_features(mut self, features: DeviceFeatures) -> Self {
        self.features |= features;
        self
    }

    #[inline]
    pub fn with_max_sampler_anisotropy(mut self, max_sampler_anisotropy: f32) -> Self {
        self.max_sampler_anisotropy = max_sampler_anisotropy;
        self
    }

    #[inline]
    pub fn with_gfx_queue_family_index(mut self, gfx_queue_family_index: Option<u32>) -> Self {
        self.gfx_queue_family_index = gfx_queue_family_index;
        self
    }

    /// 从 vulkan 查询一张显卡的属性、扩展以及 features
    pub fn query(instance: &ash::Instance, pdevice: vk::PhysicalDevice) -> GfxResult<Self> {
        unsafe {
            let basic_props = instance.get_physical_device_properties(pdevice);
            let name = CStr::from_ptr(basic_props.device_name.as_ptr()).to_string_lossy().into_owned();
            log::info!("found gpu: {:?}, type: {:?}", name, basic_props.device_type);

            // 找到当前 gpu 支持的 extensions，并打印出来
            let extensions = instance
                .enumerate_device_extension_properties(pdevice)?
                .iter()
                .map(|ext| CStr::from_ptr(ext.extension_name.as_ptr()).to_owned())
                .collect_vec();
            log::debug!(
                "physical device supports extensions:\n\t{}",
                extensions.iter().map(|ext| ext.to_string_lossy()).join("\n\t")
            );

            let required_queue = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
            let gfx_queue_family_index = instance
                .get_physical_device_queue_family_properties(pdevice)
                .iter()
                .position(|props| props.queue_flags.contains(required_queue))
                .map(|index| index as u32);

            let mut info = Self {
                name,
                device_type: basic_props.device_type,
                api_version: basic_props.api_version,
                extensions,
                features: DeviceFeatures::empty(),
                max_sampler_anisotropy: basic_props.limits.max_sampler_anisotropy,
                gfx_queue_family_index,
            };

            // Vulkan12Features 只有在 1.2 及以上的设备上才能出现在 pNext 链中
            let has_vk12 = vk::api_version_minor(info.api_version) >= 2 || vk::api_version_major(info.api_version) > 1;
            let has_memory_priority = info.supports_extension(ash::ext::memory_priority::NAME);

            let mut vk12_features = vk::PhysicalDeviceVulkan12Features::default();
            let mut memory_priority_features = vk::PhysicalDeviceMemoryPriorityFeaturesEXT::default();
            let mut features2 = vk::PhysicalDeviceFeatures2::default();
            if has_vk12 {
                features2 = features2.push_next(&mut vk12_features);
            }
            if has_memory_priority {
                features2 = features2.push_next(&mut memory_priority_features);
            }
            instance.get_physical_device_features2(pdevice, &mut features2);
            let core_features = features2.features;

            let mut features = DeviceFeatures::empty();
            features.set(DeviceFeatures::SAMPLER_ANISOTROPY, core_features.sampler_anisotropy == vk::TRUE);
            features.set(DeviceFeatures::BUFFER_DEVICE_ADDRESS, vk12_features.buffer_device_address == vk::TRUE);
            features.set(DeviceFeatures::MEMORY_PRIORITY, memory_priority_features.memory_priority == vk::TRUE);
            info.features = features;

            log::info!("gpu {:?} features: {:?}", info.name, info.features);
            Ok(info)
        }
    }
}

// getters
impl PhysicalDeviceInfo {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn device_type(&self) -> vk::PhysicalDeviceType {
        self.device_type
    }

    #[inline]
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    #[inline]
    pub fn features(&self) -> DeviceFeatures {
        self.features
    }

    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.max_sampler_anisotropy
    }

    #[inline]
    pub fn gfx_queue_family_index(&self) -> Option<u32> {
        self.gfx_queue_family_index
    }

    #[inline]
    pub fn extensions(&self) -> impl Iterator<Item = &CStr> {
        self.extensions.iter().map(CString::as_c_str)
    }
}

// tools
impl PhysicalDeviceInfo {
    #[inline]
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|ext| ext.as_c_str() == name)
    }

    #[inline]
    pub fn supports_features(&self, features: DeviceFeatures) -> bool {
        self.features.contains(features)
    }

    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_discrete_gpu(&self) -> bool {
        self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }
}
