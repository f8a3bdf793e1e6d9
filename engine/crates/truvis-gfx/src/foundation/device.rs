use std::ffi::CStr;
use std::ops::Deref;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use itertools::Itertools;

use crate::error::GfxResult;
use crate::extension::DeviceRequest;
use crate::foundation::physical_device::{DeviceFeatures, PhysicalDeviceInfo};

/// Vulkan 逻辑设备封装
///
/// 开启哪些 extension 和 feature 完全由扩展协商出的 [`DeviceRequest`] 决定
pub struct GfxDevice {
    /// 核心 Vulkan 设备 API
    pub(crate) device: ash::Device,

    #[cfg(debug_assertions)]
    destroyed: AtomicBool,
}

// 构造与销毁
impl GfxDevice {
    pub fn new(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        pdevice_info: &PhysicalDeviceInfo,
        request: &DeviceRequest,
        queue_create_infos: &[vk::DeviceQueueCreateInfo],
    ) -> GfxResult<Self> {
        // device 所需的所有 extension
        let device_exts = request.extensions.iter().map(|e| e.as_ptr()).collect_vec();
        log::info!(
            "device exts: {}",
            request.extensions.iter().map(|e: &&CStr| format!("\n\t{:?}", e)).join("")
        );

        // device 所需的所有 features
        let features = request.features;
        let core_features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(features.contains(DeviceFeatures::SAMPLER_ANISOTROPY));
        let mut vk12_features = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(features.contains(DeviceFeatures::BUFFER_DEVICE_ADDRESS));
        let mut memory_priority_features = vk::PhysicalDeviceMemoryPriorityFeaturesEXT::default().memory_priority(true);

        let mut all_features = vk::PhysicalDeviceFeatures2::default().features(core_features);
        let api_version = pdevice_info.api_version();
        if vk::api_version_major(api_version) > 1 || vk::api_version_minor(api_version) >= 2 {
            all_features = all_features.push_next(&mut vk12_features);
        }
        if features.contains(DeviceFeatures::MEMORY_PRIORITY) {
            all_features = all_features.push_next(&mut memory_priority_features);
        }
        log::info!("device features: {:?}", features);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(queue_create_infos)
            .enabled_extension_names(&device_exts)
            .push_next(&mut all_features);

        let device = unsafe { instance.create_device(pdevice, &device_create_info, None)? };

        Ok(Self {
            device,

            #[cfg(debug_assertions)]
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn destroy(&self) {
        log::info!("destroying device");

        #[cfg(debug_assertions)]
        self.destroyed.store(true, Ordering::Release);

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// tools
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }

    #[inline]
    pub fn wait_idle(&self) {
        if let Err(err) = unsafe { self.device.device_wait_idle() } {
            log::error!("device_wait_idle failed: {:?}", err);
        }
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl Drop for GfxDevice {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(
            self.destroyed.load(Ordering::Acquire),
            "GfxDevice must be destroyed before being dropped."
        );
    }
}
