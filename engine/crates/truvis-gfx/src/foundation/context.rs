use std::ffi::CString;
use std::sync::Arc;

use ash::vk;

use crate::error::{GfxError, GfxResult};
use crate::extension::{DeviceRequest, ExtensionContainer};
use crate::foundation::device::GfxDevice;
use crate::foundation::physical_device::PhysicalDeviceInfo;

/// vulkan context：instance、选中的显卡、device 以及图形队列
///
/// 由 [`ExtensionContainer`] 驱动创建，扩展只持有它的弱引用；
/// 需要 context 的设施（allocator、sampler pool 等）持有强引用，因此 context 一定晚于它们销毁。
pub struct GfxContext {
    device: GfxDevice,

    pdevice: vk::PhysicalDevice,
    pdevice_info: PhysicalDeviceInfo,
    device_request: DeviceRequest,

    gfx_queue_family_index: u32,
    gfx_queue: vk::Queue,

    /// 仅仅是函数指针，以及一个裸的 handle，生命周期手动控制
    instance: ash::Instance,

    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    vk_entry: ash::Entry,
}

// 创建与销毁
impl GfxContext {
    /// 版本过低时，有些函数无法正确加载
    pub const API_VERSION: u32 = vk::API_VERSION_1_3;
    const ENGINE_NAME: &'static str = "DruvisIII";

    /// 加载 vulkan，创建 instance，由扩展参与显卡选择以及 device 的创建
    pub fn create(app_name: &str, extensions: &ExtensionContainer<GfxContext>) -> GfxResult<Arc<Self>> {
        let vk_entry = unsafe { ash::Entry::load() }.map_err(|e| GfxError::VulkanLoad(e.to_string()))?;
        let instance = Self::create_instance(&vk_entry, app_name)?;

        let result = Self::create_with_instance(&vk_entry, &instance, extensions);
        if result.is_err() {
            // context 没有创建成功，instance 不会被任何人销毁
            unsafe { instance.destroy_instance(None) };
        }
        result
    }

    /// 先通知扩展 context 即将销毁，再释放 context 自身
    ///
    /// 如果仍有设施被外部持有，context 会一直存活到最后一个设施释放
    pub fn destroy(self: Arc<Self>, extensions: &ExtensionContainer<GfxContext>) {
        extensions.tear_down();

        let holders = Arc::strong_count(&self) - 1;
        if holders > 0 {
            log::warn!("gfx context is still referenced by {} holders, destruction is deferred", holders);
        }
    }

    fn create_instance(vk_entry: &ash::Entry, app_name: &str) -> GfxResult<ash::Instance> {
        let app_name = CString::new(app_name).unwrap_or_default();
        let engine_name = CString::new(Self::ENGINE_NAME).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .api_version(Self::API_VERSION)
            .application_name(app_name.as_ref())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name.as_ref())
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let instance_ci = vk::InstanceCreateInfo::default().application_info(&app_info);
        let instance = unsafe { vk_entry.create_instance(&instance_ci, None)? };
        log::info!("vulkan instance created for {:?}", app_name);
        Ok(instance)
    }

    fn create_with_instance(
        vk_entry: &ash::Entry,
        instance: &ash::Instance,
        extensions: &ExtensionContainer<GfxContext>,
    ) -> GfxResult<Arc<Self>> {
        let candidates = unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            .map(|pdevice| PhysicalDeviceInfo::query(instance, pdevice).map(|info| (pdevice, info)))
            .collect::<GfxResult<Vec<_>>>()?;

        extensions.bring_up(candidates, |pdevice, pdevice_info, request| {
            // 选择显卡时已经过滤掉了没有 gfx queue 的显卡
            let gfx_queue_family_index =
                pdevice_info.gfx_queue_family_index().ok_or_else(|| GfxError::DeviceCapabilityUnsatisfied {
                    extension: "GfxContext",
                    device: pdevice_info.name().to_string(),
                    missing: "gfx queue family".to_string(),
                })?;
            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(gfx_queue_family_index)
                .queue_priorities(&queue_priorities)];

            let device = GfxDevice::new(instance, pdevice, pdevice_info, request, &queue_create_infos)?;
            let gfx_queue = unsafe { device.get_device_queue(gfx_queue_family_index, 0) };

            Ok(Arc::new(Self {
                device,
                pdevice,
                pdevice_info: pdevice_info.clone(),
                device_request: request.clone(),
                gfx_queue_family_index,
                gfx_queue,
                instance: instance.clone(),
                vk_entry: vk_entry.clone(),
            }))
        })
    }
}

impl Drop for GfxContext {
    fn drop(&mut self) {
        log::info!("destroying gfx context");
        self.device.wait_idle();
        self.device.destroy();
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

// getters
impl GfxContext {
    #[inline]
    pub fn vk_entry(&self) -> &ash::Entry {
        &self.vk_entry
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.pdevice
    }

    #[inline]
    pub fn physical_device_info(&self) -> &PhysicalDeviceInfo {
        &self.pdevice_info
    }

    /// 创建 device 时实际开启的 extension 以及 feature
    #[inline]
    pub fn device_request(&self) -> &DeviceRequest {
        &self.device_request
    }

    /// instance 与 device 中较低的那个版本
    #[inline]
    pub fn api_version(&self) -> u32 {
        Self::API_VERSION.min(self.pdevice_info.api_version())
    }

    #[inline]
    pub fn gfx_queue(&self) -> vk::Queue {
        self.gfx_queue
    }

    #[inline]
    pub fn gfx_queue_family_index(&self) -> u32 {
        self.gfx_queue_family_index
    }
}
