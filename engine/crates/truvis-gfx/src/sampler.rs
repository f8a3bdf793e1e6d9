use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::error::GfxResult;
use crate::foundation::context::GfxContext;
use crate::foundation::physical_device::DeviceFeatures;

// Sampler descriptor
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub max_anisotropy: u32,
    pub compare_op: Option<vk::CompareOp>,
    pub mipmap_mode: vk::SamplerMipmapMode,
}
impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 0,
            compare_op: None,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        }
    }
}
impl GfxSamplerDesc {
    /// 实际使用的各向异性等级
    ///
    /// device 没有开启 sampler anisotropy 时总是关闭，否则不超过显卡上限
    pub fn effective_anisotropy(&self, anisotropy_enabled: bool, device_limit: f32) -> Option<f32> {
        if !anisotropy_enabled || self.max_anisotropy == 0 {
            return None;
        }
        let level = (self.max_anisotropy as f32).min(device_limit);
        (level >= 1.0).then_some(level)
    }
}

/// 按描述去重的 sampler 池
///
/// 相同的 [`GfxSamplerDesc`] 总是返回同一个 `vk::Sampler`，池销毁时统一释放
pub struct SamplerPool {
    samplers: Mutex<HashMap<GfxSamplerDesc, vk::Sampler>>,
    context: Arc<GfxContext>,
}

impl SamplerPool {
    pub fn new(context: Arc<GfxContext>) -> Self {
        Self {
            samplers: Mutex::new(HashMap::new()),
            context,
        }
    }

    pub fn get_sampler(&self, desc: &GfxSamplerDesc) -> GfxResult<vk::Sampler> {
        let mut samplers = self.samplers.lock();
        if let Some(sampler) = samplers.get(desc) {
            return Ok(*sampler);
        }

        let sampler = self.create_vk_sampler(desc)?;
        samplers.insert(*desc, sampler);
        Ok(sampler)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samplers.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn create_vk_sampler(&self, desc: &GfxSamplerDesc) -> GfxResult<vk::Sampler> {
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .address_mode_u(desc.address_mode_u)
            .address_mode_v(desc.address_mode_v)
            .address_mode_w(desc.address_mode_w)
            .mipmap_mode(desc.mipmap_mode)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        let anisotropy_enabled =
            self.context.device_request().features.contains(DeviceFeatures::SAMPLER_ANISOTROPY);
        let device_limit = self.context.physical_device_info().max_sampler_anisotropy();
        if let Some(level) = desc.effective_anisotropy(anisotropy_enabled, device_limit) {
            create_info = create_info.anisotropy_enable(true).max_anisotropy(level);
        } else {
            create_info = create_info.anisotropy_enable(false);
        }

        if let Some(compare_op) = desc.compare_op {
            create_info = create_info.compare_enable(true).compare_op(compare_op);
        } else {
            create_info = create_info.compare_enable(false);
        }

        let sampler = unsafe { self.context.device().create_sampler(&create_info, None)? };
        log::debug!("sampler created: {:?}", desc);
        Ok(sampler)
    }
}

impl Drop for SamplerPool {
    fn drop(&mut self) {
        let device = self.context.device();
        for (_, sampler) in self.samplers.get_mut().drain() {
            unsafe {
                device.destroy_sampler(sampler, None);
            }
        }
    }
}
