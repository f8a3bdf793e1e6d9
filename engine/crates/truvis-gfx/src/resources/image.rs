use std::sync::Arc;

use ash::vk;
use vk_mem::Alloc;

use crate::error::GfxResult;
use crate::foundation::mem_allocator::MemAllocator;

/// Vulkan 格式相关的工具类
pub struct VulkanFormatUtils;
impl VulkanFormatUtils {
    /// 计算指定 Vulkan 格式下每个像素需要的字节数
    ///
    /// # return
    /// 每个像素的字节数，不支持的格式返回 None
    pub fn pixel_size_in_bytes(format: vk::Format) -> Option<usize> {
        // 根据 vulkan specification 得到的 format 顺序，区间左闭右开
        const BYTE_1_FORMAT: [(vk::Format, vk::Format); 1] = [(vk::Format::R8_UNORM, vk::Format::R8G8_UNORM)];
        const BYTE_3_FORMAT: [(vk::Format, vk::Format); 1] = [(vk::Format::R8G8B8_UNORM, vk::Format::B8G8R8_SRGB)];
        const BYTE_4_FORMAT: [(vk::Format, vk::Format); 2] = [
            (vk::Format::R8G8B8A8_UNORM, vk::Format::A2R10G10B10_UNORM_PACK32),
            (vk::Format::R32_UINT, vk::Format::R32G32_UINT),
        ];
        const BYTE_8_FORMAT: [(vk::Format, vk::Format); 1] =
            [(vk::Format::R16G16B16A16_UNORM, vk::Format::R32_UINT)];
        const BYTE_16_FORMAT: [(vk::Format, vk::Format); 1] =
            [(vk::Format::R32G32B32A32_UINT, vk::Format::R64_UINT)];

        let is_in_format_region = |format: vk::Format, regions: &[(vk::Format, vk::Format)]| {
            let n = format.as_raw();
            regions.iter().any(|(begin, end)| begin.as_raw() <= n && n < end.as_raw())
        };

        match format {
            f if is_in_format_region(f, &BYTE_1_FORMAT) => Some(1),
            f if is_in_format_region(f, &BYTE_3_FORMAT) => Some(3),
            f if is_in_format_region(f, &BYTE_4_FORMAT) => Some(4),
            f if is_in_format_region(f, &BYTE_8_FORMAT) => Some(8),
            f if is_in_format_region(f, &BYTE_16_FORMAT) => Some(16),
            _ => None,
        }
    }
}

pub struct GfxImageCreateInfo {
    inner: vk::ImageCreateInfo<'static>,
}
impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            inner: vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: extent.into(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                // 这里只能是 UNDEFINED 或者 PREINITIALIZED
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            },
        }
    }

    #[inline]
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.inner.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn as_info(&self) -> &vk::ImageCreateInfo<'static> {
        &self.inner
    }
}

/// 由 vma 分配的 image，释放时自动归还内存
pub struct GfxImage {
    handle: vk::Image,
    allocation: vk_mem::Allocation,

    extent: vk::Extent3D,
    format: vk::Format,

    name: String,

    allocator: Arc<MemAllocator>,
}

// new & init
impl GfxImage {
    pub(crate) fn new(
        allocator: Arc<MemAllocator>,
        image_info: &GfxImageCreateInfo,
        debug_name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (handle, allocation) = unsafe { allocator.create_image(image_info.as_info(), &alloc_ci)? };

        Ok(Self {
            handle,
            allocation,
            extent: image_info.inner.extent,
            format: image_info.inner.format,
            name: debug_name.as_ref().to_string(),
            allocator,
        })
    }
}

impl Drop for GfxImage {
    fn drop(&mut self) {
        log::debug!("Destroying GfxImage: {}", self.name);
        unsafe {
            self.allocator.destroy_image(self.handle, &mut self.allocation);
        }
    }
}

// getter
impl GfxImage {
    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
