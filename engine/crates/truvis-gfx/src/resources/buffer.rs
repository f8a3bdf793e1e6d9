use std::ptr;
use std::sync::Arc;

use ash::vk;
use vk_mem::Alloc;

use crate::error::GfxResult;
use crate::foundation::mem_allocator::MemAllocator;

/// buffer 所在的内存位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// 只有 GPU 访问
    GpuOnly,
    /// CPU 顺序写入，GPU 读取，例如 stage buffer
    CpuToGpu,
    /// GPU 写入，CPU 随机读取
    GpuToCpu,
}

impl MemoryLocation {
    pub(crate) fn alloc_ci(self) -> vk_mem::AllocationCreateInfo {
        let flags = match self {
            MemoryLocation::GpuOnly => vk_mem::AllocationCreateFlags::empty(),
            MemoryLocation::CpuToGpu => vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            MemoryLocation::GpuToCpu => vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
        };
        vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_host_visible(self) -> bool {
        self != MemoryLocation::GpuOnly
    }
}

/// 由 vma 分配的 buffer，释放时自动归还内存
///
/// 持有 allocator 的强引用，因此 buffer 存活期间 allocator 以及 context 一定有效
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,
    location: MemoryLocation,

    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,

    debug_name: String,

    allocator: Arc<MemAllocator>,
}

impl Drop for GfxBuffer {
    fn drop(&mut self) {
        unsafe {
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}

// init
impl GfxBuffer {
    pub(crate) fn new(
        allocator: Arc<MemAllocator>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let buffer_ci = vk::BufferCreateInfo::default().size(size).usage(usage);
        let alloc_ci = location.alloc_ci();

        let (handle, allocation) = unsafe { allocator.create_buffer(&buffer_ci, &alloc_ci)? };

        let mut device_addr = None;
        if usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            let device = allocator.context().device();
            unsafe {
                device_addr =
                    Some(device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(handle)));
            }
        }

        Ok(Self {
            handle,
            allocation,
            size,
            location,
            device_addr,
            debug_name: name.as_ref().to_string(),
            allocator,
        })
    }
}

// getter
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn device_address(&self) -> Option<vk::DeviceAddress> {
        self.device_addr
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

// tools
impl GfxBuffer {
    /// 通过 mem map 的方式将 data 写入 buffer 的 `offset` 处
    pub fn write_bytes(&mut self, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        assert!(
            self.location.is_host_visible(),
            "buffer `{}` is not host visible",
            self.debug_name
        );
        assert!(
            offset + data.len() as vk::DeviceSize <= self.size,
            "write out of range on buffer `{}`",
            self.debug_name
        );

        unsafe {
            let mapped = self.allocator.map_memory(&mut self.allocation)?;
            ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
            self.allocator.unmap_memory(&mut self.allocation);
        }
        self.allocator.flush_allocation(&self.allocation, offset, data.len() as vk::DeviceSize)?;
        Ok(())
    }
}
