use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::error::GfxResult;
use crate::resources::buffer::GfxBuffer;
use crate::resources::image::{GfxImage, VulkanFormatUtils};
use crate::resources::resource_allocator::ResourceAllocator;

/// 通过 stage buffer 把 CPU 数据上传到 GPU 资源
///
/// 只负责录制 copy 命令，command buffer 的提交与同步由调用方负责；
/// 录制产生的 stage buffer 暂存在这里，直到调用方确认命令执行完毕后调用 [`Self::release_pending`]
pub struct StagingManager {
    resource_allocator: Arc<ResourceAllocator>,
    pending: Mutex<Vec<GfxBuffer>>,
}

impl StagingManager {
    #[inline]
    pub fn new(resource_allocator: Arc<ResourceAllocator>) -> Self {
        Self {
            resource_allocator,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// 录制 stage buffer → `dst` 的拷贝命令
    pub fn cmd_upload_to_buffer(
        &self,
        cmd: vk::CommandBuffer,
        dst: &GfxBuffer,
        dst_offset: vk::DeviceSize,
        data: &[u8],
    ) -> GfxResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let size = data.len() as vk::DeviceSize;
        assert!(
            dst_offset + size <= dst.size(),
            "upload out of range on buffer `{}`",
            dst.debug_name()
        );

        let stage_buffer = self.create_filled_stage_buffer(data, format!("{}-stage-buffer", dst.debug_name()))?;
        unsafe {
            self.device().cmd_copy_buffer(
                cmd,
                stage_buffer.vk_buffer(),
                dst.vk_buffer(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset,
                    size,
                }],
            );
        }
        self.pending.lock().push(stage_buffer);
        Ok(())
    }

    /// 录制 stage buffer → `dst` 整张 mip 0 的拷贝命令
    ///
    /// `dst` 需要已经处于 `dst_layout`（通常是 TRANSFER_DST_OPTIMAL），layout 转换由调用方负责
    pub fn cmd_upload_to_image(
        &self,
        cmd: vk::CommandBuffer,
        dst: &GfxImage,
        dst_layout: vk::ImageLayout,
        data: &[u8],
    ) -> GfxResult<()> {
        if let Some(pixel_size) = VulkanFormatUtils::pixel_size_in_bytes(dst.format()) {
            assert_eq!(
                data.len(),
                pixel_size * (dst.width() * dst.height()) as usize,
                "data size mismatch on image `{}`",
                dst.name()
            );
        }
        if data.is_empty() {
            return Ok(());
        }

        let stage_buffer = self.create_filled_stage_buffer(data, format!("{}-stage-buffer", dst.name()))?;
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(dst.extent())
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                cmd,
                stage_buffer.vk_buffer(),
                dst.handle(),
                dst_layout,
                std::slice::from_ref(&region),
            );
        }
        self.pending.lock().push(stage_buffer);
        Ok(())
    }

    /// 释放所有暂存的 stage buffer，返回释放的数量
    ///
    /// 调用方需要保证之前录制的命令已经执行完毕
    pub fn release_pending(&self) -> usize {
        let released = std::mem::take(&mut *self.pending.lock());
        log::debug!("release {} stage buffers", released.len());
        released.len()
    }

    /// 暂存中的 stage buffer 占用的字节数
    pub fn pending_bytes(&self) -> vk::DeviceSize {
        self.pending.lock().iter().map(GfxBuffer::size).sum()
    }

    #[inline]
    pub fn resource_allocator(&self) -> &Arc<ResourceAllocator> {
        &self.resource_allocator
    }

    fn create_filled_stage_buffer(&self, data: &[u8], name: String) -> GfxResult<GfxBuffer> {
        let mut stage_buffer = self.resource_allocator.create_stage_buffer(data.len() as vk::DeviceSize, name)?;
        stage_buffer.write_bytes(0, data)?;
        Ok(stage_buffer)
    }

    #[inline]
    fn device(&self) -> &ash::Device {
        self.resource_allocator.mem_allocator().context().device()
    }
}

impl Drop for StagingManager {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().len();
        if pending > 0 {
            log::warn!("staging manager dropped with {} pending stage buffers", pending);
        }
    }
}
