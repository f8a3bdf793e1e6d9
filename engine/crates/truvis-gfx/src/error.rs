use ash::vk;

use crate::extension::phase::ExtensionPhase;

/// GFX 层的错误类型
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// 在错误的生命周期阶段访问了资源设施
    ///
    /// 属于调用方的编程错误，例如 context 销毁之后还在请求 allocator
    #[error("extension `{extension}`: `{operation}` is only legal after the context is created (current phase: {phase:?})")]
    LifecycleViolation {
        extension: &'static str,
        operation: &'static str,
        phase: ExtensionPhase,
    },

    /// 设备缺少某个扩展要求的能力，在选择 physical device 阶段就会报告
    #[error("extension `{extension}` rejects device `{device}`: missing {missing}")]
    DeviceCapabilityUnsatisfied {
        extension: &'static str,
        device: String,
        missing: String,
    },

    /// 没有任何一张显卡被接受，`rejections` 按候选顺序记录每一次拒绝；没有候选显卡时为空
    #[error("no suitable physical device: {}", join_rejections(.rejections))]
    NoSuitablePhysicalDevice { rejections: Vec<GfxError> },

    /// context 处于 Created 阶段，但外部已经释放了它
    #[error("extension `{extension}`: the owning context has already been dropped")]
    ContextDropped { extension: &'static str },

    #[error("failed to load vulkan: {0}")]
    VulkanLoad(String),

    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
}

pub type GfxResult<T> = Result<T, GfxError>;

fn join_rejections(rejections: &[GfxError]) -> String {
    if rejections.is_empty() {
        return "no physical device available".to_string();
    }
    rejections.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl GfxError {
    #[inline]
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(self, GfxError::LifecycleViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GfxError::LifecycleViolation {
            extension: "ExtensionResources",
            operation: "memory_allocator",
            phase: ExtensionPhase::Destroyed,
        };
        assert!(err.is_lifecycle_violation());
        assert_eq!(
            err.to_string(),
            "extension `ExtensionResources`: `memory_allocator` is only legal after the context is created (current phase: Destroyed)"
        );

        let err = GfxError::NoSuitablePhysicalDevice { rejections: Vec::new() };
        assert_eq!(err.to_string(), "no suitable physical device: no physical device available");

        let err: GfxError = vk::Result::ERROR_OUT_OF_DEVICE_MEMORY.into();
        assert!(matches!(err, GfxError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)));
    }
}
