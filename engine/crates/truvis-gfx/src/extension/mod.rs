//! Context 生命周期扩展协议
//!
//! context 的创建由 [`ExtensionContainer`] 驱动，按固定顺序回调每个扩展：
//!
//! 1. [`GfxExtension::on_context_initializing`]：所有扩展都已注册，context 还不存在
//! 2. [`GfxExtension::accepts_physical_device`]：对每张候选显卡做无副作用的能力检查
//! 3. [`GfxExtension::on_physical_device_selected`]：显卡已确定，扩展记录能力标记
//! 4. [`GfxExtension::required_device_extension_names`] /
//!    [`GfxExtension::required_device_features`]：汇总创建 device 的请求
//! 5. [`GfxExtension::on_context_created`]：context 已就绪，可以开始创建资源
//! 6. [`GfxExtension::on_destroy_context`]：context 即将销毁
//!
//! 每个 hook 在一次 context 生命周期中只会被调用一次。
//! 如果在 context 创建之前失败（没有可用显卡、device 创建失败等），
//! 驱动方会调用 [`GfxExtension::on_context_aborted`]，扩展回到初始状态，之后可以重新创建 context。

pub mod container;
pub mod phase;
pub mod resources;

use std::any::Any;
use std::ffi::CStr;
use std::sync::Arc;

pub use container::{DeviceRequest, ExtensionContainer};
pub use phase::ExtensionPhase;

use crate::error::GfxResult;
use crate::foundation::physical_device::{DeviceFeatures, PhysicalDeviceInfo};

/// 参与 context 生命周期的扩展
///
/// hook 都是 `&self`：扩展通常同时被 container 和业务代码共享（`Arc`），
/// 需要可变的状态由扩展自己用锁保护。
///
/// `C` 是 context 的类型，vulkan 下是 [`crate::foundation::context::GfxContext`]
pub trait GfxExtension<C>: Any + Send + Sync {
    fn name(&self) -> &'static str;

    /// 用于 [`ExtensionContainer::get`] 的向下转型
    fn as_any(&self) -> &dyn Any;

    /// 无副作用地检查候选显卡是否满足要求
    ///
    /// 不满足时返回 [`crate::error::GfxError::DeviceCapabilityUnsatisfied`]，驱动方会跳过这张显卡
    fn accepts_physical_device(&self, _device: &PhysicalDeviceInfo) -> GfxResult<()> {
        Ok(())
    }

    fn on_context_initializing(&self, _container: &ExtensionContainer<C>) {}

    fn on_physical_device_selected(&self, _device: &PhysicalDeviceInfo) {}

    /// 创建 device 时需要开启的 device extensions
    fn required_device_extension_names(&self, _device: &PhysicalDeviceInfo) -> Vec<&'static CStr> {
        Vec::new()
    }

    /// 创建 device 时需要开启的 device features
    fn required_device_features(&self, _device: &PhysicalDeviceInfo) -> DeviceFeatures {
        DeviceFeatures::empty()
    }

    fn on_context_created(&self, _context: &Arc<C>, _container: &ExtensionContainer<C>) {}

    /// context 没能创建出来，撤销 initializing 之后记录的所有状态
    fn on_context_aborted(&self) {}

    fn on_destroy_context(&self) {}
}
