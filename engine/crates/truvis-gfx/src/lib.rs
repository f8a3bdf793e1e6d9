//! Truvis 的 GFX 层
//!
//! - [`extension`]：context 生命周期扩展协议，由 [`extension::ExtensionContainer`] 驱动
//! - [`extension::resources`]：按需创建、共享的 GPU 资源设施
//! - [`foundation`]：vulkan context、device 以及 vma 的封装
//!
//! 扩展只以弱引用观察 context，所有资源的所有权都在调用方手里。

pub mod error;
pub mod extension;
pub mod foundation;
pub mod resources;
pub mod sampler;
