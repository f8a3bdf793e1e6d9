//! Truvis 基础工具
//!
//! 目前只包含 [`LazyShared`]：按需创建、被多处共享、但自身不持有所有权的资源槽位。

pub mod lazy_shared;

pub use lazy_shared::LazyShared;
