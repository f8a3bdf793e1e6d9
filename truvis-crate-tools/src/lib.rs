//! Truvis 工具集
//!
//! 提供日志初始化以及基于工作区根目录的路径管理。

pub mod init_log;
pub mod resource;
