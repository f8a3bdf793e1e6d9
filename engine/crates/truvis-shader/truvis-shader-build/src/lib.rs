//! 着色器编译
//!
//! 通过外部的 glslc 将 GLSL 编译为 SPIR-V：
//! - [`ShaderCompiler`]：编译器接口，可以在多个线程中同时使用
//! - [`GlslcCompiler`]：基于 glslc 子进程的实现，基础 include 目录与宏在构造时确定，每次调用可以追加
//! - [`ShaderCompilerConfig`]：`shader-build.toml` 对应的配置

pub mod compiler;
pub mod config;
pub mod error;
pub mod glslc;
pub mod stage;

pub use compiler::ShaderCompiler;
pub use config::ShaderCompilerConfig;
pub use error::ShaderCompileError;
pub use glslc::{GlslcCompiler, locate_glslc};
pub use stage::ShaderStage;
