use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ShaderCompileError;
use crate::stage::ShaderStage;

/// 着色器编译器
///
/// 每次调用都是独立的，可以在多个线程中同时编译
pub trait ShaderCompiler: Send + Sync {
    /// 将 GLSL 源码编译为 SPIR-V
    ///
    /// # Parameters
    /// - `source_name`: 用于诊断信息中的文件名
    /// - `additional_include_paths`: 追加在基础 include 目录之后
    /// - `additional_macro_definitions`: 与基础宏同名时覆盖基础宏
    fn compile_glsl(
        &self,
        source: &str,
        source_name: &str,
        stage: ShaderStage,
        additional_include_paths: &[PathBuf],
        additional_macro_definitions: &BTreeMap<String, String>,
    ) -> Result<Vec<u32>, ShaderCompileError>;

    /// 编译器是否可用
    fn available(&self) -> bool;

    /// 编译一个 shader 文件，stage 由文件名推断
    ///
    /// 文件所在目录会作为第一个追加的 include 目录，便于使用相对路径 include
    fn compile_glsl_file(
        &self,
        path: &Path,
        additional_include_paths: &[PathBuf],
        additional_macro_definitions: &BTreeMap<String, String>,
    ) -> Result<Vec<u32>, ShaderCompileError> {
        let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
        let stage = ShaderStage::from_file_name(file_name)
            .ok_or_else(|| ShaderCompileError::UnknownStage(path.display().to_string()))?;
        let source = std::fs::read_to_string(path)?;

        let include_paths = path
            .parent()
            .map(Path::to_path_buf)
            .into_iter()
            .chain(additional_include_paths.iter().cloned())
            .collect::<Vec<_>>();

        self.compile_glsl(
            &source,
            &path.display().to_string(),
            stage,
            &include_paths,
            additional_macro_definitions,
        )
    }
}
