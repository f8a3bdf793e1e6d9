use std::path::{Path, PathBuf};

use truvis_shader_build::ShaderStage;

/// 一个具体的编译任务
#[derive(Debug)]
pub struct ShaderCompileTask {
    pub shader_path: PathBuf,
    pub output_path: PathBuf,
    pub shader_stage: ShaderStage,
}

impl ShaderCompileTask {
    /// 从目录项创建编译任务
    ///
    /// # Arguments
    /// * `src_root` - shader 源码根目录，输出路径保持相对于它的目录结构
    /// * `build_root` - 输出根目录
    ///
    /// # Returns
    /// 如果文件扩展名不是 shader stage，返回 None（例如只用于 include 的文件）
    pub fn new(entry: &walkdir::DirEntry, src_root: &Path, build_root: &Path) -> Option<Self> {
        let shader_path = entry.path();
        let relative_path = shader_path.strip_prefix(src_root).ok()?;
        let shader_stage = ShaderStage::from_file_name(entry.file_name().to_str()?)?;

        // xxx.vert -> xxx.vert.spv
        let mut output_name = relative_path.as_os_str().to_os_string();
        output_name.push(".spv");

        Some(Self {
            shader_path: shader_path.to_path_buf(),
            output_path: build_root.join(output_name),
            shader_stage,
        })
    }
}
