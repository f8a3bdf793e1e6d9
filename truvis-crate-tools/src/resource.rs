use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let src = TruvisPath::shader_src_path();                  // engine/shader/src
/// let out = TruvisPath::shader_build_root();                // engine/shader/.build
/// ```
pub struct TruvisPath {}
// 核心路径
impl TruvisPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // 当前 crate 位于工作区根目录下
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    pub fn engine_path() -> PathBuf {
        Self::workspace_path().join("engine")
    }
}
// engine/shader 目录下
impl TruvisPath {
    pub fn shader_root_path() -> PathBuf {
        Self::engine_path().join("shader")
    }

    /// shader 源码
    pub fn shader_src_path() -> PathBuf {
        Self::shader_root_path().join("src")
    }

    /// 所有 shader 共享的 include 目录
    pub fn shader_include_path() -> PathBuf {
        Self::shader_root_path().join("include")
    }

    /// 编译输出目录
    pub fn shader_build_root() -> PathBuf {
        Self::shader_root_path().join(".build")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_paths() {
        assert!(TruvisPath::shader_build_root().ends_with("engine/shader/.build"));
        assert!(TruvisPath::shader_include_path().ends_with("engine/shader/include"));
        assert!(TruvisPath::shader_src_path().starts_with(TruvisPath::workspace_path()));
    }
}
