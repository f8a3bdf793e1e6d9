use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// glslc 编译器的配置，`shader-build` 会从 `shader-build.toml` 中读取
///
/// ```toml
/// include_paths = ["include"]
/// target_env = "vulkan1.3"
///
/// [macro_definitions]
/// USE_RAY_QUERY = "1"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShaderCompilerConfig {
    /// 显式指定 glslc 的路径；为空时依次搜索 `$VULKAN_SDK/bin` 以及 `PATH`
    pub compiler_executable: Option<PathBuf>,
    pub include_paths: Vec<PathBuf>,
    pub macro_definitions: BTreeMap<String, String>,
    /// `--target-env`
    pub target_env: String,
    /// `--target-spv`，ray tracing 最低需要 spv1.4
    pub target_spv: Option<String>,
    /// `-g`
    pub generate_debug_info: bool,
    /// `-O`，否则 `-O0`
    pub optimize: bool,
}

impl Default for ShaderCompilerConfig {
    fn default() -> Self {
        Self {
            compiler_executable: None,
            include_paths: Vec::new(),
            macro_definitions: BTreeMap::new(),
            target_env: "vulkan1.3".to_string(),
            target_spv: Some("spv1.4".to_string()),
            generate_debug_info: true,
            optimize: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config: ShaderCompilerConfig = toml::from_str(
            r#"
            include_paths = ["include", "third_party/include"]
            optimize = true

            [macro_definitions]
            MAX_LIGHTS = "16"
            "#,
        )
        .unwrap();

        assert_eq!(config.include_paths, vec![PathBuf::from("include"), PathBuf::from("third_party/include")]);
        assert_eq!(config.macro_definitions["MAX_LIGHTS"], "16");
        assert!(config.optimize);
        assert_eq!(config.target_env, "vulkan1.3");
        assert_eq!(config.compiler_executable, None);
    }
}
