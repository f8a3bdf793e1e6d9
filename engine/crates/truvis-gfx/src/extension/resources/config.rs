use serde::Deserialize;

/// [`super::ResourcesExtension`] 的配置
///
/// 可选能力默认"有就用"；`require_*` 为 true 时，不支持该能力的显卡会在选择阶段被拒绝
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// 没有 buffer device address 的显卡直接拒绝
    pub require_buffer_device_address: bool,
    /// 显卡支持时开启 `VK_EXT_memory_budget`
    pub use_memory_budget: bool,
    /// 显卡支持时开启 `VK_EXT_memory_priority`
    pub use_memory_priority: bool,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            require_buffer_device_address: false,
            use_memory_budget: true,
            use_memory_priority: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ResourcesConfig = toml::from_str("require_buffer_device_address = true").unwrap();
        assert_eq!(
            config,
            ResourcesConfig {
                require_buffer_device_address: true,
                ..Default::default()
            }
        );
    }
}
