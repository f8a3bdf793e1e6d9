/// shader 编译的错误类型
#[derive(Debug, thiserror::Error)]
pub enum ShaderCompileError {
    /// 找不到或者无法启动编译器，调用方应当事先检查 `available()`
    #[error("shader compiler toolchain unavailable: {reason}")]
    ToolchainUnavailable { reason: String },

    /// 编译器正常运行，但报告了错误（语法、include、宏等）
    #[error("failed to compile `{source_name}`:\n{diagnostics}")]
    CompilationError { source_name: String, diagnostics: String },

    /// 编译器的输出不是合法的 SPIR-V
    #[error("compiler produced invalid SPIR-V for `{source_name}`: {reason}")]
    InvalidOutput { source_name: String, reason: String },

    #[error("cannot infer shader stage from `{0}`")]
    UnknownStage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShaderCompileError {
    #[inline]
    pub fn is_toolchain_unavailable(&self) -> bool {
        matches!(self, ShaderCompileError::ToolchainUnavailable { .. })
    }
}
