//! GLSL 着色器编译器
//!
//! 使用 glslc (来自 Vulkan SDK) 将 GLSL 着色器编译为 SPIR-V。
//! 源码通过 stdin 传入，SPIR-V 从 stdout 读出，不产生任何临时文件。

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ash::vk;
use truvis_crate_tools::resource::TruvisPath;
use truvis_gfx::foundation::context::GfxContext;

use crate::compiler::ShaderCompiler;
use crate::config::ShaderCompilerConfig;
use crate::error::ShaderCompileError;
use crate::stage::ShaderStage;

const SPIRV_MAGIC: u32 = 0x0723_0203;

#[cfg(windows)]
const GLSLC_EXE: &str = "glslc.exe";
#[cfg(not(windows))]
const GLSLC_EXE: &str = "glslc";

/// 查找 glslc
///
/// 顺序：显式指定的路径 → `$VULKAN_SDK/bin` → `PATH`。
/// 显式指定但文件不存在时不会继续搜索，视为不可用。
pub fn locate_glslc(
    explicit: Option<&Path>,
    vulkan_sdk: Option<OsString>,
    path_var: Option<OsString>,
) -> Option<PathBuf> {
    if let Some(explicit) = explicit {
        if explicit.is_file() {
            return Some(explicit.to_path_buf());
        }
        log::warn!("configured glslc {:?} does not exist", explicit);
        return None;
    }

    if let Some(sdk) = vulkan_sdk {
        let candidate = PathBuf::from(sdk).join("bin").join(GLSLC_EXE);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    path_var.and_then(|path_var| {
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(GLSLC_EXE))
            .find(|candidate| candidate.is_file())
    })
}

/// 通过 glslc 子进程编译 GLSL
///
/// 编译器的位置只在构造时查找一次，之后不会再改变
#[derive(Debug, Clone)]
pub struct GlslcCompiler {
    compiler_executable: Option<PathBuf>,

    include_paths: Vec<PathBuf>,
    macro_definitions: BTreeMap<String, String>,

    target_env: String,
    target_spv: Option<String>,
    generate_debug_info: bool,
    optimize: bool,
}

// 创建
impl GlslcCompiler {
    /// `target_env` 与 context 的 vulkan 版本一致，引擎的 shader include 目录总是排在最前面
    pub fn new(
        context: &GfxContext,
        include_paths: Vec<PathBuf>,
        macro_definitions: BTreeMap<String, String>,
    ) -> Self {
        let mut all_include_paths = vec![TruvisPath::shader_include_path()];
        all_include_paths.extend(include_paths);

        Self::from_config(ShaderCompilerConfig {
            include_paths: all_include_paths,
            macro_definitions,
            target_env: Self::target_env_for(context.api_version()),
            ..Default::default()
        })
    }

    pub fn from_config(config: ShaderCompilerConfig) -> Self {
        let compiler_executable = locate_glslc(
            config.compiler_executable.as_deref(),
            std::env::var_os("VULKAN_SDK"),
            std::env::var_os("PATH"),
        );
        match &compiler_executable {
            Some(exe) => log::info!("glslc found: {:?}", exe),
            None => log::warn!("glslc not found, shader compilation is unavailable"),
        }

        Self {
            compiler_executable,
            include_paths: config.include_paths,
            macro_definitions: config.macro_definitions,
            target_env: config.target_env,
            target_spv: config.target_spv,
            generate_debug_info: config.generate_debug_info,
            optimize: config.optimize,
        }
    }

    /// 直接指定编译器，跳过查找
    #[inline]
    pub fn with_executable(mut self, compiler_executable: Option<PathBuf>) -> Self {
        self.compiler_executable = compiler_executable;
        self
    }

    /// `vulkan{major}.{minor}`
    pub fn target_env_for(api_version: u32) -> String {
        format!(
            "vulkan{}.{}",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version)
        )
    }
}

// getters
impl GlslcCompiler {
    #[inline]
    pub fn compiler_executable(&self) -> Option<&Path> {
        self.compiler_executable.as_deref()
    }

    #[inline]
    pub fn target_env(&self) -> &str {
        &self.target_env
    }
}

// tools
impl GlslcCompiler {
    /// 基础 include 目录在前，追加的目录在后
    pub fn effective_include_paths(&self, additional_include_paths: &[PathBuf]) -> Vec<PathBuf> {
        self.include_paths.iter().chain(additional_include_paths).cloned().collect()
    }

    /// 同名的宏以追加的为准
    pub fn effective_macro_definitions(
        &self,
        additional_macro_definitions: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut macros = self.macro_definitions.clone();
        macros.extend(additional_macro_definitions.iter().map(|(k, v)| (k.clone(), v.clone())));
        macros
    }

    /// glslc 的命令行参数：从 stdin 读入源码，将 SPIR-V 写到 stdout
    pub fn command_args(
        &self,
        stage: ShaderStage,
        additional_include_paths: &[PathBuf],
        additional_macro_definitions: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let mut args = vec![
            "-x".to_string(),
            "glsl".to_string(),
            format!("-fshader-stage={}", stage.glslc_stage_name()),
            format!("--target-env={}", self.target_env),
        ];
        if let Some(target_spv) = &self.target_spv {
            args.push(format!("--target-spv={}", target_spv));
        }
        if self.generate_debug_info {
            args.push("-g".to_string());
        }
        args.push(if self.optimize { "-O" } else { "-O0" }.to_string());

        for include in self.effective_include_paths(additional_include_paths) {
            args.push(format!("-I{}", include.display()));
        }
        for (key, value) in self.effective_macro_definitions(additional_macro_definitions) {
            if value.is_empty() {
                args.push(format!("-D{}", key));
            } else {
                args.push(format!("-D{}={}", key, value));
            }
        }

        args.extend(["-o".to_string(), "-".to_string(), "-".to_string()]);
        args
    }

    fn run_glslc(&self, exe: &Path, args: &[String], source: &str) -> Result<std::process::Output, ShaderCompileError> {
        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ShaderCompileError::ToolchainUnavailable {
                reason: format!("failed to spawn {:?}: {}", exe, err),
            })?;

        let mut stdin = child.stdin.take();
        // stdout 和 stdin 同时进行，避免管道写满导致互相等待
        std::thread::scope(|scope| -> Result<std::process::Output, ShaderCompileError> {
            let writer = scope.spawn(move || match stdin.as_mut() {
                Some(stdin) => stdin.write_all(source.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output()?;

            match writer.join() {
                // glslc 在出错时可能提前退出，此时写入会 BrokenPipe，以退出码为准
                Ok(Err(err)) if err.kind() != std::io::ErrorKind::BrokenPipe => return Err(err.into()),
                _ => {}
            }
            Ok(output)
        })
    }
}

impl ShaderCompiler for GlslcCompiler {
    fn compile_glsl(
        &self,
        source: &str,
        source_name: &str,
        stage: ShaderStage,
        additional_include_paths: &[PathBuf],
        additional_macro_definitions: &BTreeMap<String, String>,
    ) -> Result<Vec<u32>, ShaderCompileError> {
        let exe = match &self.compiler_executable {
            Some(exe) if exe.is_file() => exe,
            _ => {
                return Err(ShaderCompileError::ToolchainUnavailable {
                    reason: "glslc not found, install the Vulkan SDK or add glslc to PATH".to_string(),
                });
            }
        };

        let args = self.command_args(stage, additional_include_paths, additional_macro_definitions);
        log::debug!("compiling {} with {:?} {:?}", source_name, exe, args);

        let output = self.run_glslc(exe, &args, source)?;
        if !output.status.success() {
            let diagnostics = String::from_utf8_lossy(&output.stderr).replace("<stdin>", source_name);
            return Err(ShaderCompileError::CompilationError {
                source_name: source_name.to_string(),
                diagnostics,
            });
        }
        if !output.stderr.is_empty() {
            log::warn!("{}: {}", source_name, String::from_utf8_lossy(&output.stderr).replace("<stdin>", source_name));
        }

        spirv_words(&output.stdout).map_err(|reason| ShaderCompileError::InvalidOutput {
            source_name: source_name.to_string(),
            reason,
        })
    }

    fn available(&self) -> bool {
        self.compiler_executable.as_ref().is_some_and(|exe| exe.is_file())
    }
}

/// 将字节流解释为 SPIR-V 的 word 序列
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(format!("length {} is not a positive multiple of 4", bytes.len()));
    }

    let words = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<_>>();
    if words[0] != SPIRV_MAGIC {
        return Err(format!("bad magic number {:#010x}", words[0]));
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler(include_paths: &[&str], macros: &[(&str, &str)]) -> GlslcCompiler {
        GlslcCompiler::from_config(ShaderCompilerConfig {
            include_paths: include_paths.iter().map(PathBuf::from).collect(),
            macro_definitions: macros.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Default::default()
        })
    }

    fn macros(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_additional_macro_overrides_base() {
        let compiler = compiler(&[], &[("X", "1"), ("Y", "base")]);
        let effective = compiler.effective_macro_definitions(&macros(&[("X", "2")]));

        assert_eq!(effective["X"], "2");
        assert_eq!(effective["Y"], "base");

        let args = compiler.command_args(ShaderStage::Fragment, &[], &macros(&[("X", "2")]));
        assert!(args.contains(&"-DX=2".to_string()));
        assert!(!args.contains(&"-DX=1".to_string()));
    }

    #[test]
    fn test_include_paths_base_first() {
        let compiler = compiler(&["A"], &[]);
        assert_eq!(
            compiler.effective_include_paths(&[PathBuf::from("B")]),
            vec![PathBuf::from("A"), PathBuf::from("B")]
        );

        let args = compiler.command_args(ShaderStage::Vertex, &[PathBuf::from("B")], &BTreeMap::new());
        let includes = args.iter().filter(|arg| arg.starts_with("-I")).collect::<Vec<_>>();
        assert_eq!(includes, vec!["-IA", "-IB"]);
    }

    #[test]
    fn test_command_args() {
        let compiler = compiler(&[], &[("DEBUG", "")]);
        let args = compiler.command_args(ShaderStage::RayGen, &[], &BTreeMap::new());

        assert!(args.contains(&"-fshader-stage=rgen".to_string()));
        assert!(args.contains(&"--target-env=vulkan1.3".to_string()));
        assert!(args.contains(&"--target-spv=spv1.4".to_string()));
        assert!(args.contains(&"-DDEBUG".to_string()));
        assert_eq!(&args[args.len() - 3..], ["-o", "-", "-"]);
    }

    #[test]
    fn test_target_env_for_api_version() {
        assert_eq!(GlslcCompiler::target_env_for(vk::API_VERSION_1_2), "vulkan1.2");
        assert_eq!(GlslcCompiler::target_env_for(vk::make_api_version(0, 1, 3, 250)), "vulkan1.3");
    }

    #[test]
    fn test_toolchain_absent() {
        let compiler = compiler(&[], &[]).with_executable(None);
        assert!(!compiler.available());

        let err = compiler
            .compile_glsl("void main() {}", "empty.comp", ShaderStage::Compute, &[], &BTreeMap::new())
            .unwrap_err();
        assert!(err.is_toolchain_unavailable());

        let missing = compiler.with_executable(Some(PathBuf::from("/definitely/not/here/glslc")));
        assert!(!missing.available());
        assert!(
            missing
                .compile_glsl("void main() {}", "empty.comp", ShaderStage::Compute, &[], &BTreeMap::new())
                .unwrap_err()
                .is_toolchain_unavailable()
        );
    }

    #[test]
    fn test_locate_glslc() {
        let dir = std::env::temp_dir().join(format!("truvis-locate-glslc-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let fake = dir.join(GLSLC_EXE);
        std::fs::write(&fake, b"").unwrap();

        let path_var = std::env::join_paths([PathBuf::from("/definitely/not/here"), dir.clone()]).unwrap();
        assert_eq!(locate_glslc(None, None, Some(path_var.clone())), Some(fake.clone()));
        assert_eq!(locate_glslc(Some(&fake), None, None), Some(fake.clone()));
        assert_eq!(locate_glslc(Some(Path::new("/definitely/not/here/glslc")), None, Some(path_var)), None);
        assert_eq!(locate_glslc(None, None, None), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_spirv_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend(0x0001_0400u32.to_le_bytes());
        assert_eq!(spirv_words(&bytes).unwrap(), vec![SPIRV_MAGIC, 0x0001_0400]);

        assert!(spirv_words(&[]).is_err());
        assert!(spirv_words(&bytes[..6]).is_err());
        assert!(spirv_words(&[0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_compile_with_glslc() {
        let compiler = compiler(&[], &[("COLOR", "vec4(1.0)")]);
        if !compiler.available() {
            eprintln!("glslc not available, skip");
            return;
        }

        let source = "#version 450\nlayout(location = 0) out vec4 o_color;\nvoid main() { o_color = COLOR; }\n";
        let words = compiler
            .compile_glsl(source, "solid.frag", ShaderStage::Fragment, &[], &BTreeMap::new())
            .unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);

        let err = compiler
            .compile_glsl("#version 450\nvoid main() { oops }\n", "broken.frag", ShaderStage::Fragment, &[], &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, ShaderCompileError::CompilationError { ref source_name, .. } if source_name == "broken.frag"));
    }
}
