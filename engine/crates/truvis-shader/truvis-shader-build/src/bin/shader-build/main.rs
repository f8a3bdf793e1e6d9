//! Shader 编译工具
//!
//! 将 shader 源码目录（默认 `engine/shader/src`，也可以通过第一个参数指定）下的所有 GLSL 文件
//! 编译为 SPIR-V 文件，输出到 `engine/shader/.build` 目录。
//! 源码目录下的 `shader-build.toml` 会被读取为 [`ShaderCompilerConfig`]。

mod task;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rayon::prelude::*;
use task::ShaderCompileTask;
use truvis_crate_tools::init_log::init_log;
use truvis_crate_tools::resource::TruvisPath;
use truvis_shader_build::{GlslcCompiler, ShaderCompiler, ShaderCompilerConfig};

const CONFIG_FILE_NAME: &str = "shader-build.toml";

/// 读取配置，相对路径的 include 目录基于源码目录；引擎的 include 目录总是排在最前面
fn load_config(src_root: &Path) -> anyhow::Result<ShaderCompilerConfig> {
    let config_path = src_root.join(CONFIG_FILE_NAME);
    let mut config = if config_path.is_file() {
        let text = std::fs::read_to_string(&config_path).with_context(|| format!("read {:?}", config_path))?;
        toml::from_str::<ShaderCompilerConfig>(&text).with_context(|| format!("parse {:?}", config_path))?
    } else {
        ShaderCompilerConfig::default()
    };

    config.include_paths = std::iter::once(TruvisPath::shader_include_path())
        .chain(config.include_paths.into_iter().map(|path| src_root.join(path)))
        .collect();
    Ok(config)
}

fn compile_task(compiler: &GlslcCompiler, task: &ShaderCompileTask) -> anyhow::Result<()> {
    log::info!("Compiling shader: {:?}", task.shader_path);

    let words = compiler.compile_glsl_file(&task.shader_path, &[], &BTreeMap::new())?;

    // 确保输出目录存在
    if let Some(parent) = task.output_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    let bytes = words.iter().flat_map(|word| word.to_le_bytes()).collect::<Vec<_>>();
    std::fs::write(&task.output_path, bytes).with_context(|| format!("write {:?}", task.output_path))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_log();

    let src_root = std::env::args_os().nth(1).map(PathBuf::from).unwrap_or_else(TruvisPath::shader_src_path);
    let build_root = TruvisPath::shader_build_root();
    log::info!("Shader source path: {:?}", src_root);
    log::info!("Shader output path: {:?}", build_root);

    let config = load_config(&src_root)?;
    let compiler = GlslcCompiler::from_config(config);
    if !compiler.available() {
        anyhow::bail!("glslc not found, install the Vulkan SDK or add glslc to PATH");
    }

    // 编译目录下的所有 shader 文件
    let failures = walkdir::WalkDir::new(&src_root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| ShaderCompileTask::new(&entry, &src_root, &build_root))
        .par_bridge() // 并行化编译
        .filter_map(|task| {
            compile_task(&compiler, &task).err().map(|err| {
                log::error!("{:?} ({:?}): {:#}", task.shader_path, task.shader_stage, err);
                task.shader_path
            })
        })
        .collect::<Vec<_>>();

    if !failures.is_empty() {
        anyhow::bail!("{} shader(s) failed to compile: {:?}", failures.len(), failures);
    }
    log::info!("Shader compilation completed.");
    Ok(())
}
