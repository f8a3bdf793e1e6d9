//! Shader 的执行阶段，以及从文件名推断阶段

use ash::vk;

/// Shader 的执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,

    // Ray Tracing 阶段
    RayGen,
    AnyHit,
    ClosestHit,
    Miss,
    Intersection,
    RayCallable,

    Task,
    Mesh,
}

impl ShaderStage {
    /// glslc `-fshader-stage=` 的参数
    pub fn glslc_stage_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessellationControl => "tesscontrol",
            ShaderStage::TessellationEvaluation => "tesseval",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
            ShaderStage::RayGen => "rgen",
            ShaderStage::AnyHit => "rahit",
            ShaderStage::ClosestHit => "rchit",
            ShaderStage::Miss => "rmiss",
            ShaderStage::Intersection => "rint",
            ShaderStage::RayCallable => "rcall",
            ShaderStage::Task => "task",
            ShaderStage::Mesh => "mesh",
        }
    }

    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
            ShaderStage::RayGen => vk::ShaderStageFlags::RAYGEN_KHR,
            ShaderStage::AnyHit => vk::ShaderStageFlags::ANY_HIT_KHR,
            ShaderStage::ClosestHit => vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            ShaderStage::Miss => vk::ShaderStageFlags::MISS_KHR,
            ShaderStage::Intersection => vk::ShaderStageFlags::INTERSECTION_KHR,
            ShaderStage::RayCallable => vk::ShaderStageFlags::CALLABLE_KHR,
            ShaderStage::Task => vk::ShaderStageFlags::TASK_EXT,
            ShaderStage::Mesh => vk::ShaderStageFlags::MESH_EXT,
        }
    }

    /// 根据文件名解析 shader stage
    ///
    /// 同时接受 `xxx.vert` 以及 `xxx.vert.glsl` 两种写法，不认识的后缀返回 None
    pub fn from_file_name(shader_name: &str) -> Option<ShaderStage> {
        let name = shader_name.strip_suffix(".glsl").unwrap_or(shader_name);
        let ext = name.rsplit_once('.')?.1;

        let stage = match ext {
            "vert" => ShaderStage::Vertex,
            "tesc" => ShaderStage::TessellationControl,
            "tese" => ShaderStage::TessellationEvaluation,
            "geom" => ShaderStage::Geometry,
            "frag" => ShaderStage::Fragment,
            "comp" => ShaderStage::Compute,
            "rgen" => ShaderStage::RayGen,
            "rahit" => ShaderStage::AnyHit,
            "rchit" => ShaderStage::ClosestHit,
            "rmiss" => ShaderStage::Miss,
            "rint" => ShaderStage::Intersection,
            "rcall" => ShaderStage::RayCallable,
            "task" => ShaderStage::Task,
            "mesh" => ShaderStage::Mesh,
            _ => return None,
        };

        Some(stage)
    }
}
