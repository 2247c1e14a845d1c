//! Declarative shader description: XML parsing, GLSL generation, vertex
//! format reverse-engineering, and the runtime GLSL → SPIR-V compilation
//! step the teacher's `vulkano_shaders::shader!` macro performed at build
//! time. Shader descriptions are loaded at runtime, so compilation happens
//! at runtime too.

pub mod codegen;
pub mod desc;
pub mod hash;
pub mod parser;
pub mod vertex_format;

use std::sync::Arc;

use vulkano::device::Device;
use vulkano::shader::{ShaderModule, ShaderModuleCreateInfo};

use crate::error::ShaderError;
use desc::{GraphicsPass, Passes, ShaderDescription};
use vertex_format::VertexFormat;

/// A loaded shader: the parsed description plus, for graphics shaders, the
/// vertex format reverse-engineered from the first pass's vertex stage
/// (every pass of a shader is expected to share one vertex layout).
pub struct Shader {
    pub description: ShaderDescription,
    pub vertex_format: VertexFormat,
}

impl Shader {
    /// Parses `xml` into a [`ShaderDescription`]. An XML parse error leaves
    /// the shader "uninitialized": callers get `Err` and must not create
    /// pipelines from it, matching the failure-mode contract in the loader
    /// design.
    pub fn from_xml(xml: &str) -> Result<Self, ShaderError> {
        let description = parser::parse(xml)?;
        let vertex_format = match &description.passes {
            Passes::Graphics(passes) => passes
                .first()
                .map(|p: &GraphicsPass| vertex_format::reverse_engineer(&p.vertex_source))
                .unwrap_or_default(),
            Passes::Compute(_) => VertexFormat::default(),
        };
        Ok(Shader {
            description,
            vertex_format,
        })
    }

    pub fn pass_count(&self) -> usize {
        self.description.passes.len()
    }

    pub fn pass_index_from_name(&self, name: &str) -> Option<usize> {
        self.description.pass_index_from_name(name)
    }

    /// Compiles pass `index`'s vertex and fragment GLSL to SPIR-V and wraps
    /// each in a Vulkan shader module. Returns `None` for a compute shader
    /// or an out-of-range pass.
    pub fn graphics_modules(
        &self,
        device: Arc<Device>,
        index: usize,
    ) -> Option<(Arc<ShaderModule>, Arc<ShaderModule>)> {
        let Passes::Graphics(passes) = &self.description.passes else {
            return None;
        };
        let pass = passes.get(index)?;
        let vertex_glsl = codegen::vertex_source(&self.description, pass);
        let fragment_glsl = codegen::fragment_source(&self.description, pass);

        let vertex = compile_to_module(
            device.clone(),
            &vertex_glsl,
            shaderc::ShaderKind::Vertex,
            &pass.name,
        )
        .ok()?;
        let fragment = compile_to_module(
            device,
            &fragment_glsl,
            shaderc::ShaderKind::Fragment,
            &pass.name,
        )
        .ok()?;
        Some((vertex, fragment))
    }

    /// Compiles pass `index`'s compute GLSL to SPIR-V. Returns `None` for a
    /// graphics shader or an out-of-range pass.
    pub fn compute_module(&self, device: Arc<Device>, index: usize) -> Option<Arc<ShaderModule>> {
        let Passes::Compute(passes) = &self.description.passes else {
            return None;
        };
        let pass = passes.get(index)?;
        let glsl = codegen::compute_source(&self.description, pass);
        compile_to_module(device, &glsl, shaderc::ShaderKind::Compute, &pass.name).ok()
    }
}

fn compile_to_module(
    device: Arc<Device>,
    glsl: &str,
    kind: shaderc::ShaderKind,
    debug_name: &str,
) -> Result<Arc<ShaderModule>, ShaderError> {
    let compiler = shaderc::Compiler::new().expect("no local shaderc library");
    let artifact = compiler
        .compile_into_spirv(glsl, kind, debug_name, "main", None)
        .map_err(|e| ShaderError::MissingAttribute(e.to_string()))?;

    // SAFETY: the SPIR-V just came out of shaderc, which validates as part
    // of compilation.
    unsafe {
        ShaderModule::new(
            device,
            ShaderModuleCreateInfo::new(artifact.as_binary()),
        )
    }
    .map_err(|e| ShaderError::MissingAttribute(e.to_string()))
}
