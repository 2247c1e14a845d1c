//! Expands a parsed [`ShaderDescription`](super::desc::ShaderDescription)
//! into the full GLSL source for each pass: fixed per-frame/per-object
//! descriptor sets for graphics, material resources appended after, and the
//! pass's own vertex/fragment (or compute) body appended verbatim.

use std::fmt::Write;

use super::desc::*;

/// `set = 0, binding = 0`: camera view/projection uniforms, shared by every
/// graphics pass.
const CAMERA_SET: u32 = 0;
/// `set = 1, binding = 0`: per-object world matrix.
const OBJECT_SET: u32 = 1;
/// `set = 2`: the material's own resources, in declaration order.
const MATERIAL_SET_GRAPHICS: u32 = 2;
/// Compute shaders have no camera/object sets, so material resources start
/// at set 0.
const MATERIAL_SET_COMPUTE: u32 = 0;

fn emit_field(out: &mut String, field: &FieldDesc, indent: &str) {
    if field.field_type == FieldType::Compound {
        let _ = writeln!(out, "{indent}struct {}_t {{", field.name);
        for nested in &field.fields {
            emit_field(out, nested, &format!("{indent}    "));
        }
        let _ = writeln!(out, "{indent}}};");
        let array = array_suffix(field.count);
        let _ = writeln!(out, "{indent}{}_t {}{};", field.name, field.name, array);
    } else {
        let array = array_suffix(field.count);
        let _ = writeln!(
            out,
            "{indent}{} {}{};",
            field.field_type.glsl_type(),
            field.name,
            array
        );
    }
}

fn array_suffix(count: u32) -> String {
    match count {
        1 => String::new(),
        0 => "[]".to_string(),
        n => format!("[{n}]"),
    }
}

fn emit_buffer(out: &mut String, set: u32, buffer: &BufferDesc) {
    let qualifier = match buffer.buffer_type {
        BufferType::Uniform => "uniform",
        BufferType::Storage => "readonly buffer",
    };
    let _ = writeln!(
        out,
        "layout(set = {set}, binding = {}) {qualifier} {}Block {{",
        buffer.binding, buffer.name
    );
    for field in &buffer.fields {
        emit_field(out, field, "    ");
    }
    let _ = writeln!(out, "}} {};", buffer.name);
}

fn emit_texture(out: &mut String, set: u32, texture: &TextureDesc) {
    match texture.kind {
        TextureType::Texture1d => {
            let _ = writeln!(
                out,
                "layout(set = {set}, binding = {}) uniform sampler1D {};",
                texture.binding, texture.name
            );
        }
        TextureType::Texture2d | TextureType::TextureArray => {
            let sampler = if texture.kind == TextureType::TextureArray {
                "sampler2DArray"
            } else {
                "sampler2D"
            };
            let _ = writeln!(
                out,
                "layout(set = {set}, binding = {}) uniform {sampler} {};",
                texture.binding, texture.name
            );
        }
        TextureType::TextureCube => {
            let _ = writeln!(
                out,
                "layout(set = {set}, binding = {}) uniform samplerCube {};",
                texture.binding, texture.name
            );
        }
        TextureType::StorageImage => {
            let format = texture
                .format
                .map(StorageFormat::glsl_qualifier)
                .unwrap_or("rgba32f");
            let _ = writeln!(
                out,
                "layout(set = {set}, binding = {}, {format}) uniform image2D {};",
                texture.binding, texture.name
            );
        }
    }
}

fn emit_material_resources(out: &mut String, set: u32, shader: &ShaderDescription) {
    for buffer in &shader.buffers {
        emit_buffer(out, set, buffer);
    }
    for texture in &shader.textures {
        emit_texture(out, set, texture);
    }
}

fn graphics_header(shader: &ShaderDescription) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#version 440");
    let _ = writeln!(
        out,
        "layout(set = {CAMERA_SET}, binding = 0) uniform CameraBlock {{"
    );
    let _ = writeln!(out, "    mat4 view;");
    let _ = writeln!(out, "    mat4 projection;");
    let _ = writeln!(out, "    mat4 viewInverse;");
    let _ = writeln!(out, "    mat4 projectionInverse;");
    let _ = writeln!(out, "}} camera;");
    let _ = writeln!(
        out,
        "layout(set = {OBJECT_SET}, binding = 0) uniform ObjectBlock {{"
    );
    let _ = writeln!(out, "    mat4 model;");
    let _ = writeln!(out, "}} object;");
    emit_material_resources(&mut out, MATERIAL_SET_GRAPHICS, shader);
    out
}

fn compute_header(shader: &ShaderDescription, local_size: [u32; 3]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#version 440");
    let _ = writeln!(
        out,
        "layout(local_size_x = {}, local_size_y = {}, local_size_z = {}) in;",
        local_size[0], local_size[1], local_size[2]
    );
    emit_material_resources(&mut out, MATERIAL_SET_COMPUTE, shader);
    out
}

/// Full GLSL source for one graphics pass's vertex stage.
pub fn vertex_source(shader: &ShaderDescription, pass: &GraphicsPass) -> String {
    format!("{}\n{}", graphics_header(shader), pass.vertex_source)
}

/// Full GLSL source for one graphics pass's fragment stage.
pub fn fragment_source(shader: &ShaderDescription, pass: &GraphicsPass) -> String {
    format!("{}\n{}", graphics_header(shader), pass.fragment_source)
}

/// Full GLSL source for one compute pass.
pub fn compute_source(shader: &ShaderDescription, pass: &ComputePass) -> String {
    format!(
        "{}\n{}",
        compute_header(shader, pass.local_size),
        pass.source
    )
}

#[cfg(test)]
mod tests {
    use super::super::parser;
    use super::*;

    #[test]
    fn graphics_pass_gets_camera_object_and_material_sets() {
        let xml = r#"
            <Shader Name="Test" Version="440">
              <Resources>
                <Resource Name="globals" Type="uniform_buffer">
                  <Field Name="color" Type="vec4"/>
                </Resource>
                <Resource Name="albedo" Type="texture2D"/>
              </Resources>
              <Pass Name="Opaque">
                <VertexShader>void main() { gl_Position = object.model * vec4(0); }</VertexShader>
                <FragmentShader>void main() { }</FragmentShader>
              </Pass>
            </Shader>
        "#;
        let shader = parser::parse(xml).unwrap();
        let Passes::Graphics(passes) = &shader.passes else {
            panic!("expected graphics passes")
        };
        let vs = vertex_source(&shader, &passes[0]);
        assert!(vs.contains("set = 0, binding = 0"));
        assert!(vs.contains("set = 1, binding = 0"));
        assert!(vs.contains("set = 2, binding = 0) uniform globalsBlock"));
        assert!(vs.contains("set = 2, binding = 1) uniform sampler2D albedo"));
    }

    #[test]
    fn compute_pass_puts_material_resources_in_set_zero() {
        let xml = r#"
            <Shader Name="Blur" Version="440">
              <Resources>
                <Resource Name="target" Type="storageImage" Format="RGBA32F"/>
              </Resources>
              <ComputeShader Name="Main" LocalSizeX="8" LocalSizeY="8" LocalSizeZ="1">
                void main() {}
              </ComputeShader>
            </Shader>
        "#;
        let shader = parser::parse(xml).unwrap();
        let Passes::Compute(passes) = &shader.passes else {
            panic!("expected compute passes")
        };
        let source = compute_source(&shader, &passes[0]);
        assert!(source.contains("local_size_x = 8"));
        assert!(source.contains("set = 0, binding = 0, rgba32f) uniform image2D target"));
    }
}
