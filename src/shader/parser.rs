//! XML shader-description parsing: `<Shader>` → [`ShaderDescription`].
//!
//! Field byte offsets are computed cumulatively within their enclosing
//! buffer (or compound field); compound fields recurse and their own size
//! is the sum of their children's sizes times their element count.

use roxmltree::{Document, Node};

use crate::error::ShaderError;

use super::desc::*;
use super::hash::hash_pass_name;

pub fn parse(xml: &str) -> Result<ShaderDescription, ShaderError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();

    let name = attr(&root, "Name")?.to_string();

    let mut textures = Vec::new();
    let mut buffers = Vec::new();
    let mut next_binding = 0u32;

    if let Some(resources) = child(&root, "Resources") {
        for resource in resources.children().filter(Node::is_element) {
            if resource.tag_name().name() != "Resource" {
                continue;
            }
            let res_name = attr(&resource, "Name")?.to_string();
            let res_type = attr(&resource, "Type")?;
            let binding = next_binding;
            next_binding += 1;

            match res_type {
                "uniform_buffer" | "storage_buffer" => {
                    let shared = resource
                        .attribute("Shared")
                        .map(|v| v == "yes")
                        .unwrap_or(false);
                    let fields = parse_fields(&resource)?;
                    let size = fields.iter().map(total_field_size).sum();
                    buffers.push(BufferDesc {
                        name: res_name,
                        binding,
                        buffer_type: if res_type == "uniform_buffer" {
                            BufferType::Uniform
                        } else {
                            BufferType::Storage
                        },
                        size,
                        shared,
                        fields,
                    });
                }
                "texture2D" | "textureCube" | "storageImage" => {
                    let kind = match res_type {
                        "texture2D" => TextureType::Texture2d,
                        "textureCube" => TextureType::TextureCube,
                        "storageImage" => TextureType::StorageImage,
                        _ => unreachable!(),
                    };
                    let format = resource
                        .attribute("Format")
                        .map(parse_storage_format)
                        .transpose()?;
                    textures.push(TextureDesc {
                        name: res_name,
                        binding,
                        kind,
                        format,
                    });
                }
                other => return Err(ShaderError::UnknownResourceType(other.to_string())),
            }
        }
    }

    let pass_nodes: Vec<Node> = root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Pass")
        .collect();
    let compute_nodes: Vec<Node> = root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "ComputeShader")
        .collect();

    let passes = match (pass_nodes.is_empty(), compute_nodes.is_empty()) {
        (false, false) => return Err(ShaderError::MixedPassKinds),
        (true, true) => return Err(ShaderError::NoPasses),
        (false, true) => Passes::Graphics(
            pass_nodes
                .iter()
                .map(parse_graphics_pass)
                .collect::<Result<_, _>>()?,
        ),
        (true, false) => Passes::Compute(
            compute_nodes
                .iter()
                .map(parse_compute_pass)
                .collect::<Result<_, _>>()?,
        ),
    };

    Ok(ShaderDescription {
        name,
        textures,
        buffers,
        passes,
    })
}

fn total_field_size(field: &FieldDesc) -> u32 {
    let element_size = if field.field_type == FieldType::Compound {
        field.fields.iter().map(total_field_size).sum()
    } else {
        field.field_type.size()
    };
    element_size * field.count.max(1)
}

fn parse_fields(parent: &Node) -> Result<Vec<FieldDesc>, ShaderError> {
    let mut fields = Vec::new();
    let mut offset = 0u32;
    for node in parent.children().filter(Node::is_element) {
        if node.tag_name().name() != "Field" {
            continue;
        }
        let field = parse_field(&node, offset)?;
        offset += total_field_size(&field);
        fields.push(field);
    }
    Ok(fields)
}

fn parse_field(node: &Node, offset: u32) -> Result<FieldDesc, ShaderError> {
    let name = attr(node, "Name")?.to_string();
    let type_str = attr(node, "Type")?;
    let count = node
        .attribute("Count")
        .map(|v| v.parse::<u32>().unwrap_or(1))
        .unwrap_or(1);

    if type_str == "compound_type" {
        let fields = parse_fields(node)?;
        let size = fields.iter().map(total_field_size).sum();
        return Ok(FieldDesc {
            name,
            field_type: FieldType::Compound,
            byte_offset: offset,
            size,
            count,
            fields,
        });
    }

    let field_type = match type_str {
        "int" => FieldType::Int,
        "float" => FieldType::Float,
        "vec2" => FieldType::Vec2,
        "vec3" => FieldType::Vec3,
        "vec4" => FieldType::Vec4,
        "mat4" => FieldType::Mat4,
        other => return Err(ShaderError::UnknownFieldType(other.to_string())),
    };

    Ok(FieldDesc {
        name,
        size: field_type.size(),
        byte_offset: offset,
        field_type,
        count,
        fields: Vec::new(),
    })
}

fn parse_storage_format(value: &str) -> Result<StorageFormat, ShaderError> {
    Ok(match value {
        "RGBA8I" => StorageFormat::Rgba8I,
        "RGBA8UI" => StorageFormat::Rgba8Ui,
        "RGBA32I" => StorageFormat::Rgba32I,
        "RGBA32UI" => StorageFormat::Rgba32Ui,
        "RGBA32F" => StorageFormat::Rgba32F,
        other => return Err(ShaderError::UnknownFieldType(other.to_string())),
    })
}

fn parse_graphics_pass(node: &Node) -> Result<GraphicsPass, ShaderError> {
    let name = attr(node, "Name")?.to_string();
    let vertex_source = text_child(node, "VertexShader")?;
    let fragment_source = text_child(node, "FragmentShader")?;

    let mut pipeline = PipelineDesc::default();
    if let Some(zwrite) = child(node, "ZWrite") {
        pipeline.depth_write = zwrite.attribute("Value").unwrap_or("On") == "On";
    }
    if let Some(ztest) = child(node, "ZTest") {
        pipeline.depth_test = match ztest.attribute("Value").unwrap_or("LEqual") {
            "Never" => DepthTest::Never,
            "Always" => DepthTest::Always,
            "GEqual" => DepthTest::GreaterOrEqual,
            "Off" => DepthTest::Off,
            _ => DepthTest::LessOrEqual,
        };
    }
    if let Some(cull) = child(node, "Cull") {
        pipeline.cull_mode = match cull.attribute("Value").unwrap_or("Back") {
            "Front" => CullMode::Front,
            "Off" => CullMode::Off,
            _ => CullMode::Back,
        };
    }
    for blend in node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Blend")
    {
        if let Some(target) = blend.attribute("Target").and_then(|v| v.parse().ok()) {
            pipeline.blend_targets.push(target);
        }
    }

    Ok(GraphicsPass {
        hash: hash_pass_name(&name),
        name,
        vertex_source,
        fragment_source,
        pipeline,
    })
}

fn parse_compute_pass(node: &Node) -> Result<ComputePass, ShaderError> {
    let name = attr(node, "Name")?.to_string();
    let source = node.text().unwrap_or_default().trim().to_string();
    let local_size = [
        attr(node, "LocalSizeX")?.parse().unwrap_or(1),
        attr(node, "LocalSizeY")?.parse().unwrap_or(1),
        attr(node, "LocalSizeZ")?.parse().unwrap_or(1),
    ];

    Ok(ComputePass {
        hash: hash_pass_name(&name),
        name,
        source,
        local_size,
    })
}

fn attr<'a>(node: &'a Node, name: &str) -> Result<&'a str, ShaderError> {
    node.attribute(name)
        .ok_or_else(|| ShaderError::MissingAttribute(name.to_string()))
}

fn child<'a, 'input>(node: &'a Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn text_child(node: &Node, name: &str) -> Result<String, ShaderError> {
    let found = child(node, name).ok_or_else(|| ShaderError::MissingAttribute(name.to_string()))?;
    Ok(found.text().unwrap_or_default().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLOBALS_SHADER: &str = r#"
        <Shader Name="Test" Version="440">
          <Resources>
            <Resource Name="globals" Type="uniform_buffer">
              <Field Name="color" Type="vec4"/>
              <Field Name="intensity" Type="float"/>
            </Resource>
          </Resources>
          <Pass Name="Opaque">
            <VertexShader>void main() {}</VertexShader>
            <FragmentShader>void main() {}</FragmentShader>
          </Pass>
        </Shader>
    "#;

    #[test]
    fn buffer_field_offsets_are_cumulative() {
        let shader = parse(GLOBALS_SHADER).unwrap();
        let globals = shader.buffer_named("globals").unwrap();
        assert_eq!(globals.size, 20);

        let color = globals.field("color").unwrap();
        assert_eq!(color.byte_offset, 0);
        assert_eq!(color.size, 16);

        let intensity = globals.field("intensity").unwrap();
        assert_eq!(intensity.byte_offset, 16);
        assert_eq!(intensity.size, 4);

        assert!(globals.field("missing").is_none());
    }

    #[test]
    fn graphics_pass_is_indexed_by_hash() {
        let shader = parse(GLOBALS_SHADER).unwrap();
        assert!(!shader.is_compute());
        assert_eq!(shader.pass_index_from_name("Opaque"), Some(0));
        assert_eq!(shader.pass_index_from_name("Missing"), None);
    }

    #[test]
    fn compute_pass_sets_local_group_size() {
        let xml = r#"
            <Shader Name="Blur" Version="440">
              <ComputeShader Name="Main" LocalSizeX="8" LocalSizeY="8" LocalSizeZ="1">
                void main() {}
              </ComputeShader>
            </Shader>
        "#;
        let shader = parse(xml).unwrap();
        assert!(shader.is_compute());
        match &shader.passes {
            Passes::Compute(passes) => {
                assert_eq!(passes[0].local_size, [8, 8, 1]);
            }
            _ => panic!("expected compute passes"),
        }
    }

    #[test]
    fn mixing_passes_and_compute_is_rejected() {
        let xml = r#"
            <Shader Name="Bad" Version="440">
              <Pass Name="Opaque">
                <VertexShader>void main(){}</VertexShader>
                <FragmentShader>void main(){}</FragmentShader>
              </Pass>
              <ComputeShader Name="Main" LocalSizeX="1" LocalSizeY="1" LocalSizeZ="1">
                void main(){}
              </ComputeShader>
            </Shader>
        "#;
        assert!(matches!(parse(xml), Err(ShaderError::MixedPassKinds)));
    }

    #[test]
    fn compound_field_offsets_account_for_nested_size() {
        let xml = r#"
            <Shader Name="Test" Version="440">
              <Resources>
                <Resource Name="lights" Type="uniform_buffer">
                  <Field Name="point" Type="compound_type">
                    <Field Name="position" Type="vec3"/>
                    <Field Name="radius" Type="float"/>
                  </Field>
                  <Field Name="count" Type="int"/>
                </Resource>
              </Resources>
              <Pass Name="Opaque">
                <VertexShader>void main(){}</VertexShader>
                <FragmentShader>void main(){}</FragmentShader>
              </Pass>
            </Shader>
        "#;
        let shader = parse(xml).unwrap();
        let lights = shader.buffer_named("lights").unwrap();
        let point = lights.field("point").unwrap();
        assert_eq!(point.byte_offset, 0);
        assert_eq!(point.size, 16); // vec3 (12) + float (4)
        let count = lights.field("count").unwrap();
        assert_eq!(count.byte_offset, 16);
    }
}
