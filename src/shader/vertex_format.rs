//! Reverse-engineers a mesh vertex format from a vertex shader's
//! `layout(location = N) in <type> <name>` declarations.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32Sfloat,
    R32G32B32A32Sfloat,
    R32Sint,
    R32G32Sint,
}

impl AttributeFormat {
    pub fn size(self) -> u32 {
        match self {
            AttributeFormat::R32Sfloat | AttributeFormat::R32Sint => 4,
            AttributeFormat::R32G32Sfloat | AttributeFormat::R32G32Sint => 8,
            AttributeFormat::R32G32B32Sfloat => 12,
            AttributeFormat::R32G32B32A32Sfloat => 16,
        }
    }

    fn from_glsl_type(glsl_type: &str) -> Option<Self> {
        Some(match glsl_type {
            "float" => AttributeFormat::R32Sfloat,
            "vec2" => AttributeFormat::R32G32Sfloat,
            "vec3" => AttributeFormat::R32G32B32Sfloat,
            "vec4" => AttributeFormat::R32G32B32A32Sfloat,
            "int" => AttributeFormat::R32Sint,
            "ivec2" => AttributeFormat::R32G32Sint,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub location: u32,
    pub name: String,
    pub format: AttributeFormat,
    pub byte_offset: u32,
    pub instanced: bool,
}

#[derive(Debug, Clone, Default)]
pub struct VertexFormat {
    pub attributes: Vec<VertexAttribute>,
    pub stride: u32,
}

static LAYOUT_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"layout\s*\(\s*location\s*=\s*(\d+)\s*\)\s*in\s+(\w+)\s+(\w+)").unwrap()
});

/// Scans `vertex_source` for `layout(location = N) in <type> <name>` tokens,
/// sorts by location, and assigns cumulative byte offsets for a tightly
/// packed, non-instanced vertex buffer.
pub fn reverse_engineer(vertex_source: &str) -> VertexFormat {
    let mut attributes: Vec<(u32, String, AttributeFormat)> = LAYOUT_IN
        .captures_iter(vertex_source)
        .filter_map(|caps| {
            let location: u32 = caps[1].parse().ok()?;
            let glsl_type = &caps[2];
            let name = caps[3].to_string();
            let format = AttributeFormat::from_glsl_type(glsl_type)?;
            Some((location, name, format))
        })
        .collect();

    attributes.sort_by_key(|(location, _, _)| *location);

    let mut offset = 0u32;
    let attributes = attributes
        .into_iter()
        .map(|(location, name, format)| {
            let attribute = VertexAttribute {
                location,
                name,
                format,
                byte_offset: offset,
                instanced: false,
            };
            offset += format.size();
            attribute
        })
        .collect();

    VertexFormat {
        attributes,
        stride: offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_ordered_by_location_with_cumulative_offsets() {
        let source = r#"
            #version 440
            layout(location = 1) in vec3 normal;
            layout(location = 0) in vec3 position;
            layout(location = 2) in vec2 uv;
            void main() {}
        "#;
        let format = reverse_engineer(source);
        assert_eq!(format.attributes.len(), 3);
        assert_eq!(format.attributes[0].name, "position");
        assert_eq!(format.attributes[0].byte_offset, 0);
        assert_eq!(format.attributes[1].name, "normal");
        assert_eq!(format.attributes[1].byte_offset, 12);
        assert_eq!(format.attributes[2].name, "uv");
        assert_eq!(format.attributes[2].byte_offset, 24);
        assert_eq!(format.stride, 32);
    }

    #[test]
    fn shader_without_inputs_yields_empty_format() {
        let format = reverse_engineer("void main() {}");
        assert!(format.attributes.is_empty());
        assert_eq!(format.stride, 0);
    }
}
