//! Parsed representation of a declarative shader description: resource
//! descriptors shared by every pass, plus one or more graphics or compute
//! passes (never mixed within one shader).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    Texture1d,
    Texture2d,
    TextureCube,
    TextureArray,
    StorageImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFormat {
    Rgba8I,
    Rgba8Ui,
    Rgba32I,
    Rgba32Ui,
    Rgba32F,
}

impl StorageFormat {
    pub fn glsl_qualifier(self) -> &'static str {
        match self {
            StorageFormat::Rgba8I => "rgba8i",
            StorageFormat::Rgba8Ui => "rgba8ui",
            StorageFormat::Rgba32I => "rgba32i",
            StorageFormat::Rgba32Ui => "rgba32ui",
            StorageFormat::Rgba32F => "rgba32f",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub name: String,
    pub binding: u32,
    pub kind: TextureType,
    pub format: Option<StorageFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Compound,
}

impl FieldType {
    pub fn size(self) -> u32 {
        match self {
            FieldType::Int | FieldType::Float => 4,
            FieldType::Vec2 => 8,
            FieldType::Vec3 => 12,
            FieldType::Vec4 => 16,
            FieldType::Mat4 => 64,
            FieldType::Compound => 0,
        }
    }

    pub fn glsl_type(self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Vec2 => "vec2",
            FieldType::Vec3 => "vec3",
            FieldType::Vec4 => "vec4",
            FieldType::Mat4 => "mat4",
            FieldType::Compound => "struct",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: String,
    pub field_type: FieldType,
    pub byte_offset: u32,
    /// Size of one element, in bytes (for compound fields, the size of the
    /// generated struct).
    pub size: u32,
    /// 0 denotes an unbounded array (`field[]`); >= 1 a fixed-size array;
    /// absent (1 stored) means "not an array".
    pub count: u32,
    pub fields: Vec<FieldDesc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    Uniform,
    Storage,
}

#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub name: String,
    pub binding: u32,
    pub buffer_type: BufferType,
    pub size: u32,
    pub shared: bool,
    pub fields: Vec<FieldDesc>,
}

impl BufferDesc {
    /// Finds the field named `field_name` directly under this buffer
    /// (not recursing into compound sub-fields — matches `setProperty`'s
    /// "bufferName.fieldName" contract).
    pub fn field(&self, field_name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.name == field_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthTest {
    Never,
    Less,
    LessOrEqual,
    GreaterOrEqual,
    Always,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    Front,
    Back,
    Off,
}

#[derive(Debug, Clone)]
pub struct PipelineDesc {
    pub depth_write: bool,
    pub depth_test: DepthTest,
    pub cull_mode: CullMode,
    /// Blend enabled per color output attachment (indexed by target number).
    pub blend_targets: Vec<u32>,
}

impl Default for PipelineDesc {
    fn default() -> Self {
        PipelineDesc {
            depth_write: true,
            depth_test: DepthTest::LessOrEqual,
            cull_mode: CullMode::Back,
            blend_targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphicsPass {
    pub name: String,
    pub hash: u64,
    pub vertex_source: String,
    pub fragment_source: String,
    pub pipeline: PipelineDesc,
}

#[derive(Debug, Clone)]
pub struct ComputePass {
    pub name: String,
    pub hash: u64,
    pub source: String,
    pub local_size: [u32; 3],
}

#[derive(Debug, Clone)]
pub enum Passes {
    Graphics(Vec<GraphicsPass>),
    Compute(Vec<ComputePass>),
}

impl Passes {
    pub fn len(&self) -> usize {
        match self {
            Passes::Graphics(v) => v.len(),
            Passes::Compute(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_of_hash(&self, hash: u64) -> Option<usize> {
        match self {
            Passes::Graphics(v) => v.iter().position(|p| p.hash == hash),
            Passes::Compute(v) => v.iter().position(|p| p.hash == hash),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShaderDescription {
    pub name: String,
    pub textures: Vec<TextureDesc>,
    pub buffers: Vec<BufferDesc>,
    pub passes: Passes,
}

impl ShaderDescription {
    pub fn is_compute(&self) -> bool {
        matches!(self.passes, Passes::Compute(_))
    }

    pub fn pass_index_from_name(&self, name: &str) -> Option<usize> {
        self.passes.index_of_hash(super::hash::hash_pass_name(name))
    }

    pub fn buffer_named(&self, name: &str) -> Option<&BufferDesc> {
        self.buffers.iter().find(|b| b.name == name)
    }

    pub fn texture_named(&self, name: &str) -> Option<&TextureDesc> {
        self.textures.iter().find(|t| t.name == name)
    }
}
