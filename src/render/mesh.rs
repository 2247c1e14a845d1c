//! Immutable bundle of vertex/index buffers plus the data needed to draw
//! and (optionally) animate a mesh.

use cgmath::{Matrix4, Point3};

use crate::core::handle::Handle;
use crate::shader::vertex_format::VertexFormat;
use crate::vertex_data::VertexFull;
use crate::vulkano_objects::buffers::MeshBuffers;

/// Meshes in this crate share one concrete vertex layout; a shader's own
/// vertex attributes are reverse-engineered separately and matched against
/// it at pipeline-creation time.
pub type MeshHandle = Handle<Mesh<VertexFull>>;

#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

/// One bone's keyframed local TRS across an animation's frames, flattened
/// into a single array (`frame_count` entries).
#[derive(Debug, Clone)]
pub struct BoneTrack {
    pub keys: Vec<Matrix4<f32>>,
}

#[derive(Debug, Clone)]
pub struct Animation {
    pub frame_count: u32,
    pub node_count: u32,
    pub duration_ms: f32,
    pub bone_tracks: Vec<BoneTrack>,
}

#[derive(Debug, Clone)]
pub struct Skeleton {
    pub bones: Vec<Handle<Matrix4<f32>>>,
    pub inverse_bind: Vec<Matrix4<f32>>,
    pub root_inverse_transform: Matrix4<f32>,
}

/// Owns the GPU buffers for a drawable mesh until explicitly destroyed.
pub struct Mesh<V: vulkano::pipeline::graphics::vertex_input::Vertex + vulkano::buffer::BufferContents> {
    pub buffers: MeshBuffers<V>,
    pub aabb: Aabb,
    pub vertex_format: VertexFormat,
    pub skeleton: Option<Skeleton>,
    pub animations: Vec<Animation>,
}

impl<V: vulkano::pipeline::graphics::vertex_input::Vertex + vulkano::buffer::BufferContents> Mesh<V> {
    pub fn new(buffers: MeshBuffers<V>, aabb: Aabb, vertex_format: VertexFormat) -> Self {
        Mesh {
            buffers,
            aabb,
            vertex_format,
            skeleton: None,
            animations: Vec::new(),
        }
    }

    pub fn with_skeleton(mut self, skeleton: Skeleton, animations: Vec<Animation>) -> Self {
        self.skeleton = Some(skeleton);
        self.animations = animations;
        self
    }

    pub fn is_skinned(&self) -> bool {
        self.skeleton.is_some()
    }
}
