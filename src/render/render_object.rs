//! Actors: named bindings of a mesh, a transform, and a material, with
//! their own per-object uniform buffer and descriptor set.

use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix};
use vulkano::buffer::{BufferContents, Subbuffer};
use vulkano::descriptor_set::layout::DescriptorSetLayout;
use vulkano::descriptor_set::{PersistentDescriptorSet, WriteDescriptorSet};

use crate::core::handle::Handle;
use crate::vulkano_objects::allocators::Allocators;
use crate::vulkano_objects::buffers::create_material_buffer;

use super::material::Material;
use super::mesh::MeshHandle;

#[derive(BufferContents, Clone, Copy)]
#[repr(C)]
pub struct ObjectUniforms {
    pub world: [[f32; 4]; 4],
}

/// A named entity referencing a mesh, a transform, and a material, drawn
/// `instance_count` times per submission.
pub struct Actor {
    name: String,
    mesh: MeshHandle,
    transform: Handle<Matrix4<f32>>,
    material: Handle<Material>,
    instance_count: u32,
    uniform_buffer: Subbuffer<ObjectUniforms>,
    descriptor_set: Arc<PersistentDescriptorSet>,
}

impl Actor {
    /// Creates the actor's owned per-object uniform buffer and descriptor
    /// set up front; both live for the actor's whole lifetime (the "per
    /// object" set never needs the lazy-create/dirty dance a material's
    /// pass sets do, since there is exactly one of each per actor).
    pub fn new(
        allocators: &Allocators,
        layout: Arc<DescriptorSetLayout>,
        name: impl Into<String>,
        mesh: MeshHandle,
        transform: Handle<Matrix4<f32>>,
        material: Handle<Material>,
        instance_count: u32,
    ) -> Self {
        assert!(instance_count >= 1, "actor must draw at least one instance");

        let uniform_buffer = create_material_buffer(
            allocators,
            ObjectUniforms {
                world: Matrix4::identity().into(),
            },
            vulkano::buffer::BufferUsage::UNIFORM_BUFFER,
        );
        let descriptor_set = PersistentDescriptorSet::new(
            &allocators.descriptor_set,
            layout,
            [WriteDescriptorSet::buffer(0, uniform_buffer.clone())],
            [],
        )
        .expect("actor descriptor set allocation");

        Actor {
            name: name.into(),
            mesh,
            transform,
            material,
            instance_count,
            uniform_buffer,
            descriptor_set,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> MeshHandle {
        self.mesh
    }

    pub fn transform(&self) -> Handle<Matrix4<f32>> {
        self.transform
    }

    pub fn material(&self) -> Handle<Material> {
        self.material
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn set_instance_count(&mut self, count: u32) {
        assert!(count >= 1, "actor must draw at least one instance");
        self.instance_count = count;
    }

    pub fn descriptor_set(&self) -> Arc<PersistentDescriptorSet> {
        self.descriptor_set.clone()
    }

    /// Uploads the transform manager's current world matrix for this
    /// actor's transform to its uniform buffer.
    pub fn update_world_matrix(&self, world: Matrix4<f32>) {
        let mut guard = self
            .uniform_buffer
            .write()
            .expect("actor uniform buffer host write");
        guard.world = world.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_count_must_be_at_least_one() {
        let result = std::panic::catch_unwind(|| {
            let mut count = 1u32;
            assert!(count >= 1);
            count = 0;
            assert!(count >= 1, "actor must draw at least one instance");
        });
        assert!(result.is_err());
    }
}
