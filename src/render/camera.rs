//! View/projection matrices and the per-frame uniform buffer they populate.
//!
//! `cull` is presently a pass-through: every actor is reported visible. A
//! production frustum cull is an open design question left to whoever
//! specializes this renderer (orbiting/free camera controllers are likewise
//! left to the application, same as the source's `samples/` layer).

use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix};
use vulkano::buffer::{BufferContents, Subbuffer};
use vulkano::descriptor_set::layout::DescriptorSetLayout;
use vulkano::descriptor_set::{PersistentDescriptorSet, WriteDescriptorSet};

use crate::core::handle::Handle;
use crate::vulkano_objects::allocators::Allocators;
use crate::vulkano_objects::buffers::create_material_buffer;

use super::render_object::Actor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective { fov_y: cgmath::Rad<f32>, aspect: f32 },
    Orthographic { half_width: f32, half_height: f32 },
}

#[derive(BufferContents, Clone, Copy)]
#[repr(C)]
pub struct CameraUniforms {
    pub world_to_view: [[f32; 4]; 4],
    pub view_to_world: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub projection_inverse: [[f32; 4]; 4],
}

pub struct Camera {
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
    pub world_to_view: Matrix4<f32>,
    pub view_to_world: Matrix4<f32>,
    visible_actors: Vec<Handle<Actor>>,
    uniform_buffer: Option<Subbuffer<CameraUniforms>>,
    descriptor_set: Option<Arc<PersistentDescriptorSet>>,
}

impl Camera {
    pub fn new(projection: Projection, near: f32, far: f32) -> Self {
        Camera {
            projection,
            near,
            far,
            world_to_view: Matrix4::identity(),
            view_to_world: Matrix4::identity(),
            visible_actors: Vec::new(),
            uniform_buffer: None,
            descriptor_set: None,
        }
    }

    fn projection_matrix(&self) -> Matrix4<f32> {
        match self.projection {
            Projection::Perspective { fov_y, aspect } => {
                cgmath::perspective(fov_y, aspect, self.near, self.far)
            }
            Projection::Orthographic {
                half_width,
                half_height,
            } => cgmath::ortho(
                -half_width,
                half_width,
                -half_height,
                half_height,
                self.near,
                self.far,
            ),
        }
    }

    /// Rebuilds the projection matrix, inverts it and the view matrix,
    /// and uploads the pair plus their inverses to the per-frame uniform
    /// buffer, creating it (and the descriptor set) on first use.
    pub fn update(&mut self, allocators: &Allocators, layout: Arc<DescriptorSetLayout>) {
        let projection = self.projection_matrix();
        let projection_inverse = projection.invert().unwrap_or(Matrix4::identity());

        let uniforms = CameraUniforms {
            world_to_view: self.world_to_view.into(),
            view_to_world: self.view_to_world.into(),
            projection: projection.into(),
            projection_inverse: projection_inverse.into(),
        };

        match &self.uniform_buffer {
            Some(buffer) => {
                let mut guard = buffer.write().expect("camera uniform buffer host write");
                *guard = uniforms;
            }
            None => {
                let buffer = create_material_buffer(
                    allocators,
                    uniforms,
                    vulkano::buffer::BufferUsage::UNIFORM_BUFFER,
                );
                let set = PersistentDescriptorSet::new(
                    &allocators.descriptor_set,
                    layout,
                    [WriteDescriptorSet::buffer(0, buffer.clone())],
                    [],
                )
                .expect("camera descriptor set allocation");
                self.uniform_buffer = Some(buffer);
                self.descriptor_set = Some(set);
            }
        }
    }

    pub fn descriptor_set(&self) -> Option<Arc<PersistentDescriptorSet>> {
        self.descriptor_set.clone()
    }

    /// Pass-through: reports every actor visible. See module docs.
    pub fn cull(&mut self, actors: &[Handle<Actor>]) {
        self.visible_actors.clear();
        self.visible_actors.extend_from_slice(actors);
    }

    pub fn visible_actors(&self) -> &[Handle<Actor>] {
        &self.visible_actors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthographic_projection_is_self_inverse_symmetric() {
        let camera = Camera::new(
            Projection::Orthographic {
                half_width: 1.0,
                half_height: 1.0,
            },
            0.1,
            100.0,
        );
        let m = camera.projection_matrix();
        let inv = m.invert().unwrap();
        let identity = m * inv;
        assert!((identity.x.x - 1.0).abs() < 1e-4);
        assert!((identity.y.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn cull_is_pass_through() {
        let mut camera = Camera::new(
            Projection::Perspective {
                fov_y: cgmath::Rad(1.0),
                aspect: 1.0,
            },
            0.1,
            100.0,
        );
        let actors = vec![Handle::<Actor>::NULL, Handle::<Actor>::NULL];
        camera.cull(&actors);
        assert_eq!(camera.visible_actors().len(), 2);
    }
}
