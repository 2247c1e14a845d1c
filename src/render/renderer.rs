//! The renderer facade: owns every registry, the transform manager, the
//! global descriptor layouts, the command pools, and the worker thread
//! pool, and drives the per-frame sequence described in the module docs.

use std::sync::Arc;

use cgmath::SquareMatrix;
use vulkano::command_buffer::allocator::StandardCommandBufferAllocator;
use vulkano::command_buffer::PrimaryAutoCommandBuffer;
use vulkano::descriptor_set::layout::{
    DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType,
};
use vulkano::descriptor_set::PersistentDescriptorSet;
use vulkano::device::{Device, Queue};
use vulkano::format::Format;
use vulkano::image::Image;
use vulkano::pipeline::graphics::GraphicsPipeline;
use vulkano::pipeline::ComputePipeline;
use vulkano::shader::ShaderStages;

use crate::core::handle::{Handle, PackedFreelist};
use crate::core::thread_pool::ThreadPool;
use crate::core::transform::TransformManager;
use crate::shader::Shader;
use crate::vertex_data::VertexFull;
use crate::vulkano_objects::allocators::Allocators;
use crate::vulkano_objects::buffers::MeshBuffers;

use super::camera::Camera;
use super::framebuffer::Framebuffer;
use super::material::{ComputeMaterial, Material, MaterialCore};
use super::mesh::{Mesh, MeshHandle};
use super::pipeline_cache::PipelineCache;
use super::render_object::Actor;
use super::render_target::RenderTarget;

pub const COMMAND_POOL_COUNT: usize = 8;
const WORKER_THREAD_COUNT: usize = 8;

/// Non-Vulkan knobs a caller can override before [`Renderer::new`];
/// `worker_threads` defaults to the host's core count the way the source's
/// `THREAD_COUNT` constant is overridden by deployments that care.
pub struct RendererConfig {
    pub worker_threads: usize,
    pub back_buffer_extent: [u32; 2],
    pub back_buffer_format: Format,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(WORKER_THREAD_COUNT),
            back_buffer_extent: [1280, 720],
            back_buffer_format: Format::R8G8B8A8_UNORM,
        }
    }
}

pub struct Renderer {
    device: Arc<Device>,
    graphics_queue: Arc<Queue>,
    compute_queue: Arc<Queue>,
    allocators: Allocators,
    command_pools: Vec<StandardCommandBufferAllocator>,
    thread_pool: ThreadPool,

    transform_manager: TransformManager,

    shaders: PackedFreelist<Shader>,
    materials: PackedFreelist<Material>,
    compute_materials: PackedFreelist<ComputeMaterial>,
    render_targets: PackedFreelist<RenderTarget>,
    framebuffers: PackedFreelist<Framebuffer>,
    meshes: PackedFreelist<Mesh<VertexFull>>,
    actors: PackedFreelist<Actor>,
    cameras: PackedFreelist<Camera>,

    pipeline_cache: PipelineCache,
    per_frame_layout: Arc<DescriptorSetLayout>,
    per_object_layout: Arc<DescriptorSetLayout>,

    active_camera: Handle<Camera>,
    root_actor: Handle<Actor>,
    back_buffer_target: Handle<RenderTarget>,
    back_buffer_framebuffer: Handle<Framebuffer>,
    texture_blit_shader: Handle<Shader>,
    texture_blit_material: Handle<Material>,

    /// Released this frame; not yet safe to drop since the GPU may still be
    /// reading them. Promoted to `retiring_command_buffers` at the next
    /// present, which is when the *previous* frame's batch is dropped.
    released_command_buffers: Vec<Arc<PrimaryAutoCommandBuffer>>,
    retiring_command_buffers: Vec<Arc<PrimaryAutoCommandBuffer>>,
}

fn layout(device: Arc<Device>, descriptor_type: DescriptorType, stages: ShaderStages) -> Arc<DescriptorSetLayout> {
    let mut binding = DescriptorSetLayoutBinding::descriptor_type(descriptor_type);
    binding.stages = stages;
    DescriptorSetLayout::new(
        device,
        DescriptorSetLayoutCreateInfo {
            bindings: [(0, binding)].into(),
            ..Default::default()
        },
    )
    .expect("descriptor set layout creation")
}

impl Renderer {
    /// Builds every registry, the two fixed descriptor-set layouts,
    /// `COMMAND_POOL_COUNT` command pools, the worker thread pool, the
    /// back-buffer render target + framebuffer, and the reserved root
    /// actor (a fullscreen quad bound to the built-in texture-blit
    /// material).
    pub fn new(
        device: Arc<Device>,
        graphics_queue: Arc<Queue>,
        compute_queue: Arc<Queue>,
        config: &RendererConfig,
    ) -> Self {
        log::info!(
            "creating renderer: {} command pools, {} worker threads, back buffer {}x{}",
            COMMAND_POOL_COUNT,
            config.worker_threads,
            config.back_buffer_extent[0],
            config.back_buffer_extent[1],
        );

        let allocators = Allocators::new(device.clone());
        let command_pools = (0..COMMAND_POOL_COUNT)
            .map(|_| StandardCommandBufferAllocator::new(device.clone(), Default::default()))
            .collect();
        let thread_pool = ThreadPool::new(config.worker_threads.max(1));

        let per_frame_layout = layout(
            device.clone(),
            DescriptorType::UniformBuffer,
            ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        );
        let per_object_layout = layout(
            device.clone(),
            DescriptorType::UniformBuffer,
            ShaderStages::VERTEX,
        );

        let mut render_targets = PackedFreelist::new();
        let back_buffer_target = render_targets.add(RenderTarget::new(
            &allocators,
            config.back_buffer_extent[0],
            config.back_buffer_extent[1],
            config.back_buffer_format,
            true,
        ));

        let mut framebuffers = PackedFreelist::new();
        let back_buffer_framebuffer = framebuffers.add(Framebuffer::new(
            device.clone(),
            &render_targets,
            &[back_buffer_target],
        ));

        let mut shaders = PackedFreelist::new();
        let texture_blit_shader = shaders.add(
            Shader::from_xml(TEXTURE_BLIT_SHADER_XML).expect("built-in texture-blit shader parses"),
        );

        let mut materials = PackedFreelist::new();
        let texture_blit_material = {
            let shader_ref = shaders.get(texture_blit_shader).unwrap();
            materials.add(Material::new(texture_blit_shader, shader_ref))
        };

        let mut meshes = PackedFreelist::new();
        let quad_mesh = meshes.add(fullscreen_quad_mesh(&allocators, graphics_queue.clone()));

        let mut transform_manager = TransformManager::new();
        let root_transform = transform_manager.create_transform(cgmath::Matrix4::identity());

        let mut actors = PackedFreelist::new();
        let root_actor = actors.add(Actor::new(
            &allocators,
            per_object_layout.clone(),
            "root",
            quad_mesh,
            root_transform,
            texture_blit_material,
            1,
        ));

        Renderer {
            device,
            graphics_queue,
            compute_queue,
            allocators,
            command_pools,
            thread_pool,
            transform_manager,
            shaders,
            materials,
            compute_materials: PackedFreelist::new(),
            render_targets,
            framebuffers,
            meshes,
            actors,
            cameras: PackedFreelist::new(),
            pipeline_cache: PipelineCache::new(),
            per_frame_layout,
            per_object_layout,
            active_camera: Handle::NULL,
            root_actor,
            back_buffer_target,
            back_buffer_framebuffer,
            texture_blit_shader,
            texture_blit_material,
            released_command_buffers: Vec::new(),
            retiring_command_buffers: Vec::new(),
        }
    }

    pub fn device(&self) -> Arc<Device> {
        self.device.clone()
    }

    pub fn graphics_queue(&self) -> Arc<Queue> {
        self.graphics_queue.clone()
    }

    pub fn compute_queue(&self) -> Arc<Queue> {
        self.compute_queue.clone()
    }

    pub fn allocators(&self) -> &Allocators {
        &self.allocators
    }

    pub fn command_pool_allocator(&self, index: usize) -> &StandardCommandBufferAllocator {
        &self.command_pools[index % COMMAND_POOL_COUNT]
    }

    pub fn thread_pool(&self) -> &ThreadPool {
        &self.thread_pool
    }

    pub fn per_frame_layout(&self) -> Arc<DescriptorSetLayout> {
        self.per_frame_layout.clone()
    }

    pub fn per_object_layout(&self) -> Arc<DescriptorSetLayout> {
        self.per_object_layout.clone()
    }

    pub fn root_actor(&self) -> Handle<Actor> {
        self.root_actor
    }

    pub fn back_buffer(&self) -> Handle<Framebuffer> {
        self.back_buffer_framebuffer
    }

    pub fn texture_blit_material(&self) -> Handle<Material> {
        self.texture_blit_material
    }

    // --- registry CRUD -----------------------------------------------

    pub fn create_shader(&mut self, xml: &str) -> Result<Handle<Shader>, crate::error::ShaderError> {
        Shader::from_xml(xml).map(|shader| self.shaders.add(shader))
    }

    pub fn get_shader(&self, handle: Handle<Shader>) -> Option<&Shader> {
        self.shaders.get(handle)
    }

    pub fn destroy_shader(&mut self, handle: Handle<Shader>) -> bool {
        self.shaders.remove(handle)
    }

    pub fn create_material(&mut self, shader: Handle<Shader>) -> Option<Handle<Material>> {
        let shader_ref = self.shaders.get(shader)?;
        Some(self.materials.add(Material::new(shader, shader_ref)))
    }

    pub fn get_material(&self, handle: Handle<Material>) -> Option<&Material> {
        self.materials.get(handle)
    }

    pub fn get_material_mut(&mut self, handle: Handle<Material>) -> Option<&mut Material> {
        self.materials.get_mut(handle)
    }

    pub fn destroy_material(&mut self, handle: Handle<Material>) -> bool {
        self.materials.remove(handle)
    }

    pub fn create_compute_material(&mut self, shader: Handle<Shader>) -> Option<Handle<ComputeMaterial>> {
        let shader_ref = self.shaders.get(shader)?;
        Some(
            self.compute_materials
                .add(ComputeMaterial::new(shader, shader_ref)),
        )
    }

    pub fn destroy_compute_material(&mut self, handle: Handle<ComputeMaterial>) -> bool {
        self.compute_materials.remove(handle)
    }

    pub fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: Format,
        with_depth: bool,
    ) -> Handle<RenderTarget> {
        self.render_targets
            .add(RenderTarget::new(&self.allocators, width, height, format, with_depth))
    }

    pub fn destroy_render_target(&mut self, handle: Handle<RenderTarget>) -> bool {
        self.render_targets.remove(handle)
    }

    pub fn create_framebuffer(&mut self, color_targets: &[Handle<RenderTarget>]) -> Handle<Framebuffer> {
        self.framebuffers.add(Framebuffer::new(
            self.device.clone(),
            &self.render_targets,
            color_targets,
        ))
    }

    pub fn destroy_framebuffer(&mut self, handle: Handle<Framebuffer>) -> bool {
        self.framebuffers.remove(handle)
    }

    pub fn add_mesh(&mut self, mesh: Mesh<VertexFull>) -> MeshHandle {
        self.meshes.add(mesh)
    }

    pub fn destroy_mesh(&mut self, handle: MeshHandle) -> bool {
        self.meshes.remove(handle)
    }

    pub fn create_actor(
        &mut self,
        name: &str,
        mesh: MeshHandle,
        material: Handle<Material>,
        instance_count: u32,
    ) -> Handle<Actor> {
        let transform = self
            .transform_manager
            .create_transform(cgmath::Matrix4::identity());
        self.actors.add(Actor::new(
            &self.allocators,
            self.per_object_layout.clone(),
            name,
            mesh,
            transform,
            material,
            instance_count,
        ))
    }

    pub fn get_actor(&self, handle: Handle<Actor>) -> Option<&Actor> {
        self.actors.get(handle)
    }

    /// Destroys `handle`'s transform along with the actor itself.
    pub fn destroy_actor(&mut self, handle: Handle<Actor>) -> bool {
        let Some(actor) = self.actors.get(handle) else {
            return false;
        };
        self.transform_manager.destroy_transform(actor.transform());
        self.actors.remove(handle)
    }

    pub fn find_actor(&self, name: &str) -> Option<Handle<Actor>> {
        self.actors
            .handles()
            .find(|&h| self.actors.get(h).map(|a| a.name() == name).unwrap_or(false))
    }

    pub fn all_actors(&self) -> impl Iterator<Item = Handle<Actor>> + '_ {
        self.actors.handles()
    }

    pub fn actor_set_parent(&mut self, actor: Handle<Actor>, parent: Handle<Actor>) {
        let (Some(child_transform), Some(parent_transform)) = (
            self.actors.get(actor).map(Actor::transform),
            self.actors.get(parent).map(Actor::transform),
        ) else {
            return;
        };
        self.transform_manager.set_parent(child_transform, parent_transform);
    }

    pub fn actor_set_transform(&mut self, actor: Handle<Actor>, local: cgmath::Matrix4<f32>) {
        let Some(transform) = self.actors.get(actor).map(Actor::transform) else {
            return;
        };
        self.transform_manager.set_local(transform, local);
    }

    pub fn add_camera(&mut self, camera: Camera) -> Handle<Camera> {
        self.cameras.add(camera)
    }

    pub fn get_camera_mut(&mut self, handle: Handle<Camera>) -> Option<&mut Camera> {
        self.cameras.get_mut(handle)
    }

    pub fn destroy_camera(&mut self, handle: Handle<Camera>) -> bool {
        self.cameras.remove(handle)
    }

    /// Activates `handle` as the active camera, runs its culling pass over
    /// every live actor, and uploads its view/projection uniforms.
    pub fn setup_camera(&mut self, handle: Handle<Camera>) {
        self.active_camera = handle;
        let actors: Vec<_> = self.actors.handles().collect();
        let layout = self.per_frame_layout.clone();
        if let Some(camera) = self.cameras.get_mut(handle) {
            camera.cull(&actors);
            camera.update(&self.allocators, layout);
        }
    }

    pub fn get_visible_actors(&self, camera: Handle<Camera>) -> &[Handle<Actor>] {
        self.cameras
            .get(camera)
            .map(Camera::visible_actors)
            .unwrap_or(&[])
    }

    pub fn queue_for_release(&mut self, command_buffer: Option<Arc<PrimaryAutoCommandBuffer>>) {
        if let Some(cb) = command_buffer {
            self.released_command_buffers.push(cb);
        }
    }

    // --- per-frame sequence --------------------------------------------

    /// Step 1-2 of the per-frame sequence: advance the transform hierarchy
    /// and push each live actor's new world matrix to its uniform buffer.
    pub fn update(&mut self) {
        self.transform_manager.update();
        for handle in self.actors.handles().collect::<Vec<_>>() {
            let actor = self.actors.get(handle).unwrap();
            let world = self
                .transform_manager
                .get_world_matrix(actor.transform())
                .copied()
                .unwrap_or_else(cgmath::Matrix4::identity);
            actor.update_world_matrix(world);
        }
    }

    /// Step 5: wait for the compute queue to idle, present is the
    /// swapchain's job (owned by the application, not this facade), then
    /// destroy the command buffers released by the *prior* frame — this
    /// frame's own releases aren't dropped until the next present, since the
    /// GPU may still be executing them.
    pub fn present_frame(&mut self) {
        self.compute_queue
            .with(|mut guard| unsafe { guard.wait_idle() })
            .expect("compute queue wait idle");
        self.retiring_command_buffers.clear();
        self.retiring_command_buffers = std::mem::take(&mut self.released_command_buffers);
    }

    // --- resolution helpers used by `command_buffer` -------------------

    pub fn resolve_framebuffer(&self, handle: Option<Handle<Framebuffer>>) -> &Framebuffer {
        let handle = handle.unwrap_or(self.back_buffer_framebuffer);
        self.framebuffers.get(handle).expect("valid framebuffer handle")
    }

    pub fn actor_draw_data(
        &self,
        actor: Handle<Actor>,
    ) -> Option<(MeshHandle, Handle<Material>, u32, Arc<PersistentDescriptorSet>, cgmath::Matrix4<f32>)> {
        let actor = self.actors.get(actor)?;
        let world = self
            .transform_manager
            .get_world_matrix(actor.transform())
            .copied()
            .unwrap_or_else(cgmath::Matrix4::identity);
        Some((
            actor.mesh(),
            actor.material(),
            actor.instance_count(),
            actor.descriptor_set(),
            world,
        ))
    }

    pub fn material_pass_index(&self, material: Handle<Material>, pass_name: &str) -> Option<usize> {
        let material = self.materials.get(material)?;
        let shader = self.shaders.get(material.shader())?;
        shader.pass_index_from_name(pass_name)
    }

    pub fn graphics_pipeline_for(
        &mut self,
        material: Handle<Material>,
        pass_index: usize,
        framebuffer: Option<Handle<Framebuffer>>,
    ) -> Option<Arc<GraphicsPipeline>> {
        let material_ref = self.materials.get(material)?;
        let shader_handle = material_ref.shader();
        let shader = self.shaders.get(shader_handle)?;
        let fb_handle = framebuffer.unwrap_or(self.back_buffer_framebuffer);
        let framebuffer_ref = self.framebuffers.get(fb_handle)?;
        let extent = [
            self.render_targets.get(framebuffer_ref.color_targets[0])?.width,
            self.render_targets.get(framebuffer_ref.color_targets[0])?.height,
        ];
        Some(self.pipeline_cache.graphics_pipeline(
            self.device.clone(),
            shader_handle,
            shader,
            pass_index,
            fb_handle,
            framebuffer_ref,
            extent,
        ))
    }

    pub fn active_camera_descriptor_set(&self) -> Option<Arc<PersistentDescriptorSet>> {
        self.cameras.get(self.active_camera)?.descriptor_set()
    }

    /// Allocates against the material's own pass pipeline's set-2 layout
    /// (camera is set 0, object is set 1), not the renderer's fixed
    /// single-uniform-buffer layout — a material's resources (textures,
    /// multiple buffers) don't generally fit that shape.
    pub fn material_descriptor_set(
        &mut self,
        material: Handle<Material>,
        pass_index: usize,
        framebuffer: Option<Handle<Framebuffer>>,
    ) -> Option<Arc<PersistentDescriptorSet>> {
        let pipeline = self.graphics_pipeline_for(material, pass_index, framebuffer)?;
        let layout = pipeline.layout().set_layouts()[2].clone();
        let material = self.materials.get_mut(material)?;
        Some(material.descriptor_set(&self.allocators, layout, pass_index))
    }

    pub fn mesh_buffers(
        &self,
        mesh: MeshHandle,
    ) -> (
        vulkano::buffer::Subbuffer<[VertexFull]>,
        vulkano::buffer::Subbuffer<[u32]>,
        u32,
    ) {
        let mesh = self.meshes.get(mesh).expect("valid mesh handle");
        (
            mesh.buffers.get_vertex(),
            mesh.buffers.get_index(),
            mesh.buffers.index_len() as u32,
        )
    }

    pub fn compute_pass_index(&self, material: Handle<ComputeMaterial>, pass_name: &str) -> Option<usize> {
        let material = self.compute_materials.get(material)?;
        let shader = self.shaders.get(material.shader())?;
        shader.pass_index_from_name(pass_name)
    }

    pub fn compute_pipeline_for(&mut self, material: Handle<ComputeMaterial>, pass_index: usize) -> Arc<ComputePipeline> {
        let material_ref = self.compute_materials.get(material).expect("valid compute material");
        let shader_handle = material_ref.shader();
        let shader = self.shaders.get(shader_handle).expect("valid shader");
        self.pipeline_cache
            .compute_pipeline(self.device.clone(), shader_handle, shader, pass_index)
    }

    /// Allocates against the compute pipeline's own set-0 layout, the
    /// compute-material equivalent of [`material_descriptor_set`]'s fix.
    pub fn compute_descriptor_set(
        &mut self,
        material: Handle<ComputeMaterial>,
        pass_index: usize,
    ) -> Arc<PersistentDescriptorSet> {
        let pipeline = self.compute_pipeline_for(material, pass_index);
        let layout = pipeline.layout().set_layouts()[0].clone();
        let material = self.compute_materials.get_mut(material).expect("valid compute material");
        material.descriptor_set(&self.allocators, layout, pass_index)
    }

    pub fn render_target_image(&self, handle: Handle<RenderTarget>) -> Arc<Image> {
        self.render_targets
            .get(handle)
            .expect("valid render target handle")
            .color_image
            .clone()
    }

    pub fn bind_blit_source(&mut self, material: Handle<Material>, source: Handle<RenderTarget>) {
        let Some(target) = self.render_targets.get(source) else {
            return;
        };
        let view = target.color_view.clone();
        let shader = self
            .materials
            .get(material)
            .map(|m| m.shader())
            .and_then(|s| self.shaders.get(s));
        let Some(shader) = shader else { return };
        let sampler = default_sampler(self.device.clone());
        if let Some(material) = self.materials.get_mut(material) {
            material.set_texture(shader, "MainTexture", view, sampler);
        }
    }
}

fn default_sampler(device: Arc<Device>) -> Arc<vulkano::image::sampler::Sampler> {
    vulkano::image::sampler::Sampler::new(device, Default::default())
        .expect("default sampler creation")
}

fn fullscreen_quad_mesh(allocators: &Allocators, queue: Arc<Queue>) -> Mesh<VertexFull> {
    let vertices = vec![
        VertexFull {
            position: [-1.0, -1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            colour: [0.0, 0.0, 0.0],
        },
        VertexFull {
            position: [1.0, -1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            colour: [1.0, 0.0, 0.0],
        },
        VertexFull {
            position: [1.0, 1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            colour: [1.0, 1.0, 0.0],
        },
        VertexFull {
            position: [-1.0, 1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            colour: [0.0, 1.0, 0.0],
        },
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];
    let buffers = MeshBuffers::initialize_device_local(allocators, queue, vertices, indices);
    Mesh::new(
        buffers,
        super::mesh::Aabb {
            min: cgmath::Point3::new(-1.0, -1.0, 0.0),
            max: cgmath::Point3::new(1.0, 1.0, 0.0),
        },
        Default::default(),
    )
}

const TEXTURE_BLIT_SHADER_XML: &str = r#"<Shader Name="TextureBlit" Version="440">
  <Resources>
    <Resource Name="MainTexture" Type="texture2D" />
  </Resources>
  <Pass Name="main">
    <VertexShader><![CDATA[
      #version 440
      layout(location = 0) in vec3 position;
      layout(location = 1) in vec3 normal;
      layout(location = 2) in vec3 colour;
      layout(location = 0) out vec2 uv;
      void main() {
        uv = position.xy * 0.5 + 0.5;
        gl_Position = vec4(position, 1.0);
      }
    ]]></VertexShader>
    <FragmentShader><![CDATA[
      #version 440
      layout(location = 0) in vec2 uv;
      layout(location = 0) out vec4 outColour;
      layout(set = 0, binding = 0) uniform sampler2D MainTexture;
      void main() {
        outColour = texture(MainTexture, uv);
      }
    ]]></FragmentShader>
  </Pass>
</Shader>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_config_defaults_to_host_core_count() {
        let config = RendererConfig::default();
        assert!(config.worker_threads >= 1);
        assert_eq!(config.back_buffer_extent, [1280, 720]);
    }
}
