//! Material & compute-material: per-instance uniform-buffer shadows,
//! descriptor sets, and the property/texture/buffer binding API.
//!
//! Graphics and compute materials share everything except their dispatch
//! surface, so the shared state and `getDescriptorSet` logic live on
//! [`MaterialState`] behind the [`MaterialCore`] trait (design note:
//! "Approach (b) is preferred because the dispatch surface is small and
//! statically typed").

use std::sync::Arc;

use vulkano::buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer};
use vulkano::command_buffer::{AutoCommandBufferBuilder, CommandBufferUsage, PrimaryAutoCommandBuffer};
use vulkano::descriptor_set::layout::DescriptorSetLayout;
use vulkano::descriptor_set::{PersistentDescriptorSet, WriteDescriptorSet};
use vulkano::image::sampler::Sampler;
use vulkano::image::view::ImageView;
use vulkano::memory::allocator::{AllocationCreateInfo, MemoryTypeFilter};
use vulkano::pipeline::{Pipeline, PipelineBindPoint};

use crate::core::handle::Handle;
use crate::shader::Shader;
use crate::vulkano_objects::allocators::Allocators;

use super::render_target::RenderTarget;

/// A single bound resource at a binding slot: either an owned/shared GPU
/// buffer or a texture (direct image view or a render target's color image).
#[derive(Clone)]
pub enum BoundResource {
    Buffer(Subbuffer<[u8]>),
    Texture(Arc<ImageView>, Arc<Sampler>),
    RenderTarget(Handle<RenderTarget>),
    Unbound,
}

struct PerPass {
    descriptor_set: Option<Arc<PersistentDescriptorSet>>,
    dirty: bool,
}

impl Default for PerPass {
    fn default() -> Self {
        PerPass {
            descriptor_set: None,
            dirty: true,
        }
    }
}

/// Fields common to [`Material`] and [`ComputeMaterial`].
pub struct MaterialState {
    shader: Handle<Shader>,
    /// CPU-side shadow per *non-shared* buffer descriptor, indexed the same
    /// as the shader's buffer list.
    buffer_shadows: Vec<Vec<u8>>,
    buffer_dirty: Vec<bool>,
    owned_buffers: Vec<Option<Subbuffer<[u8]>>>,
    /// Declared GLSL binding number for each slot in `owned_buffers`.
    buffer_bindings: Vec<u32>,
    /// One slot per binding (buffers then textures, shader declaration
    /// order), holding whatever is currently bound there.
    bindings: Vec<BoundResource>,
    /// Declared GLSL binding number for each slot in `bindings` — buffers and
    /// textures are interleaved in document order, so this is *not* the same
    /// as the slot's position.
    binding_numbers: Vec<u32>,
    per_pass: Vec<PerPass>,
}

impl MaterialState {
    fn new(shader: Handle<Shader>, shader_ref: &Shader, pass_count: usize) -> Self {
        let buffer_count = shader_ref.description.buffers.len();
        let binding_count = shader_ref.description.buffers.len() + shader_ref.description.textures.len();
        let buffer_bindings: Vec<u32> = shader_ref.description.buffers.iter().map(|b| b.binding).collect();
        let binding_numbers: Vec<u32> = shader_ref
            .description
            .buffers
            .iter()
            .map(|b| b.binding)
            .chain(shader_ref.description.textures.iter().map(|t| t.binding))
            .collect();
        MaterialState {
            shader,
            buffer_shadows: shader_ref
                .description
                .buffers
                .iter()
                .map(|b| vec![0u8; b.size as usize])
                .collect(),
            buffer_dirty: vec![false; buffer_count],
            owned_buffers: vec![None; buffer_count],
            buffer_bindings,
            bindings: vec![BoundResource::Unbound; binding_count],
            binding_numbers,
            per_pass: (0..pass_count).map(|_| PerPass::default()).collect(),
        }
    }
}

impl Clone for BoundResource {
    fn clone(&self) -> Self {
        match self {
            BoundResource::Buffer(b) => BoundResource::Buffer(b.clone()),
            BoundResource::Texture(v, s) => BoundResource::Texture(v.clone(), s.clone()),
            BoundResource::RenderTarget(h) => BoundResource::RenderTarget(*h),
            BoundResource::Unbound => BoundResource::Unbound,
        }
    }
}

/// Shared property/buffer/texture binding surface for graphics and compute
/// materials, mirroring `getDescriptorSet`'s contract in §4.5.
pub trait MaterialCore {
    fn state(&self) -> &MaterialState;
    fn state_mut(&mut self) -> &mut MaterialState;
    fn shader(&self) -> Handle<Shader> {
        self.state().shader
    }

    /// Writes `data` into the CPU shadow for `"bufferName.fieldName"` and
    /// marks that buffer dirty. Returns `false` (no GPU state changed) if
    /// the buffer or field doesn't exist.
    fn set_property(&mut self, shader_ref: &Shader, key: &str, data: &[u8]) -> bool {
        let Some((buffer_name, field_name)) = key.split_once('.') else {
            return false;
        };
        let Some(buffer_index) = shader_ref
            .description
            .buffers
            .iter()
            .position(|b| b.name == buffer_name)
        else {
            return false;
        };
        let buffer_desc = &shader_ref.description.buffers[buffer_index];
        let Some(field) = buffer_desc.field(field_name) else {
            return false;
        };
        if field.size as usize != data.len() {
            return false;
        }

        let state = self.state_mut();
        let offset = field.byte_offset as usize;
        state.buffer_shadows[buffer_index][offset..offset + data.len()].copy_from_slice(data);
        state.buffer_dirty[buffer_index] = true;
        true
    }

    /// Overwrites a shared buffer binding and marks every pass's descriptor
    /// set dirty.
    fn set_buffer(&mut self, shader_ref: &Shader, name: &str, buffer: Subbuffer<[u8]>) -> bool {
        let Some(binding) = binding_index(shader_ref, name) else {
            return false;
        };
        let state = self.state_mut();
        state.bindings[binding] = BoundResource::Buffer(buffer);
        for pass in &mut state.per_pass {
            pass.dirty = true;
        }
        true
    }

    fn set_texture(
        &mut self,
        shader_ref: &Shader,
        name: &str,
        view: Arc<ImageView>,
        sampler: Arc<Sampler>,
    ) -> bool {
        let Some(binding) = binding_index(shader_ref, name) else {
            return false;
        };
        let state = self.state_mut();
        state.bindings[binding] = BoundResource::Texture(view, sampler);
        for pass in &mut state.per_pass {
            pass.dirty = true;
        }
        true
    }

    fn set_render_target_texture(
        &mut self,
        shader_ref: &Shader,
        name: &str,
        target: Handle<RenderTarget>,
    ) -> bool {
        let Some(binding) = binding_index(shader_ref, name) else {
            return false;
        };
        let state = self.state_mut();
        state.bindings[binding] = BoundResource::RenderTarget(target);
        for pass in &mut state.per_pass {
            pass.dirty = true;
        }
        true
    }

    /// Implements §4.5's `getDescriptorSet(pass)`: flush dirty CPU shadows
    /// to their GPU buffers, then allocate or update the pass's descriptor
    /// set as needed.
    fn descriptor_set(
        &mut self,
        allocators: &Allocators,
        layout: Arc<DescriptorSetLayout>,
        pass: usize,
    ) -> Arc<PersistentDescriptorSet> {
        let state = self.state_mut();

        for i in 0..state.buffer_shadows.len() {
            if !state.buffer_dirty[i] {
                continue;
            }
            match &state.owned_buffers[i] {
                Some(buffer) => {
                    let mut guard = buffer.write().expect("uniform buffer host write");
                    guard.copy_from_slice(&state.buffer_shadows[i]);
                }
                None => {
                    let buffer = create_material_buffer_bytes(
                        allocators,
                        &state.buffer_shadows[i],
                        BufferUsage::UNIFORM_BUFFER,
                    );
                    state.owned_buffers[i] = Some(buffer);
                    for p in &mut state.per_pass {
                        p.dirty = true;
                    }
                }
            }
            state.buffer_dirty[i] = false;
        }

        let writes = descriptor_writes(state);

        let needs_create = state.per_pass[pass].descriptor_set.is_none();
        if needs_create || state.per_pass[pass].dirty {
            let set = PersistentDescriptorSet::new(&allocators.descriptor_set, layout, writes, [])
                .expect("descriptor set allocation");
            state.per_pass[pass].descriptor_set = Some(set);
            state.per_pass[pass].dirty = false;
        }

        state.per_pass[pass]
            .descriptor_set
            .clone()
            .expect("just created above")
    }
}

fn binding_index(shader_ref: &Shader, name: &str) -> Option<usize> {
    let buffers = &shader_ref.description.buffers;
    if let Some(i) = buffers.iter().position(|b| b.name == name) {
        return Some(i);
    }
    shader_ref
        .description
        .textures
        .iter()
        .position(|t| t.name == name)
        .map(|i| buffers.len() + i)
}

fn descriptor_writes(state: &MaterialState) -> Vec<WriteDescriptorSet> {
    let mut writes = Vec::new();
    for (i, owned) in state.owned_buffers.iter().enumerate() {
        if let Some(buffer) = owned {
            writes.push(WriteDescriptorSet::buffer(state.buffer_bindings[i], buffer.clone()));
        }
    }
    for (i, binding) in state.bindings.iter().enumerate() {
        let binding_number = state.binding_numbers[i];
        match binding {
            BoundResource::Buffer(buffer) => {
                writes.push(WriteDescriptorSet::buffer(binding_number, buffer.clone()));
            }
            BoundResource::Texture(view, sampler) => {
                writes.push(WriteDescriptorSet::image_view_sampler(
                    binding_number,
                    view.clone(),
                    sampler.clone(),
                ));
            }
            BoundResource::RenderTarget(_) | BoundResource::Unbound => {}
        }
    }
    writes
}

fn create_material_buffer_bytes(
    allocators: &Allocators,
    bytes: &[u8],
    usage: BufferUsage,
) -> Subbuffer<[u8]> {
    Buffer::from_iter(
        allocators.memory.clone(),
        BufferCreateInfo {
            usage,
            ..Default::default()
        },
        AllocationCreateInfo {
            memory_type_filter: MemoryTypeFilter::PREFER_DEVICE
                | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
            ..Default::default()
        },
        bytes.iter().copied(),
    )
    .expect("uniform buffer allocation")
}

/// A material bound to a graphics shader; one descriptor set per pass.
pub struct Material {
    state: MaterialState,
}

impl Material {
    pub fn new(shader: Handle<Shader>, shader_ref: &Shader) -> Self {
        Material {
            state: MaterialState::new(shader, shader_ref, shader_ref.pass_count()),
        }
    }
}

impl MaterialCore for Material {
    fn state(&self) -> &MaterialState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut MaterialState {
        &mut self.state
    }
}

/// A material bound to a compute shader; each pass pipeline is a compute
/// pipeline and `dispatch` both records and submits work.
pub struct ComputeMaterial {
    state: MaterialState,
}

impl ComputeMaterial {
    pub fn new(shader: Handle<Shader>, shader_ref: &Shader) -> Self {
        ComputeMaterial {
            state: MaterialState::new(shader, shader_ref, shader_ref.pass_count()),
        }
    }

    /// Begins a one-time command buffer, binds the compute pipeline and
    /// descriptor set, dispatches `(gx, gy, gz)` groups, and ends it.
    pub fn dispatch(
        &mut self,
        allocators: &Allocators,
        queue_family_index: u32,
        pipeline: Arc<vulkano::pipeline::ComputePipeline>,
        descriptor_set: Arc<PersistentDescriptorSet>,
        gx: u32,
        gy: u32,
        gz: u32,
    ) -> Arc<PrimaryAutoCommandBuffer> {
        let mut builder = AutoCommandBufferBuilder::primary(
            &allocators.command_buffer,
            queue_family_index,
            CommandBufferUsage::OneTimeSubmit,
        )
        .expect("command buffer allocation");

        builder
            .bind_pipeline_compute(pipeline.clone())
            .unwrap()
            .bind_descriptor_sets(
                PipelineBindPoint::Compute,
                pipeline.layout().clone(),
                0,
                descriptor_set,
            )
            .unwrap();
        unsafe {
            builder.dispatch([gx, gy, gz]).unwrap();
        }

        Arc::new(builder.build().unwrap())
    }
}

impl MaterialCore for ComputeMaterial {
    fn state(&self) -> &MaterialState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut MaterialState {
        &mut self.state
    }
}
