//! A command buffer wrapper with explicit dependencies, a signal
//! semaphore, and renderer-level operations (clear, render, blit, compute
//! dispatch, layout transitions) recorded against it before submission.
//!
//! Operations are queued as [`Op`]s rather than recorded into a live
//! `AutoCommandBufferBuilder` immediately: the builder borrows its
//! allocator, and this object's operations are declared well before the
//! renderer and its allocators are available to the method that finally
//! submits it. `submit`/`release` replay the queue against one builder in
//! a single pass, which also matches the source's "begin renderpass lazily,
//! end it on whatever needs to leave renderpass scope" behavior.

use std::sync::Arc;

use vulkano::command_buffer::{
    AutoCommandBufferBuilder, ClearAttachment, ClearRect, CommandBufferSubmitInfo,
    CommandBufferUsage, PrimaryAutoCommandBuffer, RenderPassBeginInfo, SubpassBeginInfo,
    SubpassEndInfo,
};
use vulkano::format::ClearValue;
use vulkano::image::{Image, ImageLayout};
use vulkano::pipeline::{Pipeline, PipelineBindPoint};
use vulkano::sync::fence::{Fence, FenceCreateInfo};
use vulkano::sync::semaphore::{Semaphore, SemaphoreSubmitInfo};
use vulkano::sync::{PipelineStages, SubmitInfo};
use vulkano::{Validated, VulkanError};

use crate::core::handle::Handle;

use super::material::{ComputeMaterial, Material, MaterialCore};
use super::render_object::Actor;
use super::render_target::RenderTarget;
use super::renderer::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Unopened,
    Open,
    Ended,
    Submitted,
    Released,
}

#[derive(Clone)]
pub struct LayoutTransition {
    pub render_target: Option<Handle<RenderTarget>>,
    pub image: Option<Arc<Image>>,
    pub layout: ImageLayout,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
}

enum Op {
    SetFrameBuffer(Option<Handle<super::framebuffer::Framebuffer>>),
    ClearRenderTargets([f32; 4]),
    Render {
        actors: Vec<Handle<Actor>>,
        pass_name: String,
    },
    Blit {
        render_target: Option<Handle<RenderTarget>>,
        material: Option<Handle<Material>>,
        pass: Option<String>,
    },
    DispatchCompute {
        material: Handle<ComputeMaterial>,
        pass: String,
        groups: [u32; 3],
    },
    ChangeLayout(Vec<LayoutTransition>),
}

/// Wraps one native command buffer; dependencies are the prior command
/// buffers' signal semaphores, waited on with `ALL_COMMANDS` stage before
/// this buffer's own work begins.
pub struct CommandBuffer {
    name: String,
    pool_index: usize,
    state: CommandBufferState,
    dependencies: Vec<Arc<Semaphore>>,
    signal_semaphore: Arc<Semaphore>,
    extra_signal_semaphore: Option<Arc<Semaphore>>,
    ops: Vec<Op>,
    recorded: Option<Arc<PrimaryAutoCommandBuffer>>,
}

impl CommandBuffer {
    pub fn new(
        device: Arc<vulkano::device::Device>,
        name: impl Into<String>,
        pool_index: usize,
        extra_signal_semaphore: Option<Arc<Semaphore>>,
    ) -> Self {
        CommandBuffer {
            name: name.into(),
            pool_index,
            state: CommandBufferState::Unopened,
            dependencies: Vec::new(),
            signal_semaphore: Arc::new(
                Semaphore::new(device, Default::default()).expect("semaphore creation"),
            ),
            extra_signal_semaphore,
            ops: Vec::new(),
            recorded: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn semaphore(&self) -> Arc<Semaphore> {
        self.signal_semaphore.clone()
    }

    pub fn set_dependencies(&mut self, dependencies: &[&CommandBuffer]) {
        self.dependencies = dependencies.iter().map(|cb| cb.semaphore()).collect();
    }

    /// Like [`set_dependencies`](Self::set_dependencies), but for
    /// dependencies whose command buffer isn't available — only their
    /// already-created signal semaphore is, as when a parallel builder's
    /// task 0 inherits the caller's `prevBuffers`.
    pub fn set_dependency_semaphores(&mut self, semaphores: Vec<Arc<Semaphore>>) {
        self.dependencies = semaphores;
    }

    fn touch(&mut self) {
        if self.state == CommandBufferState::Unopened {
            self.state = CommandBufferState::Open;
        }
    }

    pub fn set_frame_buffer(&mut self, framebuffer: Option<Handle<super::framebuffer::Framebuffer>>) {
        self.touch();
        self.ops.push(Op::SetFrameBuffer(framebuffer));
    }

    pub fn clear_render_targets(&mut self, color: [f32; 4]) {
        self.touch();
        self.ops.push(Op::ClearRenderTargets(color));
    }

    pub fn render(&mut self, actors: &[Handle<Actor>], pass_name: &str) {
        self.touch();
        self.ops.push(Op::Render {
            actors: actors.to_vec(),
            pass_name: pass_name.to_string(),
        });
    }

    pub fn blit(
        &mut self,
        render_target: Option<Handle<RenderTarget>>,
        material: Option<Handle<Material>>,
        pass: Option<&str>,
    ) {
        self.touch();
        self.ops.push(Op::Blit {
            render_target,
            material,
            pass: pass.map(str::to_string),
        });
    }

    pub fn dispatch_compute(
        &mut self,
        material: Handle<ComputeMaterial>,
        pass: &str,
        gx: u32,
        gy: u32,
        gz: u32,
    ) {
        self.touch();
        self.ops.push(Op::DispatchCompute {
            material,
            pass: pass.to_string(),
            groups: [gx, gy, gz],
        });
    }

    pub fn change_layout(&mut self, transitions: Vec<LayoutTransition>) {
        self.touch();
        self.ops.push(Op::ChangeLayout(transitions));
    }

    /// Records the queued operations into a native command buffer, ends
    /// it, and submits it to the graphics queue, waiting on every
    /// dependency's semaphore and signaling both its own semaphore and the
    /// override, if any.
    pub fn submit(&mut self, renderer: &mut Renderer) -> Result<(), Validated<VulkanError>> {
        if self.state == CommandBufferState::Submitted || self.state == CommandBufferState::Released
        {
            return Ok(());
        }

        let queue_family_index = renderer.graphics_queue().queue_family_index();
        let mut builder = AutoCommandBufferBuilder::primary(
            renderer.command_pool_allocator(self.pool_index),
            queue_family_index,
            CommandBufferUsage::OneTimeSubmit,
        )
        .expect("command buffer allocation");

        let mut current_framebuffer: Option<Handle<super::framebuffer::Framebuffer>> = None;
        let mut pending_clear: Option<[f32; 4]> = None;
        let mut in_render_pass = false;

        for op in std::mem::take(&mut self.ops) {
            match op {
                Op::SetFrameBuffer(fb) => {
                    if in_render_pass {
                        builder.end_render_pass(SubpassEndInfo::default()).unwrap();
                        in_render_pass = false;
                    }
                    current_framebuffer = fb;
                }
                Op::ClearRenderTargets(color) => {
                    pending_clear = Some(color);
                }
                Op::Render { actors, pass_name } => {
                    if !in_render_pass {
                        begin_pass(
                            &mut builder,
                            renderer,
                            current_framebuffer,
                            pending_clear.take(),
                        );
                        in_render_pass = true;
                    }
                    record_render(&mut builder, renderer, current_framebuffer, &actors, &pass_name);
                }
                Op::Blit {
                    render_target,
                    material,
                    pass,
                } => {
                    if !in_render_pass {
                        begin_pass(
                            &mut builder,
                            renderer,
                            current_framebuffer,
                            pending_clear.take(),
                        );
                        in_render_pass = true;
                    }
                    record_blit(&mut builder, renderer, current_framebuffer, render_target, material, pass.as_deref());
                }
                Op::DispatchCompute {
                    material,
                    pass,
                    groups,
                } => {
                    if in_render_pass {
                        builder.end_render_pass(SubpassEndInfo::default()).unwrap();
                        in_render_pass = false;
                    }
                    record_dispatch(&mut builder, renderer, material, &pass, groups);
                }
                Op::ChangeLayout(transitions) => {
                    if in_render_pass {
                        builder.end_render_pass(SubpassEndInfo::default()).unwrap();
                        in_render_pass = false;
                    }
                    record_layout_changes(&mut builder, renderer, &transitions);
                }
            }
        }

        if in_render_pass {
            builder.end_render_pass(SubpassEndInfo::default()).unwrap();
        }

        self.state = CommandBufferState::Ended;
        let command_buffer = builder.build().expect("command buffer recording");
        self.recorded = Some(command_buffer.clone());

        // The safe `GpuFuture` chain only carries one wait/signal semaphore,
        // so dependencies and the extra override go through the queue's
        // lower-level submit instead.
        let wait_semaphores: Vec<SemaphoreSubmitInfo> = self
            .dependencies
            .iter()
            .map(|semaphore| SemaphoreSubmitInfo {
                stages: PipelineStages::ALL_COMMANDS,
                ..SemaphoreSubmitInfo::new(semaphore.clone())
            })
            .collect();

        let mut signal_semaphores = vec![SemaphoreSubmitInfo {
            stages: PipelineStages::ALL_COMMANDS,
            ..SemaphoreSubmitInfo::new(self.signal_semaphore.clone())
        }];
        if let Some(extra) = &self.extra_signal_semaphore {
            signal_semaphores.push(SemaphoreSubmitInfo {
                stages: PipelineStages::ALL_COMMANDS,
                ..SemaphoreSubmitInfo::new(extra.clone())
            });
        }

        let submit_info = SubmitInfo {
            wait_semaphores,
            command_buffers: vec![CommandBufferSubmitInfo::new(command_buffer)],
            signal_semaphores,
            ..Default::default()
        };

        let fence = Arc::new(
            Fence::new(renderer.device(), FenceCreateInfo::default()).expect("fence creation"),
        );
        renderer
            .graphics_queue()
            .with(|mut guard| unsafe { guard.submit(&[submit_info], Some(fence.clone())) })
            .expect("queue submission");
        fence.wait(None).expect("fence wait");

        self.state = CommandBufferState::Submitted;
        Ok(())
    }

    /// Marks the command buffer for deferred destruction at the renderer's
    /// next present.
    pub fn release(&mut self, renderer: &mut Renderer) {
        if self.state != CommandBufferState::Submitted {
            let _ = self.submit(renderer);
        }
        self.state = CommandBufferState::Released;
        renderer.queue_for_release(self.recorded.take());
    }

    pub fn submit_and_release(&mut self, renderer: &mut Renderer) {
        let _ = self.submit(renderer);
        self.release(renderer);
    }
}

fn begin_pass(
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    renderer: &Renderer,
    framebuffer: Option<Handle<super::framebuffer::Framebuffer>>,
    clear: Option<[f32; 4]>,
) {
    let fb = renderer.resolve_framebuffer(framebuffer);
    // Every attachment's load op is CLEAR (see `Framebuffer::new`), so every
    // slot needs a concrete clear value — `None` here is rejected by vulkano.
    let color_clear = clear.unwrap_or([0.0, 0.0, 0.0, 1.0]);
    let clear_values = fb
        .framebuffer
        .attachments()
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if fb.depth_target.is_some() && i == fb.color_targets.len() {
                Some(ClearValue::Depth(1.0))
            } else {
                Some(ClearValue::Float(color_clear))
            }
        })
        .collect();

    builder
        .begin_render_pass(
            RenderPassBeginInfo {
                clear_values,
                ..RenderPassBeginInfo::framebuffer(fb.framebuffer.clone())
            },
            SubpassBeginInfo::default(),
        )
        .expect("begin render pass");
}

fn record_render(
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    renderer: &mut Renderer,
    framebuffer: Option<Handle<super::framebuffer::Framebuffer>>,
    actors: &[Handle<Actor>],
    pass_name: &str,
) {
    for &actor_handle in actors {
        let Some((mesh_handle, material_handle, instance_count, object_set, transform)) =
            renderer.actor_draw_data(actor_handle)
        else {
            continue;
        };
        let _ = transform;
        let Some(pass_index) = renderer.material_pass_index(material_handle, pass_name) else {
            continue;
        };
        let Some(pipeline) = renderer.graphics_pipeline_for(material_handle, pass_index, framebuffer) else {
            continue;
        };
        let camera_set = renderer.active_camera_descriptor_set();
        let material_set = renderer.material_descriptor_set(material_handle, pass_index, framebuffer);

        builder.bind_pipeline_graphics(pipeline.clone()).unwrap();
        if let Some(camera_set) = camera_set {
            builder
                .bind_descriptor_sets(
                    PipelineBindPoint::Graphics,
                    pipeline.layout().clone(),
                    0,
                    camera_set,
                )
                .unwrap();
        }
        builder
            .bind_descriptor_sets(
                PipelineBindPoint::Graphics,
                pipeline.layout().clone(),
                1,
                object_set,
            )
            .unwrap();
        if let Some(material_set) = material_set {
            builder
                .bind_descriptor_sets(
                    PipelineBindPoint::Graphics,
                    pipeline.layout().clone(),
                    2,
                    material_set,
                )
                .unwrap();
        }

        let (vertex_buffer, index_buffer, index_count) = renderer.mesh_buffers(mesh_handle);
        builder.bind_vertex_buffers(0, vertex_buffer).unwrap();
        builder.bind_index_buffer(index_buffer).unwrap();
        unsafe {
            builder
                .draw_indexed(index_count, instance_count, 0, 0, 0)
                .unwrap();
        }
    }
}

fn record_blit(
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    renderer: &mut Renderer,
    framebuffer: Option<Handle<super::framebuffer::Framebuffer>>,
    source: Option<Handle<RenderTarget>>,
    material: Option<Handle<Material>>,
    pass: Option<&str>,
) {
    let material_handle = material.unwrap_or_else(|| renderer.texture_blit_material());
    if let Some(source) = source {
        renderer.bind_blit_source(material_handle, source);
    }
    let pass_name = pass.unwrap_or("main");
    record_render(
        builder,
        renderer,
        framebuffer,
        &[renderer.root_actor()],
        pass_name,
    );
    let _ = material_handle;
}

fn record_dispatch(
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    renderer: &mut Renderer,
    material: Handle<ComputeMaterial>,
    pass: &str,
    groups: [u32; 3],
) {
    let Some(pass_index) = renderer.compute_pass_index(material, pass) else {
        return;
    };
    let pipeline = renderer.compute_pipeline_for(material, pass_index);
    let descriptor_set = renderer.compute_descriptor_set(material, pass_index);

    builder.bind_pipeline_compute(pipeline.clone()).unwrap();
    builder
        .bind_descriptor_sets(
            PipelineBindPoint::Compute,
            pipeline.layout().clone(),
            0,
            descriptor_set,
        )
        .unwrap();
    unsafe {
        builder.dispatch(groups).unwrap();
    }
}

fn record_layout_changes(
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    renderer: &Renderer,
    transitions: &[LayoutTransition],
) {
    use vulkano::command_buffer::{DependencyInfo, ImageMemoryBarrier};
    use vulkano::image::ImageSubresourceRange;
    use vulkano::sync::AccessFlags;

    let mut barriers = Vec::new();
    for transition in transitions {
        let image = transition
            .image
            .clone()
            .or_else(|| transition.render_target.map(|h| renderer.render_target_image(h)))
            .expect("layout transition names a texture or render target");

        barriers.push(ImageMemoryBarrier {
            src_stages: transition.src_stages,
            src_access: AccessFlags::MEMORY_WRITE,
            dst_stages: transition.dst_stages,
            dst_access: AccessFlags::MEMORY_READ | AccessFlags::MEMORY_WRITE,
            old_layout: ImageLayout::Undefined,
            new_layout: transition.layout,
            subresource_range: ImageSubresourceRange::from(image.format()),
            ..ImageMemoryBarrier::image(image)
        });
    }

    builder
        .pipeline_barrier(DependencyInfo {
            image_memory_barriers: barriers.into(),
            ..Default::default()
        })
        .expect("pipeline barrier");
}

// Zero-sized helper kept to document the attachment-clear contract: depth
// attachments always clear to 1.0 regardless of the caller's color.
#[allow(dead_code)]
fn depth_clear_attachment() -> ClearAttachment {
    ClearAttachment::Depth(1.0)
}

#[allow(dead_code)]
fn _clear_rect_full(extent: [u32; 2]) -> ClearRect {
    ClearRect {
        rect_offset: [0, 0],
        rect_extent: extent,
        array_layers: 0..1,
    }
}
