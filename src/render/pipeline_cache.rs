//! Lazily creates and caches graphics/compute pipelines for a (shader,
//! pass) pair, recreating graphics pipelines when the target framebuffer's
//! extent changes.
//!
//! Vertex input state is built from [`VertexFormat`] at runtime rather than
//! through the `#[derive(Vertex)]` macro the teacher's static vertex types
//! use, since a shader's attribute layout isn't known until its XML is
//! parsed.

use std::collections::HashMap;
use std::sync::Arc;

use vulkano::device::Device;
use vulkano::format::Format;
use vulkano::pipeline::graphics::color_blend::{ColorBlendAttachmentState, ColorBlendState};
use vulkano::pipeline::graphics::depth_stencil::{CompareOp, DepthState, DepthStencilState};
use vulkano::pipeline::graphics::input_assembly::InputAssemblyState;
use vulkano::pipeline::graphics::multisample::MultisampleState;
use vulkano::pipeline::graphics::rasterization::{CullMode as VkCullMode, RasterizationState};
use vulkano::pipeline::graphics::vertex_input::{
    VertexInputAttributeDescription, VertexInputBindingDescription, VertexInputRate, VertexInputState,
};
use vulkano::pipeline::graphics::viewport::{Viewport, ViewportState};
use vulkano::pipeline::graphics::GraphicsPipelineCreateInfo;
use vulkano::pipeline::layout::PipelineDescriptorSetLayoutCreateInfo;
use vulkano::pipeline::{
    ComputePipeline, GraphicsPipeline, PipelineLayout, PipelineShaderStageCreateInfo,
};
use vulkano::render_pass::Subpass;

use crate::core::handle::Handle;
use crate::shader::desc::{CullMode, DepthTest};
use crate::shader::vertex_format::{AttributeFormat, VertexFormat};
use crate::shader::Shader;

use super::framebuffer::Framebuffer;

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct GraphicsKey {
    shader: Handle<Shader>,
    pass: usize,
    framebuffer: Handle<Framebuffer>,
}

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct ComputeKey {
    shader: Handle<Shader>,
    pass: usize,
}

struct CachedGraphics {
    pipeline: Arc<GraphicsPipeline>,
    extent: [u32; 2],
}

/// Owns every pipeline built so far; indexed by the (shader, pass,
/// framebuffer) or (shader, pass) it was built for.
#[derive(Default)]
pub struct PipelineCache {
    graphics: HashMap<GraphicsKey, CachedGraphics>,
    compute: HashMap<ComputeKey, Arc<ComputePipeline>>,
}

fn attribute_format(format: AttributeFormat) -> Format {
    match format {
        AttributeFormat::R32Sfloat => Format::R32_SFLOAT,
        AttributeFormat::R32G32Sfloat => Format::R32G32_SFLOAT,
        AttributeFormat::R32G32B32Sfloat => Format::R32G32B32_SFLOAT,
        AttributeFormat::R32G32B32A32Sfloat => Format::R32G32B32A32_SFLOAT,
        AttributeFormat::R32Sint => Format::R32_SINT,
        AttributeFormat::R32G32Sint => Format::R32G32_SINT,
    }
}

fn vertex_input_state(format: &VertexFormat) -> VertexInputState {
    let mut state = VertexInputState::new();
    state = state.binding(
        0,
        VertexInputBindingDescription {
            stride: format.stride,
            input_rate: VertexInputRate::Vertex,
        },
    );
    for attribute in &format.attributes {
        state = state.attribute(
            attribute.location,
            VertexInputAttributeDescription {
                binding: 0,
                format: attribute_format(attribute.format),
                offset: attribute.byte_offset,
            },
        );
    }
    state
}

fn depth_stencil_state(depth_test: DepthTest, depth_write: bool) -> Option<DepthStencilState> {
    let compare_op = match depth_test {
        DepthTest::Never => CompareOp::Never,
        DepthTest::Less => CompareOp::Less,
        DepthTest::LessOrEqual => CompareOp::LessOrEqual,
        DepthTest::GreaterOrEqual => CompareOp::GreaterOrEqual,
        DepthTest::Always => CompareOp::Always,
        DepthTest::Off => return None,
    };
    Some(DepthStencilState {
        depth: Some(DepthState {
            write_enable: depth_write,
            compare_op,
        }),
        ..Default::default()
    })
}

fn cull_mode(mode: CullMode) -> VkCullMode {
    match mode {
        CullMode::Front => VkCullMode::Front,
        CullMode::Back => VkCullMode::Back,
        CullMode::Off => VkCullMode::None,
    }
}

impl PipelineCache {
    pub fn new() -> Self {
        PipelineCache::default()
    }

    /// Returns the cached graphics pipeline for `(shader, pass, framebuffer)`,
    /// building it (or rebuilding it, if the framebuffer's extent changed
    /// since the last build) on demand.
    #[allow(clippy::too_many_arguments)]
    pub fn graphics_pipeline(
        &mut self,
        device: Arc<Device>,
        shader_handle: Handle<Shader>,
        shader: &Shader,
        pass_index: usize,
        framebuffer_handle: Handle<Framebuffer>,
        framebuffer: &Framebuffer,
        extent: [u32; 2],
    ) -> Arc<GraphicsPipeline> {
        let key = GraphicsKey {
            shader: shader_handle,
            pass: pass_index,
            framebuffer: framebuffer_handle,
        };

        if let Some(cached) = self.graphics.get(&key) {
            if cached.extent == extent {
                return cached.pipeline.clone();
            }
        }

        let crate::shader::desc::Passes::Graphics(passes) = &shader.description.passes else {
            panic!("graphics_pipeline called on a compute shader");
        };
        let pass = &passes[pass_index];

        let (vertex_module, fragment_module) = shader
            .graphics_modules(device.clone(), pass_index)
            .expect("graphics shader modules");

        let stages = [
            PipelineShaderStageCreateInfo::new(
                vertex_module.entry_point("main").expect("vertex entry point"),
            ),
            PipelineShaderStageCreateInfo::new(
                fragment_module
                    .entry_point("main")
                    .expect("fragment entry point"),
            ),
        ];

        let layout_info = PipelineDescriptorSetLayoutCreateInfo::from_stages(&stages);
        let layout = PipelineLayout::new(
            device.clone(),
            layout_info
                .into_pipeline_layout_create_info(device.clone())
                .expect("pipeline layout info"),
        )
        .expect("pipeline layout creation");

        let subpass = Subpass::from(framebuffer.render_pass.clone(), 0).expect("subpass 0");

        let color_blend_state = ColorBlendState::with_attachment_states(
            subpass.num_color_attachments(),
            ColorBlendAttachmentState {
                blend: (!pass.pipeline.blend_targets.is_empty())
                    .then(vulkano::pipeline::graphics::color_blend::AttachmentBlend::alpha),
                ..Default::default()
            },
        );

        let create_info = GraphicsPipelineCreateInfo {
            stages: stages.into_iter().collect(),
            vertex_input_state: Some(vertex_input_state(&shader.vertex_format)),
            input_assembly_state: Some(InputAssemblyState::default()),
            viewport_state: Some(ViewportState {
                viewports: [Viewport {
                    offset: [0.0, 0.0],
                    extent: [extent[0] as f32, extent[1] as f32],
                    depth_range: 0.0..=1.0,
                }]
                .into_iter()
                .collect(),
                ..Default::default()
            }),
            rasterization_state: Some(RasterizationState {
                cull_mode: cull_mode(pass.pipeline.cull_mode),
                ..Default::default()
            }),
            depth_stencil_state: depth_stencil_state(pass.pipeline.depth_test, pass.pipeline.depth_write),
            multisample_state: Some(MultisampleState::default()),
            color_blend_state: Some(color_blend_state),
            subpass: Some(subpass.into()),
            ..GraphicsPipelineCreateInfo::layout(layout)
        };

        let pipeline =
            GraphicsPipeline::new(device, None, create_info).expect("graphics pipeline creation");
        log::debug!(
            "built graphics pipeline for pass {} at {}x{}",
            pass_index, extent[0], extent[1]
        );

        self.graphics.insert(
            key,
            CachedGraphics {
                pipeline: pipeline.clone(),
                extent,
            },
        );
        pipeline
    }

    pub fn compute_pipeline(
        &mut self,
        device: Arc<Device>,
        shader_handle: Handle<Shader>,
        shader: &Shader,
        pass_index: usize,
    ) -> Arc<ComputePipeline> {
        let key = ComputeKey {
            shader: shader_handle,
            pass: pass_index,
        };
        if let Some(pipeline) = self.compute.get(&key) {
            return pipeline.clone();
        }

        let module = shader
            .compute_module(device.clone(), pass_index)
            .expect("compute shader module");
        let stage = PipelineShaderStageCreateInfo::new(
            module.entry_point("main").expect("compute entry point"),
        );
        let layout_info = PipelineDescriptorSetLayoutCreateInfo::from_stages(std::slice::from_ref(&stage));
        let layout = PipelineLayout::new(
            device.clone(),
            layout_info
                .into_pipeline_layout_create_info(device.clone())
                .expect("pipeline layout info"),
        )
        .expect("pipeline layout creation");

        let pipeline = ComputePipeline::new(
            device,
            None,
            vulkano::pipeline::compute::ComputePipelineCreateInfo::stage_layout(stage, layout),
        )
        .expect("compute pipeline creation");

        self.compute.insert(key, pipeline.clone());
        pipeline
    }
}
