//! Builds a Vulkan renderpass + framebuffer from a list of render targets.
//!
//! Unlike the teacher's `vulkano_objects::render_pass`, whose
//! `single_pass_renderpass!`/`ordered_passes_renderpass!` macros fix the
//! attachment list at compile time, a [`Framebuffer`] here is built from a
//! runtime-determined render-target list, so the lower-level
//! `RenderPass::new`/`vulkano::render_pass::Framebuffer::new` constructors
//! are used directly instead of the macros.

use std::sync::Arc;

use vulkano::device::Device;
use vulkano::image::{ImageLayout, SampleCount};
use vulkano::render_pass::{
    AttachmentDescription, AttachmentLoadOp, AttachmentReference, AttachmentStoreOp,
    FramebufferCreateInfo, RenderPass, RenderPassCreateInfo, SubpassDescription,
};

use crate::core::handle::{Handle, PackedFreelist};

use super::render_target::RenderTarget;

pub struct Framebuffer {
    pub color_targets: Vec<Handle<RenderTarget>>,
    pub depth_target: Option<Handle<RenderTarget>>,
    pub render_pass: Arc<RenderPass>,
    pub framebuffer: Arc<vulkano::render_pass::Framebuffer>,
}

impl Framebuffer {
    /// Builds one renderpass attachment per color target (load = CLEAR,
    /// store = STORE) plus a depth attachment if any target carries depth,
    /// and a single subpass referencing all of them. Every target must
    /// share the same width/height.
    pub fn new(
        device: Arc<Device>,
        targets: &PackedFreelist<RenderTarget>,
        color_targets: &[Handle<RenderTarget>],
    ) -> Self {
        assert!(!color_targets.is_empty(), "framebuffer needs a color target");

        let first = targets.get(color_targets[0]).expect("valid render target");
        let (width, height) = (first.width, first.height);
        for &handle in color_targets {
            let target = targets.get(handle).expect("valid render target");
            assert_eq!((target.width, target.height), (width, height));
        }

        let depth_target = color_targets
            .iter()
            .copied()
            .find(|&h| targets.get(h).unwrap().has_depth());

        let mut attachments = Vec::new();
        let mut color_refs = Vec::new();
        let mut views = Vec::new();

        for &handle in color_targets {
            let target = targets.get(handle).unwrap();
            let layout = ImageLayout::ShaderReadOnlyOptimal;
            attachments.push(AttachmentDescription {
                format: target.format,
                samples: SampleCount::Sample1,
                load_op: AttachmentLoadOp::Clear,
                store_op: AttachmentStoreOp::Store,
                initial_layout: layout,
                final_layout: layout,
                ..Default::default()
            });
            color_refs.push(Some(AttachmentReference {
                attachment: (attachments.len() - 1) as u32,
                layout: ImageLayout::ColorAttachmentOptimal,
                ..Default::default()
            }));
            views.push(target.color_view.clone());
        }

        let depth_ref = depth_target.map(|handle| {
            let target = targets.get(handle).unwrap();
            attachments.push(AttachmentDescription {
                format: vulkano::format::Format::D32_SFLOAT,
                samples: SampleCount::Sample1,
                load_op: AttachmentLoadOp::Clear,
                store_op: AttachmentStoreOp::Store,
                initial_layout: ImageLayout::DepthStencilAttachmentOptimal,
                final_layout: ImageLayout::DepthStencilAttachmentOptimal,
                ..Default::default()
            });
            views.push(target.depth_view.clone().expect("depth target has a depth view"));
            AttachmentReference {
                attachment: (attachments.len() - 1) as u32,
                layout: ImageLayout::DepthStencilAttachmentOptimal,
                ..Default::default()
            }
        });

        let subpass = SubpassDescription {
            color_attachments: color_refs,
            depth_stencil_attachment: depth_ref,
            ..Default::default()
        };

        let render_pass = RenderPass::new(
            device,
            RenderPassCreateInfo {
                attachments,
                subpasses: vec![subpass],
                ..Default::default()
            },
        )
        .expect("render pass creation");

        let framebuffer = vulkano::render_pass::Framebuffer::new(
            render_pass.clone(),
            FramebufferCreateInfo {
                attachments: views,
                extent: [width, height],
                layers: 1,
                ..Default::default()
            },
        )
        .expect("framebuffer creation");

        Framebuffer {
            color_targets: color_targets.to_vec(),
            depth_target,
            render_pass,
            framebuffer,
        }
    }
}
