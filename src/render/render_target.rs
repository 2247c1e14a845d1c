//! A color image (usable as color attachment, sampled texture, and input
//! attachment) with an optional depth-stencil buffer.

use std::sync::Arc;

use vulkano::format::Format;
use vulkano::image::view::ImageView;
use vulkano::image::{Image, ImageCreateInfo, ImageUsage};
use vulkano::memory::allocator::{AllocationCreateInfo, MemoryTypeFilter};

use crate::vulkano_objects::allocators::Allocators;

pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub color_image: Arc<Image>,
    pub color_view: Arc<ImageView>,
    pub depth_view: Option<Arc<ImageView>>,
}

impl RenderTarget {
    /// Creates a render target's color image with
    /// color-attachment + sampled + input-attachment usage, and, if
    /// `with_depth` is set, a depth-stencil buffer of matching extent.
    pub fn new(
        allocators: &Allocators,
        width: u32,
        height: u32,
        format: Format,
        with_depth: bool,
    ) -> Self {
        let color_image = Image::new(
            allocators.memory.clone(),
            ImageCreateInfo {
                extent: [width, height, 1],
                format,
                usage: ImageUsage::COLOR_ATTACHMENT
                    | ImageUsage::SAMPLED
                    | ImageUsage::INPUT_ATTACHMENT,
                ..Default::default()
            },
            AllocationCreateInfo {
                memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
                ..Default::default()
            },
        )
        .expect("render target color image allocation");
        let color_view = ImageView::new_default(color_image.clone())
            .expect("render target color image view");

        let depth_view = with_depth.then(|| {
            let depth_image = Image::new(
                allocators.memory.clone(),
                ImageCreateInfo {
                    extent: [width, height, 1],
                    format: Format::D32_SFLOAT,
                    usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                },
                AllocationCreateInfo {
                    memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
                    ..Default::default()
                },
            )
            .expect("render target depth image allocation");
            ImageView::new_default(depth_image).expect("render target depth image view")
        });

        RenderTarget {
            width,
            height,
            format,
            color_image,
            color_view,
            depth_view,
        }
    }

    pub fn has_depth(&self) -> bool {
        self.depth_view.is_some()
    }
}
