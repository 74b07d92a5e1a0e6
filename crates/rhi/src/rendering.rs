//! Attachments for the viewer's single dynamic rendering pass.
//!
//! Each frame clears one color target and one depth target. With MSAA the
//! color target is the multisampled image and the swapchain view is the
//! resolve destination; the multisampled contents are not stored.

use ash::vk;

/// The frame's color output.
#[derive(Clone, Copy, Debug)]
pub struct ColorTarget {
    pub view: vk::ImageView,
    pub clear: [f32; 4],
    /// Single-sample view resolved into at the end of the pass.
    pub resolve: Option<vk::ImageView>,
}

impl ColorTarget {
    fn attachment(&self) -> vk::RenderingAttachmentInfo<'static> {
        let layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        let base = vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(layout)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: self.clear },
            });

        match self.resolve {
            Some(resolve) => base
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(resolve)
                .resolve_image_layout(layout),
            None => base.store_op(vk::AttachmentStoreOp::STORE),
        }
    }
}

fn depth_attachment(view: vk::ImageView) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .clear_value(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        })
}

/// Owns the attachment infos a `VkRenderingInfo` points at.
pub struct PassAttachments {
    color: [vk::RenderingAttachmentInfo<'static>; 1],
    depth: vk::RenderingAttachmentInfo<'static>,
    area: vk::Rect2D,
}

impl PassAttachments {
    pub fn new(extent: vk::Extent2D, color: ColorTarget, depth_view: vk::ImageView) -> Self {
        Self {
            color: [color.attachment()],
            depth: depth_attachment(depth_view),
            area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            },
        }
    }

    /// Borrows `self`; keep it alive until the pass has begun.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        vk::RenderingInfo::default()
            .render_area(self.area)
            .layer_count(1)
            .color_attachments(&self.color)
            .depth_attachment(&self.depth)
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 640,
        height: 480,
    };

    fn target(resolve: Option<vk::ImageView>) -> ColorTarget {
        ColorTarget {
            view: vk::ImageView::from_raw(3),
            clear: [0.1, 0.2, 0.3, 1.0],
            resolve,
        }
    }

    #[test]
    fn test_single_sample_color_is_stored() {
        let info = target(None).attachment();
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(info.resolve_mode, vk::ResolveModeFlags::NONE);
        let clear = unsafe { info.clear_value.color.float32 };
        assert_eq!(clear, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_resolve_discards_multisampled_contents() {
        let resolve = vk::ImageView::from_raw(7);
        let info = target(Some(resolve)).attachment();
        assert_eq!(info.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(info.resolve_image_view, resolve);
        assert_eq!(info.resolve_mode, vk::ResolveModeFlags::AVERAGE);
    }

    #[test]
    fn test_depth_clears_to_far_plane() {
        let info = depth_attachment(vk::ImageView::null());
        let depth = unsafe { info.clear_value.depth_stencil.depth };
        assert_eq!(depth, 1.0);
        assert_eq!(
            info.image_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_pass_info_covers_extent() {
        let pass = PassAttachments::new(EXTENT, target(None), vk::ImageView::null());
        let info = pass.info();
        assert_eq!(info.color_attachment_count, 1);
        assert_eq!(info.layer_count, 1);
        assert!(!info.p_depth_attachment.is_null());
        assert_eq!(pass.render_area().extent, EXTENT);
    }
}
