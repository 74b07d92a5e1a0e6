//! Depth and multisampled color attachments sized to the chain.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use mocap_rhi::RhiResult;
use mocap_rhi::device::Device;
use mocap_rhi::image::{Image, ImageDesc};

/// Sample count used for every attachment.
///
/// `max_usable` is the device's highest count supported by both color and
/// depth attachments.
pub fn choose_sample_count(msaa: bool, max_usable: vk::SampleCountFlags) -> vk::SampleCountFlags {
    if msaa && !max_usable.is_empty() {
        max_usable
    } else {
        vk::SampleCountFlags::TYPE_1
    }
}

/// Formats and sample count fixed for the renderer's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
    pub samples: vk::SampleCountFlags,
}

impl TargetFormats {
    /// Rendering goes to a separate color target that is resolved into the
    /// chain image.
    pub fn is_multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }
}

pub fn create_depth_target(
    device: Arc<Device>,
    extent: vk::Extent2D,
    formats: &TargetFormats,
) -> RhiResult<Image> {
    let image = Image::new(device, ImageDesc::depth(extent, formats.depth, formats.samples))?;
    info!(
        "Depth target {}x{} {:?} x{}",
        extent.width,
        extent.height,
        formats.depth,
        formats.samples.as_raw()
    );
    Ok(image)
}

/// The multisampled color target, or `None` when rendering single-sampled
/// straight into the chain image.
pub fn create_color_target(
    device: Arc<Device>,
    extent: vk::Extent2D,
    formats: &TargetFormats,
) -> RhiResult<Option<Image>> {
    if !formats.is_multisampled() {
        return Ok(None);
    }

    let desc = ImageDesc::color(
        "msaa color",
        extent,
        formats.color,
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
    )
    .with_samples(formats.samples);
    let image = Image::new(device, desc)?;
    info!(
        "MSAA color target {}x{} x{}",
        extent.width,
        extent.height,
        formats.samples.as_raw()
    );
    Ok(Some(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msaa_off_is_single_sample() {
        assert_eq!(
            choose_sample_count(false, vk::SampleCountFlags::TYPE_8),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_msaa_on_uses_device_max() {
        assert_eq!(
            choose_sample_count(true, vk::SampleCountFlags::TYPE_4),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            choose_sample_count(true, vk::SampleCountFlags::empty()),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_multisampled_flag() {
        let mut formats = TargetFormats {
            color: vk::Format::B8G8R8A8_SRGB,
            depth: vk::Format::D32_SFLOAT,
            samples: vk::SampleCountFlags::TYPE_1,
        };
        assert!(!formats.is_multisampled());
        formats.samples = vk::SampleCountFlags::TYPE_4;
        assert!(formats.is_multisampled());
    }
}
