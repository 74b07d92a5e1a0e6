//! Sampled textures with a full mip chain.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::Buffer;
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, generate_mipmaps, mip_level_count};

/// Texel format of uploaded RGBA8 textures.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Repeating, trilinear, anisotropic sampler.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates a sampler covering `mip_levels` levels.
    pub fn new(device: Arc<Device>, mip_levels: u32) -> RhiResult<Self> {
        let max_anisotropy = device.gpu().properties.limits.max_sampler_anisotropy;
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}

/// Mipmapped texture ready for sampling in the fragment shader.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Uploads tightly packed RGBA8 `pixels` and generates every mip level.
    ///
    /// Blocks until the upload and mip generation have executed.
    ///
    /// # Errors
    ///
    /// Returns an error if `pixels` does not hold `width * height` texels,
    /// the format cannot be blitted with linear filtering, or any resource
    /// creation fails.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        name: &'static str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "texture {name}: {} bytes for {width}x{height} RGBA8",
                pixels.len()
            )));
        }

        let mip_levels = mip_level_count(width, height);
        let staging = Buffer::staging(device.clone(), pixels)?;
        let image = Image::new(
            device.clone(),
            ImageDesc::color(
                name,
                vk::Extent2D { width, height },
                TEXTURE_FORMAT,
                vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .with_mip_levels(mip_levels),
        )?;

        pool.run_blocking(|cmd| {
            image.transition(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;

            let region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .layer_count(1),
                )
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), region);

            generate_mipmaps(&device, cmd, &image)
        })?;

        let sampler = Sampler::new(device, mip_levels)?;

        info!(
            "Texture '{}' uploaded: {}x{}, {} mip levels",
            name, width, height, mip_levels
        );

        Ok(Self { image, sampler })
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }
}
