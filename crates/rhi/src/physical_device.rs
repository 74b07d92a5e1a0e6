//! GPU selection and the capability queries made after it.
//!
//! A GPU qualifies when it has graphics and present queues, the swapchain
//! extension, sampler anisotropy and Vulkan 1.3 (dynamic rendering,
//! synchronization2). Qualifying GPUs are ranked by device type first.
//!
//! Every query is split into the Vulkan call and a pure function over its
//! result, so the decisions are testable without a driver.

use std::ffi::CStr;

use ash::vk;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::RhiError;

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Queue families the device is created with. May be the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Each family once, graphics first.
    pub fn distinct(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Why a GPU was passed over.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
enum Rejection {
    #[error("no graphics queue")]
    NoGraphicsQueue,
    #[error("no queue can present to the surface")]
    NoPresentQueue,
    #[error("VK_KHR_swapchain not supported")]
    NoSwapchain,
    #[error("sampler anisotropy not supported")]
    NoAnisotropy,
    #[error("Vulkan {0}.{1} is older than 1.3")]
    ApiTooOld(u32, u32),
}

/// The selected GPU and what was queried about it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    pub fn name(&self) -> &str {
        device_name(&self.properties)
    }

    /// Highest sample count usable for both color and depth attachments.
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        max_usable_sample_count(&self.properties.limits)
    }

    /// First of `candidates` supporting `features` with the given tiling.
    ///
    /// # Errors
    /// Returns [`RhiError::UnsupportedFormat`] if none qualifies.
    pub fn find_supported_format(
        &self,
        instance: &ash::Instance,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format, RhiError> {
        select_format(candidates, tiling, features, |format| {
            self.format_properties(instance, format)
        })
        .ok_or_else(|| RhiError::UnsupportedFormat(format!("none of {candidates:?} support {features:?}")))
    }

    /// Preferred depth attachment format.
    pub fn find_depth_format(&self, instance: &ash::Instance) -> Result<vk::Format, RhiError> {
        self.find_supported_format(
            instance,
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    pub fn format_properties(&self, instance: &ash::Instance, format: vk::Format) -> vk::FormatProperties {
        unsafe { instance.get_physical_device_format_properties(self.device, format) }
    }

    /// Index of a memory type allowed by `type_bits` with all `required` flags.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Result<u32, RhiError> {
        find_memory_type(&self.memory_properties, type_bits, required).ok_or_else(|| {
            RhiError::AllocationFailed(format!(
                "no memory type in {type_bits:#b} with {required:?}"
            ))
        })
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.name())
            .field("type", &self.properties.device_type)
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> &str {
    properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("<unnamed>")
}

/// Highest single sample-count bit present in both color and depth limits.
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts =
        limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&bit| counts.contains(bit))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// First candidate whose properties (from `query`) support `features` for `tiling`.
pub fn select_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut query: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = query(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

/// Index of the first memory type allowed by `type_bits` that has every
/// flag in `required`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1 << i) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(i, _)| i as u32)
}

/// Whether `format` carries a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Picks the best GPU for rendering to `surface`.
///
/// # Errors
///
/// [`RhiError::NoSuitableGpu`] when no GPU qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("{} Vulkan device(s) present", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            match inspect(instance, device, properties, surface, surface_loader) {
                Ok(gpu) => Some(gpu),
                Err(reason) => {
                    debug!("Skipping '{}': {}", device_name(&properties), reason);
                    None
                }
            }
        })
        .max_by_key(score)
        .ok_or(RhiError::NoSuitableGpu)?;

    info!(
        "Using '{}' ({:?}), Vulkan {}.{}",
        best.name(),
        best.properties.device_type,
        vk::api_version_major(best.properties.api_version),
        vk::api_version_minor(best.properties.api_version)
    );
    Ok(best)
}

fn inspect(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, Rejection> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let capabilities = families.iter().zip(0u32..).map(|(family, index)| {
        let graphics = family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = family.queue_count > 0
            && unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .unwrap_or(false)
            };
        (graphics, present)
    });
    let queue_families = pick_queue_families(capabilities)?;

    let features = unsafe { instance.get_physical_device_features(device) };
    check_requirements(
        &properties,
        &features,
        has_extension(instance, device, ash::khr::swapchain::NAME),
    )?;

    Ok(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
        queue_families,
    })
}

/// Chooses families from per-family `(graphics, present)` support.
///
/// A family that does both wins, so swapchain images never change queue
/// ownership; otherwise the first of each.
fn pick_queue_families(
    families: impl IntoIterator<Item = (bool, bool)>,
) -> Result<QueueFamilies, Rejection> {
    let (mut graphics, mut present) = (None, None);
    for ((can_draw, can_present), index) in families.into_iter().zip(0u32..) {
        if can_draw && can_present {
            return Ok(QueueFamilies {
                graphics: index,
                present: index,
            });
        }
        if can_draw {
            graphics.get_or_insert(index);
        }
        if can_present {
            present.get_or_insert(index);
        }
    }
    Ok(QueueFamilies {
        graphics: graphics.ok_or(Rejection::NoGraphicsQueue)?,
        present: present.ok_or(Rejection::NoPresentQueue)?,
    })
}

fn check_requirements(
    properties: &vk::PhysicalDeviceProperties,
    features: &vk::PhysicalDeviceFeatures,
    has_swapchain: bool,
) -> Result<(), Rejection> {
    if !has_swapchain {
        return Err(Rejection::NoSwapchain);
    }
    if features.sampler_anisotropy == vk::FALSE {
        return Err(Rejection::NoAnisotropy);
    }
    let version = properties.api_version;
    if version < vk::API_VERSION_1_3 {
        return Err(Rejection::ApiTooOld(
            vk::api_version_major(version),
            vk::api_version_minor(version),
        ));
    }
    Ok(())
}

fn has_extension(instance: &ash::Instance, device: vk::PhysicalDevice, name: &CStr) -> bool {
    unsafe { instance.enumerate_device_extension_properties(device) }.is_ok_and(|extensions| {
        extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext_name| ext_name == name))
    })
}

/// Ranks qualifying GPUs: device type dominates, then texture size limit,
/// VRAM (capped at 16 GiB) and MSAA headroom for thin bones.
fn score(gpu: &PhysicalDeviceInfo) -> u32 {
    let kind = match gpu.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    let memory = &gpu.memory_properties;
    let vram: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .sum();
    let vram_mib = (vram >> 20).min(16_000) as u32;

    kind + gpu.properties.limits.max_image_dimension2_d
        + vram_mib
        + gpu.max_usable_sample_count().as_raw() * 10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualifying_properties() -> vk::PhysicalDeviceProperties {
        vk::PhysicalDeviceProperties {
            api_version: vk::API_VERSION_1_3,
            ..Default::default()
        }
    }

    fn anisotropic() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        }
    }

    fn gpu(device_type: vk::PhysicalDeviceType, vram: u64) -> PhysicalDeviceInfo {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 1,
            ..Default::default()
        };
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: vram,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        PhysicalDeviceInfo {
            device: vk::PhysicalDevice::null(),
            properties: vk::PhysicalDeviceProperties {
                device_type,
                ..qualifying_properties()
            },
            features: anisotropic(),
            memory_properties,
            queue_families: QueueFamilies {
                graphics: 0,
                present: 0,
            },
        }
    }

    #[test]
    fn test_combined_family_wins() {
        let families = pick_queue_families([(true, false), (false, true), (true, true)]).unwrap();
        assert_eq!(
            families,
            QueueFamilies {
                graphics: 2,
                present: 2
            }
        );
        assert_eq!(families.distinct(), vec![2]);
    }

    #[test]
    fn test_split_families() {
        let families = pick_queue_families([(false, false), (true, false), (false, true)]).unwrap();
        assert_eq!(
            families,
            QueueFamilies {
                graphics: 1,
                present: 2
            }
        );
        assert_eq!(families.distinct(), vec![1, 2]);
    }

    #[test]
    fn test_missing_family_rejects() {
        assert_eq!(
            pick_queue_families([(false, true)]),
            Err(Rejection::NoGraphicsQueue)
        );
        assert_eq!(
            pick_queue_families([(true, false)]),
            Err(Rejection::NoPresentQueue)
        );
        assert_eq!(pick_queue_families([]), Err(Rejection::NoGraphicsQueue));
    }

    #[test]
    fn test_requirements() {
        let props = qualifying_properties();
        assert_eq!(check_requirements(&props, &anisotropic(), true), Ok(()));
        assert_eq!(
            check_requirements(&props, &anisotropic(), false),
            Err(Rejection::NoSwapchain)
        );
        assert_eq!(
            check_requirements(&props, &vk::PhysicalDeviceFeatures::default(), true),
            Err(Rejection::NoAnisotropy)
        );

        let old = vk::PhysicalDeviceProperties {
            api_version: vk::API_VERSION_1_2,
            ..props
        };
        let err = check_requirements(&old, &anisotropic(), true).unwrap_err();
        assert_eq!(err, Rejection::ApiTooOld(1, 2));
        assert_eq!(err.to_string(), "Vulkan 1.2 is older than 1.3");
    }

    #[test]
    fn test_discrete_outranks_integrated() {
        let discrete = gpu(vk::PhysicalDeviceType::DISCRETE_GPU, 2 << 30);
        let integrated = gpu(vk::PhysicalDeviceType::INTEGRATED_GPU, 8 << 30);
        assert!(score(&discrete) > score(&integrated));
        assert!(score(&gpu(vk::PhysicalDeviceType::DISCRETE_GPU, 8 << 30)) > score(&discrete));
    }

    #[test]
    fn test_max_usable_sample_count_intersects_limits() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            max_usable_sample_count(&vk::PhysicalDeviceLimits::default()),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_select_format_respects_tiling() {
        let query = |format: vk::Format| match format {
            vk::Format::D32_SFLOAT => vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            vk::Format::D24_UNORM_S8_UINT => vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            _ => vk::FormatProperties::default(),
        };
        let depth = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        let optimal = select_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::OPTIMAL, depth, query);
        assert_eq!(optimal, Some(vk::Format::D24_UNORM_S8_UINT));

        let linear = select_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::LINEAR, depth, query);
        assert_eq!(linear, Some(vk::Format::D32_SFLOAT));

        let none = select_format(
            &[vk::Format::D32_SFLOAT_S8_UINT],
            vk::ImageTiling::OPTIMAL,
            depth,
            query,
        );
        assert_eq!(none, None);
    }

    #[test]
    fn test_find_memory_type_honours_mask_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b111, host), Some(1));
        assert_eq!(find_memory_type(&props, 0b100, host), Some(2));
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
        assert_eq!(find_memory_type(&props, 0b001, host), None);
        // Types past memory_type_count are ignored.
        assert_eq!(
            find_memory_type(&props, 1 << 5, vk::MemoryPropertyFlags::empty()),
            None
        );
    }

    #[test]
    fn test_has_stencil_component() {
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }
}
