//! Vulkan 1.3 instance with optional Khronos validation.
//!
//! When validation is requested and installed, a debug messenger forwards
//! every validation message to `tracing` at the matching level.
//!
//! ```no_run
//! use mocap_rhi::instance::Instance;
//! # fn demo(display: raw_window_handle::RawDisplayHandle) -> mocap_rhi::RhiResult<()> {
//! let instance = Instance::new(c"Mocap Viewer", cfg!(debug_assertions), display)?;
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_void};

use ash::{Entry, vk};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    raw: vk::DebugUtilsMessengerEXT,
}

/// Owns the loader entry, the instance and the debug messenger, destroyed
/// in reverse order.
pub struct Instance {
    entry: Entry,
    raw: ash::Instance,
    messenger: Option<DebugMessenger>,
}

impl Instance {
    /// Creates an instance able to present to `display`.
    ///
    /// A missing validation layer is logged and ignored.
    ///
    /// # Errors
    ///
    /// Loading the Vulkan library, the platform surface extensions or
    /// instance creation failed.
    pub fn new(app_name: &CStr, validation: bool, display: RawDisplayHandle) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation = validation && {
            let present = has_validation_layer(&entry)?;
            if !present {
                warn!("{:?} is not installed; running without validation", VALIDATION_LAYER);
            }
            present
        };

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| RhiError::SurfaceError(format!("no surface extensions: {e}")))?
            .to_vec();
        let mut layers = Vec::new();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let version = vk::make_api_version(0, 0, 1, 0);
        let app = vk::ApplicationInfo::default()
            .application_name(app_name)
            .application_version(version)
            .engine_name(c"mocap")
            .engine_version(version)
            .api_version(vk::API_VERSION_1_3);
        let info = vk::InstanceCreateInfo::default()
            .application_info(&app)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let raw = unsafe { entry.create_instance(&info, None)? };

        let mut instance = Self {
            entry,
            raw,
            messenger: None,
        };
        if validation {
            let loader = ash::ext::debug_utils::Instance::new(&instance.entry, &instance.raw);
            let raw = unsafe { loader.create_debug_utils_messenger(&messenger_info(), None)? };
            instance.messenger = Some(DebugMessenger { loader, raw });
        }

        info!(
            "Vulkan 1.3 instance, validation {}",
            if validation { "on" } else { "off" }
        );
        Ok(instance)
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.raw
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The validation layer is loaded and reporting.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(messenger) = self.messenger.take() {
                messenger
                    .loader
                    .destroy_debug_utils_messenger(messenger.raw, None);
            }
            self.raw.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

fn has_validation_layer(entry: &Entry) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER)))
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
    use vk::DebugUtilsMessageTypeFlagsEXT as Kind;

    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(Severity::VERBOSE | Severity::INFO | Severity::WARNING | Severity::ERROR)
        .message_type(Kind::GENERAL | Kind::VALIDATION | Kind::PERFORMANCE)
        .pfn_user_callback(Some(forward_to_tracing))
}

/// Logs one validation message. Never asks the driver to abort the call.
///
/// # Safety
///
/// `data` is null or points at callback data valid for this call.
unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

    let message = match unsafe { data.as_ref() } {
        Some(data) if !data.p_message.is_null() => {
            unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
        }
        _ => Cow::Borrowed("<empty>"),
    };
    let kind = kind_label(kind);
    if severity.contains(Severity::ERROR) {
        error!(target: "vulkan", "[{kind}] {message}");
    } else if severity.contains(Severity::WARNING) {
        warn!(target: "vulkan", "[{kind}] {message}");
    } else if severity.contains(Severity::INFO) {
        info!(target: "vulkan", "[{kind}] {message}");
    } else {
        debug!(target: "vulkan", "[{kind}] {message}");
    }
    vk::FALSE
}

/// Most specific label when several type bits are set.
fn kind_label(kind: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    use vk::DebugUtilsMessageTypeFlagsEXT as Kind;
    [
        (Kind::VALIDATION, "validation"),
        (Kind::PERFORMANCE, "performance"),
        (Kind::GENERAL, "general"),
    ]
    .into_iter()
    .find_map(|(bit, label)| kind.contains(bit).then_some(label))
    .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::DebugUtilsMessageTypeFlagsEXT as Kind;

    #[test]
    fn test_kind_label_prefers_specific_bits() {
        assert_eq!(kind_label(Kind::VALIDATION | Kind::GENERAL), "validation");
        assert_eq!(kind_label(Kind::GENERAL | Kind::PERFORMANCE), "performance");
        assert_eq!(kind_label(Kind::GENERAL), "general");
        assert_eq!(kind_label(Kind::empty()), "unknown");
    }

    #[test]
    fn test_messenger_reports_every_severity() {
        let info = messenger_info();
        let all = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
            | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE;
        assert!(info.message_severity.contains(all));
        assert!(info.pfn_user_callback.is_some());
    }

    #[test]
    fn test_null_callback_data_is_tolerated() {
        let abort = unsafe {
            forward_to_tracing(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                Kind::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(abort, vk::FALSE);
    }
}
