//! SPIR-V shader modules.
//!
//! The viewer ships precompiled `.spv` files (see `shaders/README.md`);
//! nothing is compiled at runtime.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

const ENTRY_POINT: &CStr = c"main";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// A loaded module and the stage it will be bound to. Entry point `main`.
pub struct Shader {
    module: vk::ShaderModule,
    stage: ShaderStage,
    device: Arc<Device>,
}

impl Shader {
    /// Reads and validates a `.spv` file.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderError`] naming `path` when the file is missing or is
    /// not SPIR-V.
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| RhiError::ShaderError(format!("{}: {e}", path.display())))?;
        let words = spirv_words(&bytes)
            .map_err(|e| RhiError::ShaderError(format!("{}: {e}", path.display())))?;

        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { device.handle().create_shader_module(&info, None)? };
        debug!("{:?} shader {} ({} words)", stage, path.display(), words.len());

        Ok(Self {
            module,
            stage,
            device,
        })
    }

    /// Borrows this module for pipeline creation.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_shader_module(self.module, None) };
    }
}

/// Decodes SPIR-V bytes into aligned words and checks the magic number.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, String> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| e.to_string())?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(format!("bad SPIR-V magic {other:#010x}")),
        None => Err("empty SPIR-V module".to_string()),
    }
}
