// Shader module loading
//
// Shaders arrive as pre-compiled SPIR-V blobs on disk; the bytes are
// treated as opaque and handed straight to module creation.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;

/// Load a SPIR-V blob from `path` and create a shader module from it.
pub fn create_shader_module<P: AsRef<Path>>(
    device: &VulkanDevice,
    path: P,
) -> Result<vk::ShaderModule> {
    let path = path.as_ref();

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader file: {}", path.display()))?;

    // SPIR-V is a stream of 4-byte words; read_spv handles the alignment.
    let code = ash::util::read_spv(&mut Cursor::new(bytes))
        .with_context(|| format!("Invalid SPIR-V in shader file: {}", path.display()))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .with_context(|| format!("Failed to create shader module: {}", path.display()))
    }
}
