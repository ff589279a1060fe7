// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Shaders are compiled ahead of time by
// build.rs and read from disk when a pipeline is built.

use super::error::BackendError;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Parse SPIR-V bytes into aligned words, checking length and magic number.
pub fn parse_spirv(bytes: &[u8], origin: &str) -> Result<Vec<u32>, BackendError> {
    let invalid = |reason: String| BackendError::InvalidShader {
        path: origin.to_string(),
        reason,
    };

    // read_spv handles alignment and endianness
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| invalid(e.to_string()))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(invalid(format!("bad magic number {:#010x}", other))),
        None => Err(invalid("empty module".to_string())),
    }
}

/// Owned shader module, destroyed once the pipeline using it is built.
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    pub fn from_file(device: Arc<VulkanDevice>, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read shader {}", path.display()))?;
        let code = parse_spirv(&bytes, &path.display().to_string())?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .with_context(|| format!("Failed to create shader module from {}", path.display()))?;

        log::debug!("Loaded shader {} ({} words)", path.display(), code.len());
        Ok(Self { module, device })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_well_formed_module() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = parse_spirv(&bytes, "test.spv").unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_truncated_bytes() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.pop();
        assert!(matches!(
            parse_spirv(&bytes, "cut.spv"),
            Err(BackendError::InvalidShader { .. })
        ));
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = words_to_bytes(&[0xDEAD_BEEF, 0]);
        match parse_spirv(&bytes, "junk.spv") {
            Err(BackendError::InvalidShader { path, reason }) => {
                assert_eq!(path, "junk.spv");
                assert!(reason.contains("magic"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_empty_file() {
        assert!(parse_spirv(&[], "empty.spv").is_err());
    }
}
