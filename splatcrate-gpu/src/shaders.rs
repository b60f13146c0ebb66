//! Shader sources

use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;

use splatcrate_core::{Error, Result};
use tracing::debug;

use crate::device::check_error_scope;

pub const MESH_SHADER: &str = include_str!("shaders/mesh.wgsl");
pub const GAUSSIAN_SHADER: &str = include_str!("shaders/gaussian.wgsl");
pub const PREPROCESS_SHADER: &str = include_str!("shaders/preprocess.wgsl");

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Where a shader comes from.
///
/// Files with a `.spv` extension are loaded as SPIR-V; anything else is
/// treated as WGSL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderBlob {
    Embedded(&'static str),
    File(PathBuf),
}

impl ShaderBlob {
    /// `path` if given, `embedded` otherwise
    pub fn from_override(path: Option<PathBuf>, embedded: &'static str) -> Self {
        match path {
            Some(path) => ShaderBlob::File(path),
            None => ShaderBlob::Embedded(embedded),
        }
    }

    pub fn is_spirv(&self) -> bool {
        match self {
            ShaderBlob::Embedded(_) => false,
            ShaderBlob::File(path) => path.extension().is_some_and(|ext| ext == "spv"),
        }
    }

    /// Read the blob into a shader source
    pub fn source(&self) -> Result<wgpu::ShaderSource<'static>> {
        let path = match self {
            ShaderBlob::Embedded(source) => return Ok(wgpu::ShaderSource::Wgsl(Cow::Borrowed(*source))),
            ShaderBlob::File(path) => path,
        };

        let bytes = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.display().to_string(),
            },
            _ => Error::Io(e),
        })?;
        debug!("read shader {} ({} bytes)", path.display(), bytes.len());

        if self.is_spirv() {
            let words = spirv_words(&bytes)
                .map_err(|reason| Error::Shader(format!("{}: {}", path.display(), reason)))?;
            Ok(wgpu::ShaderSource::SpirV(Cow::Owned(words)))
        } else {
            let text = String::from_utf8(bytes)
                .map_err(|e| Error::Shader(format!("{}: not valid UTF-8: {}", path.display(), e)))?;
            Ok(wgpu::ShaderSource::Wgsl(Cow::Owned(text)))
        }
    }

    /// Compile the blob into a module on `device`
    pub fn load(&self, device: &wgpu::Device, label: &str) -> Result<wgpu::ShaderModule> {
        let source = self.source()?;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source,
        });
        check_error_scope(device, &format!("compile shader {}", label))
            .map_err(|e| Error::Shader(e.to_string()))?;
        Ok(module)
    }
}

fn spirv_words(bytes: &[u8]) -> std::result::Result<Vec<u32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!("length {} is not a multiple of 4", bytes.len()));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(format!("bad magic number {:#010x}", other)),
        None => Err("empty module".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_embedded_is_wgsl() {
        let blob = ShaderBlob::Embedded(MESH_SHADER);
        assert!(!blob.is_spirv());
        assert!(matches!(blob.source().unwrap(), wgpu::ShaderSource::Wgsl(_)));
    }

    #[test]
    fn test_override_selects_file() {
        let path = PathBuf::from("custom.spv");
        assert_eq!(
            ShaderBlob::from_override(Some(path.clone()), GAUSSIAN_SHADER),
            ShaderBlob::File(path)
        );
        assert_eq!(
            ShaderBlob::from_override(None, GAUSSIAN_SHADER),
            ShaderBlob::Embedded(GAUSSIAN_SHADER)
        );
    }

    #[test]
    fn test_missing_file() {
        let blob = ShaderBlob::File(env::temp_dir().join("splatcrate_missing_shader.wgsl"));
        assert!(matches!(blob.source(), Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_spirv_file_is_read_as_words() {
        let path = env::temp_dir().join("splatcrate_shader_words.spv");
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        let source = ShaderBlob::File(path.clone()).source().unwrap();
        match source {
            wgpu::ShaderSource::SpirV(words) => assert_eq!(&words[..], &[SPIRV_MAGIC, 0x0001_0000]),
            _ => panic!("expected SPIR-V"),
        }
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_spirv_with_bad_magic_is_rejected() {
        assert!(spirv_words(&[0, 0, 0, 0]).is_err());
        assert!(spirv_words(&[1, 2, 3]).is_err());
        assert!(spirv_words(&[]).is_err());
    }
}
