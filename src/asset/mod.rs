// Model loading: turns files on disk into CPU-side meshes ready for upload

pub mod cube;
pub mod obj;

use crate::backend::pipeline::Vertex3D;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use obj::ObjLoader;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Model {0} contains no geometry")]
    Empty(PathBuf),
    #[error("No loader for model {0}")]
    Unsupported(PathBuf),
}

/// One drawable piece of a model with the texture maps its material names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedMesh {
    pub name: String,
    pub vertices: Vec<Vertex3D>,
    pub indices: Vec<u32>,
    pub albedo_path: Option<PathBuf>,
    pub normal_path: Option<PathBuf>,
}

pub trait ModelLoader {
    fn supports(&self, path: &Path) -> bool;
    fn load(&self, path: &Path) -> Result<Vec<LoadedMesh>, AssetError>;
}

/// Load `path` with the first loader that claims it.
pub fn load_model(path: &Path) -> Result<Vec<LoadedMesh>, AssetError> {
    let loaders: [&dyn ModelLoader; 1] = [&ObjLoader];
    let loader = loaders
        .into_iter()
        .find(|l| l.supports(path))
        .ok_or_else(|| AssetError::Unsupported(path.to_path_buf()))?;

    let meshes = loader.load(path)?;
    log::info!("Loaded model {} ({} meshes)", path.display(), meshes.len());
    Ok(meshes)
}

/// Resolve a texture reference from a material file.
///
/// Absolute paths written by authoring tools are reduced to their file name.
/// The name is tried next to the model first, then searched for anywhere
/// below the model directory. Returns None when nothing matches.
pub fn resolve_texture_path(model_dir: &Path, reference: &str) -> Option<PathBuf> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    // Authoring tools on Windows write backslashes
    let normalized = reference.replace('\\', "/");
    let mut relative = PathBuf::from(&normalized);
    if relative.is_absolute() || normalized.get(1..2) == Some(":") {
        relative = PathBuf::from(relative.file_name()?);
    }

    let direct = model_dir.join(&relative);
    if direct.is_file() {
        return Some(direct);
    }

    let file_name = relative.file_name()?;
    find_file_recursive(model_dir, file_name)
}

fn find_file_recursive(root: &Path, file_name: &std::ffi::OsStr) -> Option<PathBuf> {
    let entries = fs::read_dir(root).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.file_name() == Some(file_name) {
            return Some(path);
        }
    }

    // Stable order so repeated runs pick the same match
    subdirs.sort();
    subdirs
        .iter()
        .find_map(|dir| find_file_recursive(dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vxr-asset-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn texture_next_to_model_resolves_directly() {
        let dir = scratch_dir("direct");
        fs::write(dir.join("albedo.png"), b"x").unwrap();

        assert_eq!(resolve_texture_path(&dir, "albedo.png"), Some(dir.join("albedo.png")));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn absolute_authoring_paths_fall_back_to_search() {
        let dir = scratch_dir("search");
        fs::create_dir_all(dir.join("textures/hull")).unwrap();
        fs::write(dir.join("textures/hull/normal.png"), b"x").unwrap();

        let found = resolve_texture_path(&dir, "C:\\Users\\artist\\maps\\normal.png");
        assert_eq!(found, Some(dir.join("textures/hull/normal.png")));

        let found = resolve_texture_path(&dir, "/home/artist/normal.png");
        assert_eq!(found, Some(dir.join("textures/hull/normal.png")));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_texture_resolves_to_none() {
        let dir = scratch_dir("missing");
        assert_eq!(resolve_texture_path(&dir, "nowhere.png"), None);
        assert_eq!(resolve_texture_path(&dir, "  "), None);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = load_model(Path::new("model.fbx")).unwrap_err();
        assert!(matches!(err, AssetError::Unsupported(_)));
    }
}
