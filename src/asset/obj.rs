// Wavefront OBJ + MTL loader
//
// Faces are fan-triangulated, identical position/uv/normal corners are shared,
// V is flipped to Vulkan's top-left texture origin, and faces without normals
// get flat face normals. A new mesh starts at every `usemtl` switch.

use super::{resolve_texture_path, AssetError, LoadedMesh, ModelLoader};
use crate::backend::pipeline::Vertex3D;
use glam::Vec3;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct ObjLoader;

impl ModelLoader for ObjLoader {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("obj"))
    }

    fn load(&self, path: &Path) -> Result<Vec<LoadedMesh>, AssetError> {
        let source = read_to_string(path)?;
        let parsed = parse_obj(&source)?;
        let model_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut materials = HashMap::new();
        for lib in &parsed.material_libs {
            let lib_path = model_dir.join(lib);
            match read_to_string(&lib_path) {
                Ok(text) => materials.extend(parse_mtl(&text)),
                Err(e) => log::warn!("{} (continuing without it)", e),
            }
        }

        let mut meshes = Vec::with_capacity(parsed.groups.len());
        for group in parsed.groups {
            let material = group.material.as_deref().and_then(|m| materials.get(m));
            let resolve = |reference: Option<&String>| {
                let reference = reference?;
                let resolved = resolve_texture_path(model_dir, reference);
                if resolved.is_none() {
                    log::warn!("Texture '{}' not found under {}", reference, model_dir.display());
                }
                resolved
            };

            meshes.push(LoadedMesh {
                name: group.material.clone().unwrap_or_else(|| "default".to_string()),
                albedo_path: resolve(material.and_then(|m| m.albedo.as_ref())),
                normal_path: resolve(material.and_then(|m| m.normal.as_ref())),
                vertices: group.vertices,
                indices: group.indices,
            });
        }

        if meshes.is_empty() {
            return Err(AssetError::Empty(path.to_path_buf()));
        }
        Ok(meshes)
    }
}

fn read_to_string(path: &Path) -> Result<String, AssetError> {
    fs::read_to_string(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default)]
pub struct ObjGroup {
    pub material: Option<String>,
    pub vertices: Vec<Vertex3D>,
    pub indices: Vec<u32>,
    // (position, uv, normal) -> vertex index; corners without a normal are never shared
    corners: HashMap<(usize, Option<usize>, usize), u32>,
}

#[derive(Debug, Default)]
pub struct ObjData {
    pub groups: Vec<ObjGroup>,
    pub material_libs: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

pub fn parse_obj(source: &str) -> Result<ObjData, AssetError> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut data = ObjData::default();
    let mut current = ObjGroup::default();

    for (i, raw) in source.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword {
            "v" => positions.push(Vec3::from(parse_floats::<3>(&mut parts, line_no)?)),
            "vn" => normals.push(Vec3::from(parse_floats::<3>(&mut parts, line_no)?)),
            "vt" => {
                let [u, v] = parse_floats::<2>(&mut parts, line_no)?;
                uvs.push([u, 1.0 - v]);
            }
            "f" => {
                let corners = parts
                    .map(|token| parse_corner(token, positions.len(), uvs.len(), normals.len(), line_no))
                    .collect::<Result<Vec<_>, _>>()?;
                if corners.len() < 3 {
                    return Err(AssetError::Parse {
                        line: line_no,
                        message: format!("face needs at least 3 vertices, got {}", corners.len()),
                    });
                }
                push_face(&mut current, &corners, &positions, &uvs, &normals);
            }
            "usemtl" => {
                let name = parts.next().map(str::to_string);
                if !current.indices.is_empty() {
                    data.groups.push(std::mem::take(&mut current));
                }
                current.material = name;
            }
            "mtllib" => data.material_libs.extend(parts.map(str::to_string)),
            // Objects, groups and smoothing groups do not split meshes
            _ => {}
        }
    }

    if !current.indices.is_empty() {
        data.groups.push(current);
    }
    Ok(data)
}

fn parse_floats<const N: usize>(
    parts: &mut std::str::SplitWhitespace<'_>,
    line: usize,
) -> Result<[f32; N], AssetError> {
    let mut out = [0.0; N];
    for value in out.iter_mut() {
        let token = parts.next().ok_or_else(|| AssetError::Parse {
            line,
            message: format!("expected {} numbers", N),
        })?;
        *value = token.parse().map_err(|_| AssetError::Parse {
            line,
            message: format!("invalid number '{}'", token),
        })?;
    }
    Ok(out)
}

/// OBJ indices are 1-based; negative values count back from the newest element.
fn resolve_index(token: &str, count: usize, line: usize) -> Result<usize, AssetError> {
    let raw: i64 = token.parse().map_err(|_| AssetError::Parse {
        line,
        message: format!("invalid index '{}'", token),
    })?;

    let index = match raw {
        r if r > 0 => r - 1,
        r if r < 0 => count as i64 + r,
        _ => -1,
    };
    if index < 0 || index as usize >= count {
        return Err(AssetError::Parse {
            line,
            message: format!("index {} out of range ({} elements)", raw, count),
        });
    }
    Ok(index as usize)
}

fn parse_corner(
    token: &str,
    position_count: usize,
    uv_count: usize,
    normal_count: usize,
    line: usize,
) -> Result<Corner, AssetError> {
    let mut fields = token.split('/');
    let position = resolve_index(fields.next().unwrap_or(""), position_count, line)?;
    let uv = match fields.next() {
        Some(t) if !t.is_empty() => Some(resolve_index(t, uv_count, line)?),
        _ => None,
    };
    let normal = match fields.next() {
        Some(t) if !t.is_empty() => Some(resolve_index(t, normal_count, line)?),
        _ => None,
    };
    Ok(Corner { position, uv, normal })
}

fn push_face(group: &mut ObjGroup, corners: &[Corner], positions: &[Vec3], uvs: &[[f32; 2]], normals: &[Vec3]) {
    let p0 = positions[corners[0].position];
    let face_normal = (positions[corners[1].position] - p0)
        .cross(positions[corners[2].position] - p0)
        .normalize_or_zero();

    let mut emit = |corner: &Corner| -> u32 {
        let key = corner.normal.map(|n| (corner.position, corner.uv, n));
        if let Some(&index) = key.as_ref().and_then(|k| group.corners.get(k)) {
            return index;
        }

        let normal = corner.normal.map_or(face_normal, |n| normals[n]);
        let uv = corner.uv.map_or([0.0, 0.0], |t| uvs[t]);
        let index = group.vertices.len() as u32;
        group.vertices.push(Vertex3D::new(
            positions[corner.position].to_array(),
            normal.to_array(),
            uv,
        ));
        if let Some(key) = key {
            group.corners.insert(key, index);
        }
        index
    };

    let first = emit(&corners[0]);
    let mut previous = emit(&corners[1]);
    for corner in &corners[2..] {
        let next = emit(corner);
        group.indices.extend_from_slice(&[first, previous, next]);
        previous = next;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MtlMaterial {
    pub albedo: Option<String>,
    pub normal: Option<String>,
}

pub fn parse_mtl(source: &str) -> HashMap<String, MtlMaterial> {
    let mut materials = HashMap::new();
    let mut current: Option<(String, MtlMaterial)> = None;

    for raw in source.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        let Some((keyword, rest)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let rest = rest.trim();

        match keyword {
            "newmtl" => {
                if let Some((name, material)) = current.take() {
                    materials.insert(name, material);
                }
                current = Some((rest.to_string(), MtlMaterial::default()));
            }
            "map_Kd" => {
                if let Some((_, material)) = current.as_mut() {
                    material.albedo = map_file(rest);
                }
            }
            "map_Bump" | "map_bump" | "bump" | "norm" => {
                if let Some((_, material)) = current.as_mut() {
                    material.normal = map_file(rest);
                }
            }
            _ => {}
        }
    }

    if let Some((name, material)) = current {
        materials.insert(name, material);
    }
    materials
}

/// Texture statements may carry options (`-bm 0.5 file.png`); the file is last.
fn map_file(rest: &str) -> Option<String> {
    rest.split_whitespace().last().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const QUAD: &str = "\
# unit quad in the XY plane
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn quad_is_fan_triangulated_with_shared_corners() {
        let data = parse_obj(QUAD).unwrap();
        assert_eq!(data.groups.len(), 1);

        let group = &data.groups[0];
        assert_eq!(group.vertices.len(), 4);
        assert_eq!(group.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn texture_v_is_flipped() {
        let data = parse_obj(QUAD).unwrap();
        let vertices = &data.groups[0].vertices;
        assert_relative_eq!(vertices[0].uv[1], 1.0);
        assert_relative_eq!(vertices[2].uv[1], 0.0);
    }

    #[test]
    fn missing_normals_become_face_normals() {
        let data = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let vertices = &data.groups[0].vertices;
        assert_eq!(vertices.len(), 3);
        for v in vertices {
            assert_relative_eq!(v.normal[2], 1.0);
        }
    }

    #[test]
    fn negative_indices_are_relative() {
        let data = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(data.groups[0].vertices[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn out_of_range_index_reports_line() {
        let err = parse_obj("v 0 0 0\n\nf 1 2 3\n").unwrap_err();
        match err {
            AssetError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn usemtl_splits_meshes() {
        let source = "\
mtllib scene.mtl
v 0 0 0
v 1 0 0
v 0 1 0
usemtl red
f 1 2 3
usemtl blue
f 3 2 1
";
        let data = parse_obj(source).unwrap();
        assert_eq!(data.material_libs, vec!["scene.mtl".to_string()]);
        assert_eq!(data.groups.len(), 2);
        assert_eq!(data.groups[0].material.as_deref(), Some("red"));
        assert_eq!(data.groups[1].material.as_deref(), Some("blue"));
        assert_eq!(data.groups[1].indices, vec![0, 1, 2]);
    }

    #[test]
    fn mtl_texture_maps_are_read() {
        let source = "\
newmtl hull
Kd 1 1 1
map_Kd textures/hull_albedo.png
map_Bump -bm 0.5 textures/hull_normal.png

newmtl glass
Kd 0.2 0.2 0.2
";
        let materials = parse_mtl(source);
        assert_eq!(materials.len(), 2);
        assert_eq!(
            materials["hull"].albedo.as_deref(),
            Some("textures/hull_albedo.png")
        );
        assert_eq!(
            materials["hull"].normal.as_deref(),
            Some("textures/hull_normal.png")
        );
        assert_eq!(materials["glass"], MtlMaterial::default());
    }

    #[test]
    fn loader_resolves_textures_next_to_model() {
        let dir = std::env::temp_dir().join(format!("vxr-obj-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("maps")).unwrap();
        fs::write(dir.join("maps/albedo.png"), b"x").unwrap();
        fs::write(dir.join("tri.mtl"), "newmtl m\nmap_Kd D:\\art\\albedo.png\n").unwrap();
        fs::write(
            dir.join("tri.obj"),
            "mtllib tri.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl m\nf 1 2 3\n",
        )
        .unwrap();

        let loader = ObjLoader;
        assert!(loader.supports(&dir.join("tri.OBJ")));
        let meshes = loader.load(&dir.join("tri.obj")).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].name, "m");
        assert_eq!(meshes[0].albedo_path, Some(dir.join("maps/albedo.png")));
        assert_eq!(meshes[0].normal_path, None);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn file_without_faces_is_empty() {
        let dir = std::env::temp_dir().join(format!("vxr-obj-empty-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("points.obj");
        fs::write(&path, "v 0 0 0\n").unwrap();

        assert!(matches!(ObjLoader.load(&path), Err(AssetError::Empty(_))));
        fs::remove_dir_all(&dir).unwrap();
    }
}
