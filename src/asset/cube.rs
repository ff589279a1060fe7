// Built-in unit cube, used when no model is configured

use super::LoadedMesh;
use crate::backend::pipeline::Vertex3D;

/// Axis-aligned cube centered at the origin with edge length `size`.
/// Every face has its own four vertices so normals stay flat.
pub fn cube(size: f32) -> LoadedMesh {
    let h = size * 0.5;
    // (normal, tangent u, tangent v), u x v == normal
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (n, u, v) in faces {
        let base = vertices.len() as u32;
        // Bottom-left, bottom-right, top-right, top-left seen from outside
        for (su, sv, uv) in [
            (-1.0, -1.0, [0.0, 1.0]),
            (1.0, -1.0, [1.0, 1.0]),
            (1.0, 1.0, [1.0, 0.0]),
            (-1.0, 1.0, [0.0, 0.0]),
        ] {
            let position = [
                (n[0] + su * u[0] + sv * v[0]) * h,
                (n[1] + su * u[1] + sv * v[1]) * h,
                (n[2] + su * u[2] + sv * v[2]) * h,
            ];
            vertices.push(Vertex3D::new(position, n, uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    LoadedMesh {
        name: "cube".to_string(),
        vertices,
        indices,
        albedo_path: None,
        normal_path: None,
    }
}
