// Scene description consumed by the renderer each frame
//
// Objects reference meshes and materials by arena key, never by pointer.
// A key whose entry was removed simply stops resolving and the object is
// left out of the render queue.

pub mod assets;
pub mod material;
pub mod mesh;
pub mod render_queue;

use crate::lighting::SceneLighting;
use glam::{Mat4, Quat, Vec3};

slotmap::new_key_type! {
    pub struct MeshId;
    pub struct TextureId;
    pub struct TemplateId;
    pub struct MaterialId;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Scale, then rotate, then translate.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderObject {
    pub transform: Transform,
    pub mesh: Option<MeshId>,
    pub material: Option<MaterialId>,
}

/// Flat list of renderable objects plus the lights shining on them.
#[derive(Debug, Default)]
pub struct Scene {
    objects: Vec<RenderObject>,
    pub lighting: SceneLighting,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: RenderObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[RenderObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transform_applies_scale_then_translation() {
        let transform = Transform {
            position: Vec3::new(1.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::splat(2.0),
        };
        let p = transform.to_matrix().transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 2.0);
    }

    #[test]
    fn default_transform_is_identity() {
        assert_eq!(Transform::default().to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn default_objects_reference_nothing() {
        let mut scene = Scene::new();
        scene.add(RenderObject::default());
        assert_eq!(scene.len(), 1);
        assert!(scene.objects()[0].mesh.is_none());
        assert!(scene.objects()[0].material.is_none());
        assert_eq!(scene.lighting.point_count, 0);
    }
}
