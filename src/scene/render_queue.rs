// Per-frame draw list derived from the scene
//
// Rebuilt every frame and never persisted. Objects whose mesh or material
// does not resolve are dropped silently.

use super::{MaterialId, MeshId, RenderObject, Scene};
use ash::vk;
use glam::Mat4;

/// Everything the recorder needs from a material to issue a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialBinding {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
}

/// Lookup side of the asset arenas.
pub trait ResolveDraw {
    fn mesh_alive(&self, mesh: MeshId) -> bool;
    fn material_binding(&self, material: MaterialId) -> Option<MaterialBinding>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderCommand {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub binding: MaterialBinding,
    pub model: Mat4,
}

#[derive(Debug, Default)]
pub struct RenderQueue {
    commands: Vec<RenderCommand>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Queue one object. Returns whether it produced a command.
    pub fn submit(&mut self, object: &RenderObject, resolver: &impl ResolveDraw) -> bool {
        let (Some(mesh), Some(material)) = (object.mesh, object.material) else {
            return false;
        };
        if !resolver.mesh_alive(mesh) {
            return false;
        }
        let Some(binding) = resolver.material_binding(material) else {
            return false;
        };

        self.commands.push(RenderCommand {
            mesh,
            material,
            binding,
            model: object.transform.to_matrix(),
        });
        true
    }

    /// Replace the queue contents with the drawable objects of `scene`.
    pub fn build(&mut self, scene: &Scene, resolver: &impl ResolveDraw) {
        self.clear();
        for object in scene.objects() {
            self.submit(object, resolver);
        }
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;
    use ash::vk::Handle;
    use glam::Vec3;
    use slotmap::SlotMap;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockAssets {
        meshes: SlotMap<MeshId, ()>,
        materials: SlotMap<MaterialId, ()>,
        bindings: HashMap<MaterialId, MaterialBinding>,
    }

    impl MockAssets {
        fn mesh(&mut self) -> MeshId {
            self.meshes.insert(())
        }

        fn material(&mut self, raw: u64) -> MaterialId {
            let id = self.materials.insert(());
            self.bindings.insert(
                id,
                MaterialBinding {
                    pipeline: vk::Pipeline::from_raw(raw),
                    layout: vk::PipelineLayout::from_raw(raw),
                    descriptor_set: vk::DescriptorSet::from_raw(raw),
                },
            );
            id
        }
    }

    impl ResolveDraw for MockAssets {
        fn mesh_alive(&self, mesh: MeshId) -> bool {
            self.meshes.contains_key(mesh)
        }

        fn material_binding(&self, material: MaterialId) -> Option<MaterialBinding> {
            self.bindings.get(&material).copied()
        }
    }

    #[test]
    fn objects_missing_a_mesh_are_excluded() {
        let mut assets = MockAssets::default();
        let mesh = assets.mesh();
        let material = assets.material(7);

        let mut scene = Scene::new();
        for x in 0..3 {
            scene.add(RenderObject {
                transform: Transform {
                    position: Vec3::new(x as f32, 0.0, 0.0),
                    ..Default::default()
                },
                // The middle object never got a mesh
                mesh: (x != 1).then_some(mesh),
                material: Some(material),
            });
        }

        let mut queue = RenderQueue::new();
        queue.build(&scene, &assets);

        assert_eq!(queue.commands().len(), 2);
        assert_eq!(queue.commands()[0].model.w_axis.x, 0.0);
        assert_eq!(queue.commands()[1].model.w_axis.x, 2.0);
        assert_eq!(
            queue.commands()[0].binding.descriptor_set,
            vk::DescriptorSet::from_raw(7)
        );
    }

    #[test]
    fn objects_missing_a_material_are_excluded() {
        let mut assets = MockAssets::default();
        let mesh = assets.mesh();
        let material = assets.material(1);

        let mut scene = Scene::new();
        scene.add(RenderObject {
            mesh: Some(mesh),
            material: Some(material),
            ..Default::default()
        });
        scene.add(RenderObject {
            mesh: Some(mesh),
            material: None,
            ..Default::default()
        });

        let mut queue = RenderQueue::new();
        queue.build(&scene, &assets);
        assert_eq!(queue.commands().len(), 1);
    }

    #[test]
    fn stale_keys_do_not_resolve() {
        let mut assets = MockAssets::default();
        let mesh = assets.mesh();
        let material = assets.material(3);
        let object = RenderObject {
            mesh: Some(mesh),
            material: Some(material),
            ..Default::default()
        };

        let mut queue = RenderQueue::new();
        assert!(queue.submit(&object, &assets));

        assets.meshes.remove(mesh);
        assert!(!queue.submit(&object, &assets));

        // Material present in the arena but never given a descriptor set
        let mesh = assets.mesh();
        let orphan = assets.materials.insert(());
        let object = RenderObject {
            mesh: Some(mesh),
            material: Some(orphan),
            ..Default::default()
        };
        assert!(!queue.submit(&object, &assets));
        assert_eq!(queue.commands().len(), 1);
    }

    #[test]
    fn build_replaces_previous_frame() {
        let mut assets = MockAssets::default();
        let mesh = assets.mesh();
        let material = assets.material(1);
        let mut scene = Scene::new();
        scene.add(RenderObject {
            mesh: Some(mesh),
            material: Some(material),
            ..Default::default()
        });

        let mut queue = RenderQueue::new();
        queue.build(&scene, &assets);
        queue.build(&scene, &assets);
        assert_eq!(queue.commands().len(), 1);
    }
}
