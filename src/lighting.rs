// Scene lighting data uploaded with the global uniform buffer
//
// Layout mirrors the SceneUBO block in shaders/mesh.{vert,frag} (std140):
// every vec3 is followed by a float so each struct packs into vec4 rows.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

pub const MAX_POINT_LIGHTS: usize = 32;
pub const MAX_SPOT_LIGHTS: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DirectionalLight {
    pub direction: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    _pad: f32,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero().to_array(),
            intensity,
            color: color.to_array(),
            _pad: 0.0,
        }
    }

    /// White key light from above and slightly to the front-left.
    pub fn sun() -> Self {
        Self::new(Vec3::new(-0.5, -1.0, -0.3), Vec3::ONE, 1.0)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub intensity: f32,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, radius: f32, intensity: f32) -> Self {
        Self {
            position: position.to_array(),
            radius,
            color: color.to_array(),
            intensity,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpotLight {
    pub position: [f32; 3],
    pub range: f32,
    pub direction: [f32; 3],
    /// Cosine of the inner cone angle
    pub inner_cutoff: f32,
    pub color: [f32; 3],
    /// Cosine of the outer cone angle
    pub outer_cutoff: f32,
}

impl SpotLight {
    pub fn new(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        inner_cutoff: f32,
        outer_cutoff: f32,
        range: f32,
    ) -> Self {
        Self {
            position: position.to_array(),
            range,
            direction: direction.normalize_or_zero().to_array(),
            inner_cutoff,
            color: color.to_array(),
            outer_cutoff,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneLighting {
    pub sun: DirectionalLight,
    pub point_count: u32,
    pub spot_count: u32,
    _pad: [f32; 2],
    pub points: [PointLight; MAX_POINT_LIGHTS],
    pub spots: [SpotLight; MAX_SPOT_LIGHTS],
}

impl Default for SceneLighting {
    fn default() -> Self {
        Self {
            sun: DirectionalLight::sun(),
            ..Self::zeroed()
        }
    }
}

impl SceneLighting {
    /// Add a point light; returns false once all slots are taken.
    pub fn push_point(&mut self, light: PointLight) -> bool {
        let count = self.point_count as usize;
        if count >= MAX_POINT_LIGHTS {
            log::warn!("Point light limit ({}) reached, ignoring light", MAX_POINT_LIGHTS);
            return false;
        }
        self.points[count] = light;
        self.point_count += 1;
        true
    }

    pub fn push_spot(&mut self, light: SpotLight) -> bool {
        let count = self.spot_count as usize;
        if count >= MAX_SPOT_LIGHTS {
            log::warn!("Spot light limit ({}) reached, ignoring light", MAX_SPOT_LIGHTS);
            return false;
        }
        self.spots[count] = light;
        self.spot_count += 1;
        true
    }
}

/// Contents of the set 0 uniform buffer, rewritten every frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneUbo {
    pub view: Mat4,
    pub projection: Mat4,
    pub lighting: SceneLighting,
}

impl SceneUbo {
    pub fn new(view: Mat4, projection: Mat4, lighting: SceneLighting) -> Self {
        Self {
            view,
            projection,
            lighting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_std140_block() {
        assert_eq!(size_of::<DirectionalLight>(), 32);
        assert_eq!(size_of::<PointLight>(), 32);
        assert_eq!(size_of::<SpotLight>(), 48);

        assert_eq!(offset_of!(SceneLighting, point_count), 32);
        assert_eq!(offset_of!(SceneLighting, points), 48);
        assert_eq!(offset_of!(SceneLighting, spots), 48 + 32 * 32);
        assert_eq!(size_of::<SceneLighting>(), 1840);

        assert_eq!(offset_of!(SceneUbo, lighting), 128);
        assert_eq!(size_of::<SceneUbo>(), 1968);
    }

    #[test]
    fn light_limits_are_enforced() {
        let mut lighting = SceneLighting::default();
        for i in 0..MAX_POINT_LIGHTS {
            assert!(lighting.push_point(PointLight::new(Vec3::splat(i as f32), Vec3::ONE, 5.0, 1.0)));
        }
        assert!(!lighting.push_point(PointLight::new(Vec3::ZERO, Vec3::ONE, 5.0, 1.0)));
        assert_eq!(lighting.point_count as usize, MAX_POINT_LIGHTS);

        assert!(lighting.push_spot(SpotLight::new(
            Vec3::ZERO,
            Vec3::NEG_Y,
            Vec3::ONE,
            0.9,
            0.8,
            10.0
        )));
        assert_eq!(lighting.spot_count, 1);
    }

    #[test]
    fn directions_are_normalized() {
        let sun = DirectionalLight::sun();
        assert_relative_eq!(Vec3::from(sun.direction).length(), 1.0, epsilon = 1e-6);

        let spot = SpotLight::new(Vec3::ZERO, Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, 0.9, 0.8, 1.0);
        assert_relative_eq!(spot.direction[1], -1.0);
    }
}
