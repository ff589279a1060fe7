// Fly camera, its input-driven controller, and the frame clock feeding it
//
// Conventions: right-handed, +Y up, yaw = pitch = 0 looks down -Z.
// Projection flips Y for Vulkan clip space.

use glam::{Mat4, Vec3};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use winit::keyboard::KeyCode;

const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 2.0),
            yaw: 0.0,
            pitch: 0.0,
            fov: 1.0472, // ~60 deg
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn with_perspective(fov: f32, near: f32, far: f32) -> Self {
        Self {
            fov,
            near,
            far,
            ..Self::default()
        }
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_yaw_pitch(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn add_yaw_pitch(&mut self, yaw_delta: f32, pitch_delta: f32) {
        self.set_yaw_pitch(self.yaw + yaw_delta, self.pitch + pitch_delta);
    }

    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(sy * cp, sp, -cy * cp).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    pub fn move_forward(&mut self, amount: f32) {
        self.position += self.forward() * amount;
    }

    pub fn move_right(&mut self, amount: f32) {
        self.position += self.right() * amount;
    }

    pub fn move_up(&mut self, amount: f32) {
        self.position += Vec3::Y * amount;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }

    /// Perspective with [0, 1] depth and Y pointing down in clip space.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// Raw input gathered from window events between two ticks.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    pub keys_down: HashSet<KeyCode>,
    pub cursor: (f64, f64),
    pub middle_mouse: bool,
    /// Accumulated vertical scroll since the last tick
    pub scroll: f32,
}

impl InputState {
    pub fn is_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll)
    }
}

/// WASD/QE movement, middle-mouse look, scroll to change speed.
#[derive(Debug, Clone)]
pub struct CameraController {
    pub move_speed: f32,
    pub mouse_sensitivity: f32,
    last_cursor: Option<(f64, f64)>,
}

impl CameraController {
    pub const MIN_SPEED: f32 = 0.05;
    pub const MAX_SPEED: f32 = 100.0;

    pub fn new(move_speed: f32, mouse_sensitivity: f32) -> Self {
        Self {
            move_speed,
            mouse_sensitivity,
            last_cursor: None,
        }
    }

    pub fn on_scroll(&mut self, delta: f32) {
        if delta > 0.0 {
            self.move_speed *= 1.15;
        } else if delta < 0.0 {
            self.move_speed *= 0.85;
        }
        self.move_speed = self.move_speed.clamp(Self::MIN_SPEED, Self::MAX_SPEED);
    }

    pub fn update(&mut self, camera: &mut Camera, input: &mut InputState, dt: f32) {
        let scroll = input.take_scroll();
        if scroll != 0.0 {
            self.on_scroll(scroll);
        }

        let step = self.move_speed * dt;
        let axis = |positive: KeyCode, negative: KeyCode| {
            let mut v = 0.0;
            if input.is_down(positive) {
                v += step;
            }
            if input.is_down(negative) {
                v -= step;
            }
            v
        };

        let forward = axis(KeyCode::KeyW, KeyCode::KeyS);
        let right = axis(KeyCode::KeyD, KeyCode::KeyA);
        let up = axis(KeyCode::KeyE, KeyCode::KeyQ);
        if forward != 0.0 {
            camera.move_forward(forward);
        }
        if right != 0.0 {
            camera.move_right(right);
        }
        if up != 0.0 {
            camera.move_up(up);
        }

        if !input.middle_mouse {
            self.last_cursor = None;
            return;
        }

        let (x, y) = input.cursor;
        // First sample after pressing only establishes the baseline
        if let Some((last_x, last_y)) = self.last_cursor.replace((x, y)) {
            let dx = (x - last_x) as f32;
            let dy = (y - last_y) as f32;
            camera.add_yaw_pitch(dx * self.mouse_sensitivity, -dy * self.mouse_sensitivity);
        }
    }
}

/// Timing snapshot for one tick.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped
    pub dt: f32,
    pub frame_index: u64,
}

/// Delta-time source clamped against stalls (debugger, minimise, resize).
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Restart the baseline, e.g. after a swapchain rebuild.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let time = FrameTime {
            dt: dt.as_secs_f32(),
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        let f = camera.forward();
        assert_relative_eq!(f.z, -1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.right().x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn pitch_is_clamped_below_vertical() {
        let mut camera = Camera::default();
        camera.add_yaw_pitch(0.0, 10.0);
        assert_relative_eq!(camera.pitch(), PITCH_LIMIT);
        camera.add_yaw_pitch(0.0, -20.0);
        assert_relative_eq!(camera.pitch(), -PITCH_LIMIT);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = Camera::default();
        let proj = camera.projection(16.0 / 9.0);
        let reference = Mat4::perspective_rh(camera.fov, 16.0 / 9.0, camera.near, camera.far);
        assert_relative_eq!(proj.y_axis.y, -reference.y_axis.y);
        assert!(proj.y_axis.y < 0.0);
    }

    #[test]
    fn view_moves_world_opposite_to_camera() {
        let camera = Camera::default();
        let eye_space = camera.view().transform_point3(Vec3::ZERO);
        // Origin sits 2 units in front of the camera
        assert_relative_eq!(eye_space.z, -2.0, epsilon = 1e-5);
    }

    #[test]
    fn scroll_scales_and_clamps_speed() {
        let mut controller = CameraController::new(2.0, 0.0025);
        controller.on_scroll(1.0);
        assert_relative_eq!(controller.move_speed, 2.3, epsilon = 1e-5);
        controller.on_scroll(-1.0);
        assert_relative_eq!(controller.move_speed, 2.3 * 0.85, epsilon = 1e-5);

        for _ in 0..200 {
            controller.on_scroll(1.0);
        }
        assert_eq!(controller.move_speed, CameraController::MAX_SPEED);
        for _ in 0..400 {
            controller.on_scroll(-1.0);
        }
        assert_eq!(controller.move_speed, CameraController::MIN_SPEED);
    }

    #[test]
    fn keys_move_camera_by_speed_times_dt() {
        let mut camera = Camera::default();
        let mut controller = CameraController::new(2.0, 0.0025);
        let mut input = InputState::default();
        input.keys_down.insert(KeyCode::KeyW);
        input.keys_down.insert(KeyCode::KeyE);

        controller.update(&mut camera, &mut input, 0.5);
        assert_relative_eq!(camera.position.z, 1.0, epsilon = 1e-5);
        assert_relative_eq!(camera.position.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn first_look_sample_does_not_jump() {
        let mut camera = Camera::default();
        let mut controller = CameraController::new(2.0, 0.01);
        let mut input = InputState {
            middle_mouse: true,
            cursor: (500.0, 300.0),
            ..Default::default()
        };

        controller.update(&mut camera, &mut input, 0.016);
        assert_eq!(camera.yaw(), 0.0);

        input.cursor = (510.0, 300.0);
        controller.update(&mut camera, &mut input, 0.016);
        assert_relative_eq!(camera.yaw(), 0.1, epsilon = 1e-6);

        // Releasing resets the baseline
        input.middle_mouse = false;
        controller.update(&mut camera, &mut input, 0.016);
        input.middle_mouse = true;
        input.cursor = (900.0, 300.0);
        controller.update(&mut camera, &mut input, 0.016);
        assert_relative_eq!(camera.yaw(), 0.1, epsilon = 1e-6);
    }

    #[test]
    fn scroll_is_consumed_once() {
        let mut camera = Camera::default();
        let mut controller = CameraController::new(2.0, 0.0025);
        let mut input = InputState {
            scroll: 2.0,
            ..Default::default()
        };
        controller.update(&mut camera, &mut input, 0.016);
        controller.update(&mut camera, &mut input, 0.016);
        assert_relative_eq!(controller.move_speed, 2.0 * 1.15, epsilon = 1e-5);
        assert_eq!(input.scroll, 0.0);
    }

    #[test]
    fn frame_clock_clamps_delta() {
        let mut clock = FrameClock::new();
        let start = clock.last;

        let t = clock.tick_at(start);
        assert_relative_eq!(t.dt, 0.0001, epsilon = 1e-7);
        assert_eq!(t.frame_index, 0);

        let t = clock.tick_at(start + Duration::from_secs(5));
        assert_relative_eq!(t.dt, 0.25);
        assert_eq!(t.frame_index, 1);

        let t = clock.tick_at(start + Duration::from_secs(5) + Duration::from_millis(16));
        assert_relative_eq!(t.dt, 0.016, epsilon = 1e-6);
    }
}
