//! Fly camera, projection and the per-frame input that drives them.
//!
//! Input is collected into an [`InputState`] owned by the caller and handed to
//! [`CameraController::update_camera`] once per frame. Cursor deltas are
//! computed against the previous cursor position stored in that state.

use std::{collections::HashSet, time::Duration};

use cgmath::{Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, perspective};
use wgpu::util::DeviceExt;
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseScrollDelta},
    keyboard::KeyCode,
};

use crate::data_structures::database::Aabb;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

pub const DEFAULT_YAW: Deg<f32> = Deg(-90.0);
pub const DEFAULT_SPEED: f32 = 0.2;
pub const DEFAULT_SENSITIVITY: f32 = 0.1;
pub const DEFAULT_ZOOM: Deg<f32> = Deg(45.0);
const MIN_ZOOM: Deg<f32> = Deg(1.0);
const PITCH_LIMIT: Deg<f32> = Deg(89.9);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

impl Movement {
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::KeyW | KeyCode::ArrowUp => Some(Movement::Forward),
            KeyCode::KeyS | KeyCode::ArrowDown => Some(Movement::Backward),
            KeyCode::KeyA | KeyCode::ArrowLeft => Some(Movement::Left),
            KeyCode::KeyD | KeyCode::ArrowRight => Some(Movement::Right),
            KeyCode::Space => Some(Movement::Up),
            KeyCode::ShiftLeft => Some(Movement::Down),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Point3<f32>,
    yaw: Rad<f32>,
    pitch: Rad<f32>,
    world_up: Vector3<f32>,
}

impl Camera {
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
            world_up: Vector3::unit_y(),
        }
    }

    pub fn yaw(&self) -> Rad<f32> {
        self.yaw
    }

    pub fn pitch(&self) -> Rad<f32> {
        self.pitch
    }

    pub fn front(&self) -> Vector3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        Vector3::new(cos_yaw * cos_pitch, sin_pitch, sin_yaw * cos_pitch).normalize()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.front().cross(self.world_up).normalize()
    }

    pub fn up(&self) -> Vector3<f32> {
        self.right().cross(self.front()).normalize()
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.front(), self.up())
    }

    /// Places the camera on the diagonal above `bounds`, looking at its centre.
    pub fn frame_all(&mut self, bounds: &Aabb) {
        if bounds.is_empty() {
            return;
        }
        let centre = Point3::from_vec(bounds.center());
        let size = bounds.size();
        let length = ((size.x + size.y + size.z) / 2.0).max(f32::EPSILON);
        self.position = centre + Vector3::new(length, length, length);
        let front = (centre - self.position).normalize();
        self.yaw = Rad(front.z.atan2(front.x));
        self.pitch = Rad(front.y.asin());
    }

    fn clamp_pitch(&mut self) {
        let limit: Rad<f32> = PITCH_LIMIT.into();
        self.pitch = Rad(self.pitch.0.clamp(-limit.0, limit.0));
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new((0.0, 0.0, 3.0), DEFAULT_YAW, Deg(0.0))
    }
}

#[derive(Clone, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn fovy(&self) -> Rad<f32> {
        self.fovy
    }

    /// Narrows the field of view by `amount` degrees, clamped to 1..=45.
    pub fn zoom(&mut self, amount: f32) {
        let current: Deg<f32> = self.fovy.into();
        let next = (current.0 - amount).clamp(MIN_ZOOM.0, DEFAULT_ZOOM.0);
        self.fovy = Deg(next).into();
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Input gathered between two frames.
#[derive(Clone, Debug, Default)]
pub struct InputState {
    held: HashSet<Movement>,
    last_cursor: Option<PhysicalPosition<f64>>,
    cursor_delta: (f32, f32),
    scroll: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the key drives the camera.
    pub fn process_key(&mut self, key: KeyCode, state: ElementState) -> bool {
        let Some(movement) = Movement::from_key(key) else {
            return false;
        };
        match state {
            ElementState::Pressed => self.held.insert(movement),
            ElementState::Released => self.held.remove(&movement),
        };
        true
    }

    /// Accumulates the motion since the previous cursor position. The first
    /// position seen only sets the reference point.
    pub fn process_cursor(&mut self, position: PhysicalPosition<f64>) {
        if let Some(last) = self.last_cursor {
            self.cursor_delta.0 += (position.x - last.x) as f32;
            // window y grows downwards, pitch grows upwards
            self.cursor_delta.1 += (last.y - position.y) as f32;
        }
        self.last_cursor = Some(position);
    }

    pub fn process_scroll(&mut self, delta: &MouseScrollDelta) {
        self.scroll += match delta {
            MouseScrollDelta::LineDelta(_, y) => *y,
            MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => *y as f32 / 100.0,
        };
    }

    pub fn is_held(&self, movement: Movement) -> bool {
        self.held.contains(&movement)
    }

    /// Clears per-frame motion; held keys stay held.
    pub fn end_frame(&mut self) {
        self.cursor_delta = (0.0, 0.0);
        self.scroll = 0.0;
    }
}

#[derive(Clone, Debug)]
pub struct CameraController {
    /// Units per second.
    pub speed: f32,
    /// Degrees per pixel of cursor motion.
    pub sensitivity: f32,
}

impl CameraController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self { speed, sensitivity }
    }

    /// Applies one frame of input and clears its per-frame part.
    pub fn update_camera(
        &self,
        camera: &mut Camera,
        projection: &mut Projection,
        input: &mut InputState,
        dt: Duration,
    ) {
        let velocity = self.speed * dt.as_secs_f32();
        let (front, right, up) = (camera.front(), camera.right(), camera.up());
        for movement in input.held.iter() {
            let step = match movement {
                Movement::Forward => front,
                Movement::Backward => -front,
                Movement::Left => -right,
                Movement::Right => right,
                Movement::Up => up,
                Movement::Down => -up,
            };
            camera.position += step * velocity;
        }

        let (dx, dy) = input.cursor_delta;
        camera.yaw += Rad::from(Deg(dx * self.sensitivity));
        camera.pitch += Rad::from(Deg(dy * self.sensitivity));
        camera.clamp_pitch();

        if input.scroll != 0.0 {
            projection.zoom(input.scroll);
        }
        input.end_frame();
    }
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED, DEFAULT_SENSITIVITY)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_position: [f32; 4],
    pub view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// GPU side of the camera: the uniform buffer and its bind group.
#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub projection: Projection,
    pub controller: CameraController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(device: &wgpu::Device, camera: Camera, projection: Projection) -> Self {
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(&camera, &projection);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("camera_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        Self {
            camera,
            projection,
            controller: CameraController::default(),
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    /// Applies one frame of input and writes the new view projection.
    pub fn update(&mut self, queue: &wgpu::Queue, input: &mut InputState, dt: Duration) {
        self.controller
            .update_camera(&mut self.camera, &mut self.projection, input, dt);
        self.write(queue);
    }

    /// Writes the current camera state without applying input, e.g. after
    /// [`Camera::frame_all`].
    pub fn write(&mut self, queue: &wgpu::Queue) {
        self.uniform.update_view_proj(&self.camera, &self.projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn default_camera_looks_down_negative_z() {
        let front = Camera::default().front();
        assert!((front - Vector3::new(0.0, 0.0, -1.0)).magnitude() < EPS, "{:?}", front);
    }

    #[test]
    fn first_cursor_sample_has_no_delta() {
        let mut input = InputState::new();
        input.process_cursor(PhysicalPosition::new(400.0, 300.0));
        assert_eq!(input.cursor_delta, (0.0, 0.0));
        input.process_cursor(PhysicalPosition::new(410.0, 290.0));
        assert_eq!(input.cursor_delta, (10.0, 10.0));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::default();
        let mut projection = Projection::new(800, 600, DEFAULT_ZOOM, 0.1, 100.0);
        let mut input = InputState::new();
        input.process_cursor(PhysicalPosition::new(0.0, 10_000.0));
        input.process_cursor(PhysicalPosition::new(0.0, 0.0));
        CameraController::default().update_camera(&mut camera, &mut projection, &mut input, Duration::ZERO);
        let pitch: Deg<f32> = camera.pitch().into();
        assert!((pitch.0 - 89.9).abs() < EPS, "{:?}", pitch);
        assert_eq!(input.cursor_delta, (0.0, 0.0));
    }

    #[test]
    fn held_key_moves_with_frame_time() {
        let mut camera = Camera::default();
        let mut projection = Projection::new(800, 600, DEFAULT_ZOOM, 0.1, 100.0);
        let mut input = InputState::new();
        assert!(input.process_key(KeyCode::KeyW, ElementState::Pressed));
        assert!(!input.process_key(KeyCode::KeyQ, ElementState::Pressed));
        let controller = CameraController::new(2.0, 0.1);
        controller.update_camera(&mut camera, &mut projection, &mut input, Duration::from_millis(500));
        assert!((camera.position.z - 2.0).abs() < EPS, "{:?}", camera.position);
        assert!(input.is_held(Movement::Forward));
    }

    #[test]
    fn zoom_stays_in_range() {
        let mut projection = Projection::new(800, 600, DEFAULT_ZOOM, 0.1, 100.0);
        projection.zoom(100.0);
        let fovy: Deg<f32> = projection.fovy().into();
        assert!((fovy.0 - 1.0).abs() < EPS);
        projection.zoom(-100.0);
        let fovy: Deg<f32> = projection.fovy().into();
        assert!((fovy.0 - 45.0).abs() < EPS);
    }

    #[test]
    fn frame_all_looks_at_bounds_centre() {
        let mut camera = Camera::default();
        let mut bounds = Aabb::empty();
        bounds.grow(Vector3::new(-1.0, -1.0, -1.0));
        bounds.grow(Vector3::new(1.0, 1.0, 1.0));
        camera.frame_all(&bounds);
        assert_eq!(camera.position, Point3::new(3.0, 3.0, 3.0));
        let to_centre = (Point3::new(0.0, 0.0, 0.0) - camera.position).normalize();
        assert!((camera.front() - to_centre).magnitude() < EPS);
    }
}
