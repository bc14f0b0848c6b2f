//! Light records and the uniforms they are passed through as.
//!
//! Lighting is pass-through data: the engine does not evaluate it, it only
//! names and packs it for the shaders. Two forms are produced:
//!
//! - [`light_uniforms`] gives `u_lights[i].<field>` name/value pairs for
//!   programs that set uniforms by name
//! - [`LightsUniform`] is a packed array for a uniform buffer

use crate::data_structures::database::LightId;

/// Upper bound of lights packed into [`LightsUniform`].
pub const MAX_LIGHTS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Directional,
    Spot,
    Area,
}

impl LightKind {
    /// Integer written to the `type` uniform. 0 and 1 are understood by the
    /// shaders, the rest are reserved.
    pub fn code(self) -> i32 {
        match self {
            LightKind::Point => 0,
            LightKind::Directional => 1,
            LightKind::Spot => 2,
            LightKind::Area => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightRecord {
    /// Assigned by the database on insertion.
    pub id: LightId,
    pub name: String,
    pub kind: LightKind,
    pub position: [f32; 3],
    pub direction: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
    pub range: f32,
}

impl LightRecord {
    pub fn point(position: [f32; 3], color: [f32; 3], intensity: f32, range: f32) -> Self {
        Self {
            id: 0,
            name: String::new(),
            kind: LightKind::Point,
            position,
            direction: [0.0, 0.0, -1.0],
            color,
            intensity,
            range,
        }
    }

    pub fn directional(direction: [f32; 3], color: [f32; 3], intensity: f32, range: f32) -> Self {
        Self {
            id: 0,
            name: String::new(),
            kind: LightKind::Directional,
            position: [0.0; 3],
            direction,
            color,
            intensity,
            range,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn uses_position(&self) -> bool {
        self.kind != LightKind::Directional
    }

    fn uses_direction(&self) -> bool {
        self.kind != LightKind::Point
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3([f32; 3]),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NamedUniform {
    pub name: String,
    pub value: UniformValue,
}

impl NamedUniform {
    fn new(index: usize, field: &str, value: UniformValue) -> Self {
        Self {
            name: format!("u_lights[{index}].{field}"),
            value,
        }
    }
}

/// Flattens lights into named uniforms in the order
/// `type, position, intensity, color, range, direction`.
///
/// Fields a light type does not use are left out: point lights have no
/// direction and directional lights have no position.
pub fn light_uniforms(lights: &[LightRecord]) -> Vec<NamedUniform> {
    let mut uniforms = Vec::with_capacity(lights.len() * 6);
    for (i, light) in lights.iter().enumerate() {
        uniforms.push(NamedUniform::new(i, "type", UniformValue::Int(light.kind.code())));
        if light.uses_position() {
            uniforms.push(NamedUniform::new(i, "position", UniformValue::Vec3(light.position)));
        }
        uniforms.push(NamedUniform::new(i, "intensity", UniformValue::Float(light.intensity)));
        uniforms.push(NamedUniform::new(i, "color", UniformValue::Vec3(light.color)));
        uniforms.push(NamedUniform::new(i, "range", UniformValue::Float(light.range)));
        if light.uses_direction() {
            uniforms.push(NamedUniform::new(i, "direction", UniformValue::Vec3(light.direction)));
        }
    }
    uniforms
}

/// One light as laid out in the uniform buffer (three 16 byte rows).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub position: [f32; 3],
    pub kind: i32,
    pub color: [f32; 3],
    pub intensity: f32,
    pub direction: [f32; 3],
    pub range: f32,
}

impl From<&LightRecord> for LightUniform {
    fn from(light: &LightRecord) -> Self {
        Self {
            position: light.position,
            kind: light.kind.code(),
            color: light.color,
            intensity: light.intensity,
            direction: light.direction,
            range: light.range,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightsUniform {
    pub lights: [LightUniform; MAX_LIGHTS],
    pub count: u32,
    // Uniforms require 16 byte alignment
    pub _padding: [u32; 3],
}

impl LightsUniform {
    pub fn from_records(records: &[LightRecord]) -> Self {
        if records.len() > MAX_LIGHTS {
            log::warn!(
                "scene has {} lights, only the first {} are passed to the shaders",
                records.len(),
                MAX_LIGHTS
            );
        }
        let mut uniform: Self = bytemuck::Zeroable::zeroed();
        for (slot, light) in uniform.lights.iter_mut().zip(records) {
            *slot = light.into();
        }
        uniform.count = records.len().min(MAX_LIGHTS) as u32;
        uniform
    }
}
