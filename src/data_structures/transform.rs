//! Local node transforms and their GPU representation.
//!
//! A [`Transform`] is a validated translation/rotation/scale triple. It is
//! composed into a column-major affine matrix as `T * R * S`, so applying the
//! matrix to a point in local space yields its position in parent space.

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, One, Quaternion, SquareMatrix, Vector3};

use crate::error::TransformError;

/// How far a rotation quaternion's length may stray from 1 before it is rejected.
/// Anything within the tolerance is renormalized.
pub const UNIT_TOLERANCE: f32 = 1e-3;

/// Translation, rotation (unit quaternion) and non-zero scale.
///
/// The invariants are checked once in [`Transform::new`]; a `Transform` is
/// immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    translation: Vector3<f32>,
    rotation: Quaternion<f32>,
    scale: Vector3<f32>,
}

impl Transform {
    /// Identity transform (no move, rotate, or scale).
    pub fn identity() -> Self {
        Self {
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn new(
        translation: Vector3<f32>,
        rotation: Quaternion<f32>,
        scale: Vector3<f32>,
    ) -> Result<Self, TransformError> {
        if !(translation.x.is_finite() && translation.y.is_finite() && translation.z.is_finite()) {
            return Err(TransformError::NonFiniteTranslation(translation.into()));
        }
        let len = rotation.magnitude();
        if !len.is_finite() || (len - 1.0).abs() > UNIT_TOLERANCE {
            return Err(TransformError::NonUnitRotation(len));
        }
        let degenerate = |s: f32| s == 0.0 || !s.is_finite();
        if degenerate(scale.x) || degenerate(scale.y) || degenerate(scale.z) {
            return Err(TransformError::DegenerateScale(scale.into()));
        }
        Ok(Self {
            translation,
            rotation: rotation.normalize(),
            scale,
        })
    }

    /// Builds a transform from raw database components. `rotation` is `(w, x, y, z)`.
    pub fn from_components(
        translation: [f32; 3],
        rotation: [f32; 4],
        scale: [f32; 3],
    ) -> Result<Self, TransformError> {
        let [w, x, y, z] = rotation;
        Self::new(
            translation.into(),
            Quaternion::new(w, x, y, z),
            scale.into(),
        )
    }

    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    pub fn translation(&self) -> Vector3<f32> {
        self.translation
    }

    pub fn rotation(&self) -> Quaternion<f32> {
        self.rotation
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.scale
    }

    /// `Translate(t) * Rotate(r) * Scale(s)`.
    ///
    /// Uses the standard quaternion to rotation matrix conversion, which is
    /// stable for every unit quaternion including the identity.
    pub fn compose(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Splits an affine matrix without shear back into its components.
    ///
    /// A mirroring matrix (negative determinant) is reported with a negative x
    /// scale, so a transform with a negative y or z scale decomposes into an
    /// equivalent but not identical triple.
    pub fn decompose(matrix: &Matrix4<f32>) -> Result<Self, TransformError> {
        let translation = matrix.w.truncate();
        let (x, y, z) = (matrix.x.truncate(), matrix.y.truncate(), matrix.z.truncate());
        let linear = Matrix3::from_cols(x, y, z);

        let mut scale = Vector3::new(x.magnitude(), y.magnitude(), z.magnitude());
        if linear.determinant() < 0.0 {
            scale.x = -scale.x;
        }
        if scale.x == 0.0 || scale.y == 0.0 || scale.z == 0.0 {
            return Err(TransformError::DegenerateScale(scale.into()));
        }

        let rotation = Matrix3::from_cols(x / scale.x, y / scale.y, z / scale.z);
        let rotation = Quaternion::from(rotation).normalize();
        Self::new(translation, rotation, scale)
    }

    pub fn to_raw(&self) -> TransformRaw {
        TransformRaw::from_matrix(&self.compose())
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Vector3<f32>> for Transform {
    fn from(translation: Vector3<f32>) -> Self {
        Self::from_translation(translation)
    }
}

/**
 * The raw transform is the per-draw data stored in the instance buffer on the GPU.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformRaw {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 3]; 3],
    pub handedness: f32,
}

impl TransformRaw {
    const ATTRIBS: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
        // model matrix, one vec4 per column
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4,
        // normal matrix
        9 => Float32x3,
        10 => Float32x3,
        11 => Float32x3,
        12 => Float32,
    ];

    /// Packs a world matrix. The normal matrix is the inverse transpose of the
    /// upper 3x3 block so non-uniform scale does not skew lighting.
    pub fn from_matrix(world: &Matrix4<f32>) -> Self {
        let linear = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
        let det = linear.determinant();
        let normal = linear
            .invert()
            .map(|inv| inv.transpose())
            .unwrap_or_else(Matrix3::identity);
        Self {
            model: (*world).into(),
            normal: normal.into(),
            handedness: det.signum(),
        }
    }

    /// Instance-stepped layout: the shader advances to the next transform per
    /// instance, not per vertex.
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<TransformRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}
