//! Math type aliases and helper functions.
//!
//! All conversion math runs in `f32` on nalgebra types. Source documents store
//! matrices row-major; nalgebra matrices are column-major in memory, so every
//! conversion between flat arrays and [`Mat4`] goes through the helpers here.

pub use nalgebra;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 3x3 matrix (f32).
pub type Mat3 = nalgebra::Matrix3<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// Quaternion (f32). Exported as `[x, y, z, w]`, constructed with
/// `Quaternion::new(w, x, y, z)`.
pub type Quat = nalgebra::Quaternion<f32>;

/// Recompose a pose matrix: `T * R * S`.
pub fn mat4_from_scale_rotation_translation(
    scale: Vec3,
    rotation: Quat,
    translation: Vec3,
) -> Mat4 {
    let rotation = nalgebra::UnitQuaternion::new_normalize(rotation);
    Mat4::new_translation(&translation)
        * rotation.to_homogeneous()
        * Mat4::new_nonuniform_scaling(&scale)
}

/// Build a 4x4 matrix from 16 row-major values (source document convention).
///
/// Returns identity if fewer than 16 values are available.
pub fn mat4_from_row_major(values: &[f32]) -> Mat4 {
    if values.len() < 16 {
        return Mat4::identity();
    }
    Mat4::from_row_slice(&values[..16])
}

/// Flatten a matrix into 16 column-major values.
pub fn mat4_to_col_major(m: &Mat4) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    out.copy_from_slice(m.as_slice());
    out
}

/// Rotation matrix around an arbitrary axis, angle in degrees.
///
/// A zero-length axis yields identity.
pub fn mat4_from_axis_angle_degrees(axis: Vec3, angle_degrees: f32) -> Mat4 {
    let norm = axis.norm();
    if norm < 1e-12 || angle_degrees == 0.0 {
        return Mat4::identity();
    }
    let unit = nalgebra::Unit::new_unchecked(axis / norm);
    nalgebra::Rotation3::from_axis_angle(&unit, angle_degrees.to_radians()).to_homogeneous()
}

/// Inverse of a matrix, identity if singular.
pub fn mat4_inverse_or_identity(m: &Mat4) -> Mat4 {
    m.try_inverse().unwrap_or_else(|| {
        log::warn!("Singular matrix inverted, using identity");
        Mat4::identity()
    })
}

/// Normal transform for an affine matrix: the inverse-transpose of its upper 3x3.
///
/// Computed from the adjugate so that singular matrices still produce a
/// (degenerate but finite) result; normals are renormalized by the caller.
pub fn normal_matrix(m: &Mat4) -> Mat3 {
    let a: Mat3 = m.fixed_view::<3, 3>(0, 0).into_owned();
    let c0 = a.column(1).cross(&a.column(2));
    let c1 = a.column(2).cross(&a.column(0));
    let c2 = a.column(0).cross(&a.column(1));
    // Cofactor matrix == transpose(adjugate) == det * inverse-transpose.
    let cof = Mat3::from_columns(&[c0, c1, c2]);
    let det = a.determinant();
    if det.abs() > 1e-20 {
        cof / det
    } else {
        cof
    }
}

/// Transform a point (w = 1) by an affine matrix.
pub fn transform_point(m: &Mat4, p: Vec3) -> Vec3 {
    m.transform_point(&nalgebra::Point3::from(p)).coords
}

/// Component-wise comparison with an absolute tolerance.
pub fn mat4_approx_eq(a: &Mat4, b: &Mat4, epsilon: f32) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= epsilon)
}

/// `[x, y, z, w]` components, the order every exporter writes.
pub fn quat_to_array(q: Quat) -> [f32; 4] {
    let c = q.coords;
    [c.x, c.y, c.z, c.w]
}

/// Rotate `v` by a unit quaternion.
pub fn quat_rotate_vec3(q: Quat, v: Vec3) -> Vec3 {
    nalgebra::UnitQuaternion::new_unchecked(q).transform_vector(&v)
}

/// Rotation angle (radians, in `[0, pi]`) of a unit quaternion.
pub fn quat_angle(q: Quat) -> f32 {
    let w = q.coords.w.abs().min(1.0);
    2.0 * w.acos()
}

/// Decompose a 4x4 affine matrix into (scale, rotation, translation).
///
/// Translation comes from the last column and scale from the lengths of the
/// three basis columns. Scale is divided out before the rotation is converted
/// to a quaternion. A mirrored basis (negative determinant) is expressed as a
/// negative X scale so that recomposition reproduces the source matrix.
pub fn to_scale_rotation_translation(m: &Mat4) -> (Vec3, Quat, Vec3) {
    let translation = Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    let mut col0 = Vec3::new(m[(0, 0)], m[(1, 0)], m[(2, 0)]);
    let col1 = Vec3::new(m[(0, 1)], m[(1, 1)], m[(2, 1)]);
    let col2 = Vec3::new(m[(0, 2)], m[(1, 2)], m[(2, 2)]);
    let mut sx = col0.norm();
    let sy = col1.norm();
    let sz = col2.norm();

    if col0.dot(&col1.cross(&col2)) < 0.0 {
        sx = -sx;
        col0 = -col0;
    }

    let safe = |v: Vec3, s: f32| if s.abs() > 1e-12 { v / s.abs() } else { v };
    let rot_mat = Mat3::from_columns(&[safe(col0, sx), safe(col1, sy), safe(col2, sz)]);
    let rotation = nalgebra::UnitQuaternion::from_rotation_matrix(
        &nalgebra::Rotation3::from_matrix_unchecked(rot_mat),
    )
    .into_inner();
    let norm = rotation.norm();
    let rotation = if norm > 1e-12 {
        rotation / norm
    } else {
        Quat::identity()
    };
    (Vec3::new(sx, sy, sz), rotation, translation)
}
