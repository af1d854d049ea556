//! Quaternion helpers and coordinate-set distances shared by the kinematics
//! and the pose clustering.

use nalgebra::{UnitQuaternion, Vector3};

/// Tolerance on |1 - q.q| beyond which a quaternion is renormalized.
pub const QUAT_NORM_TOLERANCE: f64 = 1e-6;

/// Renormalize a quaternion only when accumulated rounding has pushed its
/// norm outside tolerance.
pub fn renormalize(q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let norm_sqr = q.as_ref().norm_squared();
    if (1.0 - norm_sqr).abs() > QUAT_NORM_TOLERANCE {
        UnitQuaternion::new_normalize(*q.as_ref())
    } else {
        q
    }
}

/// Quaternion for a rotation vector (axis scaled by angle). Identity for a
/// near-zero vector, where the axis is undefined.
pub fn quat_from_rotvec(v: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(*v)
}

/// Accumulated square distance between two equally sized coordinate sets.
pub fn distance_sqr(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(p, q)| (p - q).norm_squared())
        .sum()
}

/// Accumulated square distance between two nested per-frame coordinate sets.
pub fn nested_distance_sqr(a: &[Vec<Vector3<f64>>], b: &[Vec<Vector3<f64>>]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(p, q)| distance_sqr(p, q))
        .sum()
}
