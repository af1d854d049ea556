//! Kinematic state of a ligand and its tangent vector

use nalgebra::{DVector, UnitQuaternion, Vector3};

use crate::math;

/// A kinematic state: root position, root orientation, and one angle per
/// active torsion.
#[derive(Debug, Clone)]
pub struct Conformation {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub torsions: Vec<f64>,
}

impl Conformation {
    /// Identity orientation and zero torsions at the given position.
    pub fn new(position: Vector3<f64>, num_active_torsions: usize) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
            torsions: vec![0.0; num_active_torsions],
        }
    }

    /// Apply a scaled tangent vector: translate, rotate by the rotation
    /// vector, and shift each torsion.
    pub fn step(&self, change: &Change, alpha: f64) -> Conformation {
        debug_assert_eq!(self.torsions.len(), change.torsions.len());
        Conformation {
            position: self.position + alpha * change.position,
            orientation: math::renormalize(
                math::quat_from_rotvec(&(alpha * change.orientation)) * self.orientation,
            ),
            torsions: self
                .torsions
                .iter()
                .zip(&change.torsions)
                .map(|(t, d)| t + alpha * d)
                .collect(),
        }
    }
}

/// The tangent of a conformation: a translation, a rotation vector, and one
/// delta per active torsion. Also carries the gradient of the energy with
/// respect to those coordinates.
#[derive(Debug, Clone)]
pub struct Change {
    pub position: Vector3<f64>,
    pub orientation: Vector3<f64>,
    pub torsions: Vec<f64>,
}

impl Change {
    pub fn zero(num_active_torsions: usize) -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: Vector3::zeros(),
            torsions: vec![0.0; num_active_torsions],
        }
    }

    /// Total degrees of freedom: 6 rigid-body plus the active torsions.
    pub fn dim(&self) -> usize {
        6 + self.torsions.len()
    }

    /// Flatten to `[tx, ty, tz, rx, ry, rz, torsion...]`.
    pub fn to_dvector(&self) -> DVector<f64> {
        let mut v = DVector::zeros(self.dim());
        for i in 0..3 {
            v[i] = self.position[i];
            v[3 + i] = self.orientation[i];
        }
        for (i, t) in self.torsions.iter().enumerate() {
            v[6 + i] = *t;
        }
        v
    }

    /// Rebuild from the flat layout produced by [`to_dvector`](Self::to_dvector).
    pub fn from_dvector(v: &DVector<f64>) -> Self {
        debug_assert!(v.len() >= 6);
        Self {
            position: Vector3::new(v[0], v[1], v[2]),
            orientation: Vector3::new(v[3], v[4], v[5]),
            torsions: v.iter().skip(6).copied().collect(),
        }
    }
}
