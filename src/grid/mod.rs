//! Search box geometry and per-type energy grids

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atom::XsType;

/// Errors that can occur when constructing grids
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid box size: {0:?}")]
    InvalidSize(Vector3<f64>),

    #[error("Invalid grid granularity: {0}")]
    InvalidGranularity(f64),
}

/// The axis-aligned search volume, discretized into grid nodes at a fixed
/// granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBox {
    /// Center of the search volume in Angstroms.
    pub center: Vector3<f64>,

    /// Edge lengths of the search volume in Angstroms.
    pub size: Vector3<f64>,

    /// Spacing between grid nodes in Angstroms.
    pub granularity: f64,

    granularity_inverse: f64,

    /// Low corner of the box.
    pub corner1: Vector3<f64>,

    /// High corner of the box.
    pub corner2: Vector3<f64>,

    /// Number of grid nodes along each axis. The nodes span the box, so
    /// every contained point has a full cell of nodes around it except on
    /// the high faces, where indices saturate.
    pub num_grids: [usize; 3],
}

impl SearchBox {
    /// Default node spacing in Angstroms.
    pub const DEFAULT_GRANULARITY: f64 = 0.15625;

    pub fn new(
        center: Vector3<f64>,
        size: Vector3<f64>,
        granularity: f64,
    ) -> Result<Self, GridError> {
        if !(size.x > 0.0 && size.y > 0.0 && size.z > 0.0) {
            return Err(GridError::InvalidSize(size));
        }
        if !(granularity > 0.0 && granularity.is_finite()) {
            return Err(GridError::InvalidGranularity(granularity));
        }

        let corner1 = center - size * 0.5;
        let corner2 = center + size * 0.5;
        let num_grids = [
            (size.x / granularity).ceil() as usize + 1,
            (size.y / granularity).ceil() as usize + 1,
            (size.z / granularity).ceil() as usize + 1,
        ];

        Ok(Self {
            center,
            size,
            granularity,
            granularity_inverse: 1.0 / granularity,
            corner1,
            corner2,
            num_grids,
        })
    }

    /// Reciprocal of the node spacing.
    pub fn granularity_inverse(&self) -> f64 {
        self.granularity_inverse
    }

    /// Whether a point lies inside the box, boundary included.
    pub fn within(&self, p: &Vector3<f64>) -> bool {
        (0..3).all(|i| self.corner1[i] <= p[i] && p[i] <= self.corner2[i])
    }

    /// Node index of the lower corner of the cell containing `p`, clamped
    /// per axis so a point on the high face saturates to the last node.
    pub fn grid_index(&self, p: &Vector3<f64>) -> [usize; 3] {
        let mut index = [0usize; 3];
        for i in 0..3 {
            let x = (p[i] - self.corner1[i]) * self.granularity_inverse;
            index[i] = (x.max(0.0) as usize).min(self.num_grids[i] - 1);
        }
        index
    }

    /// Cartesian coordinate of a grid node.
    pub fn grid_coordinate(&self, index: [usize; 3]) -> Vector3<f64> {
        Vector3::new(
            self.corner1.x + self.granularity * index[0] as f64,
            self.corner1.y + self.granularity * index[1] as f64,
            self.corner1.z + self.granularity * index[2] as f64,
        )
    }

    /// Total number of grid nodes.
    pub fn num_nodes(&self) -> usize {
        self.num_grids[0] * self.num_grids[1] * self.num_grids[2]
    }

    /// Squared distance from a point to the box, zero inside.
    pub fn distance_sqr_to(&self, p: &Vector3<f64>) -> f64 {
        let mut sum = 0.0;
        for i in 0..3 {
            let d = (self.corner1[i] - p[i]).max(0.0).max(p[i] - self.corner2[i]);
            sum += d * d;
        }
        sum
    }
}

/// Precomputed receptor-side interaction energies for one probe type at
/// every grid node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridMap {
    /// Probe XScore type this map was computed for.
    pub xs: XsType,

    num_grids: [usize; 3],

    /// Node energies, laid out with x fastest and z slowest so a z-slab is
    /// one contiguous run.
    pub data: Vec<f64>,
}

impl GridMap {
    pub fn new(xs: XsType, num_grids: [usize; 3], data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), num_grids[0] * num_grids[1] * num_grids[2]);
        Self {
            xs,
            num_grids,
            data,
        }
    }

    /// Number of nodes in one z-slab.
    pub fn slab_len(num_grids: [usize; 3]) -> usize {
        num_grids[0] * num_grids[1]
    }

    /// Energy at a node.
    pub fn at(&self, x: usize, y: usize, z: usize) -> f64 {
        self.data[(z * self.num_grids[1] + y) * self.num_grids[0] + x]
    }

    /// Energy at the node one step along an axis, clamped at the high face.
    pub fn at_clamped(&self, x: usize, y: usize, z: usize) -> f64 {
        self.at(
            x.min(self.num_grids[0] - 1),
            y.min(self.num_grids[1] - 1),
            z.min(self.num_grids[2] - 1),
        )
    }
}
