//! Optimization: BFGS local search, Monte Carlo global search, and the
//! ranked pose collection they feed.

pub mod local;
pub mod monte_carlo;

use std::cmp::Ordering;

use nalgebra::Vector3;

use crate::math;

/// A docked pose: free energies and the world coordinates of every atom,
/// grouped per frame.
#[derive(Debug, Clone)]
pub struct DockingResult {
    /// Free energy, before the flexibility penalty.
    pub e: f64,

    /// Inter-molecular part of the free energy.
    pub f_inter: f64,

    /// Heavy atom world coordinates, one vector per frame.
    pub heavy_atoms: Vec<Vec<Vector3<f64>>>,

    /// Hydrogen world coordinates, one vector per frame.
    pub hydrogens: Vec<Vec<Vector3<f64>>>,
}

impl DockingResult {
    /// Accumulated square error to another pose over the heavy atoms.
    pub fn square_error_to(&self, other: &DockingResult) -> f64 {
        math::nested_distance_sqr(&self.heavy_atoms, &other.heavy_atoms)
    }

    /// Cluster a pose into a ranked collection.
    ///
    /// If the nearest retained pose is within `required_sqr_error`, the
    /// incoming pose replaces it only when strictly better. Otherwise the
    /// pose is inserted in energy order, evicting the worst retained pose
    /// once `capacity` is reached. The collection stays sorted ascending
    /// by energy.
    pub fn push(
        results: &mut Vec<DockingResult>,
        r: DockingResult,
        required_sqr_error: f64,
        capacity: usize,
    ) {
        if capacity == 0 {
            return;
        }
        if results.is_empty() {
            results.push(r);
            return;
        }

        let (mut index, mut best) = (0, f64::INFINITY);
        for (i, kept) in results.iter().enumerate() {
            let d = r.square_error_to(kept);
            if d < best {
                best = d;
                index = i;
            }
        }

        if best < required_sqr_error {
            if r.e < results[index].e {
                results[index] = r;
                sort_by_energy(results);
            }
        } else if results.len() < capacity {
            let pos = results.partition_point(|kept| kept.e < r.e);
            results.insert(pos, r);
        } else if r.e < results[results.len() - 1].e {
            let last = results.len() - 1;
            results[last] = r;
            sort_by_energy(results);
        }
    }
}

fn sort_by_energy(results: &mut [DockingResult]) {
    results.sort_by(|a, b| a.e.partial_cmp(&b.e).unwrap_or(Ordering::Equal));
}
