//! The empirical pair potential and its precomputed lookup table
//!
//! The potential is a weighted sum of five closed-form terms of the surface
//! distance between two atoms. Evaluating it during search would be too
//! slow, so for every unordered pair of XScore types the energy and its
//! radial derivative are tabulated over squared distance once, before any
//! docking starts. Lookups are a single array access with no interpolation;
//! the bin width is small enough that the residual error is negligible
//! against the grid-map discretization.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atom::{is_hbond_pair, XsType, NUM_XS_TYPES};

/// Errors that can occur while building the scoring-function table
#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("unsupported atom type pair index {0}")]
    InvalidTypePair(usize),
}

/// Interaction cutoff distance in Angstroms.
pub const CUTOFF: f64 = 8.0;

/// Squared cutoff distance.
pub const CUTOFF_SQR: f64 = CUTOFF * CUTOFF;

/// Number of squared-distance bins per type pair.
pub const NUM_SAMPLES: usize = 1024;

/// Number of unordered XScore type pairs.
pub const NUM_TYPE_PAIRS: usize = NUM_XS_TYPES * (NUM_XS_TYPES + 1) / 2;

/// Bin index for a squared distance is `floor(r2 * FACTOR)`.
const FACTOR: f64 = (NUM_SAMPLES as f64 - 1.0) / CUTOFF_SQR;

/// Index of an unordered type pair in triangular storage. Requires t1 <= t2.
pub fn triangular_index(t1: usize, t2: usize) -> usize {
    debug_assert!(t1 <= t2);
    debug_assert!(t2 < NUM_XS_TYPES);
    t1 + t2 * (t2 + 1) / 2
}

/// Triangular index for a pair in either order.
pub fn triangular_index_permissive(t1: usize, t2: usize) -> usize {
    if t1 <= t2 {
        triangular_index(t1, t2)
    } else {
        triangular_index(t2, t1)
    }
}

/// Weights of the five scoring terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermWeights {
    pub gauss1: f64,
    pub gauss2: f64,
    pub repulsion: f64,
    pub hydrophobic: f64,
    pub hbond: f64,
}

impl Default for TermWeights {
    fn default() -> Self {
        Self {
            gauss1: -0.035579,
            gauss2: -0.005156,
            repulsion: 0.840245,
            hydrophobic: -0.035069,
            hbond: -0.587439,
        }
    }
}

/// A single table entry: energy and `(de/dr)/r`.
///
/// Storing the derivative divided by r lets the evaluator obtain the
/// gradient with respect to the inter-atom vector as `dor * delta_r`
/// without a square root.
#[derive(Debug, Clone, Copy)]
pub struct ScoringElement {
    pub e: f64,
    pub dor: f64,
}

/// Precomputed scoring-function table over all XScore type pairs.
#[derive(Debug, Clone)]
pub struct ScoringFunction {
    weights: TermWeights,
    e: Vec<f64>,
    d: Vec<f64>,
}

impl Default for ScoringFunction {
    fn default() -> Self {
        Self::new(TermWeights::default())
    }
}

impl ScoringFunction {
    /// Create an empty table; call [`precalculate`](Self::precalculate)
    /// before evaluating.
    pub fn new(weights: TermWeights) -> Self {
        Self {
            weights,
            e: Vec::new(),
            d: Vec::new(),
        }
    }

    /// Closed-form potential for a type pair at distance `r`.
    pub fn score(&self, t1: XsType, t2: XsType, r: f64) -> f64 {
        self.score_and_derivative(t1, t2, r).0
    }

    /// Closed-form potential and its derivative with respect to `r`.
    fn score_and_derivative(&self, t1: XsType, t2: XsType, r: f64) -> (f64, f64) {
        let w = &self.weights;
        let d = r - (t1.radius() + t2.radius());

        let gauss1 = (-(d / 0.5) * (d / 0.5)).exp();
        let gauss1_d = -8.0 * d * gauss1;

        let u = (d - 3.0) / 2.0;
        let gauss2 = (-u * u).exp();
        let gauss2_d = -u * gauss2;

        let (repulsion, repulsion_d) = if d < 0.0 { (d * d, 2.0 * d) } else { (0.0, 0.0) };

        let (hydrophobic, hydrophobic_d) = if t1.is_hydrophobic() && t2.is_hydrophobic() {
            if d <= 0.5 {
                (1.0, 0.0)
            } else if d >= 1.5 {
                (0.0, 0.0)
            } else {
                (1.5 - d, -1.0)
            }
        } else {
            (0.0, 0.0)
        };

        let (hbond, hbond_d) = if is_hbond_pair(t1, t2) {
            if d <= -0.7 {
                (1.0, 0.0)
            } else if d >= 0.0 {
                (0.0, 0.0)
            } else {
                (-d / 0.7, -1.0 / 0.7)
            }
        } else {
            (0.0, 0.0)
        };

        let e = w.gauss1 * gauss1
            + w.gauss2 * gauss2
            + w.repulsion * repulsion
            + w.hydrophobic * hydrophobic
            + w.hbond * hbond;
        let de = w.gauss1 * gauss1_d
            + w.gauss2 * gauss2_d
            + w.repulsion * repulsion_d
            + w.hydrophobic * hydrophobic_d
            + w.hbond * hbond_d;
        (e, de)
    }

    /// Tabulate energies and derivatives for all type pairs. Pairs are
    /// computed concurrently on the calling rayon pool.
    ///
    /// Fails only when a pair resolves outside the triangular table; after
    /// a successful build, lookups cannot fail.
    pub fn precalculate(&mut self) -> Result<(), ScoringError> {
        let types = XsType::all();
        let mut pairs = Vec::with_capacity(NUM_TYPE_PAIRS);
        for t2 in 0..NUM_XS_TYPES {
            for t1 in 0..=t2 {
                let index = triangular_index(t1, t2);
                if index >= NUM_TYPE_PAIRS {
                    return Err(ScoringError::InvalidTypePair(index));
                }
                pairs.push((types[t1], types[t2]));
            }
        }

        // Pair order matches triangular_index, so the blocks concatenate
        // into the flat tables directly.
        let blocks: Vec<(Vec<f64>, Vec<f64>)> = pairs
            .par_iter()
            .map(|&(t1, t2)| self.precalculate_pair(t1, t2))
            .collect();

        self.e = Vec::with_capacity(NUM_TYPE_PAIRS * NUM_SAMPLES);
        self.d = Vec::with_capacity(NUM_TYPE_PAIRS * NUM_SAMPLES);
        for (e, d) in blocks {
            self.e.extend(e);
            self.d.extend(d);
        }
        Ok(())
    }

    /// Sample one type pair at every bin center.
    fn precalculate_pair(&self, t1: XsType, t2: XsType) -> (Vec<f64>, Vec<f64>) {
        let mut e = Vec::with_capacity(NUM_SAMPLES);
        let mut d = Vec::with_capacity(NUM_SAMPLES);
        for i in 0..NUM_SAMPLES {
            let r2 = (i as f64 + 0.5) / FACTOR;
            let r = r2.sqrt();
            let (energy, derivative) = self.score_and_derivative(t1, t2, r);
            e.push(energy);
            d.push(derivative / r);
        }
        (e, d)
    }

    /// Look up energy and `(de/dr)/r` for a type pair at squared distance
    /// `r2`. The caller is responsible for the cutoff check.
    pub fn evaluate(&self, type_pair_index: usize, r2: f64) -> ScoringElement {
        let o = type_pair_index * NUM_SAMPLES + Self::bin(r2);
        ScoringElement {
            e: self.e[o],
            dor: self.d[o],
        }
    }

    /// Base offset of a type pair's samples, for inner loops that hoist the
    /// pair resolution out of the distance lookup.
    pub fn offset(t1: XsType, t2: XsType) -> usize {
        NUM_SAMPLES * triangular_index_permissive(t1.index(), t2.index())
    }

    /// Energy lookup by precomputed pair offset.
    pub fn energy_at(&self, offset: usize, r2: f64) -> f64 {
        self.e[offset + Self::bin(r2)]
    }

    fn bin(r2: f64) -> usize {
        ((r2 * FACTOR) as usize).min(NUM_SAMPLES - 1)
    }
}
