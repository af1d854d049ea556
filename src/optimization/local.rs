//! BFGS local optimization over a ligand conformation
//!
//! A quasi-Newton minimizer working directly on the kinematic coordinates
//! (translation, rotation vector, torsions). The inverse Hessian is a dense
//! symmetric matrix; with 6 + T degrees of freedom and typical T well under
//! 20, a limited-memory variant would buy nothing.

use nalgebra::DMatrix;

use crate::ligand::conformation::{Change, Conformation};
use crate::ligand::Ligand;
use crate::receptor::Receptor;
use crate::scoring::ScoringFunction;

/// Parameters for the BFGS minimizer.
#[derive(Debug, Clone)]
pub struct BfgsParams {
    /// Maximum number of quasi-Newton iterations.
    pub max_iterations: usize,

    /// Stop once the gradient norm falls below this.
    pub gradient_tolerance: f64,

    /// Armijo sufficient-decrease constant for the line search.
    pub armijo_c1: f64,

    /// Maximum number of step halvings per line search.
    pub max_halvings: usize,
}

impl Default for BfgsParams {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            gradient_tolerance: 1e-5,
            armijo_c1: 1e-4,
            max_halvings: 10,
        }
    }
}

/// Minimize the ligand's energy starting from `conf`.
///
/// Returns the best conformation reached with its energies, or `None` when
/// the starting point itself cannot be evaluated.
pub fn minimize(
    lig: &mut Ligand,
    conf: Conformation,
    sf: &ScoringFunction,
    rec: &Receptor,
    params: &BfgsParams,
) -> Option<(f64, f64, Conformation)> {
    let n = 6 + lig.num_active_torsions;

    let (mut e, mut f_inter, g0) = lig.evaluate(&conf, sf, rec, f64::INFINITY)?;
    let mut g = g0.to_dvector();
    let mut conf = conf;
    let mut h = DMatrix::<f64>::identity(n, n);

    for _ in 0..params.max_iterations {
        if g.norm() < params.gradient_tolerance {
            break;
        }

        let p = -(&h * &g);
        let pg = p.dot(&g);
        if pg >= 0.0 {
            // Not a descent direction; the Hessian approximation has
            // degenerated numerically.
            break;
        }
        let direction = Change::from_dvector(&p);

        // Backtracking line search from a full step.
        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..=params.max_halvings {
            let candidate = conf.step(&direction, alpha);
            if let Some((e2, f2, g2)) = lig.evaluate(&candidate, sf, rec, f64::INFINITY) {
                if e2 < e + params.armijo_c1 * alpha * pg {
                    accepted = Some((candidate, e2, f2, g2));
                    break;
                }
            }
            alpha *= 0.5;
        }
        let Some((candidate, e2, f2, g2)) = accepted else {
            break;
        };

        let g2 = g2.to_dvector();
        let s = &p * alpha;
        let y = &g2 - &g;
        let sy = s.dot(&y);
        if sy > 1e-10 * s.norm() * y.norm() {
            // Standard inverse BFGS update,
            // H <- (I - rho s y^T) H (I - rho y s^T) + rho s s^T.
            let rho = 1.0 / sy;
            let identity = DMatrix::<f64>::identity(n, n);
            let left = &identity - rho * (&s * y.transpose());
            let right = &identity - rho * (&y * s.transpose());
            h = &left * h * &right + rho * (&s * s.transpose());
        }

        conf = candidate;
        e = e2;
        f_inter = f2;
        g = g2;
    }

    Some((e, f_inter, conf))
}
