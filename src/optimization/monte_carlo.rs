//! Monte Carlo global search
//!
//! Each task is an independent, seeded Metropolis chain: perturb the
//! current conformation, refine it with BFGS, and keep the best distinct
//! poses. Tasks fan out over the worker pool and their ranked lists merge
//! under the same duplicate filter, so a run is reproducible for a given
//! master seed regardless of thread count.

use std::f64::consts::PI;

use nalgebra::{Unit, UnitQuaternion, Vector3};
use rand::prelude::*;
use rayon::prelude::*;

use crate::ligand::conformation::Conformation;
use crate::ligand::Ligand;
use crate::math;
use crate::optimization::local::{self, BfgsParams};
use crate::optimization::DockingResult;
use crate::receptor::Receptor;
use crate::scoring::ScoringFunction;

/// Parameters for the Monte Carlo search
#[derive(Debug, Clone)]
pub struct MonteCarloParams {
    /// Number of independent tasks per ligand.
    pub num_tasks: usize,

    /// Maximum number of distinct poses retained per task and after the
    /// merge.
    pub max_conformations: usize,

    /// Inverse temperature for the Metropolis criterion.
    pub temperature: f64,

    /// Maximum translation perturbation per axis (in Angstroms).
    pub max_translation: f64,

    /// Maximum rotation perturbation (in radians).
    pub max_rotation: f64,

    /// Mutations per heavy atom in one task.
    pub mutations_per_heavy_atom: usize,

    /// Heavy-atom RMSD below which two poses count as duplicates.
    pub rmsd_threshold: f64,

    /// Parameters of the BFGS refinement stage.
    pub bfgs: BfgsParams,
}

impl Default for MonteCarloParams {
    fn default() -> Self {
        Self {
            num_tasks: 256,
            max_conformations: 9,
            temperature: 1.2,
            max_translation: 1.0,
            max_rotation: PI / 6.0, // 30 degrees
            mutations_per_heavy_atom: 25,
            rmsd_threshold: 2.0,
            bfgs: BfgsParams::default(),
        }
    }
}

/// The Monte Carlo search driver.
#[derive(Debug, Clone, Default)]
pub struct MonteCarlo {
    pub params: MonteCarloParams,
}

impl MonteCarlo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: MonteCarloParams) -> Self {
        Self { params }
    }

    /// Run every task of one ligand across the worker pool and merge the
    /// per-task pose lists into a single ranked collection.
    ///
    /// All grid maps for the ligand's atom types must be populated.
    pub fn generate_poses(
        &self,
        lig: &Ligand,
        sf: &ScoringFunction,
        rec: &Receptor,
        master_seed: u64,
        pool: &rayon::ThreadPool,
    ) -> Vec<DockingResult> {
        let task_results: Vec<Vec<DockingResult>> = pool.install(|| {
            (0..self.params.num_tasks)
                .into_par_iter()
                .map(|task| self.run_task(lig, sf, rec, task_seed(master_seed, task as u64)))
                .collect()
        });

        let required_sqr_error = self.required_sqr_error(lig);
        let mut merged = Vec::with_capacity(self.params.max_conformations);
        for r in task_results.into_iter().flatten() {
            DockingResult::push(
                &mut merged,
                r,
                required_sqr_error,
                self.params.max_conformations,
            );
        }
        merged
    }

    /// One deterministic Metropolis chain.
    pub fn run_task(
        &self,
        lig: &Ligand,
        sf: &ScoringFunction,
        rec: &Receptor,
        seed: u64,
    ) -> Vec<DockingResult> {
        let mut lig = lig.clone();
        let mut rng = StdRng::seed_from_u64(seed);
        let num_mutations = self.params.mutations_per_heavy_atom * lig.num_heavy_atoms;
        let e_upper_bound = 40.0 * lig.num_heavy_atoms as f64;
        let required_sqr_error = self.required_sqr_error(&lig);
        let mut results = Vec::with_capacity(self.params.max_conformations);

        // Seed the chain with a refined random conformation, redrawing
        // until one places every atom inside the box.
        const MAX_RESTARTS: usize = 1000;
        let mut seeded = None;
        for _ in 0..MAX_RESTARTS {
            let candidate = self.random_conformation(&mut rng, &lig, rec);
            if let Some((e, f_inter, optimized)) =
                local::minimize(&mut lig, candidate, sf, rec, &self.params.bfgs)
            {
                if e < e_upper_bound {
                    let r = lig.compose_result(e, f_inter, &optimized);
                    DockingResult::push(
                        &mut results,
                        r,
                        required_sqr_error,
                        self.params.max_conformations,
                    );
                }
                seeded = Some((e, optimized));
                break;
            }
        }
        let Some((mut e_current, mut conf)) = seeded else {
            return results;
        };

        for _ in 0..num_mutations {
            let candidate = self.mutate(&conf, &mut rng);
            let Some((e, f_inter, optimized)) =
                local::minimize(&mut lig, candidate, sf, rec, &self.params.bfgs)
            else {
                continue;
            };

            if e < e_upper_bound {
                let r = lig.compose_result(e, f_inter, &optimized);
                DockingResult::push(
                    &mut results,
                    r,
                    required_sqr_error,
                    self.params.max_conformations,
                );
            }

            // Metropolis criterion on the refined energies.
            let accept = e < e_current
                || rng.gen::<f64>() < ((e_current - e) * self.params.temperature).exp();
            if accept {
                e_current = e;
                conf = optimized;
            }
        }

        results
    }

    fn required_sqr_error(&self, lig: &Ligand) -> f64 {
        self.params.rmsd_threshold * self.params.rmsd_threshold * lig.num_heavy_atoms as f64
    }

    /// A uniformly random starting state inside the search box.
    fn random_conformation(
        &self,
        rng: &mut StdRng,
        lig: &Ligand,
        rec: &Receptor,
    ) -> Conformation {
        let b = &rec.search_box;
        Conformation {
            position: Vector3::new(
                rng.gen_range(b.corner1.x..=b.corner2.x),
                rng.gen_range(b.corner1.y..=b.corner2.y),
                rng.gen_range(b.corner1.z..=b.corner2.z),
            ),
            orientation: random_rotation(rng, PI),
            torsions: (0..lig.num_active_torsions)
                .map(|_| rng.gen_range(-PI..PI))
                .collect(),
        }
    }

    /// Perturb a conformation: jitter the position, rotate by a bounded
    /// random axis-angle, and redraw a random subset of the torsions.
    fn mutate(&self, conf: &Conformation, rng: &mut StdRng) -> Conformation {
        let mut c = conf.clone();
        c.position += Vector3::new(
            rng.gen_range(-self.params.max_translation..=self.params.max_translation),
            rng.gen_range(-self.params.max_translation..=self.params.max_translation),
            rng.gen_range(-self.params.max_translation..=self.params.max_translation),
        );
        c.orientation = math::renormalize(random_rotation(rng, self.params.max_rotation) * c.orientation);
        for t in &mut c.torsions {
            if rng.gen_bool(0.5) {
                *t = rng.gen_range(-PI..PI);
            }
        }
        c
    }
}

/// A rotation about a random axis by an angle uniform in [-max_angle, max_angle].
fn random_rotation(rng: &mut StdRng, max_angle: f64) -> UnitQuaternion<f64> {
    let axis = Vector3::new(
        rng.gen::<f64>() - 0.5,
        rng.gen::<f64>() - 0.5,
        rng.gen::<f64>() - 0.5,
    );
    let angle = rng.gen_range(-max_angle..=max_angle);
    if axis.norm() > 1e-10 {
        UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), angle)
    } else {
        UnitQuaternion::identity()
    }
}

/// Mix a task index into the master seed so tasks are decorrelated and the
/// assignment is independent of scheduling.
fn task_seed(master_seed: u64, task: u64) -> u64 {
    let mut z = master_seed.wrapping_add(task.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::XsType;
    use crate::grid::SearchBox;

    fn atom_line(serial: usize, x: f64, y: f64, z: f64, ad: &str) -> String {
        format!(
            "ATOM  {:>5}  {:<2}{} LIG A   1    {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}    {:>6.3} {:<2}",
            serial, "C", " ", x, y, z, 0.0, 0.0, 0.0, ad
        )
    }

    fn single_atom_ligand() -> Ligand {
        Ligand::from_pdbqt_str(&format!(
            "ROOT\n{}\nENDROOT\nTORSDOF 0\n",
            atom_line(1, 0.0, 0.0, 0.0, "C")
        ))
        .unwrap()
    }

    fn single_atom_receptor() -> (ScoringFunction, Receptor) {
        let mut sf = ScoringFunction::default();
        sf.precalculate().unwrap();
        let b = SearchBox::new(Vector3::zeros(), Vector3::new(10.0, 10.0, 10.0), 0.15625).unwrap();
        let rec =
            Receptor::from_reader(format!("{}\n", atom_line(1, 0.0, 0.0, 0.0, "C")).as_bytes(), b)
                .unwrap();
        rec.ensure_maps(&sf, &[XsType::CarbonHydrophobic]);
        (sf, rec)
    }

    #[test]
    fn test_task_seed_decorrelates_tasks() {
        let a = task_seed(42, 0);
        let b = task_seed(42, 1);
        let c = task_seed(43, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, task_seed(42, 0));
    }

    #[test]
    fn test_run_task_is_deterministic_per_seed() {
        let (sf, rec) = single_atom_receptor();
        let lig = single_atom_ligand();
        let mc = MonteCarlo::with_params(MonteCarloParams {
            mutations_per_heavy_atom: 5,
            ..MonteCarloParams::default()
        });

        let a = mc.run_task(&lig, &sf, &rec, 7);
        let b = mc.run_task(&lig, &sf, &rec, 7);
        assert_eq!(a.len(), b.len());
        for (ra, rb) in a.iter().zip(&b) {
            assert_eq!(ra.e, rb.e);
            assert_eq!(ra.heavy_atoms, rb.heavy_atoms);
        }
    }

    #[test]
    fn test_merged_poses_are_ranked_and_distinct() {
        let (sf, rec) = single_atom_receptor();
        let lig = single_atom_ligand();
        let mc = MonteCarlo::with_params(MonteCarloParams {
            num_tasks: 8,
            mutations_per_heavy_atom: 10,
            ..MonteCarloParams::default()
        });
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();

        let results = mc.generate_poses(&lig, &sf, &rec, 99, &pool);
        assert!(!results.is_empty());
        assert!(results.len() <= mc.params.max_conformations);
        let required = mc.params.rmsd_threshold * mc.params.rmsd_threshold;
        for i in 0..results.len() {
            assert!(results[i].e.is_finite());
            if i > 0 {
                assert!(results[i - 1].e <= results[i].e);
            }
            for j in (i + 1)..results.len() {
                assert!(results[i].square_error_to(&results[j]) >= required);
            }
        }
    }

    #[test]
    fn test_generate_poses_is_thread_count_invariant() {
        let (sf, rec) = single_atom_receptor();
        let lig = single_atom_ligand();
        let mc = MonteCarlo::with_params(MonteCarloParams {
            num_tasks: 4,
            mutations_per_heavy_atom: 5,
            ..MonteCarloParams::default()
        });

        let pool1 = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let pool4 = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let a = mc.generate_poses(&lig, &sf, &rec, 1234, &pool1);
        let b = mc.generate_poses(&lig, &sf, &rec, 1234, &pool4);

        assert_eq!(a.len(), b.len());
        for (ra, rb) in a.iter().zip(&b) {
            assert_eq!(ra.e, rb.e);
            assert_eq!(ra.heavy_atoms, rb.heavy_atoms);
        }
    }
}
