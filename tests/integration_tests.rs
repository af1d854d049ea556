//! Integration tests for the griddock virtual-screening engine

use std::path::PathBuf;

use nalgebra::Vector3;
use tempfile::tempdir;

use griddock::atom::XsType;
use griddock::grid::SearchBox;
use griddock::io;
use griddock::ligand::Ligand;
use griddock::optimization::local::BfgsParams;
use griddock::optimization::monte_carlo::{MonteCarlo, MonteCarloParams};
use griddock::receptor::Receptor;
use griddock::scoring::ScoringFunction;

/// Get the path to the test data directory
fn test_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("test_data")
}

fn scoring_function() -> ScoringFunction {
    let mut sf = ScoringFunction::default();
    sf.precalculate().unwrap();
    sf
}

fn load_receptor(name: &str, center: Vector3<f64>, size: f64) -> Receptor {
    let b = SearchBox::new(
        center,
        Vector3::new(size, size, size),
        SearchBox::DEFAULT_GRANULARITY,
    )
    .unwrap();
    Receptor::from_path(test_data_dir().join(name), b).expect("receptor parses")
}

fn load_ligand(name: &str) -> Ligand {
    Ligand::from_path(test_data_dir().join(name)).expect("ligand parses")
}

fn fast_params(num_tasks: usize, mutations: usize, bfgs_iterations: usize) -> MonteCarloParams {
    MonteCarloParams {
        num_tasks,
        mutations_per_heavy_atom: mutations,
        bfgs: BfgsParams {
            max_iterations: bfgs_iterations,
            ..BfgsParams::default()
        },
        ..MonteCarloParams::default()
    }
}

fn pool(threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .unwrap()
}

#[test]
fn test_parse_receptor_pdbqt() {
    let rec = load_receptor("receptor.pdbqt", Vector3::zeros(), 10.0);
    // Three heavy atoms; the hydroxyl hydrogen marks the oxygen as donor.
    assert_eq!(rec.atoms.len(), 3);
    assert_eq!(rec.atoms[1].xs, XsType::OxygenDonorAcceptor);
    // The carbon bonded to the oxygen is polar, the distant one is not.
    assert_eq!(rec.atoms[0].xs, XsType::CarbonPolar);
    assert_eq!(rec.atoms[2].xs, XsType::CarbonHydrophobic);
}

#[test]
fn test_parse_ligand_pdbqt() {
    let lig = load_ligand("ligand_three.pdbqt");
    assert_eq!(lig.num_heavy_atoms, 3);
    assert_eq!(lig.num_frames, 2);
    assert_eq!(lig.num_active_torsions, 1);
}

#[test]
fn test_single_atom_ligand_in_empty_receptor() {
    let sf = scoring_function();
    let rec = load_receptor("receptor_empty.pdbqt", Vector3::zeros(), 10.0);
    let lig = load_ligand("ligand_single.pdbqt");
    rec.ensure_maps(&sf, &lig.atom_types());

    let mc = MonteCarlo::with_params(fast_params(4, 5, 50));
    let results = mc.generate_poses(&lig, &sf, &rec, 7, &pool(2));

    assert!(!results.is_empty());
    assert!(results.len() <= mc.params.max_conformations);
    for r in &results {
        // An empty receptor yields exactly zero energy everywhere.
        assert_eq!(r.e, 0.0);
        assert_eq!(r.f_inter, 0.0);
        assert!(rec.search_box.within(&r.heavy_atoms[0][0]));
    }
}

#[test]
fn test_two_atom_rigid_ligand_has_no_intra_energy() {
    let sf = scoring_function();
    let rec = load_receptor("receptor_empty.pdbqt", Vector3::zeros(), 10.0);
    let mut lig = load_ligand("ligand_two.pdbqt");
    rec.ensure_maps(&sf, &lig.atom_types());

    // Distance-1 neighbors produce no 1-4 pairs; the energy is pure grid
    // energy, which is zero here.
    let conf = lig.reference_conformation();
    let (e, f_inter, g) = lig
        .evaluate(&conf, &sf, &rec, f64::INFINITY)
        .expect("reference pose is inside the box");
    assert_eq!(e, 0.0);
    assert_eq!(f_inter, 0.0);
    assert_eq!(g.dim(), 6);
}

#[test]
fn test_one_torsion_ligand_has_zero_torsion_gradient() {
    let sf = scoring_function();
    let rec = load_receptor("receptor_empty.pdbqt", Vector3::zeros(), 10.0);
    let mut lig = load_ligand("ligand_three.pdbqt");
    rec.ensure_maps(&sf, &lig.atom_types());

    for torsion in [-2.0, -0.5, 0.0, 1.3] {
        let mut conf = lig.reference_conformation();
        conf.torsions[0] = torsion;
        let (e, _, g) = lig
            .evaluate(&conf, &sf, &rec, f64::INFINITY)
            .expect("pose is inside the box");
        assert_eq!(e, 0.0);
        assert_eq!(g.dim(), 7);
        assert!(g.torsions[0].abs() < 1e-6);
    }
}

#[test]
fn test_single_receptor_atom_forms_a_binding_well() {
    let sf = scoring_function();
    let rec = load_receptor("receptor_single.pdbqt", Vector3::zeros(), 10.0);
    let lig = load_ligand("ligand_single.pdbqt");
    rec.ensure_maps(&sf, &lig.atom_types());

    let mc = MonteCarlo::with_params(fast_params(16, 25, 300));
    let results = mc.generate_poses(&lig, &sf, &rec, 42, &pool(4));

    assert!(!results.is_empty());
    let top = &results[0];
    assert!(top.e < -0.05, "top pose energy {}", top.e);
    // The pair potential bottoms out at the contact distance of two
    // carbons, 3.8 A from the receptor atom at the origin.
    let r = top.heavy_atoms[0][0].norm();
    assert!((3.3..4.5).contains(&r), "top pose distance {}", r);
}

#[test]
fn test_flexibility_penalty_is_applied_to_reported_energies() {
    let lig = load_ligand("ligand_flex.pdbqt");
    // Two active torsions.
    assert_eq!(lig.num_active_torsions, 2);
    let expected = 1.0 / (1.0 + 0.05846 * 2.0);
    assert!((lig.flexibility_penalty_factor - expected).abs() < 1e-12);
    assert!((lig.flexibility_penalty_factor - 0.8953).abs() < 1e-4);

    let sf = scoring_function();
    let rec = load_receptor("receptor_single.pdbqt", Vector3::zeros(), 10.0);
    rec.ensure_maps(&sf, &lig.atom_types());
    let mc = MonteCarlo::with_params(fast_params(2, 3, 30));
    let results = mc.generate_poses(&lig, &sf, &rec, 5, &pool(2));
    assert!(!results.is_empty());

    let energies: Vec<f64> = results
        .iter()
        .map(|r| r.e * lig.flexibility_penalty_factor)
        .collect();

    let dir = tempdir().unwrap();
    let out = dir.path().join("ligand_flex_out.pdbqt");
    io::write_models(&out, &lig, &results, &energies).unwrap();
    let content = std::fs::read_to_string(&out).unwrap();

    // The REMARK header reports the penalized energy to two decimals.
    let remark = content
        .lines()
        .find(|l| l.starts_with("REMARK"))
        .expect("REMARK present");
    let reported: f64 = remark
        .split(':')
        .nth(1)
        .unwrap()
        .trim()
        .split_whitespace()
        .next()
        .unwrap()
        .parse()
        .unwrap();
    assert!((reported - energies[0]).abs() < 0.005 + 1e-9);
}

#[test]
fn test_identical_seed_is_thread_count_invariant() {
    let sf = scoring_function();
    let rec = load_receptor("receptor_single.pdbqt", Vector3::zeros(), 10.0);
    let lig = load_ligand("ligand_flex.pdbqt");
    rec.ensure_maps(&sf, &lig.atom_types());

    let mc = MonteCarlo::with_params(fast_params(4, 3, 30));
    let a = mc.generate_poses(&lig, &sf, &rec, 2024, &pool(1));
    let b = mc.generate_poses(&lig, &sf, &rec, 2024, &pool(8));

    assert_eq!(a.len(), b.len());
    for (ra, rb) in a.iter().zip(&b) {
        assert_eq!(ra.e, rb.e);
        assert_eq!(ra.heavy_atoms, rb.heavy_atoms);
        assert_eq!(ra.hydrogens, rb.hydrogens);
    }
}

#[test]
fn test_write_models_round_trips_the_input_pose() {
    let lig = load_ligand("ligand_polar.pdbqt");
    // The input pose corresponds to the reference conformation.
    let r = lig.compose_result(0.0, 0.0, &lig.reference_conformation());

    let dir = tempdir().unwrap();
    let out = dir.path().join("ligand_polar_out.pdbqt");
    io::write_models(&out, &lig, &[r], &[0.0]).unwrap();
    let written = std::fs::read_to_string(&out).unwrap();

    let original = std::fs::read_to_string(test_data_dir().join("ligand_polar.pdbqt")).unwrap();
    let original_atoms: Vec<&str> = original
        .lines()
        .filter(|l| l.starts_with("ATOM") || l.starts_with("HETATM"))
        .collect();
    let written_atoms: Vec<&str> = written
        .lines()
        .filter(|l| l.starts_with("ATOM") || l.starts_with("HETATM"))
        .collect();

    assert_eq!(original_atoms.len(), written_atoms.len());
    for (a, b) in original_atoms.iter().zip(&written_atoms) {
        // Coordinates reproduce to the 3 decimals of the format; the
        // surrounding columns are byte-identical.
        assert_eq!(a[..30], b[..30]);
        assert_eq!(a[54..], b[54..]);
        for range in [30..38, 38..46, 46..54] {
            let x: f64 = a[range.clone()].trim().parse().unwrap();
            let y: f64 = b[range.clone()].trim().parse().unwrap();
            assert!((x - y).abs() < 1.5e-3);
        }
    }

    // Model structure around the atoms.
    assert!(written.starts_with("MODEL"));
    assert!(written.contains("REMARK     FREE ENERGY PREDICTED BY IDOCK:"));
    assert!(written.contains("ROOT"));
    assert!(written.contains("TORSDOF 0"));
    assert!(written.trim_end().ends_with("ENDMDL"));
}

#[test]
fn test_screening_log_is_sorted_by_affinity() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.csv");
    let mut records = vec![
        io::LogRecord {
            stem: "weak".to_string(),
            energies: vec![-1.25],
        },
        io::LogRecord {
            stem: "strong".to_string(),
            energies: vec![-9.87, -8.0],
        },
        io::LogRecord {
            stem: "medium".to_string(),
            energies: vec![-4.5],
        },
    ];
    io::write_log(&path, &mut records).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    let stems: Vec<&str> = content
        .lines()
        .map(|l| l.split(',').next().unwrap())
        .collect();
    assert_eq!(stems, vec!["strong", "medium", "weak"]);
}
