use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Vector3;

use griddock::atom::XsType;
use griddock::grid::SearchBox;
use griddock::ligand::conformation::Conformation;
use griddock::ligand::Ligand;
use griddock::optimization::local::{minimize, BfgsParams};
use griddock::receptor::Receptor;
use griddock::scoring::ScoringFunction;

fn single_atom_setup() -> (ScoringFunction, Receptor, Ligand) {
    let mut sf = ScoringFunction::default();
    sf.precalculate().unwrap();
    let search_box =
        SearchBox::new(Vector3::zeros(), Vector3::new(12.0, 12.0, 12.0), 0.15625).unwrap();
    let line = "ATOM      1  C   REC A   1       0.000   0.000   0.000  0.00  0.00     0.000 C \n";
    let rec = Receptor::from_reader(line.as_bytes(), search_box).unwrap();
    rec.ensure_maps(&sf, &[XsType::CarbonHydrophobic]);
    let lig = Ligand::from_pdbqt_str(
        "ROOT\nATOM      1  C   LIG A   1       0.000   0.000   0.000  0.00  0.00     0.000 C \nENDROOT\nTORSDOF 0\n",
    )
    .unwrap();
    (sf, rec, lig)
}

fn bench_evaluate(c: &mut Criterion) {
    let (sf, rec, mut lig) = single_atom_setup();
    let conf = Conformation::new(Vector3::new(4.0, 0.0, 0.0), 0);

    c.bench_function("evaluate", |b| {
        b.iter(|| {
            black_box(lig.evaluate(&conf, &sf, &rec, f64::INFINITY));
        })
    });
}

fn bench_bfgs_minimize(c: &mut Criterion) {
    let (sf, rec, mut lig) = single_atom_setup();
    let params = BfgsParams::default();

    c.bench_function("bfgs_minimize", |b| {
        b.iter(|| {
            let start = Conformation::new(Vector3::new(4.8, 0.2, -0.3), 0);
            black_box(minimize(&mut lig, start, &sf, &rec, &params));
        })
    });
}

criterion_group!(optimization_benches, bench_evaluate, bench_bfgs_minimize);
criterion_main!(optimization_benches);
