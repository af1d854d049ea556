use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Vector3;

use griddock::atom::XsType;
use griddock::grid::SearchBox;
use griddock::receptor::Receptor;
use griddock::scoring::ScoringFunction;

fn receptor_pdbqt() -> String {
    let mut s = String::new();
    let mut serial = 0;
    for i in 0..4 {
        for j in 0..4 {
            serial += 1;
            s.push_str(&format!(
                "ATOM  {:>5}  C   REC A   1    {:>8.3}{:>8.3}{:>8.3}  0.00  0.00     0.000 C \n",
                serial,
                -3.0 + 2.0 * i as f64,
                -3.0 + 2.0 * j as f64,
                0.0
            ));
        }
    }
    s
}

fn bench_grid_population(c: &mut Criterion) {
    let mut sf = ScoringFunction::default();
    sf.precalculate().unwrap();
    let pdbqt = receptor_pdbqt();

    c.bench_function("grid_population", |b| {
        b.iter(|| {
            let search_box = SearchBox::new(
                Vector3::zeros(),
                Vector3::new(16.0, 16.0, 16.0),
                0.5,
            )
            .unwrap();
            let rec = Receptor::from_reader(pdbqt.as_bytes(), search_box).unwrap();
            rec.ensure_maps(&sf, &[XsType::CarbonHydrophobic]);
            black_box(rec.map(XsType::CarbonHydrophobic).unwrap().data.len());
        })
    });
}

fn bench_grid_index(c: &mut Criterion) {
    let search_box =
        SearchBox::new(Vector3::zeros(), Vector3::new(20.0, 20.0, 20.0), 0.15625).unwrap();

    c.bench_function("grid_index", |b| {
        b.iter(|| {
            let mut acc = 0usize;
            let mut x = -9.9;
            while x < 9.9 {
                acc += search_box.grid_index(&Vector3::new(x, 0.3 * x, -0.7 * x))[0];
                x += 0.01;
            }
            black_box(acc);
        })
    });
}

criterion_group!(grid_benches, bench_grid_population, bench_grid_index);
criterion_main!(grid_benches);
