//! Input/output: PDBQT atom records, docked model files, and the screening log

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;
use thiserror::Error;

use crate::atom::AdType;
use crate::ligand::Ligand;
use crate::optimization::DockingResult;

/// Errors that can occur during file I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// The fields of one ATOM/HETATM record the docking engine consumes.
#[derive(Debug, Clone)]
pub struct AtomRecord {
    pub serial: usize,
    pub coordinate: Vector3<f64>,
    pub ad: AdType,
}

/// Parse the fixed-width fields of a PDBQT ATOM/HETATM record: serial at
/// columns 7-11, coordinates at 31-38/39-46/47-54, AutoDock type at 78-79
/// (1-based, inclusive).
pub fn parse_atom_record(line: &str, line_number: usize) -> Result<AtomRecord, IoError> {
    if line.len() < 78 {
        return Err(IoError::Parse {
            line: line_number,
            message: format!("atom record too short ({} columns)", line.len()),
        });
    }

    let serial = line[6..11]
        .trim()
        .parse::<usize>()
        .map_err(|_| IoError::Parse {
            line: line_number,
            message: format!("invalid atom serial number '{}'", line[6..11].trim()),
        })?;

    let mut coordinate = Vector3::zeros();
    for (i, range) in [(0, 30..38), (1, 38..46), (2, 46..54)] {
        coordinate[i] = line[range.clone()]
            .trim()
            .parse::<f64>()
            .map_err(|_| IoError::Parse {
                line: line_number,
                message: format!("invalid coordinate '{}'", line[range.clone()].trim()),
            })?;
    }

    let ad_string = line
        .get(77..79)
        .or_else(|| line.get(77..78))
        .unwrap_or("");
    let ad = AdType::from_pdbqt_string(ad_string).ok_or_else(|| IoError::Parse {
        line: line_number,
        message: format!("AutoDock atom type '{}' is not supported", ad_string.trim()),
    })?;

    Ok(AtomRecord {
        serial,
        coordinate,
        ad,
    })
}

/// Write docked poses as MODEL blocks, rewriting the coordinates of the
/// ligand's original PDBQT lines in place. `energies` carries the reported
/// (flexibility-penalized) free energy per pose.
pub fn write_models<P: AsRef<Path>>(
    path: P,
    lig: &Ligand,
    results: &[DockingResult],
    energies: &[f64],
) -> Result<(), IoError> {
    debug_assert_eq!(results.len(), energies.len());
    let mut out = BufWriter::new(File::create(path)?);

    for (i, (r, e)) in results.iter().zip(energies).enumerate() {
        writeln!(out, "MODEL     {:>4}", i + 1)?;
        writeln!(
            out,
            "REMARK     FREE ENERGY PREDICTED BY IDOCK:{:8.2} KCAL/MOL",
            e
        )?;

        let mut frame = 0;
        let mut heavy_atom = 0;
        let mut hydrogen = 0;
        for line in &lig.lines {
            if line.len() >= 78 {
                // An ATOM/HETATM line; the AutoDock type begins at column
                // 78, and only the two hydrogen types start with 'H'.
                let coordinate = if line.as_bytes()[77] == b'H' {
                    let c = r.hydrogens[frame][hydrogen];
                    hydrogen += 1;
                    c
                } else {
                    let c = r.heavy_atoms[frame][heavy_atom];
                    heavy_atom += 1;
                    c
                };
                writeln!(
                    out,
                    "{}{:8.3}{:8.3}{:8.3}{}",
                    &line[..30],
                    coordinate.x,
                    coordinate.y,
                    coordinate.z,
                    &line[54..]
                )?;
            } else {
                // ROOT, ENDROOT, BRANCH, ENDBRANCH, TORSDOF pass through.
                out.write_all(line.as_bytes())?;
                writeln!(out)?;
                if line.starts_with("BRANCH") {
                    frame += 1;
                    heavy_atom = 0;
                    hydrogen = 0;
                }
            }
        }
        writeln!(out, "ENDMDL")?;
    }

    Ok(())
}

/// One screening log row: ligand stem and its reported pose energies,
/// best first.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub stem: String,
    pub energies: Vec<f64>,
}

impl LogRecord {
    fn best_energy(&self) -> f64 {
        self.energies.first().copied().unwrap_or(f64::INFINITY)
    }
}

/// Sort log records by predicted affinity ascending and write them as CSV.
pub fn write_log<P: AsRef<Path>>(path: P, records: &mut [LogRecord]) -> Result<(), IoError> {
    records.sort_by(|a, b| {
        a.best_energy()
            .partial_cmp(&b.best_energy())
            .unwrap_or(Ordering::Equal)
    });

    let mut out = BufWriter::new(File::create(path)?);
    for record in records.iter() {
        write!(out, "{}", record.stem)?;
        for e in &record.energies {
            write!(out, ",{:.2}", e)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atom_record() {
        let line =
            "ATOM      7  C   LIG A   1      -1.234  22.000   0.125  0.00  0.00    +0.000 C ";
        let record = parse_atom_record(line, 1).unwrap();
        assert_eq!(record.serial, 7);
        assert!((record.coordinate.x - -1.234).abs() < 1e-12);
        assert!((record.coordinate.y - 22.0).abs() < 1e-12);
        assert!((record.coordinate.z - 0.125).abs() < 1e-12);
        assert_eq!(record.ad, AdType::Carbon);
    }

    #[test]
    fn test_parse_atom_record_two_letter_type() {
        let line =
            "ATOM      1  N   LIG A   1       0.000   0.000   0.000  0.00  0.00    +0.000 NA";
        let record = parse_atom_record(line, 3).unwrap();
        assert_eq!(record.ad, AdType::NitrogenAcceptor);
    }

    #[test]
    fn test_parse_atom_record_rejects_unknown_type() {
        let line =
            "ATOM      1  X   LIG A   1       0.000   0.000   0.000  0.00  0.00    +0.000 Xx";
        let err = parse_atom_record(line, 5).unwrap_err();
        match err {
            IoError::Parse { line, .. } => assert_eq!(line, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_atom_record_rejects_short_line() {
        assert!(parse_atom_record("ATOM      1  C", 2).is_err());
    }

    #[test]
    fn test_write_log_sorts_by_best_energy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut records = vec![
            LogRecord {
                stem: "lig_b".to_string(),
                energies: vec![-3.5, -2.0],
            },
            LogRecord {
                stem: "lig_a".to_string(),
                energies: vec![-7.234],
            },
        ];
        write_log(&path, &mut records).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["lig_a,-7.23", "lig_b,-3.50,-2.00"]);
    }
}
