//! Receptor model and lazy grid-map population

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use log::debug;
use rayon::prelude::*;

use crate::atom::{AdType, Atom, XsType, NUM_XS_TYPES};
use crate::grid::{GridMap, SearchBox};
use crate::io::{self, IoError};
use crate::scoring::{ScoringFunction, CUTOFF, CUTOFF_SQR};

/// A rigid receptor: its heavy atoms near the search box and the lazily
/// populated per-probe-type energy grids.
///
/// Each map slot goes through absent -> populated exactly once, before any
/// Monte Carlo task that needs it is dispatched; once populated a map is
/// read-only and lookups are lock-free.
#[derive(Debug)]
pub struct Receptor {
    /// Heavy atoms within the scoring cutoff of the search box.
    pub atoms: Vec<Atom>,

    /// The search volume all grids are laid over.
    pub search_box: SearchBox,

    maps: Vec<OnceLock<GridMap>>,
}

impl Receptor {
    /// Parse a receptor PDBQT file and keep the heavy atoms within the
    /// scoring cutoff of the search box.
    pub fn from_path<P: AsRef<Path>>(path: P, search_box: SearchBox) -> Result<Self, IoError> {
        Self::from_reader(BufReader::new(File::open(path)?), search_box)
    }

    pub fn from_reader<R: BufRead>(reader: R, search_box: SearchBox) -> Result<Self, IoError> {
        let mut atoms: Vec<Atom> = Vec::new();

        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = line_number + 1;
            if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
                continue;
            }
            let record = io::parse_atom_record(&line, line_number)?;
            if record.ad.is_hydrogen() {
                // A polar hydrogen marks its bonded heteroatom as a
                // hydrogen bond donor; hydrogens themselves do not score.
                if record.ad == AdType::PolarHydrogen {
                    for atom in atoms.iter_mut().rev() {
                        if atom.is_hetero() && atom.is_neighbor_at(&record.coordinate, record.ad) {
                            atom.donorize();
                            break;
                        }
                    }
                }
                continue;
            }
            let xs = record.ad.xs().expect("heavy atom has an XScore type");
            atoms.push(Atom::new(record.serial, record.coordinate, record.ad, xs));
        }

        // Carbons bonded to a heteroatom lose their hydrophobic character.
        for i in 0..atoms.len() {
            if atoms[i].is_hetero() {
                continue;
            }
            let bonded_to_hetero = atoms
                .iter()
                .enumerate()
                .any(|(j, a)| j != i && a.is_hetero() && a.is_neighbor(&atoms[i]));
            if bonded_to_hetero {
                atoms[i].dehydrophobicize();
            }
        }

        atoms.retain(|a| search_box.distance_sqr_to(&a.coordinate) <= CUTOFF_SQR);

        Ok(Self {
            atoms,
            search_box,
            maps: (0..NUM_XS_TYPES).map(|_| OnceLock::new()).collect(),
        })
    }

    /// The populated grid map for a probe type, if any.
    pub fn map(&self, xs: XsType) -> Option<&GridMap> {
        self.maps[xs.index()].get()
    }

    /// Whether the grid map for a probe type has been populated. A map is
    /// never partially populated.
    pub fn is_populated(&self, xs: XsType) -> bool {
        self.maps[xs.index()].get().is_some()
    }

    /// The subset of `types` whose grid maps have not been populated yet.
    pub fn missing_types(&self, types: &[XsType]) -> Vec<XsType> {
        types
            .iter()
            .copied()
            .filter(|t| !self.is_populated(*t))
            .collect()
    }

    /// Populate the grid maps for any of `types` still absent. Ligands
    /// whose types are all populated return immediately without locking.
    ///
    /// One task per z-slab is spread over the calling rayon pool; every
    /// slab sweep first prunes the receptor atoms to those within the
    /// cutoff of the slab plane.
    pub fn ensure_maps(&self, sf: &ScoringFunction, types: &[XsType]) {
        let missing = self.missing_types(types);
        if missing.is_empty() {
            return;
        }
        debug!("Populating {} grid map(s)", missing.len());

        let b = &self.search_box;
        let [nx, ny, nz] = b.num_grids;
        let slab_len = GridMap::slab_len(b.num_grids);

        // Per-pair base offsets into the scoring table, hoisted so the
        // node loop is a single offset lookup per atom and type.
        let slabs: Vec<Vec<Vec<f64>>> = (0..nz)
            .into_par_iter()
            .map(|z| {
                let z_coord = b.corner1.z + b.granularity * z as f64;
                let nearby: Vec<&Atom> = self
                    .atoms
                    .iter()
                    .filter(|a| (a.coordinate.z - z_coord).abs() <= CUTOFF)
                    .collect();
                let offsets: Vec<Vec<usize>> = missing
                    .iter()
                    .map(|&t| {
                        nearby
                            .iter()
                            .map(|a| ScoringFunction::offset(t, a.xs))
                            .collect()
                    })
                    .collect();

                let mut slab = vec![vec![0.0; slab_len]; missing.len()];
                for y in 0..ny {
                    let y_coord = b.corner1.y + b.granularity * y as f64;
                    for x in 0..nx {
                        let x_coord = b.corner1.x + b.granularity * x as f64;
                        let node = y * nx + x;
                        for (ai, a) in nearby.iter().enumerate() {
                            let dx = a.coordinate.x - x_coord;
                            let dy = a.coordinate.y - y_coord;
                            let dz = a.coordinate.z - z_coord;
                            let r2 = dx * dx + dy * dy + dz * dz;
                            if r2 < CUTOFF_SQR {
                                for (ti, s) in slab.iter_mut().enumerate() {
                                    s[node] += sf.energy_at(offsets[ti][ai], r2);
                                }
                            }
                        }
                    }
                }
                slab
            })
            .collect();

        for (ti, &t) in missing.iter().enumerate() {
            let mut data = Vec::with_capacity(b.num_nodes());
            for slab in &slabs {
                data.extend_from_slice(&slab[ti]);
            }
            let _ = self.maps[t.index()].set(GridMap::new(t, b.num_grids, data));
        }
    }
}
