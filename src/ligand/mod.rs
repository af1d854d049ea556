//! Ligand model: a tree of rigid frames joined by rotatable bonds
//!
//! A PDBQT ligand is parsed into ROOT and BRANCH frames. Atom coordinates
//! are stored relative to each frame's origin (its first heavy atom, the
//! rotor-Y of the incoming rotatable bond), so expanding a conformation to
//! Cartesian coordinates is a single walk down the tree.

pub mod conformation;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nalgebra::{Rotation3, Unit, UnitQuaternion, Vector3};

use crate::atom::{Atom, XsType};
use crate::io::{self, IoError};
use crate::math;
use crate::optimization::DockingResult;
use crate::receptor::Receptor;
use crate::scoring::{triangular_index_permissive, ScoringFunction, CUTOFF_SQR};
use conformation::{Change, Conformation};

/// One rigid fragment of the ligand.
///
/// The per-evaluation buffers are parallel arrays over the frame's heavy
/// atoms; the evaluator streams over them, so they stay flat.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Index of the parent frame; the ROOT frame points to itself.
    pub parent: usize,

    /// Serial number of the parent-frame atom of the rotatable bond.
    pub rotor_x_serial: usize,

    /// Serial number of this frame's origin atom.
    pub rotor_y_serial: usize,

    /// Index of the rotor-X atom inside the parent frame.
    pub rotor_x_idx: usize,

    /// False iff rotating this frame changes nothing observable.
    pub active: bool,

    /// Heavy atoms; coordinates are relative to the frame origin after
    /// assembly, so the first atom sits at (0, 0, 0).
    pub heavy_atoms: Vec<Atom>,

    /// Hydrogen coordinates relative to the frame origin.
    pub hydrogens: Vec<Vector3<f64>>,

    /// Vector from the parent's origin to this origin in the input pose.
    pub relative_origin: Vector3<f64>,

    /// Unit vector from the parent's rotor-X atom to this origin in the
    /// input pose.
    pub relative_axis: Vector3<f64>,

    // Scratch state written by evaluate().
    coordinates: Vec<Vector3<f64>>,
    derivatives: Vec<Vector3<f64>>,
    energies: Vec<f64>,
    orientation_q: UnitQuaternion<f64>,
    orientation_m: Rotation3<f64>,
    axis: Vector3<f64>,
    force: Vector3<f64>,
    torque: Vector3<f64>,
}

impl Frame {
    fn new(parent: usize, rotor_x_serial: usize, rotor_y_serial: usize, rotor_x_idx: usize) -> Self {
        Self {
            parent,
            rotor_x_serial,
            rotor_y_serial,
            rotor_x_idx,
            active: true,
            heavy_atoms: Vec::new(),
            hydrogens: Vec::new(),
            relative_origin: Vector3::zeros(),
            relative_axis: Vector3::zeros(),
            coordinates: Vec::new(),
            derivatives: Vec::new(),
            energies: Vec::new(),
            orientation_q: UnitQuaternion::identity(),
            orientation_m: Rotation3::identity(),
            axis: Vector3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    /// World coordinates of the heavy atoms after the latest evaluation.
    pub fn coordinates(&self) -> &[Vector3<f64>] {
        &self.coordinates
    }

    /// Per-atom grid energies from the latest evaluation.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }
}

/// A pair of heavy atoms in different frames separated by more than three
/// covalent bonds, contributing intra-ligand non-bonded energy.
#[derive(Debug, Clone, Copy)]
struct OneToFourPair {
    k1: usize,
    i1: usize,
    k2: usize,
    i2: usize,
    type_pair_index: usize,
}

/// A flexible ligand ready for docking.
#[derive(Debug, Clone)]
pub struct Ligand {
    /// Input PDBQT lines that survive into the output models.
    pub lines: Vec<String>,

    /// ROOT and BRANCH frames in topological order.
    pub frames: Vec<Frame>,

    pub num_frames: usize,
    pub num_torsions: usize,
    pub num_active_torsions: usize,
    pub num_heavy_atoms: usize,

    /// Origin of the ROOT frame in the input pose.
    pub reference_origin: Vector3<f64>,

    /// Down-weights the raw free energy in proportion to flexibility.
    pub flexibility_penalty_factor: f64,

    /// Reject poses with cross-frame steric clashes. Off by default; the
    /// repulsion term already penalizes overlap.
    pub steric_clash_check: bool,

    one_to_four_pairs: Vec<OneToFourPair>,
}

impl Ligand {
    /// Parse a ligand PDBQT file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// Parse a ligand from in-memory PDBQT text.
    pub fn from_pdbqt_str(s: &str) -> Result<Self, IoError> {
        Self::from_reader(s.as_bytes())
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, IoError> {
        let mut lines: Vec<String> = Vec::with_capacity(200);
        let mut frames = vec![Frame::new(0, 0, 0, 0)];
        let mut current = 0usize;
        let mut num_heavy_atoms = 0usize;
        let mut num_active_torsions = 0usize;

        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = line_number + 1;

            if line.starts_with("ATOM") || line.starts_with("HETATM") {
                lines.push(line.clone());
                let record = io::parse_atom_record(&line, line_number)?;
                let frame = &mut frames[current];
                if record.ad.is_hydrogen() {
                    // A polar hydrogen turns its bonded heteroatom into a
                    // hydrogen bond donor; scan backwards so the most
                    // recently parsed candidate wins.
                    if record.ad == crate::atom::AdType::PolarHydrogen {
                        for atom in frame.heavy_atoms.iter_mut().rev() {
                            if atom.is_hetero()
                                && atom.is_neighbor_at(&record.coordinate, record.ad)
                            {
                                atom.donorize();
                                break;
                            }
                        }
                    }
                    frame.hydrogens.push(record.coordinate);
                } else {
                    let xs = record.ad.xs().expect("heavy atom has an XScore type");
                    frame
                        .heavy_atoms
                        .push(Atom::new(record.serial, record.coordinate, record.ad, xs));
                    num_heavy_atoms += 1;
                }
            } else if line.starts_with("BRANCH") {
                lines.push(line.clone());
                let mut parts = line.split_whitespace().skip(1);
                let (x, y) = match (
                    parts.next().and_then(|s| s.parse::<usize>().ok()),
                    parts.next().and_then(|s| s.parse::<usize>().ok()),
                ) {
                    (Some(x), Some(y)) => (x, y),
                    _ => {
                        return Err(IoError::Parse {
                            line: line_number,
                            message: format!("invalid BRANCH record '{}'", line.trim_end()),
                        })
                    }
                };
                let rotor_x_idx = frames[current]
                    .heavy_atoms
                    .iter()
                    .position(|a| a.serial == x)
                    .ok_or_else(|| IoError::Parse {
                        line: line_number,
                        message: format!("BRANCH atom {} not found in the current frame", x),
                    })?;
                frames.push(Frame::new(current, x, y, rotor_x_idx));
                current = frames.len() - 1;
            } else if line.starts_with("ENDBRANCH") {
                lines.push(line.clone());
                let frame = &frames[current];
                if frame.heavy_atoms.is_empty() {
                    return Err(IoError::Parse {
                        line: line_number,
                        message: "an empty BRANCH indicates an invalid ligand structure"
                            .to_string(),
                    });
                }
                let rotor_x = frames[frame.parent].heavy_atoms[frame.rotor_x_idx].coordinate;
                let axis = frame.heavy_atoms[0].coordinate - rotor_x;
                if axis.norm_squared() < 1e-12 {
                    return Err(IoError::Parse {
                        line: line_number,
                        message: "degenerate rotatable bond of zero length".to_string(),
                    });
                }
                // A childless frame of one heavy atom (say -OH or -NH2)
                // contributes no observable torsion.
                if current == frames.len() - 1 && frames[current].heavy_atoms.len() == 1 {
                    frames[current].active = false;
                } else {
                    num_active_torsions += 1;
                }
                current = frames[current].parent;
            } else if line.starts_with("ROOT")
                || line.starts_with("ENDROOT")
                || line.starts_with("TORSDOF")
            {
                lines.push(line);
            }
        }

        if current != 0 {
            return Err(IoError::Parse {
                line: lines.len(),
                message: "unmatched BRANCH record".to_string(),
            });
        }
        if frames[0].heavy_atoms.is_empty() {
            return Err(IoError::Parse {
                line: lines.len(),
                message: "ligand has no heavy atoms in its ROOT frame".to_string(),
            });
        }

        let mut lig = Self {
            lines,
            num_frames: frames.len(),
            num_torsions: frames.len() - 1,
            num_active_torsions,
            num_heavy_atoms,
            reference_origin: frames[0].heavy_atoms[0].coordinate,
            flexibility_penalty_factor: flexibility_penalty_factor(
                num_active_torsions,
                frames.len() - 1,
            ),
            steric_clash_check: false,
            one_to_four_pairs: Vec::new(),
            frames,
        };
        lig.assemble();
        Ok(lig)
    }

    /// Post-parse assembly: finalize XScore types, derive the frame
    /// kinematics, enumerate 1-4 pairs, and make coordinates
    /// frame-relative.
    fn assemble(&mut self) {
        let num_frames = self.num_frames;

        // Carbons bonded to a heteroatom within the same frame lose their
        // hydrophobic character.
        for k in 0..num_frames {
            let f = &mut self.frames[k];
            let n = f.heavy_atoms.len();
            for i in 0..n {
                if !f.heavy_atoms[i].is_hetero() {
                    continue;
                }
                for j in 0..n {
                    if f.heavy_atoms[j].is_hetero() {
                        continue;
                    }
                    if f.heavy_atoms[i].is_neighbor(&f.heavy_atoms[j]) {
                        f.heavy_atoms[j].dehydrophobicize();
                    }
                }
            }
        }

        // The same applies across each rotatable bond.
        for k in 1..num_frames {
            let parent = self.frames[k].parent;
            let rotor_x_idx = self.frames[k].rotor_x_idx;
            let rotor_y_hetero = self.frames[k].heavy_atoms[0].is_hetero();
            let rotor_x_hetero = self.frames[parent].heavy_atoms[rotor_x_idx].is_hetero();
            if rotor_y_hetero && !rotor_x_hetero {
                self.frames[parent].heavy_atoms[rotor_x_idx].dehydrophobicize();
            }
            if rotor_x_hetero && !rotor_y_hetero {
                self.frames[k].heavy_atoms[0].dehydrophobicize();
            }
        }

        // Relative origin and rotation axis of every BRANCH frame in the
        // input pose.
        for k in 1..num_frames {
            let parent = self.frames[k].parent;
            let origin = self.frames[k].heavy_atoms[0].coordinate;
            let parent_origin = self.frames[parent].heavy_atoms[0].coordinate;
            let rotor_x = self.frames[parent].heavy_atoms[self.frames[k].rotor_x_idx].coordinate;
            self.frames[k].relative_origin = origin - parent_origin;
            self.frames[k].relative_axis = (origin - rotor_x).normalize();
        }

        // Bond graph over heavy atoms: bonds within each frame plus the
        // rotor-X to rotor-Y bond across each frame boundary.
        let mut bonds: Vec<Vec<Vec<(usize, usize)>>> = self
            .frames
            .iter()
            .map(|f| vec![Vec::with_capacity(4); f.heavy_atoms.len()])
            .collect();
        for k in 0..num_frames {
            let f = &self.frames[k];
            let n = f.heavy_atoms.len();
            for i in 0..n {
                for j in (i + 1)..n {
                    if f.heavy_atoms[i].is_neighbor(&f.heavy_atoms[j]) {
                        bonds[k][i].push((k, j));
                        bonds[k][j].push((k, i));
                    }
                }
            }
            if k > 0 {
                let parent = f.parent;
                let rotor_x_idx = f.rotor_x_idx;
                bonds[k][0].push((parent, rotor_x_idx));
                bonds[parent][rotor_x_idx].push((k, 0));
            }
        }

        // 1-4 pairs: cross-frame heavy atom pairs not within three
        // consecutive covalent bonds and not across the rotor bond itself.
        let mut pairs = Vec::new();
        let mut neighbors: Vec<(usize, usize)> = Vec::with_capacity(10);
        for k1 in 0..num_frames {
            for i in 0..self.frames[k1].heavy_atoms.len() {
                for &b1 in &bonds[k1][i] {
                    if !neighbors.contains(&b1) {
                        neighbors.push(b1);
                    }
                    for &b2 in &bonds[b1.0][b1.1] {
                        if !neighbors.contains(&b2) {
                            neighbors.push(b2);
                        }
                        for &b3 in &bonds[b2.0][b2.1] {
                            if !neighbors.contains(&b3) {
                                neighbors.push(b3);
                            }
                        }
                    }
                }

                for k2 in (k1 + 1)..num_frames {
                    let f2 = &self.frames[k2];
                    for j in 0..f2.heavy_atoms.len() {
                        if (k1 == f2.parent && (j == 0 || i == f2.rotor_x_idx))
                            || neighbors.contains(&(k2, j))
                        {
                            continue;
                        }
                        let t1 = self.frames[k1].heavy_atoms[i].xs;
                        let t2 = f2.heavy_atoms[j].xs;
                        pairs.push(OneToFourPair {
                            k1,
                            i1: i,
                            k2,
                            i2: j,
                            type_pair_index: triangular_index_permissive(t1.index(), t2.index()),
                        });
                    }
                }

                neighbors.clear();
            }
        }
        self.one_to_four_pairs = pairs;

        // Make every coordinate relative to its frame origin and size the
        // evaluation buffers.
        for f in &mut self.frames {
            let origin = f.heavy_atoms[0].coordinate;
            for a in &mut f.heavy_atoms {
                a.coordinate -= origin;
            }
            for h in &mut f.hydrogens {
                *h -= origin;
            }
            let n = f.heavy_atoms.len();
            f.coordinates = vec![Vector3::zeros(); n];
            f.derivatives = vec![Vector3::zeros(); n];
            f.energies = vec![0.0; n];
        }
    }

    /// The distinct XScore types among the ligand's heavy atoms.
    pub fn atom_types(&self) -> Vec<XsType> {
        let mut types: Vec<XsType> = Vec::with_capacity(10);
        for f in &self.frames {
            for a in &f.heavy_atoms {
                if !types.contains(&a.xs) {
                    types.push(a.xs);
                }
            }
        }
        types
    }

    /// The input pose as a conformation: the reference origin, identity
    /// orientation, and zero torsions.
    pub fn reference_conformation(&self) -> Conformation {
        Conformation::new(self.reference_origin, self.num_active_torsions)
    }

    /// Expand a conformation to Cartesian coordinates, score it against the
    /// grid maps and the intra-ligand pairs, and assemble the gradient.
    ///
    /// Returns `None` when any heavy atom leaves the box, when the energy
    /// is not below `e_upper_bound`, or when it is not finite. The returned
    /// energy is pre-penalty; the driver applies the flexibility penalty
    /// factor when ranking final poses.
    pub fn evaluate(
        &mut self,
        conf: &Conformation,
        sf: &ScoringFunction,
        rec: &Receptor,
        e_upper_bound: f64,
    ) -> Option<(f64, f64, Change)> {
        debug_assert_eq!(conf.torsions.len(), self.num_active_torsions);
        let b = &rec.search_box;
        if !b.within(&conf.position) {
            return None;
        }

        // Place the ROOT frame.
        {
            let root = &mut self.frames[0];
            root.coordinates[0] = conf.position;
            root.orientation_q = conf.orientation;
            root.orientation_m = conf.orientation.to_rotation_matrix();
            for i in 1..root.heavy_atoms.len() {
                root.coordinates[i] =
                    conf.position + root.orientation_m * root.heavy_atoms[i].coordinate;
                if !b.within(&root.coordinates[i]) {
                    return None;
                }
            }
        }

        // Walk the BRANCH frames; parents are placed before their children.
        let mut t = 0;
        for k in 1..self.num_frames {
            let parent = self.frames[k].parent;
            let relative_origin = self.frames[k].relative_origin;
            let relative_axis = self.frames[k].relative_axis;
            let (parent_origin, parent_q, parent_m) = {
                let pf = &self.frames[parent];
                (pf.coordinates[0], pf.orientation_q, pf.orientation_m)
            };

            let origin = parent_origin + parent_m * relative_origin;
            if !b.within(&origin) {
                return None;
            }

            let f = &mut self.frames[k];
            f.coordinates[0] = origin;
            if f.active {
                f.axis = parent_m * relative_axis;
                let rotation = UnitQuaternion::from_axis_angle(
                    &Unit::new_unchecked(f.axis),
                    conf.torsions[t],
                );
                t += 1;
                f.orientation_q = math::renormalize(rotation * parent_q);
                f.orientation_m = f.orientation_q.to_rotation_matrix();
            } else {
                f.orientation_q = parent_q;
                f.orientation_m = parent_m;
            }
            for i in 1..f.heavy_atoms.len() {
                f.coordinates[i] = origin + f.orientation_m * f.heavy_atoms[i].coordinate;
                if !b.within(&f.coordinates[i]) {
                    return None;
                }
            }
        }

        // Optional rejection of cross-frame steric clashes, excluding the
        // rotor-X/rotor-Y pair itself.
        if self.steric_clash_check && !self.passes_steric_check() {
            return None;
        }

        // Per-atom grid energy and forward-difference gradient.
        let mut e = 0.0;
        for k in 0..self.num_frames {
            let f = &mut self.frames[k];
            for i in 0..f.heavy_atoms.len() {
                let map = rec
                    .map(f.heavy_atoms[i].xs)
                    .expect("grid map not populated for a ligand atom type");
                let [x0, y0, z0] = b.grid_index(&f.coordinates[i]);
                let e000 = map.at(x0, y0, z0);
                let e100 = map.at_clamped(x0 + 1, y0, z0);
                let e010 = map.at_clamped(x0, y0 + 1, z0);
                let e001 = map.at_clamped(x0, y0, z0 + 1);
                f.energies[i] = e000;
                f.derivatives[i] =
                    Vector3::new(e100 - e000, e010 - e000, e001 - e000) * b.granularity_inverse();
                e += e000;
            }
        }
        let f_inter = e;

        // Intra-ligand non-bonded energy over the 1-4 pairs.
        for pi in 0..self.one_to_four_pairs.len() {
            let p = self.one_to_four_pairs[pi];
            let delta = self.frames[p.k2].coordinates[p.i2] - self.frames[p.k1].coordinates[p.i1];
            let r2 = delta.norm_squared();
            if r2 < CUTOFF_SQR {
                let element = sf.evaluate(p.type_pair_index, r2);
                e += element.e;
                let derivative = element.dor * delta;
                self.frames[p.k1].derivatives[p.i1] -= derivative;
                self.frames[p.k2].derivatives[p.i2] += derivative;
            }
        }

        // Refuse the pose when no better than the bound; a non-finite
        // energy fails this comparison too.
        if !(e < e_upper_bound) {
            return None;
        }

        // Initialize force and torque. The origin's derivative contributes
        // only to force; its torque arm is zero.
        for f in &mut self.frames {
            f.force = f.derivatives[0];
            f.torque = Vector3::zeros();
        }

        // Aggregate force and torque bottom-up into the parent frames,
        // projecting each active frame's torque onto its rotation axis.
        let mut g = Change::zero(self.num_active_torsions);
        let mut t = self.num_active_torsions;
        for k in (1..self.num_frames).rev() {
            let (force, torque, origin, parent, active, axis) = {
                let f = &mut self.frames[k];
                let origin = f.coordinates[0];
                for i in 1..f.heavy_atoms.len() {
                    let d = f.derivatives[i];
                    f.force += d;
                    f.torque += (f.coordinates[i] - origin).cross(&d);
                }
                (f.force, f.torque, origin, f.parent, f.active, f.axis)
            };
            let pf = &mut self.frames[parent];
            pf.force += force;
            pf.torque += torque + (origin - pf.coordinates[0]).cross(&force);
            if active {
                t -= 1;
                g.torsions[t] = torque.dot(&axis);
            }
        }

        {
            let root = &mut self.frames[0];
            let origin = root.coordinates[0];
            for i in 1..root.heavy_atoms.len() {
                let d = root.derivatives[i];
                root.force += d;
                root.torque += (root.coordinates[i] - origin).cross(&d);
            }
            g.position = root.force;
            g.orientation = root.torque;
        }

        Some((e, f_inter, g))
    }

    fn passes_steric_check(&self) -> bool {
        for k1 in (1..self.num_frames).rev() {
            let f1 = &self.frames[k1];
            for i1 in 0..f1.heavy_atoms.len() {
                for k2 in 0..k1 {
                    let f2 = &self.frames[k2];
                    for i2 in 0..f2.heavy_atoms.len() {
                        if k2 == f1.parent && i1 == 0 && i2 == f1.rotor_x_idx {
                            continue;
                        }
                        let s = f1.heavy_atoms[i1].ad.covalent_radius()
                            + f2.heavy_atoms[i2].ad.covalent_radius();
                        if (f1.coordinates[i1] - f2.coordinates[i2]).norm_squared() < s * s {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Expand a conformation into world coordinates of every atom,
    /// hydrogens included, for clustering and output.
    pub fn compose_result(&self, e: f64, f_inter: f64, conf: &Conformation) -> DockingResult {
        let mut orientations_q = vec![UnitQuaternion::identity(); self.num_frames];
        let mut orientations_m = vec![Rotation3::identity(); self.num_frames];
        let mut heavy_atoms: Vec<Vec<Vector3<f64>>> = Vec::with_capacity(self.num_frames);
        let mut hydrogens: Vec<Vec<Vector3<f64>>> = Vec::with_capacity(self.num_frames);

        let root = &self.frames[0];
        orientations_q[0] = conf.orientation;
        orientations_m[0] = conf.orientation.to_rotation_matrix();
        heavy_atoms.push(
            root.heavy_atoms
                .iter()
                .map(|a| conf.position + orientations_m[0] * a.coordinate)
                .collect(),
        );
        hydrogens.push(
            root.hydrogens
                .iter()
                .map(|h| conf.position + orientations_m[0] * *h)
                .collect(),
        );

        let mut t = 0;
        for k in 1..self.num_frames {
            let f = &self.frames[k];
            let parent = f.parent;
            let origin = heavy_atoms[parent][0] + orientations_m[parent] * f.relative_origin;

            let angle = if f.active {
                let angle = conf.torsions[t];
                t += 1;
                angle
            } else {
                0.0
            };
            let axis = orientations_m[parent] * f.relative_axis;
            orientations_q[k] = math::renormalize(
                UnitQuaternion::from_axis_angle(&Unit::new_unchecked(axis), angle)
                    * orientations_q[parent],
            );
            orientations_m[k] = orientations_q[k].to_rotation_matrix();

            heavy_atoms.push(
                f.heavy_atoms
                    .iter()
                    .map(|a| origin + orientations_m[k] * a.coordinate)
                    .collect(),
            );
            hydrogens.push(
                f.hydrogens
                    .iter()
                    .map(|h| origin + orientations_m[k] * *h)
                    .collect(),
            );
        }

        DockingResult {
            e,
            f_inter,
            heavy_atoms,
            hydrogens,
        }
    }
}

/// The multiplicative flexibility penalty: fully counted active torsions,
/// half-counted inactive ones.
fn flexibility_penalty_factor(num_active_torsions: usize, num_torsions: usize) -> f64 {
    1.0 / (1.0
        + 0.05846
            * (num_active_torsions as f64 + 0.5 * (num_torsions - num_active_torsions) as f64))
}
