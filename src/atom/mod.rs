//! Atom representation and the AutoDock / XScore atom type tables

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Number of XScore atom types. Grid maps and the scoring-function table are
/// indexed by these types.
pub const NUM_XS_TYPES: usize = 15;

/// AutoDock atom types assigned by ligand preparation tools, parsed from
/// columns 78-79 of a PDBQT atom record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdType {
    Hydrogen,         // H
    PolarHydrogen,    // HD
    Carbon,           // C
    AromaticCarbon,   // A
    Nitrogen,         // N
    NitrogenAcceptor, // NA
    OxygenAcceptor,   // OA
    Sulfur,           // S
    SulfurAcceptor,   // SA
    Selenium,         // Se
    Phosphorus,       // P
    Fluorine,         // F
    Chlorine,         // Cl
    Bromine,          // Br
    Iodine,           // I
    Zinc,             // Zn
    Iron,             // Fe
    Magnesium,        // Mg
    Calcium,          // Ca
    Manganese,        // Mn
}

impl AdType {
    /// Parse an AutoDock type from its PDBQT string representation.
    /// Returns `None` for types not supported by the screening engine.
    pub fn from_pdbqt_string(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "H" => Some(AdType::Hydrogen),
            "HD" => Some(AdType::PolarHydrogen),
            "C" => Some(AdType::Carbon),
            "A" => Some(AdType::AromaticCarbon),
            "N" => Some(AdType::Nitrogen),
            "NA" => Some(AdType::NitrogenAcceptor),
            "OA" => Some(AdType::OxygenAcceptor),
            "S" => Some(AdType::Sulfur),
            "SA" => Some(AdType::SulfurAcceptor),
            "SE" => Some(AdType::Selenium),
            "P" => Some(AdType::Phosphorus),
            "F" => Some(AdType::Fluorine),
            "CL" => Some(AdType::Chlorine),
            "BR" => Some(AdType::Bromine),
            "I" => Some(AdType::Iodine),
            "ZN" => Some(AdType::Zinc),
            "FE" => Some(AdType::Iron),
            "MG" => Some(AdType::Magnesium),
            "CA" => Some(AdType::Calcium),
            "MN" => Some(AdType::Manganese),
            _ => None,
        }
    }

    /// Returns true for the two hydrogen types.
    pub fn is_hydrogen(self) -> bool {
        matches!(self, AdType::Hydrogen | AdType::PolarHydrogen)
    }

    /// Covalent radius of the underlying element in Angstroms.
    pub fn covalent_radius(self) -> f64 {
        match self {
            AdType::Hydrogen | AdType::PolarHydrogen => 0.37,
            AdType::Carbon | AdType::AromaticCarbon => 0.77,
            AdType::Nitrogen | AdType::NitrogenAcceptor => 0.75,
            AdType::OxygenAcceptor => 0.73,
            AdType::Sulfur | AdType::SulfurAcceptor => 1.02,
            AdType::Selenium => 1.16,
            AdType::Phosphorus => 1.06,
            AdType::Fluorine => 0.71,
            AdType::Chlorine => 0.99,
            AdType::Bromine => 1.14,
            AdType::Iodine => 1.33,
            AdType::Zinc => 1.31,
            AdType::Iron => 1.25,
            AdType::Magnesium => 1.30,
            AdType::Calcium => 1.74,
            AdType::Manganese => 1.39,
        }
    }

    /// The XScore type initially assigned to a heavy atom of this AutoDock
    /// type, before donor marking and dehydrophobicization. `None` for
    /// hydrogens, which carry no XScore type.
    pub fn xs(self) -> Option<XsType> {
        match self {
            AdType::Hydrogen | AdType::PolarHydrogen => None,
            AdType::Carbon | AdType::AromaticCarbon => Some(XsType::CarbonHydrophobic),
            AdType::Nitrogen => Some(XsType::NitrogenPolar),
            AdType::NitrogenAcceptor => Some(XsType::NitrogenAcceptor),
            AdType::OxygenAcceptor => Some(XsType::OxygenAcceptor),
            AdType::Sulfur | AdType::SulfurAcceptor | AdType::Selenium => Some(XsType::Sulfur),
            AdType::Phosphorus => Some(XsType::Phosphorus),
            AdType::Fluorine => Some(XsType::Fluorine),
            AdType::Chlorine => Some(XsType::Chlorine),
            AdType::Bromine => Some(XsType::Bromine),
            AdType::Iodine => Some(XsType::Iodine),
            AdType::Zinc | AdType::Iron | AdType::Magnesium | AdType::Calcium | AdType::Manganese => {
                Some(XsType::MetalDonor)
            }
        }
    }
}

/// XScore atom types used by the scoring function and the grid maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XsType {
    CarbonHydrophobic,     // C_H
    CarbonPolar,           // C_P
    NitrogenPolar,         // N_P
    NitrogenDonor,         // N_D
    NitrogenAcceptor,      // N_A
    NitrogenDonorAcceptor, // N_DA
    OxygenAcceptor,        // O_A
    OxygenDonorAcceptor,   // O_DA
    Sulfur,                // S_P
    Phosphorus,            // P_P
    Fluorine,              // F_H
    Chlorine,              // Cl_H
    Bromine,               // Br_H
    Iodine,                // I_H
    MetalDonor,            // Met_D
}

impl XsType {
    /// Index into grid maps and the scoring-function type-pair table.
    pub fn index(self) -> usize {
        self as usize
    }

    /// All XScore types in index order.
    pub fn all() -> [XsType; NUM_XS_TYPES] {
        [
            XsType::CarbonHydrophobic,
            XsType::CarbonPolar,
            XsType::NitrogenPolar,
            XsType::NitrogenDonor,
            XsType::NitrogenAcceptor,
            XsType::NitrogenDonorAcceptor,
            XsType::OxygenAcceptor,
            XsType::OxygenDonorAcceptor,
            XsType::Sulfur,
            XsType::Phosphorus,
            XsType::Fluorine,
            XsType::Chlorine,
            XsType::Bromine,
            XsType::Iodine,
            XsType::MetalDonor,
        ]
    }

    /// XScore van der Waals radius in Angstroms.
    pub fn radius(self) -> f64 {
        match self {
            XsType::CarbonHydrophobic | XsType::CarbonPolar => 1.9,
            XsType::NitrogenPolar
            | XsType::NitrogenDonor
            | XsType::NitrogenAcceptor
            | XsType::NitrogenDonorAcceptor => 1.8,
            XsType::OxygenAcceptor | XsType::OxygenDonorAcceptor => 1.7,
            XsType::Sulfur => 2.0,
            XsType::Phosphorus => 2.1,
            XsType::Fluorine => 1.5,
            XsType::Chlorine => 1.8,
            XsType::Bromine => 2.0,
            XsType::Iodine => 2.2,
            XsType::MetalDonor => 1.2,
        }
    }

    /// Hydrophobic types contribute to the hydrophobic term.
    pub fn is_hydrophobic(self) -> bool {
        matches!(
            self,
            XsType::CarbonHydrophobic
                | XsType::Fluorine
                | XsType::Chlorine
                | XsType::Bromine
                | XsType::Iodine
        )
    }

    /// Hydrogen bond donors.
    pub fn is_donor(self) -> bool {
        matches!(
            self,
            XsType::NitrogenDonor
                | XsType::NitrogenDonorAcceptor
                | XsType::OxygenDonorAcceptor
                | XsType::MetalDonor
        )
    }

    /// Hydrogen bond acceptors.
    pub fn is_acceptor(self) -> bool {
        matches!(
            self,
            XsType::NitrogenAcceptor
                | XsType::NitrogenDonorAcceptor
                | XsType::OxygenAcceptor
                | XsType::OxygenDonorAcceptor
        )
    }
}

/// Returns true if one type is a donor and the other an acceptor.
pub fn is_hbond_pair(t1: XsType, t2: XsType) -> bool {
    (t1.is_donor() && t2.is_acceptor()) || (t1.is_acceptor() && t2.is_donor())
}

/// A heavy atom with its position and type assignment.
///
/// Hydrogens are not stored as `Atom`s; frames keep only their coordinates
/// since hydrogens carry no XScore type and do not score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    /// Serial number from the PDBQT record, used to resolve BRANCH records.
    pub serial: usize,

    /// Cartesian coordinate in Angstroms. For ligand atoms this becomes
    /// relative to the owning frame's origin after assembly.
    pub coordinate: Vector3<f64>,

    /// AutoDock type as parsed.
    pub ad: AdType,

    /// Derived XScore type; mutated by donor marking and
    /// dehydrophobicization during assembly.
    pub xs: XsType,
}

impl Atom {
    /// Create a heavy atom. `ad` must not be a hydrogen type.
    pub fn new(serial: usize, coordinate: Vector3<f64>, ad: AdType, xs: XsType) -> Self {
        Self {
            serial,
            coordinate,
            ad,
            xs,
        }
    }

    /// Heteroatoms are anything but carbon.
    pub fn is_hetero(&self) -> bool {
        !matches!(self.ad, AdType::Carbon | AdType::AromaticCarbon)
    }

    /// Two atoms are covalently bonded iff their distance is within 1.1
    /// times the sum of their covalent radii.
    pub fn is_neighbor(&self, other: &Atom) -> bool {
        self.is_neighbor_at(&other.coordinate, other.ad)
    }

    /// Neighbor test against a bare coordinate/type pair, used for
    /// hydrogens which are not stored as atoms.
    pub fn is_neighbor_at(&self, coordinate: &Vector3<f64>, ad: AdType) -> bool {
        let s = 1.1 * (self.ad.covalent_radius() + ad.covalent_radius());
        (self.coordinate - coordinate).norm_squared() <= s * s
    }

    /// Mark this atom as a hydrogen bond donor.
    pub fn donorize(&mut self) {
        self.xs = match self.xs {
            XsType::NitrogenPolar => XsType::NitrogenDonor,
            XsType::NitrogenAcceptor => XsType::NitrogenDonorAcceptor,
            XsType::OxygenAcceptor => XsType::OxygenDonorAcceptor,
            other => other,
        };
    }

    /// Demote a hydrophobic carbon bonded to a heteroatom to polar carbon.
    pub fn dehydrophobicize(&mut self) {
        if self.xs == XsType::CarbonHydrophobic {
            self.xs = XsType::CarbonPolar;
        }
    }
}
