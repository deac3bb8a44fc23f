use super::topology::Topology;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The label selecting which chemical variant is currently "real"
/// (e.g., a molecule encoding or a mutant name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityLabel(String);

impl IdentityLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityLabel {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SystemError {
    #[error("{kind} term references atom index {index}, out of range for {atom_count} atoms")]
    TermIndexOutOfRange {
        kind: &'static str,
        index: usize,
        atom_count: usize,
    },
}

/// A harmonic bond-stretch term: `0.5 * k * (r - r0)^2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondTerm {
    pub i: usize,
    pub j: usize,
    /// Force constant in kcal/(mol·Å²).
    pub force_constant: f64,
    /// Equilibrium bond length in Angstroms.
    pub equilibrium_length: f64,
}

/// A harmonic angle-bend term: `0.5 * k * (theta - theta0)^2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleTerm {
    pub i: usize,
    pub j: usize,
    pub k: usize,
    /// Force constant in kcal/(mol·rad²).
    pub force_constant: f64,
    /// Equilibrium angle in radians.
    pub equilibrium_angle: f64,
}

/// A periodic proper-torsion term: `V * (1 + cos(n*phi - phase))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorsionTerm {
    pub i: usize,
    pub j: usize,
    pub k: usize,
    pub l: usize,
    /// Barrier height in kcal/mol.
    pub barrier: f64,
    pub periodicity: i32,
    /// Phase offset in radians.
    pub phase: f64,
}

/// A fully parameterized system for one chemical identity: the topology plus
/// the force-field terms that act on it. Nonbonded parameters live on the
/// atoms themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalSystem {
    topology: Topology,
    bond_terms: Vec<BondTerm>,
    angle_terms: Vec<AngleTerm>,
    torsion_terms: Vec<TorsionTerm>,
    dielectric: f64,
}

impl ChemicalSystem {
    pub fn new(
        topology: Topology,
        bond_terms: Vec<BondTerm>,
        angle_terms: Vec<AngleTerm>,
        torsion_terms: Vec<TorsionTerm>,
        dielectric: f64,
    ) -> Result<Self, SystemError> {
        let n = topology.atom_count();
        let check = |kind: &'static str, index: usize| {
            if index >= n {
                Err(SystemError::TermIndexOutOfRange {
                    kind,
                    index,
                    atom_count: n,
                })
            } else {
                Ok(())
            }
        };
        for term in &bond_terms {
            check("bond", term.i)?;
            check("bond", term.j)?;
        }
        for term in &angle_terms {
            check("angle", term.i)?;
            check("angle", term.j)?;
            check("angle", term.k)?;
        }
        for term in &torsion_terms {
            check("torsion", term.i)?;
            check("torsion", term.j)?;
            check("torsion", term.k)?;
            check("torsion", term.l)?;
        }
        Ok(Self {
            topology,
            bond_terms,
            angle_terms,
            torsion_terms,
            dielectric,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn atom_count(&self) -> usize {
        self.topology.atom_count()
    }

    pub fn bond_terms(&self) -> &[BondTerm] {
        &self.bond_terms
    }

    pub fn angle_terms(&self) -> &[AngleTerm] {
        &self.angle_terms
    }

    pub fn torsion_terms(&self) -> &[TorsionTerm] {
        &self.torsion_terms
    }

    pub fn dielectric(&self) -> f64 {
        self.dielectric
    }

    /// The bond term acting between `a` and `b`, in either orientation.
    pub fn bond_term_between(&self, a: usize, b: usize) -> Option<&BondTerm> {
        self.bond_terms
            .iter()
            .find(|t| (t.i == a && t.j == b) || (t.i == b && t.j == a))
    }

    /// The angle term with central atom `center` spanning `a` and `b`.
    pub fn angle_term_for(&self, a: usize, center: usize, b: usize) -> Option<&AngleTerm> {
        self.angle_terms.iter().find(|t| {
            t.j == center && ((t.i == a && t.k == b) || (t.i == b && t.k == a))
        })
    }
}

/// The complete physical state carried by the driver between iterations:
/// the current identity, its parameterized system, Cartesian positions, and
/// the expanded-ensemble log-weight the identity was accepted with.
///
/// Never mutated in place: every accepted move constructs a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalState {
    pub identity: IdentityLabel,
    pub system: ChemicalSystem,
    pub positions: Vec<Point3<f64>>,
    pub log_weight: f64,
}

impl PhysicalState {
    pub fn new(
        identity: IdentityLabel,
        system: ChemicalSystem,
        positions: Vec<Point3<f64>>,
        log_weight: f64,
    ) -> Self {
        Self {
            identity,
            system,
            positions,
            log_weight,
        }
    }
}
