use super::potentials;
use crate::core::models::system::ChemicalSystem;
use crate::core::utils::geometry::{bend_angle, dihedral_angle};
use nalgebra::Point3;
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnergyError {
    #[error("Position array has {actual} entries but the system has {expected} atoms")]
    PositionCountMismatch { expected: usize, actual: usize },
}

/// The independently switchable interaction categories of an alchemical
/// transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionCategory {
    Bonds,
    Angles,
    Torsions,
    Sterics,
    Electrostatics,
}

impl InteractionCategory {
    pub const ALL: [InteractionCategory; 5] = [
        InteractionCategory::Bonds,
        InteractionCategory::Angles,
        InteractionCategory::Torsions,
        InteractionCategory::Sterics,
        InteractionCategory::Electrostatics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InteractionCategory::Bonds => "bonds",
            InteractionCategory::Angles => "angles",
            InteractionCategory::Torsions => "torsions",
            InteractionCategory::Sterics => "sterics",
            InteractionCategory::Electrostatics => "electrostatics",
        }
    }
}

impl FromStr for InteractionCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bonds" => Ok(InteractionCategory::Bonds),
            "angles" => Ok(InteractionCategory::Angles),
            "torsions" => Ok(InteractionCategory::Torsions),
            "sterics" => Ok(InteractionCategory::Sterics),
            "electrostatics" => Ok(InteractionCategory::Electrostatics),
            _ => Err(()),
        }
    }
}

/// Per-category scaling factors applied to interactions that touch the
/// alchemical atom set. The identity scaling leaves the system physical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryScaling {
    pub bonds: f64,
    pub angles: f64,
    pub torsions: f64,
    pub sterics: f64,
    pub electrostatics: f64,
}

impl CategoryScaling {
    pub fn identity() -> Self {
        Self {
            bonds: 1.0,
            angles: 1.0,
            torsions: 1.0,
            sterics: 1.0,
            electrostatics: 1.0,
        }
    }

    pub fn get(&self, category: InteractionCategory) -> f64 {
        match category {
            InteractionCategory::Bonds => self.bonds,
            InteractionCategory::Angles => self.angles,
            InteractionCategory::Torsions => self.torsions,
            InteractionCategory::Sterics => self.sterics,
            InteractionCategory::Electrostatics => self.electrostatics,
        }
    }

    pub fn is_identity(&self) -> bool {
        InteractionCategory::ALL
            .iter()
            .all(|&c| self.get(c) == 1.0)
    }
}

/// A potential energy broken down by term class, in kcal/mol.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyTerm {
    pub bond: f64,
    pub angle: f64,
    pub torsion: f64,
    pub vdw: f64,
    pub coulomb: f64,
}

impl EnergyTerm {
    #[inline]
    pub fn total(&self) -> f64 {
        self.bond + self.angle + self.torsion + self.vdw + self.coulomb
    }
}

/// The external-evaluator seam: anything that can return a potential energy
/// for a system at given positions with a per-category alchemical scaling.
///
/// Implementations must be deterministic for identical inputs and callable at
/// arbitrary intermediate scaling values.
pub trait PotentialEvaluator {
    fn potential(
        &self,
        system: &ChemicalSystem,
        positions: &[Point3<f64>],
        scaling: &CategoryScaling,
        alchemical_atoms: &HashSet<usize>,
    ) -> Result<f64, EnergyError>;
}

/// The built-in evaluator over a [`ChemicalSystem`]'s force-field terms.
///
/// A term or nonbonded pair is scaled by its category factor when any of its
/// atoms belongs to the alchemical set; all other interactions are evaluated
/// at full strength. Sterics that touch alchemical atoms use the soft-core
/// Lennard-Jones form so partially coupled atoms never produce a singularity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaledEnergyEvaluator;

impl ScaledEnergyEvaluator {
    pub fn evaluate_terms(
        &self,
        system: &ChemicalSystem,
        positions: &[Point3<f64>],
        scaling: &CategoryScaling,
        alchemical_atoms: &HashSet<usize>,
    ) -> Result<EnergyTerm, EnergyError> {
        let n = system.atom_count();
        if positions.len() != n {
            return Err(EnergyError::PositionCountMismatch {
                expected: n,
                actual: positions.len(),
            });
        }

        let touches = |indices: &[usize]| indices.iter().any(|i| alchemical_atoms.contains(i));
        let mut energy = EnergyTerm::default();

        for term in system.bond_terms() {
            let scale = if touches(&[term.i, term.j]) {
                scaling.bonds
            } else {
                1.0
            };
            let dist = (positions[term.i] - positions[term.j]).norm();
            energy.bond +=
                scale * potentials::harmonic(dist, term.force_constant, term.equilibrium_length);
        }

        for term in system.angle_terms() {
            let scale = if touches(&[term.i, term.j, term.k]) {
                scaling.angles
            } else {
                1.0
            };
            let theta = bend_angle(&positions[term.i], &positions[term.j], &positions[term.k]);
            energy.angle +=
                scale * potentials::harmonic(theta, term.force_constant, term.equilibrium_angle);
        }

        for term in system.torsion_terms() {
            let scale = if touches(&[term.i, term.j, term.k, term.l]) {
                scaling.torsions
            } else {
                1.0
            };
            let phi = dihedral_angle(
                &positions[term.i],
                &positions[term.j],
                &positions[term.k],
                &positions[term.l],
            );
            energy.torsion +=
                scale * potentials::periodic_torsion(phi, term.barrier, term.periodicity, term.phase);
        }

        let atoms = system.topology().atoms();
        let exclusions = system.topology().nonbonded_exclusions();
        for i in 0..n {
            for j in (i + 1)..n {
                if exclusions.contains(&(i, j)) {
                    continue;
                }
                let dist = (positions[i] - positions[j]).norm();
                let r_min = 0.5 * (atoms[i].lj_r_min + atoms[j].lj_r_min);
                let well_depth = (atoms[i].lj_well_depth * atoms[j].lj_well_depth).sqrt();
                let alchemical_pair = touches(&[i, j]);

                if alchemical_pair {
                    energy.vdw +=
                        potentials::soft_core_lennard_jones(dist, r_min, well_depth, scaling.sterics);
                } else {
                    energy.vdw += potentials::lennard_jones_12_6(dist, r_min, well_depth);
                }

                let coulomb_scale = if alchemical_pair {
                    scaling.electrostatics
                } else {
                    1.0
                };
                energy.coulomb += coulomb_scale
                    * potentials::coulomb(
                        dist,
                        atoms[i].partial_charge,
                        atoms[j].partial_charge,
                        system.dielectric(),
                    );
            }
        }

        Ok(energy)
    }
}

impl PotentialEvaluator for ScaledEnergyEvaluator {
    fn potential(
        &self,
        system: &ChemicalSystem,
        positions: &[Point3<f64>],
        scaling: &CategoryScaling,
        alchemical_atoms: &HashSet<usize>,
    ) -> Result<f64, EnergyError> {
        Ok(self
            .evaluate_terms(system, positions, scaling, alchemical_atoms)?
            .total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::{Atom, Element};
    use crate::core::models::system::BondTerm;
    use crate::core::models::topology::Topology;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn lj_atom(name: &str) -> Atom {
        let mut atom = Atom::new(name, Element::Carbon);
        atom.lj_r_min = 4.0;
        atom.lj_well_depth = 0.1;
        atom
    }

    fn three_bead_system() -> ChemicalSystem {
        // Linear chain: only the (0, 2) pair is nonbonded.
        let atoms = vec![lj_atom("C1"), lj_atom("C2"), lj_atom("C3")];
        let topology = Topology::new(atoms, vec![(0, 1), (1, 2)]).unwrap();
        let bonds = vec![
            BondTerm {
                i: 0,
                j: 1,
                force_constant: 300.0,
                equilibrium_length: 1.5,
            },
            BondTerm {
                i: 1,
                j: 2,
                force_constant: 300.0,
                equilibrium_length: 1.5,
            },
        ];
        ChemicalSystem::new(topology, bonds, vec![], vec![], 1.0).unwrap()
    }

    fn stretched_positions() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.6, 0.0, 0.0),
            Point3::new(3.2, 0.0, 0.0),
        ]
    }

    #[test]
    fn position_count_mismatch_is_reported() {
        let system = three_bead_system();
        let evaluator = ScaledEnergyEvaluator;
        let result = evaluator.evaluate_terms(
            &system,
            &[Point3::origin()],
            &CategoryScaling::identity(),
            &HashSet::new(),
        );
        assert_eq!(
            result.unwrap_err(),
            EnergyError::PositionCountMismatch {
                expected: 3,
                actual: 1
            }
        );
    }

    #[test]
    fn identity_scaling_with_alchemical_atoms_matches_physical_energy() {
        let system = three_bead_system();
        let positions = stretched_positions();
        let evaluator = ScaledEnergyEvaluator;
        let physical = evaluator
            .evaluate_terms(
                &system,
                &positions,
                &CategoryScaling::identity(),
                &HashSet::new(),
            )
            .unwrap();
        let alchemical = evaluator
            .evaluate_terms(
                &system,
                &positions,
                &CategoryScaling::identity(),
                &HashSet::from([2]),
            )
            .unwrap();
        assert!(f64_approx_equal(physical.total(), alchemical.total()));
    }

    #[test]
    fn zero_scaling_decouples_alchemical_atom_nonbonded_terms() {
        let system = three_bead_system();
        let positions = stretched_positions();
        let evaluator = ScaledEnergyEvaluator;
        let mut scaling = CategoryScaling::identity();
        scaling.sterics = 0.0;
        scaling.electrostatics = 0.0;
        let energy = evaluator
            .evaluate_terms(&system, &positions, &scaling, &HashSet::from([2]))
            .unwrap();
        // The only nonbonded pair (0, 2) touches atom 2 and is switched off.
        assert!(f64_approx_equal(energy.vdw, 0.0));
        assert!(f64_approx_equal(energy.coulomb, 0.0));
        // Bonds are untouched by the sterics scaling.
        assert!(energy.bond > 0.0);
    }

    #[test]
    fn bond_scaling_only_affects_terms_touching_alchemical_atoms() {
        let system = three_bead_system();
        let positions = stretched_positions();
        let evaluator = ScaledEnergyEvaluator;
        let mut scaling = CategoryScaling::identity();
        scaling.bonds = 0.0;
        let energy = evaluator
            .evaluate_terms(&system, &positions, &scaling, &HashSet::from([2]))
            .unwrap();
        // Bond (0, 1) stays physical; bond (1, 2) is scaled away.
        let single_bond = potentials::harmonic(1.6, 300.0, 1.5);
        assert!(f64_approx_equal(energy.bond, single_bond));
    }

    #[test]
    fn scaling_is_identity_predicate_works() {
        assert!(CategoryScaling::identity().is_identity());
        let mut scaling = CategoryScaling::identity();
        scaling.sterics = 0.5;
        assert!(!scaling.is_identity());
    }

    #[test]
    fn category_parsing_round_trips_names() {
        for category in InteractionCategory::ALL {
            assert_eq!(
                InteractionCategory::from_str(category.name()),
                Ok(category)
            );
        }
        assert!(InteractionCategory::from_str("hbond").is_err());
    }
}
