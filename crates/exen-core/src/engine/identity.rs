use super::error::EngineError;
use crate::core::models::atom::{Atom, Element};
use crate::core::models::system::{
    AngleTerm, BondTerm, ChemicalSystem, IdentityLabel, TorsionTerm,
};
use crate::core::models::topology::Topology;
use crate::core::utils::geometry::{InternalCoordinate, position_from_internal};
use nalgebra::Point3;

/// The topology/molecule provider collaborator: realizes a discrete identity
/// label into a parameterized system with a canonical atom ordering.
///
/// Implementations must be deterministic: repeated calls for the same label
/// within a run must return identical systems and reference positions.
pub trait IdentityProvider: Send + Sync {
    fn realize(&self, label: &IdentityLabel) -> Result<ChemicalSystem, EngineError>;

    /// A canonical conformation for the identity, used to seed the chain.
    fn reference_positions(&self, label: &IdentityLabel) -> Result<Vec<Point3<f64>>, EngineError>;
}

/// A built-in provider realizing labels of the form `"C"`, `"CC"`, `"CCC"`, …
/// as united-atom linear alkane chains with harmonic bonds and angles,
/// threefold torsions, and Lennard-Jones beads.
///
/// This backs the test suite and the CLI demo; production deployments supply
/// their own [`IdentityProvider`].
#[derive(Debug, Clone)]
pub struct AlkaneChainProvider {
    pub bond_force_constant: f64,
    pub bond_length: f64,
    pub angle_force_constant: f64,
    pub bend_angle: f64,
    pub torsion_barrier: f64,
    pub lj_r_min: f64,
    pub lj_well_depth: f64,
    pub dielectric: f64,
}

impl Default for AlkaneChainProvider {
    fn default() -> Self {
        Self {
            bond_force_constant: 310.0,
            bond_length: 1.526,
            angle_force_constant: 63.0,
            bend_angle: 114.0f64.to_radians(),
            torsion_barrier: 1.4,
            lj_r_min: 4.2,
            lj_well_depth: 0.1094,
            dielectric: 1.0,
        }
    }
}

impl AlkaneChainProvider {
    fn chain_length(&self, label: &IdentityLabel) -> Result<usize, EngineError> {
        let encoding = label.as_str();
        if encoding.is_empty() || !encoding.chars().all(|c| c == 'C') {
            return Err(EngineError::Provider {
                identity: label.clone(),
                message: "expected a linear alkane encoding of one or more 'C' characters"
                    .to_string(),
            });
        }
        Ok(encoding.len())
    }
}

impl IdentityProvider for AlkaneChainProvider {
    fn realize(&self, label: &IdentityLabel) -> Result<ChemicalSystem, EngineError> {
        let n = self.chain_length(label)?;

        let atoms: Vec<Atom> = (0..n)
            .map(|i| {
                let mut atom = Atom::new(&format!("C{}", i + 1), Element::Carbon);
                atom.lj_r_min = self.lj_r_min;
                atom.lj_well_depth = self.lj_well_depth;
                atom
            })
            .collect();
        let bonds: Vec<(usize, usize)> = (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect();
        let topology = Topology::new(atoms, bonds)
            .map_err(|e| EngineError::Internal(format!("chain topology construction: {e}")))?;

        let bond_terms = topology
            .bonds()
            .iter()
            .map(|&(i, j)| BondTerm {
                i,
                j,
                force_constant: self.bond_force_constant,
                equilibrium_length: self.bond_length,
            })
            .collect();
        let angle_terms = topology
            .angles()
            .into_iter()
            .map(|(i, j, k)| AngleTerm {
                i,
                j,
                k,
                force_constant: self.angle_force_constant,
                equilibrium_angle: self.bend_angle,
            })
            .collect();
        let torsion_terms = topology
            .torsions()
            .into_iter()
            .map(|(i, j, k, l)| TorsionTerm {
                i,
                j,
                k,
                l,
                barrier: self.torsion_barrier,
                periodicity: 3,
                phase: 0.0,
            })
            .collect();

        ChemicalSystem::new(
            topology,
            bond_terms,
            angle_terms,
            torsion_terms,
            self.dielectric,
        )
        .map_err(|e| EngineError::Internal(format!("chain parameterization: {e}")))
    }

    fn reference_positions(&self, label: &IdentityLabel) -> Result<Vec<Point3<f64>>, EngineError> {
        let n = self.chain_length(label)?;
        let r = self.bond_length;
        let theta = self.bend_angle;

        let mut positions: Vec<Point3<f64>> = Vec::with_capacity(n);
        for i in 0..n {
            let next = match i {
                0 => Point3::origin(),
                1 => positions[0] + nalgebra::Vector3::new(r, 0.0, 0.0),
                2 => {
                    positions[1]
                        + nalgebra::Vector3::new(-r * theta.cos(), r * theta.sin(), 0.0)
                }
                _ => {
                    // All-trans continuation of the chain.
                    let internal = InternalCoordinate {
                        bond_length: r,
                        bond_angle: theta,
                        torsion: std::f64::consts::PI,
                    };
                    position_from_internal(
                        &positions[i - 1],
                        &positions[i - 2],
                        &positions[i - 3],
                        &internal,
                    )
                    .ok_or_else(|| {
                        EngineError::Internal(
                            "degenerate reference frame while extending chain".to_string(),
                        )
                    })?
                }
            };
            positions.push(next);
        }
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::geometry::bend_angle;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn realize_builds_expected_term_counts() {
        let provider = AlkaneChainProvider::default();
        let system = provider.realize(&IdentityLabel::from("CCCC")).unwrap();
        assert_eq!(system.atom_count(), 4);
        assert_eq!(system.bond_terms().len(), 3);
        assert_eq!(system.angle_terms().len(), 2);
        assert_eq!(system.torsion_terms().len(), 1);
    }

    #[test]
    fn realize_rejects_non_alkane_labels() {
        let provider = AlkaneChainProvider::default();
        assert!(matches!(
            provider.realize(&IdentityLabel::from("CO")),
            Err(EngineError::Provider { .. })
        ));
        assert!(matches!(
            provider.realize(&IdentityLabel::from("")),
            Err(EngineError::Provider { .. })
        ));
    }

    #[test]
    fn reference_positions_sit_at_equilibrium_geometry() {
        let provider = AlkaneChainProvider::default();
        let positions = provider
            .reference_positions(&IdentityLabel::from("CCCCC"))
            .unwrap();
        assert_eq!(positions.len(), 5);
        for window in positions.windows(2) {
            let dist = (window[1] - window[0]).norm();
            assert!((dist - provider.bond_length).abs() < TOLERANCE);
        }
        for window in positions.windows(3) {
            let theta = bend_angle(&window[0], &window[1], &window[2]);
            assert!((theta - provider.bend_angle).abs() < 1e-6);
        }
    }

    #[test]
    fn repeated_realization_is_deterministic() {
        let provider = AlkaneChainProvider::default();
        let label = IdentityLabel::from("CCC");
        assert_eq!(
            provider.realize(&label).unwrap(),
            provider.realize(&label).unwrap()
        );
        assert_eq!(
            provider.reference_positions(&label).unwrap(),
            provider.reference_positions(&label).unwrap()
        );
    }
}
