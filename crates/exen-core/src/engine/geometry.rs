use super::error::EngineError;
use super::proposal::TopologyProposal;
use crate::core::forcefield::BOLTZMANN_KCAL_MOL_K;
use crate::core::models::system::ChemicalSystem;
use crate::core::utils::geometry::{
    InternalCoordinate, internal_from_positions, log_jacobian_spherical, position_from_internal,
    uniform_unit_vector, virtual_torsion_reference,
};
use nalgebra::Point3;
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeSet;
use tracing::instrument;

// Fallback proposal parameters for coordinates without a force-field term.
const DEFAULT_BOND_FORCE_CONSTANT: f64 = 300.0;
const DEFAULT_BOND_LENGTH: f64 = 1.5;
const DEFAULT_ANGLE_FORCE_CONSTANT: f64 = 60.0;
const DEFAULT_BEND_ANGLE: f64 = 1.911;

const MAX_RESAMPLE_ATTEMPTS: usize = 100;

/// Result of completing the geometry of one proposal: a full position array
/// for the new system, the accumulated proposal log-density of the sampled
/// internal coordinates, and the accumulated log Jacobian of the
/// internal-to-Cartesian transformation.
#[derive(Debug, Clone)]
pub struct GeometryProposal {
    pub new_positions: Vec<Point3<f64>>,
    pub logp_internal: f64,
    pub log_jacobian: f64,
}

impl GeometryProposal {
    /// The single term this proposal contributes to the acceptance
    /// log-probability: the Jacobian credit minus the forward sampling
    /// density. Exactly zero when no atoms were placed.
    pub fn logp(&self) -> f64 {
        self.log_jacobian - self.logp_internal
    }
}

/// Which already-placed atoms a new atom is positioned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum References {
    /// Only the bonded anchor is placed.
    One(usize),
    /// Anchor and one angle reference are placed.
    Two(usize, usize),
    /// Anchor, angle, and torsion references are placed.
    Three(usize, usize, usize),
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    atom: usize,
    references: References,
}

/// The concrete geometric situation after degenerate references collapse.
enum Effective {
    /// Sample a distance and a uniform direction on the sphere.
    Radial { anchor: usize },
    /// Sample full internal coordinates against a (possibly virtual) frame.
    Framed {
        anchor: usize,
        angle_reference: usize,
        torsion_point: Point3<f64>,
    },
}

/// The geometry completion engine.
///
/// Atoms of the new topology absent from the atom map are placed one at a
/// time, each from internal-coordinate proposal distributions parameterized
/// by the force-field terms governing that coordinate: bond lengths and bend
/// angles from Gaussians at the terms' equilibria with thermal widths, and
/// torsions uniformly. The placement order is a deterministic function of the
/// topology and the mapped core, so the reverse-direction evaluation walks
/// the identical order and recovers the identical densities.
#[derive(Debug, Clone)]
pub struct GeometryEngine {
    temperature: f64,
}

impl GeometryEngine {
    pub fn new(temperature: f64) -> Self {
        Self { temperature }
    }

    fn thermal_energy(&self) -> f64 {
        BOLTZMANN_KCAL_MOL_K * self.temperature
    }

    /// Samples positions for every new-topology atom absent from the atom
    /// map, starting from the mapped core copied out of
    /// `reference_positions` (the old system's coordinates).
    #[instrument(level = "debug", skip_all, fields(new_atoms = proposal.new_system.atom_count() - proposal.atom_map.len()))]
    pub fn propose(
        &self,
        proposal: &TopologyProposal,
        reference_positions: &[Point3<f64>],
        rng: &mut dyn RngCore,
    ) -> Result<GeometryProposal, EngineError> {
        let system = &proposal.new_system;
        let mut positions = vec![Point3::origin(); system.atom_count()];
        let mut core = BTreeSet::new();
        for (new, old) in proposal.atom_map.pairs() {
            let reference = reference_positions.get(old).ok_or_else(|| {
                EngineError::Internal(format!(
                    "atom map references old atom {old}, beyond {} positions",
                    reference_positions.len()
                ))
            })?;
            positions[new] = *reference;
            core.insert(new);
        }
        if core.is_empty() {
            return Err(EngineError::ProposalInvalid {
                reason: "geometry completion requires a non-empty mapped core".to_string(),
            });
        }

        let order = placement_order(system, &core)?;
        let mut logp_internal = 0.0;
        let mut log_jacobian = 0.0;
        for placement in order {
            let (position, logp, jacobian) =
                self.sample_placement(system, &positions, &placement, rng)?;
            positions[placement.atom] = position;
            logp_internal += logp;
            log_jacobian += jacobian;
        }

        Ok(GeometryProposal {
            new_positions: positions,
            logp_internal,
            log_jacobian,
        })
    }

    /// Reverse-direction evaluation: the log-density and Jacobian the forward
    /// pass would have produced had it placed `system`'s atoms outside
    /// `core` at exactly the given positions.
    pub fn evaluate(
        &self,
        system: &ChemicalSystem,
        core: &BTreeSet<usize>,
        positions: &[Point3<f64>],
    ) -> Result<GeometryProposal, EngineError> {
        if positions.len() != system.atom_count() {
            return Err(EngineError::Internal(format!(
                "geometry evaluation over {} positions for {} atoms",
                positions.len(),
                system.atom_count()
            )));
        }
        if core.is_empty() {
            return Err(EngineError::ProposalInvalid {
                reason: "geometry evaluation requires a non-empty placed core".to_string(),
            });
        }

        let order = placement_order(system, core)?;
        let mut logp_internal = 0.0;
        let mut log_jacobian = 0.0;
        for placement in order {
            let (logp, jacobian) = self.measure_placement(system, positions, &placement)?;
            logp_internal += logp;
            log_jacobian += jacobian;
        }

        Ok(GeometryProposal {
            new_positions: positions.to_vec(),
            logp_internal,
            log_jacobian,
        })
    }

    /// Reverse-move probability of the atoms the proposal destroys: evaluates
    /// the old system's unmapped atoms at their current positions.
    pub fn logp_reverse(
        &self,
        proposal: &TopologyProposal,
        old_system: &ChemicalSystem,
        old_positions: &[Point3<f64>],
    ) -> Result<GeometryProposal, EngineError> {
        let core: BTreeSet<usize> = (0..old_system.atom_count())
            .filter(|&i| proposal.atom_map.contains_old(i))
            .collect();
        self.evaluate(old_system, &core, old_positions)
    }

    fn bond_parameters(&self, system: &ChemicalSystem, atom: usize, anchor: usize) -> (f64, f64) {
        match system.bond_term_between(atom, anchor) {
            Some(term) => (term.equilibrium_length, term.force_constant),
            None => (DEFAULT_BOND_LENGTH, DEFAULT_BOND_FORCE_CONSTANT),
        }
    }

    fn angle_parameters(
        &self,
        system: &ChemicalSystem,
        atom: usize,
        anchor: usize,
        angle_reference: usize,
    ) -> (f64, f64) {
        match system.angle_term_for(atom, anchor, angle_reference) {
            Some(term) => (term.equilibrium_angle, term.force_constant),
            None => (DEFAULT_BEND_ANGLE, DEFAULT_ANGLE_FORCE_CONSTANT),
        }
    }

    fn sample_placement(
        &self,
        system: &ChemicalSystem,
        positions: &[Point3<f64>],
        placement: &Placement,
        rng: &mut dyn RngCore,
    ) -> Result<(Point3<f64>, f64, f64), EngineError> {
        let kt = self.thermal_energy();
        match effective_references(positions, placement.references) {
            Effective::Radial { anchor } => {
                let (r0, k) = self.bond_parameters(system, placement.atom, anchor);
                let sigma = (kt / k).sqrt();
                let r = sample_bounded(rng, r0, sigma, |r| r > 0.0)?;
                let direction = uniform_unit_vector(rng);
                let position = positions[anchor] + direction * r;
                let logp = normal_logpdf(r, r0, sigma) - (4.0 * std::f64::consts::PI).ln();
                let jacobian = 2.0 * r.ln();
                Ok((position, logp, jacobian))
            }
            Effective::Framed {
                anchor,
                angle_reference,
                torsion_point,
            } => {
                let (r0, bond_k) = self.bond_parameters(system, placement.atom, anchor);
                let (theta0, angle_k) =
                    self.angle_parameters(system, placement.atom, anchor, angle_reference);
                let sigma_r = (kt / bond_k).sqrt();
                let sigma_theta = (kt / angle_k).sqrt();

                let r = sample_bounded(rng, r0, sigma_r, |r| r > 0.0)?;
                let theta = sample_bounded(rng, theta0, sigma_theta, |t| {
                    t > 0.0 && t < std::f64::consts::PI
                })?;
                let phi = std::f64::consts::PI * (2.0 * uniform_f64(rng) - 1.0);

                let internal = InternalCoordinate {
                    bond_length: r,
                    bond_angle: theta,
                    torsion: phi,
                };
                let position = position_from_internal(
                    &positions[anchor],
                    &positions[angle_reference],
                    &torsion_point,
                    &internal,
                )
                .ok_or_else(|| {
                    EngineError::Internal(
                        "degenerate reference frame in geometry placement".to_string(),
                    )
                })?;

                let logp = normal_logpdf(r, r0, sigma_r)
                    + normal_logpdf(theta, theta0, sigma_theta)
                    - (2.0 * std::f64::consts::PI).ln();
                let jacobian = log_jacobian_spherical(r, theta);
                Ok((position, logp, jacobian))
            }
        }
    }

    fn measure_placement(
        &self,
        system: &ChemicalSystem,
        positions: &[Point3<f64>],
        placement: &Placement,
    ) -> Result<(f64, f64), EngineError> {
        let kt = self.thermal_energy();
        let atom_position = positions[placement.atom];
        match effective_references(positions, placement.references) {
            Effective::Radial { anchor } => {
                let (r0, k) = self.bond_parameters(system, placement.atom, anchor);
                let sigma = (kt / k).sqrt();
                let r = (atom_position - positions[anchor]).norm();
                let logp = normal_logpdf(r, r0, sigma) - (4.0 * std::f64::consts::PI).ln();
                let jacobian = 2.0 * r.ln();
                Ok((logp, jacobian))
            }
            Effective::Framed {
                anchor,
                angle_reference,
                torsion_point,
            } => {
                let (r0, bond_k) = self.bond_parameters(system, placement.atom, anchor);
                let (theta0, angle_k) =
                    self.angle_parameters(system, placement.atom, anchor, angle_reference);
                let sigma_r = (kt / bond_k).sqrt();
                let sigma_theta = (kt / angle_k).sqrt();

                let internal = internal_from_positions(
                    &atom_position,
                    &positions[anchor],
                    &positions[angle_reference],
                    &torsion_point,
                )
                .ok_or_else(|| {
                    EngineError::Internal(
                        "degenerate reference frame in geometry evaluation".to_string(),
                    )
                })?;

                let logp = normal_logpdf(internal.bond_length, r0, sigma_r)
                    + normal_logpdf(internal.bond_angle, theta0, sigma_theta)
                    - (2.0 * std::f64::consts::PI).ln();
                let jacobian =
                    log_jacobian_spherical(internal.bond_length, internal.bond_angle);
                Ok((logp, jacobian))
            }
        }
    }
}

/// Collapses degenerate reference geometries: a collinear or coincident
/// torsion reference falls back to a deterministic virtual frame, coincident
/// anchor/angle references fall back to radial placement.
fn effective_references(positions: &[Point3<f64>], references: References) -> Effective {
    match references {
        References::One(anchor) => Effective::Radial { anchor },
        References::Two(anchor, angle_reference) => {
            framed_or_radial(positions, anchor, angle_reference, None)
        }
        References::Three(anchor, angle_reference, torsion_reference) => {
            let pa = positions[anchor];
            let pb = positions[angle_reference];
            let pc = positions[torsion_reference];
            let collinear = (pa - pb).cross(&(pb - pc)).norm() < 1e-9;
            if collinear {
                framed_or_radial(positions, anchor, angle_reference, None)
            } else {
                framed_or_radial(positions, anchor, angle_reference, Some(pc))
            }
        }
    }
}

fn framed_or_radial(
    positions: &[Point3<f64>],
    anchor: usize,
    angle_reference: usize,
    torsion_point: Option<Point3<f64>>,
) -> Effective {
    let pa = positions[anchor];
    let pb = positions[angle_reference];
    if (pa - pb).norm() < 1e-9 {
        return Effective::Radial { anchor };
    }
    Effective::Framed {
        anchor,
        angle_reference,
        torsion_point: torsion_point.unwrap_or_else(|| virtual_torsion_reference(&pa, &pb)),
    }
}

/// Deterministic placement order: repeatedly take the lowest-indexed unplaced
/// atom bonded to the placed set, with references chosen as the lowest-indexed
/// placed neighbors walking outward. Both the forward sampling pass and the
/// reverse evaluation pass derive the identical order from the same core.
fn placement_order(
    system: &ChemicalSystem,
    core: &BTreeSet<usize>,
) -> Result<Vec<Placement>, EngineError> {
    let topology = system.topology();
    let n = system.atom_count();
    let mut placed = core.clone();
    let mut order = Vec::with_capacity(n - placed.len());

    while placed.len() < n {
        let next = (0..n)
            .filter(|atom| !placed.contains(atom))
            .find_map(|atom| {
                let anchor = topology
                    .bonded_neighbors(atom)
                    .iter()
                    .copied()
                    .find(|a| placed.contains(a))?;
                let angle_reference = topology
                    .bonded_neighbors(anchor)
                    .iter()
                    .copied()
                    .find(|&b| b != atom && placed.contains(&b));
                let references = match angle_reference {
                    None => References::One(anchor),
                    Some(b) => {
                        let torsion_reference = topology
                            .bonded_neighbors(b)
                            .iter()
                            .copied()
                            .find(|&c| c != anchor && c != atom && placed.contains(&c));
                        match torsion_reference {
                            None => References::Two(anchor, b),
                            Some(c) => References::Three(anchor, b, c),
                        }
                    }
                };
                Some(Placement { atom, references })
            });

        match next {
            Some(placement) => {
                placed.insert(placement.atom);
                order.push(placement);
            }
            None => {
                return Err(EngineError::ProposalInvalid {
                    reason: "unmapped atoms are disconnected from the placed core".to_string(),
                });
            }
        }
    }
    Ok(order)
}

fn normal_logpdf(x: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    -0.5 * z * z - sigma.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
}

fn uniform_f64(rng: &mut dyn RngCore) -> f64 {
    rand::Rng::r#gen::<f64>(rng)
}

fn sample_bounded(
    rng: &mut dyn RngCore,
    mean: f64,
    sigma: f64,
    valid: impl Fn(f64) -> bool,
) -> Result<f64, EngineError> {
    let normal = Normal::new(mean, sigma)
        .map_err(|e| EngineError::Internal(format!("proposal distribution: {e}")))?;
    for _ in 0..MAX_RESAMPLE_ATTEMPTS {
        let draw = normal.sample(rng);
        if valid(draw) {
            return Ok(draw);
        }
    }
    Err(EngineError::Internal(
        "internal-coordinate proposal failed to draw a valid sample".to_string(),
    ))
}
