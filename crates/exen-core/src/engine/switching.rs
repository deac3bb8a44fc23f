use super::alchemy::AlchemicalSystem;
use super::error::EngineError;
use crate::core::forcefield::BOLTZMANN_KCAL_MOL_K;
use crate::core::forcefield::energy::PotentialEvaluator;
use nalgebra::{Point3, Vector3};
use rand::Rng;
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use tracing::{instrument, trace};

/// Nominal diffusion coefficient in Å²/fs used to convert the configured
/// timestep into the displacement scale of the stochastic propagation kernel.
const NOMINAL_DIFFUSION: f64 = 1.25e-3;

/// Output of one switching leg: the final coordinates and the acceptance
/// contribution `-W/kT` derived from the accumulated protocol work `W`.
/// The sign convention contributes positively to acceptance of the direction
/// the switch was run in.
#[derive(Debug, Clone)]
pub struct SwitchingResult {
    pub final_positions: Vec<Point3<f64>>,
    /// Accumulated protocol work in kcal/mol.
    pub protocol_work: f64,
    /// `-protocol_work / kT`.
    pub logp: f64,
}

/// The nonequilibrium switching engine.
///
/// Drives the interpolation parameter of an [`AlchemicalSystem`] from its
/// start endpoint to its end endpoint over `steps` equal increments,
/// interleaving each parameter update with a segment of stochastic dynamics
/// at fixed temperature. The protocol work is the sum of the energy changes
/// attributable to the parameter updates alone; the dynamics segments use a
/// Metropolis-adjusted Gaussian displacement kernel, which preserves the
/// fixed-lambda Boltzmann distribution and therefore contributes no work.
///
/// With `steps = 0` the protocol degenerates to an instantaneous switch and
/// the contribution reduces to the plain endpoint energy difference.
#[derive(Debug, Clone)]
pub struct NcmcEngine<E: PotentialEvaluator> {
    temperature: f64,
    timestep_fs: f64,
    steps: usize,
    evaluator: E,
}

impl<E: PotentialEvaluator> NcmcEngine<E> {
    pub fn new(temperature: f64, timestep_fs: f64, steps: usize, evaluator: E) -> Self {
        Self {
            temperature,
            timestep_fs,
            steps,
            evaluator,
        }
    }

    fn beta(&self) -> f64 {
        1.0 / (BOLTZMANN_KCAL_MOL_K * self.temperature)
    }

    fn displacement_sigma(&self) -> f64 {
        (2.0 * NOMINAL_DIFFUSION * self.timestep_fs).sqrt()
    }

    fn energy(
        &self,
        alchemical: &AlchemicalSystem,
        lambda: f64,
        positions: &[Point3<f64>],
        context: &'static str,
    ) -> Result<f64, EngineError> {
        let scaling = alchemical.scaling_at(lambda);
        let energy = self.evaluator.potential(
            alchemical.system(),
            positions,
            &scaling,
            alchemical.alchemical_atoms(),
        )?;
        if !energy.is_finite() {
            return Err(EngineError::NumericDivergence { context });
        }
        Ok(energy)
    }

    /// One Metropolis sweep over all atoms at fixed lambda. Returns the
    /// potential energy of the final configuration.
    fn dynamics_segment(
        &self,
        alchemical: &AlchemicalSystem,
        lambda: f64,
        positions: &mut Vec<Point3<f64>>,
        mut current_energy: f64,
        rng: &mut dyn RngCore,
    ) -> Result<f64, EngineError> {
        let sigma = self.displacement_sigma();
        let displacement = Normal::new(0.0, sigma).map_err(|e| {
            EngineError::Internal(format!("displacement kernel construction: {e}"))
        })?;
        let beta = self.beta();

        for atom in 0..positions.len() {
            let original = positions[atom];
            positions[atom] = original
                + Vector3::new(
                    displacement.sample(rng),
                    displacement.sample(rng),
                    displacement.sample(rng),
                );
            let trial_energy = self.energy(alchemical, lambda, positions, "dynamics segment")?;
            let delta = trial_energy - current_energy;
            if delta <= 0.0 || rng.r#gen::<f64>() < (-beta * delta).exp() {
                current_energy = trial_energy;
            } else {
                positions[atom] = original;
            }
        }
        Ok(current_energy)
    }

    /// Runs the switching protocol from the given initial positions.
    ///
    /// Any non-finite intermediate energy aborts the integration with
    /// [`EngineError::NumericDivergence`]; the caller treats this as a
    /// rejection of the overall move, not a fatal error.
    #[instrument(level = "debug", skip_all, fields(direction = %alchemical.direction(), steps = self.steps))]
    pub fn integrate(
        &self,
        alchemical: &AlchemicalSystem,
        positions: &[Point3<f64>],
        rng: &mut dyn RngCore,
    ) -> Result<SwitchingResult, EngineError> {
        let beta = self.beta();
        let lambda_start = alchemical.lambda_start();
        let lambda_end = alchemical.lambda_end();
        let mut current = positions.to_vec();

        if self.steps == 0 {
            let u_start = self.energy(alchemical, lambda_start, &current, "instantaneous switch")?;
            let u_end = self.energy(alchemical, lambda_end, &current, "instantaneous switch")?;
            let work = u_end - u_start;
            return Ok(SwitchingResult {
                final_positions: current,
                protocol_work: work,
                logp: -beta * work,
            });
        }

        let mut work = 0.0;
        let mut energy_before_update =
            self.energy(alchemical, lambda_start, &current, "alchemical interpolation")?;
        for step in 1..=self.steps {
            let fraction = step as f64 / self.steps as f64;
            let lambda = lambda_start + (lambda_end - lambda_start) * fraction;
            let energy_after_update =
                self.energy(alchemical, lambda, &current, "alchemical interpolation")?;
            work += energy_after_update - energy_before_update;
            trace!(step, lambda, work, "Parameter update applied.");

            energy_before_update = self.dynamics_segment(
                alchemical,
                lambda,
                &mut current,
                energy_after_update,
                rng,
            )?;
        }

        Ok(SwitchingResult {
            final_positions: current,
            protocol_work: work,
            logp: -beta * work,
        })
    }
}
