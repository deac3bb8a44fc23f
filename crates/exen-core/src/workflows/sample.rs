use crate::core::forcefield::energy::{PotentialEvaluator, ScaledEnergyEvaluator};
use crate::core::models::system::{IdentityLabel, PhysicalState};
use crate::engine::alchemy::{AlchemicalBuilder, Direction};
use crate::engine::bias::BiasHandle;
use crate::engine::config::SamplerConfig;
use crate::engine::error::{EngineError, RejectionReason};
use crate::engine::geometry::GeometryEngine;
use crate::engine::identity::IdentityProvider;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::proposal::{IdentitySetProposal, ProposalEngine, TopologyProposal};
use crate::engine::switching::NcmcEngine;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The per-term breakdown of one acceptance decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceTerms {
    pub logp_proposal: f64,
    pub logp_geometry: f64,
    pub logp_eliminate: f64,
    pub logp_introduce: f64,
    pub log_weight_new: f64,
    pub log_weight_current: f64,
}

impl AcceptanceTerms {
    pub fn logp_accept(&self) -> f64 {
        self.logp_proposal
            + self.logp_geometry
            + self.logp_eliminate
            + self.logp_introduce
            + self.log_weight_new
            - self.log_weight_current
    }
}

/// The immutable record of one chain iteration.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub iteration: u64,
    pub proposed_identity: IdentityLabel,
    pub accepted: bool,
    pub logp_accept: f64,
    pub rejection: Option<RejectionReason>,
    pub terms: Option<AcceptanceTerms>,
}

impl IterationOutcome {
    fn rejected(iteration: u64, proposed_identity: IdentityLabel, reason: RejectionReason) -> Self {
        Self {
            iteration,
            proposed_identity,
            accepted: false,
            logp_accept: f64::NEG_INFINITY,
            rejection: Some(reason),
            terms: None,
        }
    }
}

/// Output of a full sampling run.
#[derive(Debug)]
pub struct SamplingResult {
    pub final_state: PhysicalState,
    pub outcomes: Vec<IterationOutcome>,
    /// Identity visited after each iteration (initial identity first), only
    /// recorded when the configuration asks for it.
    pub history: Option<Vec<IdentityLabel>>,
}

impl SamplingResult {
    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.accepted).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// The Metropolis criterion on a log-probability: deterministic acceptance at
/// `logp >= 0`, otherwise a uniform draw against `exp(logp)`.
fn metropolis_accept(logp_accept: f64, rng: &mut dyn RngCore) -> bool {
    logp_accept >= 0.0 || rng.r#gen::<f64>() < logp_accept.exp()
}

/// The expanded-ensemble sampling driver.
///
/// Owns the full collaborator set and executes the per-iteration state
/// machine: propose a discrete identity, run the elimination switching leg on
/// the current system, complete the geometry of the new system, run the
/// introduction switching leg, and apply the Metropolis criterion to the
/// summed acceptance terms. Recoverable failures inside an iteration
/// (invalid proposals, numeric divergence) reject the move and leave the
/// chain state untouched.
pub struct ExpandedEnsembleSampler<E: PotentialEvaluator> {
    proposal: Box<dyn ProposalEngine>,
    alchemical: AlchemicalBuilder,
    ncmc: NcmcEngine<E>,
    geometry: GeometryEngine,
    bias: BiasHandle,
    config: SamplerConfig,
    rng: StdRng,
    iteration: u64,
}

impl ExpandedEnsembleSampler<ScaledEnergyEvaluator> {
    /// Assembles the sampler with the default scaled energy evaluator.
    pub fn from_config(
        config: SamplerConfig,
        provider: Arc<dyn IdentityProvider>,
        bias: BiasHandle,
    ) -> Self {
        Self::with_evaluator(config, provider, bias, ScaledEnergyEvaluator)
    }
}

impl<E: PotentialEvaluator> ExpandedEnsembleSampler<E> {
    pub fn with_evaluator(
        config: SamplerConfig,
        provider: Arc<dyn IdentityProvider>,
        bias: BiasHandle,
        evaluator: E,
    ) -> Self {
        let proposal = Box::new(IdentitySetProposal::new(
            config.candidates.clone(),
            config.selection.clone(),
            provider,
        ));
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            proposal,
            alchemical: AlchemicalBuilder::new(config.schedules.clone()),
            ncmc: NcmcEngine::new(
                config.temperature,
                config.timestep_fs,
                config.ncmc_steps,
                evaluator,
            ),
            geometry: GeometryEngine::new(config.temperature),
            bias,
            config,
            rng,
            iteration: 0,
        }
    }

    /// Runs one full iteration of the chain.
    ///
    /// Returns the next chain state (the prior state when the move is
    /// rejected) and the iteration record. Only configuration-level failures
    /// surface as errors; per-move failures become rejections.
    #[instrument(level = "debug", skip_all, fields(iteration = self.iteration, from = %state.identity))]
    pub fn step(
        &mut self,
        state: &PhysicalState,
    ) -> Result<(PhysicalState, IterationOutcome), EngineError> {
        let iteration = self.iteration;
        self.iteration += 1;

        let proposal = match self.proposal.propose(state, &mut self.rng) {
            Ok(proposal) => proposal,
            Err(EngineError::ProposalInvalid { reason }) => {
                warn!(reason, "Proposal invalid; iteration rejected.");
                return Ok((
                    state.clone(),
                    IterationOutcome::rejected(
                        iteration,
                        state.identity.clone(),
                        RejectionReason::InvalidProposal,
                    ),
                ));
            }
            Err(e) => return Err(e),
        };
        let proposed_identity = proposal.new_identity.clone();

        match self.attempt(state, &proposal) {
            Ok((candidate, terms)) => {
                let logp_accept = terms.logp_accept();
                let accepted = metropolis_accept(logp_accept, &mut self.rng);
                debug!(
                    to = %proposed_identity,
                    logp_accept,
                    accepted,
                    "Acceptance decision made."
                );
                let next = if accepted { candidate } else { state.clone() };
                Ok((
                    next,
                    IterationOutcome {
                        iteration,
                        proposed_identity,
                        accepted,
                        logp_accept,
                        rejection: (!accepted).then_some(RejectionReason::Metropolis),
                        terms: Some(terms),
                    },
                ))
            }
            Err(EngineError::NumericDivergence { context }) => {
                warn!(context, "Numeric divergence during the move; iteration rejected.");
                Ok((
                    state.clone(),
                    IterationOutcome::rejected(
                        iteration,
                        proposed_identity,
                        RejectionReason::NumericDivergence,
                    ),
                ))
            }
            Err(EngineError::ProposalInvalid { reason }) => {
                warn!(reason, "Move could not be constructed; iteration rejected.");
                Ok((
                    state.clone(),
                    IterationOutcome::rejected(
                        iteration,
                        proposed_identity,
                        RejectionReason::InvalidProposal,
                    ),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Executes the eliminate / geometry / introduce legs and assembles the
    /// candidate state with its acceptance terms.
    fn attempt(
        &mut self,
        state: &PhysicalState,
        proposal: &TopologyProposal,
    ) -> Result<(PhysicalState, AcceptanceTerms), EngineError> {
        let bias = self.bias.snapshot();
        let policy = self.config.missing_weight_policy;
        let log_weight_current = bias.log_weight(&state.identity, policy)?;
        let log_weight_new = bias.log_weight(&proposal.new_identity, policy)?;

        let eliminate = self
            .alchemical
            .build(&state.system, proposal, Direction::Eliminate);
        let eliminated = self
            .ncmc
            .integrate(&eliminate, &state.positions, &mut self.rng)?;

        let geometry =
            self.geometry
                .propose(proposal, &eliminated.final_positions, &mut self.rng)?;

        let introduce = self
            .alchemical
            .build(&proposal.new_system, proposal, Direction::Introduce);
        let introduced =
            self.ncmc
                .integrate(&introduce, &geometry.new_positions, &mut self.rng)?;

        let terms = AcceptanceTerms {
            logp_proposal: proposal.logp_proposal,
            logp_geometry: geometry.logp(),
            logp_eliminate: eliminated.logp,
            logp_introduce: introduced.logp,
            log_weight_new,
            log_weight_current,
        };
        let candidate = PhysicalState::new(
            proposal.new_identity.clone(),
            proposal.new_system.clone(),
            introduced.final_positions,
            log_weight_new,
        );
        Ok((candidate, terms))
    }
}

/// Builds the sampler from a validated configuration, seeds the chain at the
/// configured initial identity, and runs it to completion.
#[instrument(skip_all, fields(iterations = config.iterations, initial = %config.initial_identity))]
pub fn run(
    config: SamplerConfig,
    provider: Arc<dyn IdentityProvider>,
    bias: BiasHandle,
    reporter: &ProgressReporter,
) -> Result<SamplingResult, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "expanded-ensemble sampling",
    });

    let initial_system = provider.realize(&config.initial_identity)?;
    let initial_positions = provider.reference_positions(&config.initial_identity)?;
    let initial_weight = bias
        .snapshot()
        .log_weight(&config.initial_identity, config.missing_weight_policy)?;
    let mut state = PhysicalState::new(
        config.initial_identity.clone(),
        initial_system,
        initial_positions,
        initial_weight,
    );

    let iterations = config.iterations;
    let record_history = config.record_history;
    let mut sampler = ExpandedEnsembleSampler::from_config(config, provider, bias);

    reporter.report(Progress::ChainStart {
        total_iterations: iterations,
    });
    let mut outcomes = Vec::with_capacity(iterations as usize);
    let mut history = record_history.then(|| vec![state.identity.clone()]);
    for _ in 0..iterations {
        let (next, outcome) = sampler.step(&state)?;
        reporter.report(Progress::IterationFinish {
            accepted: outcome.accepted,
        });
        if let Some(history) = history.as_mut() {
            history.push(next.identity.clone());
        }
        outcomes.push(outcome);
        state = next;
    }
    reporter.report(Progress::ChainFinish);
    reporter.report(Progress::PhaseFinish);

    let accepted = outcomes.iter().filter(|o| o.accepted).count();
    info!(
        accepted,
        total = outcomes.len(),
        final_identity = %state.identity,
        "Sampling chain finished."
    );

    Ok(SamplingResult {
        final_state: state,
        outcomes,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::energy::{CategoryScaling, EnergyError};
    use crate::core::models::system::ChemicalSystem;
    use crate::engine::bias::{BiasTable, MissingWeightPolicy};
    use crate::engine::config::SamplerConfigBuilder;
    use crate::engine::identity::AlkaneChainProvider;
    use nalgebra::Point3;
    use std::cell::Cell;
    use std::collections::HashSet;

    fn config_for(candidates: &[&str], initial: &str) -> SamplerConfigBuilder {
        SamplerConfigBuilder::new()
            .iterations(5)
            .temperature(300.0)
            .timestep_fs(0.5)
            .ncmc_steps(2)
            .candidates(candidates.iter().map(|&c| IdentityLabel::from(c)).collect())
            .initial_identity(IdentityLabel::from(initial))
            .seed(1234)
    }

    fn provider() -> Arc<dyn IdentityProvider> {
        Arc::new(AlkaneChainProvider::default())
    }

    #[test]
    fn metropolis_accepts_deterministically_at_nonnegative_logp() {
        let mut rng = StdRng::seed_from_u64(31);
        for _ in 0..32 {
            assert!(metropolis_accept(0.0, &mut rng));
            assert!(metropolis_accept(5.0, &mut rng));
            assert!(!metropolis_accept(f64::NEG_INFINITY, &mut rng));
        }
    }

    #[test]
    fn identity_moves_have_exactly_zero_acceptance_logp() {
        let config = config_for(&["CCC"], "CCC").build().unwrap();
        let bias = BiasHandle::default();
        let result = run(config, provider(), bias, &ProgressReporter::new()).unwrap();
        assert_eq!(result.total(), 5);
        assert_eq!(result.accepted(), 5);
        for outcome in &result.outcomes {
            assert!(outcome.accepted);
            assert_eq!(outcome.logp_accept, 0.0);
            let terms = outcome.terms.unwrap();
            assert_eq!(terms.logp_geometry, 0.0);
            assert_eq!(terms.logp_eliminate, 0.0);
            assert_eq!(terms.logp_introduce, 0.0);
        }
        assert_eq!(result.final_state.identity, IdentityLabel::from("CCC"));
    }

    #[test]
    fn heavily_penalized_identity_is_never_entered() {
        let config = config_for(&["CC", "CCC"], "CC")
            .iterations(20)
            .ncmc_steps(0)
            .build()
            .unwrap();
        let bias = BiasHandle::new(BiasTable::from_pairs([
            (IdentityLabel::from("CC"), 0.0),
            (IdentityLabel::from("CCC"), -1000.0),
        ]));
        let result = run(config, provider(), bias, &ProgressReporter::new()).unwrap();
        for outcome in &result.outcomes {
            if outcome.proposed_identity == IdentityLabel::from("CCC") {
                assert!(!outcome.accepted);
            }
        }
        assert_eq!(result.final_state.identity, IdentityLabel::from("CC"));
    }

    #[test]
    fn unknown_current_identity_rejects_without_advancing_state() {
        let config = config_for(&["CC"], "CC").build().unwrap();
        let mut sampler =
            ExpandedEnsembleSampler::from_config(config, provider(), BiasHandle::default());
        // Hand the sampler a state outside its candidate set.
        let alkanes = AlkaneChainProvider::default();
        let label = IdentityLabel::from("CCCC");
        let state = PhysicalState::new(
            label.clone(),
            alkanes.realize(&label).unwrap(),
            alkanes.reference_positions(&label).unwrap(),
            0.0,
        );
        let (next, outcome) = sampler.step(&state).unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.rejection, Some(RejectionReason::InvalidProposal));
        assert_eq!(next.identity, label);
    }

    #[test]
    fn fatal_missing_weight_policy_aborts_the_run() {
        let config = config_for(&["CC"], "CC")
            .missing_weight_policy(MissingWeightPolicy::Fatal)
            .build()
            .unwrap();
        let result = run(config, provider(), BiasHandle::default(), &ProgressReporter::new());
        assert!(matches!(
            result,
            Err(EngineError::MissingBiasWeight { .. })
        ));
    }

    /// Wraps the real evaluator and poisons one designated call with NaN.
    struct PoisonedEvaluator {
        inner: ScaledEnergyEvaluator,
        calls: Cell<usize>,
        fail_on: usize,
    }

    impl PotentialEvaluator for PoisonedEvaluator {
        fn potential(
            &self,
            system: &ChemicalSystem,
            positions: &[Point3<f64>],
            scaling: &CategoryScaling,
            alchemical_atoms: &HashSet<usize>,
        ) -> Result<f64, EnergyError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call == self.fail_on {
                return Ok(f64::NAN);
            }
            self.inner
                .potential(system, positions, scaling, alchemical_atoms)
        }
    }

    #[test]
    fn numeric_divergence_rejects_the_iteration_and_the_chain_continues() {
        let config = config_for(&["CC", "CCC"], "CC").ncmc_steps(1).build().unwrap();
        let mut sampler = ExpandedEnsembleSampler::with_evaluator(
            config,
            provider(),
            BiasHandle::default(),
            PoisonedEvaluator {
                inner: ScaledEnergyEvaluator,
                calls: Cell::new(0),
                fail_on: 2,
            },
        );
        let alkanes = AlkaneChainProvider::default();
        let label = IdentityLabel::from("CC");
        let mut state = PhysicalState::new(
            label.clone(),
            alkanes.realize(&label).unwrap(),
            alkanes.reference_positions(&label).unwrap(),
            0.0,
        );
        let mut outcomes = Vec::new();
        for _ in 0..6 {
            let (next, outcome) = sampler.step(&state).unwrap();
            outcomes.push(outcome);
            state = next;
        }
        assert_eq!(outcomes.len(), 6);
        assert!(
            outcomes
                .iter()
                .any(|o| o.rejection == Some(RejectionReason::NumericDivergence))
        );
    }

    #[test]
    fn history_records_the_identity_after_every_iteration() {
        let config = config_for(&["CCC"], "CCC")
            .record_history(true)
            .build()
            .unwrap();
        let result = run(config, provider(), BiasHandle::default(), &ProgressReporter::new())
            .unwrap();
        let history = result.history.unwrap();
        assert_eq!(history.len(), 6);
        assert!(history.iter().all(|id| id == &IdentityLabel::from("CCC")));
    }
}
