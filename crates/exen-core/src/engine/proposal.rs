use super::error::EngineError;
use super::identity::IdentityProvider;
use crate::core::models::system::{ChemicalSystem, IdentityLabel, PhysicalState};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AtomMapError {
    #[error("old atom {0} is the image of two distinct new atoms")]
    DuplicateOld(usize),
    #[error("new atom {0} is mapped twice")]
    DuplicateNew(usize),
}

/// An explicit partial bijection between the atom indices of two identities'
/// topologies. Both directions are stored; construction rejects any input in
/// which an index appears as the image of two distinct counterparts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomMap {
    new_to_old: BTreeMap<usize, usize>,
    old_to_new: BTreeMap<usize, usize>,
}

impl AtomMap {
    pub fn from_new_to_old(
        pairs: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, AtomMapError> {
        let mut new_to_old = BTreeMap::new();
        let mut old_to_new = BTreeMap::new();
        for (new, old) in pairs {
            if new_to_old.insert(new, old).is_some() {
                return Err(AtomMapError::DuplicateNew(new));
            }
            if old_to_new.insert(old, new).is_some() {
                return Err(AtomMapError::DuplicateOld(old));
            }
        }
        Ok(Self {
            new_to_old,
            old_to_new,
        })
    }

    /// The identity map over `n` atoms.
    pub fn identity(n: usize) -> Self {
        let new_to_old: BTreeMap<usize, usize> = (0..n).map(|i| (i, i)).collect();
        Self {
            old_to_new: new_to_old.clone(),
            new_to_old,
        }
    }

    pub fn len(&self) -> usize {
        self.new_to_old.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new_to_old.is_empty()
    }

    pub fn old_for_new(&self, new: usize) -> Option<usize> {
        self.new_to_old.get(&new).copied()
    }

    pub fn new_for_old(&self, old: usize) -> Option<usize> {
        self.old_to_new.get(&old).copied()
    }

    pub fn contains_new(&self, new: usize) -> bool {
        self.new_to_old.contains_key(&new)
    }

    pub fn contains_old(&self, old: usize) -> bool {
        self.old_to_new.contains_key(&old)
    }

    /// Mapped (new, old) index pairs in ascending new-index order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.new_to_old.iter().map(|(&new, &old)| (new, old))
    }
}

/// The immutable record of one dimension-changing proposal: the chosen new
/// identity, its realized system, the atom correspondence, and the net
/// forward-minus-reverse log-probability of having made this choice.
#[derive(Debug, Clone)]
pub struct TopologyProposal {
    pub old_identity: IdentityLabel,
    pub new_identity: IdentityLabel,
    pub new_system: ChemicalSystem,
    pub atom_map: AtomMap,
    /// Net proposal log-probability: `ln q(new|old) - ln q(old|new)`. The
    /// acceptance rule adds this single term; no separate reverse-proposal
    /// term exists.
    pub logp_proposal: f64,
}

impl TopologyProposal {
    pub fn is_identity_move(&self) -> bool {
        self.old_identity == self.new_identity
    }
}

/// How the next identity is drawn from the candidate set.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionPolicy {
    /// Uniform over the whole candidate set (the current identity included,
    /// so single-candidate sets degenerate to pure identity moves).
    Uniform,
    /// Row-stochastic transition matrix indexed by candidate order.
    TransitionMatrix(Vec<Vec<f64>>),
}

/// A polymorphic capability: given the current state, propose a new discrete
/// identity together with an atom map and the net proposal log-probability.
pub trait ProposalEngine: Send + Sync {
    fn propose(
        &self,
        state: &PhysicalState,
        rng: &mut dyn RngCore,
    ) -> Result<TopologyProposal, EngineError>;
}

/// Proposal engine over a fixed candidate set of identities.
///
/// The atom map between two identities is the longest common element-sequence
/// prefix of their canonical atom orderings. The mapping is deterministic, so
/// only the identity-selection probabilities enter `logp_proposal`.
pub struct IdentitySetProposal {
    candidates: Vec<IdentityLabel>,
    policy: SelectionPolicy,
    provider: Arc<dyn IdentityProvider>,
}

impl IdentitySetProposal {
    pub fn new(
        candidates: Vec<IdentityLabel>,
        policy: SelectionPolicy,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            candidates,
            policy,
            provider,
        }
    }

    fn candidate_index(&self, label: &IdentityLabel) -> Result<usize, EngineError> {
        self.candidates
            .iter()
            .position(|c| c == label)
            .ok_or_else(|| EngineError::ProposalInvalid {
                reason: format!("current identity '{label}' is not in the candidate set"),
            })
    }

    /// Draws the next candidate index and returns it with the net
    /// forward-minus-reverse selection log-probability.
    fn select(
        &self,
        current: usize,
        rng: &mut dyn RngCore,
    ) -> Result<(usize, f64), EngineError> {
        match &self.policy {
            SelectionPolicy::Uniform => {
                let chosen = rng.gen_range(0..self.candidates.len());
                // Forward and reverse selection probabilities are both 1/K.
                Ok((chosen, 0.0))
            }
            SelectionPolicy::TransitionMatrix(matrix) => {
                let row = matrix.get(current).ok_or_else(|| {
                    EngineError::Internal(format!(
                        "transition matrix has no row for candidate {current}"
                    ))
                })?;
                let dist = WeightedIndex::new(row).map_err(|e| {
                    EngineError::Internal(format!("transition matrix row {current}: {e}"))
                })?;
                let chosen = dist.sample(rng);
                let forward = row[chosen];
                let reverse = matrix[chosen][current];
                if reverse <= 0.0 {
                    return Err(EngineError::ProposalInvalid {
                        reason: format!(
                            "transition {} -> {} has zero reverse probability",
                            self.candidates[current], self.candidates[chosen]
                        ),
                    });
                }
                Ok((chosen, forward.ln() - reverse.ln()))
            }
        }
    }

    /// Longest common element-sequence prefix of the two canonical orderings.
    fn common_prefix_map(
        old_system: &ChemicalSystem,
        new_system: &ChemicalSystem,
    ) -> Result<AtomMap, EngineError> {
        let old_atoms = old_system.topology().atoms();
        let new_atoms = new_system.topology().atoms();
        let shared = old_atoms
            .iter()
            .zip(new_atoms.iter())
            .take_while(|(old, new)| old.element == new.element)
            .count();
        if shared == 0 {
            return Err(EngineError::ProposalInvalid {
                reason: "no shared substructure between old and new identity".to_string(),
            });
        }
        Ok(AtomMap::from_new_to_old((0..shared).map(|i| (i, i)))?)
    }
}

impl ProposalEngine for IdentitySetProposal {
    fn propose(
        &self,
        state: &PhysicalState,
        rng: &mut dyn RngCore,
    ) -> Result<TopologyProposal, EngineError> {
        let current = self.candidate_index(&state.identity)?;
        let (chosen, logp_selection) = self.select(current, rng)?;
        let new_identity = self.candidates[chosen].clone();
        let new_system = self.provider.realize(&new_identity)?;

        let atom_map = if new_identity == state.identity {
            AtomMap::identity(state.system.atom_count())
        } else {
            Self::common_prefix_map(&state.system, &new_system)?
        };

        tracing::debug!(
            from = %state.identity,
            to = %new_identity,
            mapped_atoms = atom_map.len(),
            logp_selection,
            "Proposed identity transformation."
        );

        Ok(TopologyProposal {
            old_identity: state.identity.clone(),
            new_identity,
            new_system,
            atom_map,
            logp_proposal: logp_selection,
        })
    }
}
