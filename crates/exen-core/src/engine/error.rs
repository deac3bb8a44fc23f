use thiserror::Error;

use super::config::ConfigError;
use super::proposal::AtomMapError;
use crate::core::forcefield::energy::EnergyError;
use crate::core::models::system::IdentityLabel;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid proposal: {reason}")]
    ProposalInvalid { reason: String },

    #[error("Atom map rejected: {source}")]
    InvalidAtomMap {
        #[from]
        source: AtomMapError,
    },

    #[error("Non-finite energy during {context}")]
    NumericDivergence { context: &'static str },

    #[error("No bias weight recorded for identity '{identity}'")]
    MissingBiasWeight { identity: IdentityLabel },

    #[error("Energy evaluation failed: {source}")]
    Energy {
        #[from]
        source: EnergyError,
    },

    #[error("Identity provider failed for '{identity}': {message}")]
    Provider {
        identity: IdentityLabel,
        message: String,
    },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

/// Diagnostic reason attached to a rejected iteration. A rejected iteration
/// is otherwise indistinguishable in the driver's public result from a
/// Metropolis rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The acceptance test failed against the uniform draw.
    Metropolis,
    /// No usable atom map existed between the old and new identity.
    InvalidProposal,
    /// A non-finite energy aborted the iteration.
    NumericDivergence,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Metropolis => "metropolis",
            RejectionReason::InvalidProposal => "invalid-proposal",
            RejectionReason::NumericDivergence => "numeric-divergence",
        }
    }
}
