use super::config::ConfigError;
use super::proposal::TopologyProposal;
use crate::core::forcefield::energy::{CategoryScaling, InteractionCategory};
use crate::core::models::system::ChemicalSystem;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Which side of a dimension-changing move the switching protocol serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Decouple the old identity's unmapped atoms: lambda runs 1 -> 0.
    Eliminate,
    /// Couple the new identity's unmapped atoms: lambda runs 0 -> 1.
    Introduce,
}

impl Direction {
    pub fn lambda_start(&self) -> f64 {
        match self {
            Direction::Eliminate => 1.0,
            Direction::Introduce => 0.0,
        }
    }

    pub fn lambda_end(&self) -> f64 {
        match self {
            Direction::Eliminate => 0.0,
            Direction::Introduce => 1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Eliminate => "eliminate",
            Direction::Introduce => "introduce",
        })
    }
}

/// Functional form mapping the switching parameter to a per-category scaling
/// factor. All forms map lambda = 1 to full coupling, so the coupled endpoint
/// of every schedule is the physical system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    Constant(f64),
    Linear,
    Squared,
    Sqrt,
}

impl Schedule {
    /// Parses the configured functional-form string.
    ///
    /// Recognized forms: `"lambda"`, `"1"`, `"lambda^2"`, `"sqrt(lambda)"`.
    pub fn parse(form: &str) -> Result<Self, ConfigError> {
        match form.trim() {
            "lambda" => Ok(Schedule::Linear),
            "1" => Ok(Schedule::Constant(1.0)),
            "lambda^2" => Ok(Schedule::Squared),
            "sqrt(lambda)" => Ok(Schedule::Sqrt),
            other => Err(ConfigError::UnknownSchedule(other.to_string())),
        }
    }

    pub fn value(&self, lambda: f64) -> f64 {
        match self {
            Schedule::Constant(c) => *c,
            Schedule::Linear => lambda,
            Schedule::Squared => lambda * lambda,
            Schedule::Sqrt => lambda.sqrt(),
        }
    }
}

/// Per-interaction-category switching schedules.
///
/// The default softens nonbonded and angular terms linearly while holding
/// bond-stretch terms fully coupled throughout, which preserves local
/// geometry as atoms appear and disappear.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchingSchedules {
    schedules: HashMap<InteractionCategory, Schedule>,
}

impl Default for SwitchingSchedules {
    fn default() -> Self {
        let mut schedules = HashMap::new();
        schedules.insert(InteractionCategory::Bonds, Schedule::Constant(1.0));
        schedules.insert(InteractionCategory::Angles, Schedule::Linear);
        schedules.insert(InteractionCategory::Torsions, Schedule::Linear);
        schedules.insert(InteractionCategory::Sterics, Schedule::Linear);
        schedules.insert(InteractionCategory::Electrostatics, Schedule::Linear);
        Self { schedules }
    }
}

impl SwitchingSchedules {
    /// Builds schedules from configured `category name -> functional form`
    /// entries, starting from the defaults. Unknown category names and
    /// unrecognized forms are configuration errors, fatal at startup.
    pub fn from_named(named: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut schedules = Self::default();
        for (name, form) in named {
            let category = InteractionCategory::from_str(name)
                .map_err(|_| ConfigError::UnknownCategory(name.clone()))?;
            schedules
                .schedules
                .insert(category, Schedule::parse(form)?);
        }
        Ok(schedules)
    }

    pub fn get(&self, category: InteractionCategory) -> Schedule {
        // Every category is present; Default seeds the full map.
        self.schedules
            .get(&category)
            .copied()
            .unwrap_or(Schedule::Linear)
    }

    pub fn scaling_at(&self, lambda: f64) -> CategoryScaling {
        CategoryScaling {
            bonds: self.get(InteractionCategory::Bonds).value(lambda),
            angles: self.get(InteractionCategory::Angles).value(lambda),
            torsions: self.get(InteractionCategory::Torsions).value(lambda),
            sterics: self.get(InteractionCategory::Sterics).value(lambda),
            electrostatics: self
                .get(InteractionCategory::Electrostatics)
                .value(lambda),
        }
    }
}

/// A system carrying a scalar interpolation parameter: the physical system,
/// the set of atoms whose interactions are being switched, and the schedules
/// mapping lambda to per-category scaling factors.
///
/// At the coupled endpoint (lambda = 1) the energy reduces exactly to the
/// physical system's; at the decoupled endpoint the alchemical atoms are
/// non-interacting through every softened category but stay enumerated.
#[derive(Debug, Clone)]
pub struct AlchemicalSystem {
    system: ChemicalSystem,
    alchemical_atoms: HashSet<usize>,
    schedules: SwitchingSchedules,
    direction: Direction,
}

impl AlchemicalSystem {
    pub fn system(&self) -> &ChemicalSystem {
        &self.system
    }

    pub fn alchemical_atoms(&self) -> &HashSet<usize> {
        &self.alchemical_atoms
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn lambda_start(&self) -> f64 {
        self.direction.lambda_start()
    }

    pub fn lambda_end(&self) -> f64 {
        self.direction.lambda_end()
    }

    pub fn scaling_at(&self, lambda: f64) -> CategoryScaling {
        self.schedules.scaling_at(lambda)
    }

    /// True when no atoms are being switched (an identity move).
    pub fn is_trivial(&self) -> bool {
        self.alchemical_atoms.is_empty()
    }
}

/// Constructs alchemical systems for the two legs of a proposal.
#[derive(Debug, Clone, Default)]
pub struct AlchemicalBuilder {
    schedules: SwitchingSchedules,
}

impl AlchemicalBuilder {
    pub fn new(schedules: SwitchingSchedules) -> Self {
        Self { schedules }
    }

    /// Builds the alchemical system for one leg.
    ///
    /// For [`Direction::Eliminate`], `system` is the current identity's system
    /// and the alchemical atoms are the old-side atoms absent from the map
    /// (soon to be destroyed). For [`Direction::Introduce`], `system` is the
    /// proposal's new system and the alchemical atoms are the new-side atoms
    /// absent from the map (being created).
    pub fn build(
        &self,
        system: &ChemicalSystem,
        proposal: &TopologyProposal,
        direction: Direction,
    ) -> AlchemicalSystem {
        let alchemical_atoms: HashSet<usize> = match direction {
            Direction::Eliminate => (0..system.atom_count())
                .filter(|&i| !proposal.atom_map.contains_old(i))
                .collect(),
            Direction::Introduce => (0..system.atom_count())
                .filter(|&i| !proposal.atom_map.contains_new(i))
                .collect(),
        };
        AlchemicalSystem {
            system: system.clone(),
            alchemical_atoms,
            schedules: self.schedules.clone(),
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::system::{IdentityLabel, PhysicalState};
    use crate::engine::identity::{AlkaneChainProvider, IdentityProvider};
    use crate::engine::proposal::AtomMap;

    fn proposal_between(old: &str, new: &str) -> (PhysicalState, TopologyProposal) {
        let provider = AlkaneChainProvider::default();
        let old_label = IdentityLabel::from(old);
        let new_label = IdentityLabel::from(new);
        let old_system = provider.realize(&old_label).unwrap();
        let new_system = provider.realize(&new_label).unwrap();
        let positions = provider.reference_positions(&old_label).unwrap();
        let shared = old.len().min(new.len());
        let state = PhysicalState::new(old_label.clone(), old_system, positions, 0.0);
        let proposal = TopologyProposal {
            old_identity: old_label,
            new_identity: new_label,
            new_system,
            atom_map: AtomMap::from_new_to_old((0..shared).map(|i| (i, i))).unwrap(),
            logp_proposal: 0.0,
        };
        (state, proposal)
    }

    #[test]
    fn schedule_forms_parse_and_evaluate() {
        assert_eq!(Schedule::parse("lambda").unwrap().value(0.3), 0.3);
        assert_eq!(Schedule::parse("1").unwrap().value(0.0), 1.0);
        assert_eq!(Schedule::parse("lambda^2").unwrap().value(0.5), 0.25);
        assert_eq!(Schedule::parse("sqrt(lambda)").unwrap().value(0.25), 0.5);
    }

    #[test]
    fn unknown_schedule_form_is_a_config_error() {
        assert!(matches!(
            Schedule::parse("cosh(lambda)"),
            Err(ConfigError::UnknownSchedule(_))
        ));
    }

    #[test]
    fn all_schedules_are_fully_coupled_at_lambda_one() {
        let schedules = SwitchingSchedules::default();
        assert!(schedules.scaling_at(1.0).is_identity());
    }

    #[test]
    fn default_holds_bonds_coupled_at_lambda_zero() {
        let scaling = SwitchingSchedules::default().scaling_at(0.0);
        assert_eq!(scaling.bonds, 1.0);
        assert_eq!(scaling.sterics, 0.0);
        assert_eq!(scaling.electrostatics, 0.0);
    }

    #[test]
    fn from_named_rejects_unknown_category() {
        let named = HashMap::from([("hbonds".to_string(), "lambda".to_string())]);
        assert!(matches!(
            SwitchingSchedules::from_named(&named),
            Err(ConfigError::UnknownCategory(_))
        ));
    }

    #[test]
    fn from_named_overrides_only_named_categories() {
        let named = HashMap::from([("sterics".to_string(), "lambda^2".to_string())]);
        let schedules = SwitchingSchedules::from_named(&named).unwrap();
        assert_eq!(
            schedules.get(InteractionCategory::Sterics),
            Schedule::Squared
        );
        assert_eq!(
            schedules.get(InteractionCategory::Bonds),
            Schedule::Constant(1.0)
        );
    }

    #[test]
    fn eliminate_leg_switches_old_unmapped_atoms() {
        let (state, proposal) = proposal_between("CCCC", "CC");
        let builder = AlchemicalBuilder::default();
        let alchemical = builder.build(&state.system, &proposal, Direction::Eliminate);
        assert_eq!(alchemical.alchemical_atoms(), &HashSet::from([2, 3]));
        assert_eq!(alchemical.lambda_start(), 1.0);
        assert_eq!(alchemical.lambda_end(), 0.0);
    }

    #[test]
    fn introduce_leg_switches_new_unmapped_atoms() {
        let (_, proposal) = proposal_between("CC", "CCC");
        let builder = AlchemicalBuilder::default();
        let alchemical = builder.build(&proposal.new_system, &proposal, Direction::Introduce);
        assert_eq!(alchemical.alchemical_atoms(), &HashSet::from([2]));
        assert_eq!(alchemical.lambda_start(), 0.0);
        assert_eq!(alchemical.lambda_end(), 1.0);
    }

    #[test]
    fn identity_move_produces_trivial_alchemical_system() {
        let (state, proposal) = proposal_between("CCC", "CCC");
        let builder = AlchemicalBuilder::default();
        let alchemical = builder.build(&state.system, &proposal, Direction::Eliminate);
        assert!(alchemical.is_trivial());
    }
}
