use super::alchemy::SwitchingSchedules;
use super::bias::MissingWeightPolicy;
use super::proposal::SelectionPolicy;
use crate::core::models::system::IdentityLabel;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Unknown interaction category: '{0}'")]
    UnknownCategory(String),
    #[error("Unknown schedule form: '{0}'")]
    UnknownSchedule(String),
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

/// The validated, immutable configuration of one sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub iterations: u64,
    pub temperature: f64,
    pub timestep_fs: f64,
    pub ncmc_steps: usize,
    pub schedules: SwitchingSchedules,
    pub candidates: Vec<IdentityLabel>,
    pub initial_identity: IdentityLabel,
    pub selection: SelectionPolicy,
    pub missing_weight_policy: MissingWeightPolicy,
    pub seed: Option<u64>,
    pub record_history: bool,
}

/// On-disk representation of [`SamplerConfig`]. Selection defaults to uniform
/// unless a transition matrix is given.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct SamplerConfigFile {
    iterations: u64,
    temperature: f64,
    timestep_fs: f64,
    ncmc_steps: usize,
    candidates: Vec<String>,
    initial_identity: String,
    #[serde(default)]
    schedules: HashMap<String, String>,
    #[serde(default)]
    transition_matrix: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    missing_weight_policy: MissingWeightPolicy,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    record_history: bool,
}

impl SamplerConfig {
    /// Loads and validates a run configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: SamplerConfigFile =
            toml::from_str(&content).map_err(|e| ConfigError::Toml {
                path: path.to_string_lossy().to_string(),
                source: e,
            })?;

        let selection = match file.transition_matrix {
            Some(matrix) => SelectionPolicy::TransitionMatrix(matrix),
            None => SelectionPolicy::Uniform,
        };

        SamplerConfigBuilder::new()
            .iterations(file.iterations)
            .temperature(file.temperature)
            .timestep_fs(file.timestep_fs)
            .ncmc_steps(file.ncmc_steps)
            .candidates(file.candidates.into_iter().map(IdentityLabel::new).collect())
            .initial_identity(IdentityLabel::new(file.initial_identity))
            .schedules(SwitchingSchedules::from_named(&file.schedules)?)
            .selection(selection)
            .missing_weight_policy(file.missing_weight_policy)
            .maybe_seed(file.seed)
            .record_history(file.record_history)
            .build()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "temperature",
                reason: format!("must be a positive temperature in Kelvin, got {}", self.temperature),
            });
        }
        if !(self.timestep_fs.is_finite() && self.timestep_fs > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "timestep_fs",
                reason: format!("must be a positive timestep in femtoseconds, got {}", self.timestep_fs),
            });
        }
        if self.candidates.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "candidates",
                reason: "the candidate identity set must not be empty".to_string(),
            });
        }
        if !self.candidates.contains(&self.initial_identity) {
            return Err(ConfigError::InvalidParameter {
                name: "initial_identity",
                reason: format!(
                    "'{}' is not in the candidate set",
                    self.initial_identity
                ),
            });
        }
        if let SelectionPolicy::TransitionMatrix(matrix) = &self.selection {
            let k = self.candidates.len();
            if matrix.len() != k {
                return Err(ConfigError::InvalidParameter {
                    name: "transition_matrix",
                    reason: format!("expected {k} rows, got {}", matrix.len()),
                });
            }
            for (index, row) in matrix.iter().enumerate() {
                if row.len() != k {
                    return Err(ConfigError::InvalidParameter {
                        name: "transition_matrix",
                        reason: format!("row {index} has {} entries, expected {k}", row.len()),
                    });
                }
                if row.iter().any(|&p| !p.is_finite() || p < 0.0) {
                    return Err(ConfigError::InvalidParameter {
                        name: "transition_matrix",
                        reason: format!("row {index} contains a negative or non-finite entry"),
                    });
                }
                let total: f64 = row.iter().sum();
                if (total - 1.0).abs() > 1e-9 {
                    return Err(ConfigError::InvalidParameter {
                        name: "transition_matrix",
                        reason: format!("row {index} sums to {total}, expected 1"),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct SamplerConfigBuilder {
    iterations: Option<u64>,
    temperature: Option<f64>,
    timestep_fs: Option<f64>,
    ncmc_steps: Option<usize>,
    schedules: Option<SwitchingSchedules>,
    candidates: Option<Vec<IdentityLabel>>,
    initial_identity: Option<IdentityLabel>,
    selection: Option<SelectionPolicy>,
    missing_weight_policy: Option<MissingWeightPolicy>,
    seed: Option<u64>,
    record_history: bool,
}

impl SamplerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iterations(mut self, iterations: u64) -> Self {
        self.iterations = Some(iterations);
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn timestep_fs(mut self, femtoseconds: f64) -> Self {
        self.timestep_fs = Some(femtoseconds);
        self
    }
    pub fn ncmc_steps(mut self, steps: usize) -> Self {
        self.ncmc_steps = Some(steps);
        self
    }
    pub fn schedules(mut self, schedules: SwitchingSchedules) -> Self {
        self.schedules = Some(schedules);
        self
    }
    pub fn candidates(mut self, candidates: Vec<IdentityLabel>) -> Self {
        self.candidates = Some(candidates);
        self
    }
    pub fn initial_identity(mut self, identity: IdentityLabel) -> Self {
        self.initial_identity = Some(identity);
        self
    }
    pub fn selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = Some(selection);
        self
    }
    pub fn missing_weight_policy(mut self, policy: MissingWeightPolicy) -> Self {
        self.missing_weight_policy = Some(policy);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn maybe_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn record_history(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }

    pub fn build(self) -> Result<SamplerConfig, ConfigError> {
        let config = SamplerConfig {
            iterations: self
                .iterations
                .ok_or(ConfigError::MissingParameter("iterations"))?,
            temperature: self
                .temperature
                .ok_or(ConfigError::MissingParameter("temperature"))?,
            timestep_fs: self
                .timestep_fs
                .ok_or(ConfigError::MissingParameter("timestep_fs"))?,
            ncmc_steps: self
                .ncmc_steps
                .ok_or(ConfigError::MissingParameter("ncmc_steps"))?,
            schedules: self.schedules.unwrap_or_default(),
            candidates: self
                .candidates
                .ok_or(ConfigError::MissingParameter("candidates"))?,
            initial_identity: self
                .initial_identity
                .ok_or(ConfigError::MissingParameter("initial_identity"))?,
            selection: self.selection.unwrap_or(SelectionPolicy::Uniform),
            missing_weight_policy: self.missing_weight_policy.unwrap_or_default(),
            seed: self.seed,
            record_history: self.record_history,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::energy::InteractionCategory;
    use crate::engine::alchemy::Schedule;
    use std::io::Write;

    fn minimal_builder() -> SamplerConfigBuilder {
        SamplerConfigBuilder::new()
            .iterations(10)
            .temperature(300.0)
            .timestep_fs(1.0)
            .ncmc_steps(5)
            .candidates(vec![IdentityLabel::from("CC"), IdentityLabel::from("CCC")])
            .initial_identity(IdentityLabel::from("CC"))
    }

    #[test]
    fn builder_produces_defaults_for_optional_fields() {
        let config = minimal_builder().build().unwrap();
        assert_eq!(config.selection, SelectionPolicy::Uniform);
        assert_eq!(
            config.missing_weight_policy,
            MissingWeightPolicy::ZeroWithWarning
        );
        assert_eq!(config.seed, None);
        assert!(!config.record_history);
    }

    #[test]
    fn builder_rejects_missing_required_parameter() {
        let result = SamplerConfigBuilder::new()
            .iterations(10)
            .temperature(300.0)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::MissingParameter("timestep_fs"))
        ));
    }

    #[test]
    fn zero_iterations_is_invalid() {
        let result = minimal_builder().iterations(0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "iterations",
                ..
            })
        ));
    }

    #[test]
    fn negative_temperature_is_invalid() {
        let result = minimal_builder().temperature(-10.0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "temperature",
                ..
            })
        ));
    }

    #[test]
    fn initial_identity_must_be_a_candidate() {
        let result = minimal_builder()
            .initial_identity(IdentityLabel::from("CCCCCC"))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "initial_identity",
                ..
            })
        ));
    }

    #[test]
    fn transition_matrix_rows_must_be_stochastic() {
        let result = minimal_builder()
            .selection(SelectionPolicy::TransitionMatrix(vec![
                vec![0.5, 0.5],
                vec![0.9, 0.2],
            ]))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "transition_matrix",
                ..
            })
        ));
    }

    #[test]
    fn transition_matrix_must_match_candidate_count() {
        let result = minimal_builder()
            .selection(SelectionPolicy::TransitionMatrix(vec![vec![1.0]]))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "transition_matrix",
                ..
            })
        ));
    }

    #[test]
    fn load_reads_a_complete_toml_configuration() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
iterations = 100
temperature = 300.0
timestep-fs = 1.0
ncmc-steps = 10
candidates = ["CC", "CCC", "CCCC"]
initial-identity = "CCC"
missing-weight-policy = "fatal"
seed = 42
record-history = true

[schedules]
sterics = "lambda^2"
"#
        )
        .unwrap();
        let config = SamplerConfig::load(file.path()).unwrap();
        assert_eq!(config.iterations, 100);
        assert_eq!(config.initial_identity, IdentityLabel::from("CCC"));
        assert_eq!(config.missing_weight_policy, MissingWeightPolicy::Fatal);
        assert_eq!(config.seed, Some(42));
        assert!(config.record_history);
        assert_eq!(
            config.schedules.get(InteractionCategory::Sterics),
            Schedule::Squared
        );
    }

    #[test]
    fn load_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
iterations = 100
temperature = 300.0
timestep-fs = 1.0
ncmc-steps = 10
candidates = ["CC"]
initial-identity = "CC"
thermostat = "nose-hoover"
"#
        )
        .unwrap();
        assert!(matches!(
            SamplerConfig::load(file.path()),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn load_accepts_a_transition_matrix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
iterations = 5
temperature = 300.0
timestep-fs = 1.0
ncmc-steps = 0
candidates = ["CC", "CCC"]
initial-identity = "CC"
transition-matrix = [[0.25, 0.75], [0.5, 0.5]]
"#
        )
        .unwrap();
        let config = SamplerConfig::load(file.path()).unwrap();
        assert!(matches!(
            config.selection,
            SelectionPolicy::TransitionMatrix(_)
        ));
    }
}
