use super::error::EngineError;
use crate::core::models::system::IdentityLabel;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum BiasLoadError {
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

/// Policy for identities absent from the bias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingWeightPolicy {
    /// Use a log-weight of zero and record a warning.
    #[default]
    ZeroWithWarning,
    /// Escalate to an error; the chain must not proceed.
    Fatal,
}

/// An immutable mapping from discrete identity to expanded-ensemble
/// log-weight. Refreshing the table means building a new one and swapping it
/// into a [`BiasHandle`]; entries are never mutated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiasTable {
    weights: HashMap<IdentityLabel, f64>,
}

impl BiasTable {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (IdentityLabel, f64)>) -> Self {
        Self {
            weights: pairs.into_iter().collect(),
        }
    }

    /// Loads a table from a TOML file of `identity = log_weight` entries.
    pub fn load(path: &Path) -> Result<Self, BiasLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| BiasLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let raw: HashMap<String, f64> =
            toml::from_str(&content).map_err(|e| BiasLoadError::Toml {
                path: path.to_string_lossy().to_string(),
                source: e,
            })?;
        Ok(Self::from_pairs(
            raw.into_iter().map(|(k, v)| (IdentityLabel::new(k), v)),
        ))
    }

    pub fn get(&self, identity: &IdentityLabel) -> Option<f64> {
        self.weights.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// The log-weight for `identity` under the given missing-entry policy.
    pub fn log_weight(
        &self,
        identity: &IdentityLabel,
        policy: MissingWeightPolicy,
    ) -> Result<f64, EngineError> {
        match self.get(identity) {
            Some(weight) => Ok(weight),
            None => match policy {
                MissingWeightPolicy::ZeroWithWarning => {
                    warn!(%identity, "No bias weight recorded; using log-weight 0.");
                    Ok(0.0)
                }
                MissingWeightPolicy::Fatal => Err(EngineError::MissingBiasWeight {
                    identity: identity.clone(),
                }),
            },
        }
    }
}

/// Shared read path into the current bias table.
///
/// The driver takes one snapshot per iteration; an external estimation
/// process publishes refreshed tables with [`BiasHandle::store`]. Readers
/// always observe a complete mapping, never a partial update.
#[derive(Debug, Clone, Default)]
pub struct BiasHandle {
    inner: Arc<RwLock<Arc<BiasTable>>>,
}

impl BiasHandle {
    pub fn new(table: BiasTable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    pub fn snapshot(&self) -> Arc<BiasTable> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self, table: BiasTable) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn label(s: &str) -> IdentityLabel {
        IdentityLabel::from(s)
    }

    #[test]
    fn log_weight_returns_recorded_entry() {
        let table = BiasTable::from_pairs([(label("CC"), -1.5)]);
        let weight = table
            .log_weight(&label("CC"), MissingWeightPolicy::Fatal)
            .unwrap();
        assert_eq!(weight, -1.5);
    }

    #[test]
    fn missing_entry_defaults_to_zero_with_warning_policy() {
        let table = BiasTable::default();
        let weight = table
            .log_weight(&label("CCC"), MissingWeightPolicy::ZeroWithWarning)
            .unwrap();
        assert_eq!(weight, 0.0);
    }

    #[test]
    fn missing_entry_escalates_under_fatal_policy() {
        let table = BiasTable::default();
        let result = table.log_weight(&label("CCC"), MissingWeightPolicy::Fatal);
        assert!(matches!(
            result,
            Err(EngineError::MissingBiasWeight { .. })
        ));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_store() {
        let handle = BiasHandle::new(BiasTable::from_pairs([(label("CC"), 1.0)]));
        let snapshot = handle.snapshot();
        handle.store(BiasTable::from_pairs([(label("CC"), 2.0)]));
        assert_eq!(snapshot.get(&label("CC")), Some(1.0));
        assert_eq!(handle.snapshot().get(&label("CC")), Some(2.0));
    }

    #[test]
    fn load_reads_toml_weight_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CC = 0.0\nCCC = -2.5").unwrap();
        let table = BiasTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&label("CCC")), Some(-2.5));
    }

    #[test]
    fn load_reports_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CC = \"not a number\"").unwrap();
        assert!(matches!(
            BiasTable::load(file.path()),
            Err(BiasLoadError::Toml { .. })
        ));
    }
}
