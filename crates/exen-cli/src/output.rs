use crate::error::Result;
use exen::workflows::sample::IterationOutcome;
use std::path::Path;

/// Writes the per-iteration chain log as CSV, one row per iteration with the
/// acceptance decision and its term breakdown.
pub fn write_chain_log(path: &Path, outcomes: &[IterationOutcome]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "iteration",
        "proposed_identity",
        "accepted",
        "logp_accept",
        "rejection",
        "logp_proposal",
        "logp_geometry",
        "logp_eliminate",
        "logp_introduce",
        "log_weight_new",
        "log_weight_current",
    ])?;

    for outcome in outcomes {
        let rejection = outcome.rejection.map(|r| r.as_str()).unwrap_or("");
        let terms = outcome.terms;
        let term_field = |value: Option<f64>| match value {
            Some(v) => v.to_string(),
            None => String::new(),
        };
        writer.write_record([
            outcome.iteration.to_string(),
            outcome.proposed_identity.to_string(),
            outcome.accepted.to_string(),
            outcome.logp_accept.to_string(),
            rejection.to_string(),
            term_field(terms.map(|t| t.logp_proposal)),
            term_field(terms.map(|t| t.logp_geometry)),
            term_field(terms.map(|t| t.logp_eliminate)),
            term_field(terms.map(|t| t.logp_introduce)),
            term_field(terms.map(|t| t.log_weight_new)),
            term_field(terms.map(|t| t.log_weight_current)),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
