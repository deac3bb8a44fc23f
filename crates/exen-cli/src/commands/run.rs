use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::output;
use crate::progress::CliProgressHandler;
use exen::engine::bias::{BiasHandle, BiasTable};
use exen::engine::config::SamplerConfig;
use exen::engine::identity::{AlkaneChainProvider, IdentityProvider};
use exen::engine::progress::ProgressReporter;
use exen::workflows;
use std::sync::Arc;
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let mut config = SamplerConfig::load(&args.config)?;
    if let Some(iterations) = args.iterations {
        if iterations == 0 {
            return Err(CliError::Argument(
                "--iterations must be at least 1".to_string(),
            ));
        }
        info!(iterations, "Overriding iteration count from the command line.");
        config.iterations = iterations;
    }
    if let Some(seed) = args.seed {
        info!(seed, "Overriding random seed from the command line.");
        config.seed = Some(seed);
    }

    let bias = match &args.bias {
        Some(path) => {
            let table = BiasTable::load(path)?;
            info!(entries = table.len(), path = %path.display(), "Loaded bias table.");
            BiasHandle::new(table)
        }
        None => {
            info!("No bias table supplied; all identities carry log-weight 0.");
            BiasHandle::default()
        }
    };

    let provider: Arc<dyn IdentityProvider> = Arc::new(AlkaneChainProvider::default());
    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting expanded-ensemble sampling...");
    info!("Invoking the core sampling workflow...");
    let result = workflows::sample::run(config, provider, bias, &reporter)?;

    if let Some(path) = &args.output {
        output::write_chain_log(path, &result.outcomes)?;
        println!("Chain log written to: {}", path.display());
    }

    println!(
        "Sampling complete: {}/{} moves accepted, final identity '{}'.",
        result.accepted(),
        result.total(),
        result.final_state.identity
    );
    Ok(())
}
