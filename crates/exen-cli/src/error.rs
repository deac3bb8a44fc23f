use exen::engine::bias::BiasLoadError;
use exen::engine::config::ConfigError;
use exen::engine::error::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bias table error: {0}")]
    BiasTable(#[from] BiasLoadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chain log error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),
}
