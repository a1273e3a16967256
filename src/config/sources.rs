//! Configuration sources, lowest precedence first.

use crate::error::PublishError;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use std::path::Path;

/// Selects `config/{name}.toml` on top of the base file.
pub const ENV_NAME: &str = "LEARNCRAFTER_ENV";
/// Prefix of override variables, e.g. `LEARNCRAFTER__ORCHESTRATOR__WORKER_POOL_SIZE`.
pub const ENV_PREFIX: &str = "LEARNCRAFTER";

/// Add `config/config.toml` then `config/{LEARNCRAFTER_ENV}.toml` under `base_dir`.
/// Both are optional.
pub fn add_directory_files(
    builder: ConfigBuilder<DefaultState>,
    base_dir: &Path,
) -> Result<ConfigBuilder<DefaultState>, PublishError> {
    let config_dir = base_dir.join("config");
    let env_name = std::env::var(ENV_NAME).unwrap_or_else(|_| "development".to_string());

    let mut builder = builder;
    for path in [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", env_name)),
    ] {
        if path.exists() {
            builder = builder.add_source(File::from(path).required(false));
        }
    }
    Ok(builder)
}

/// Add a file named on the command line; it must exist.
pub fn add_explicit_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, PublishError> {
    if !path.exists() {
        return Err(PublishError::ConfigError(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    Ok(builder.add_source(File::from(path).required(true)))
}

pub fn add_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
