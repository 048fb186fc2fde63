use crate::config::PipelineConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::path::Path;

/// Load and parse pipeline configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<PipelineConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;

    let config: PipelineConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    config.validate()?;

    if config.window.is_none() {
        warn!("No window configured, analysing all available history");
    }

    Ok(config)
}

/// Load the configuration if a path was given, defaults otherwise
pub fn load_config_or_default(config_path: Option<&Path>) -> Result<PipelineConfig> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}
