use crate::config::Config;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::path::Path;

/// Load, parse and validate the tool configuration from a YAML file.
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("failed to open {}", config_path.display()))?;
    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("failed to parse {}", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Load the configuration, falling back to defaults when the file is
/// missing or unusable.
pub fn load_or_default(config_path: &Path) -> Config {
    if !config_path.exists() {
        warn!(
            "Configuration file {} not found, using defaults",
            config_path.display()
        );
        return Config::default();
    }
    match load_config(config_path) {
        Ok(config) => config,
        Err(err) => {
            warn!("{:#}; using defaults", err);
            Config::default()
        }
    }
}

/// Write `config` as YAML, creating parent directories as needed.
pub fn save_config(config: &Config, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(config_path, yaml)
        .wrap_err_with(|| format!("failed to write {}", config_path.display()))?;
    info!("Configuration written to {:?}", config_path);
    Ok(())
}
