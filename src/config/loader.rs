// Configuration loader
// Loads looper.toml from --config, $LOOPER_CONFIG or the working directory

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::{CONFIG_FILE_NAME, ENV_CONFIG_PATH};
use super::settings::LooperConfig;

/// Load configuration.
///
/// An explicit path (argument or env var) must exist. The implicit
/// `./looper.toml` is optional and its absence yields defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LooperConfig> {
    let from_env = std::env::var(ENV_CONFIG_PATH)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from);

    match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => {
            if !path.exists() {
                bail!("Configuration file not found: {}", path.display());
            }
            load_config_file(&path)
        }
        None => {
            let default_path = PathBuf::from(CONFIG_FILE_NAME);
            if default_path.exists() {
                load_config_file(&default_path)
            } else {
                tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                Ok(LooperConfig::default())
            }
        }
    }
}

pub fn load_config_file(path: &Path) -> Result<LooperConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
    let config = LooperConfig::from_toml_str(&contents)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    tracing::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_load_file_with_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("looper.toml");
        fs::write(&path, "[api]\nmodle = \"typo\"\n").unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("looper.toml"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("looper.toml");
        fs::write(&path, "[api]\nmodel = \"qwen3-32b\"\n[loop]\nauto_apply = true\n").unwrap();
        let config = load_config_file(&path).unwrap();
        assert_eq!(config.api.model, "qwen3-32b");
        assert!(config.looping.auto_apply);
    }
}
