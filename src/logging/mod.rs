// Tracing subscriber setup
//
// RUST_LOG overrides the configured level. Logs go to stderr so command
// output on stdout stays clean; an optional file receives a plain copy.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Directive used when neither RUST_LOG nor `verbose` is set
pub fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "looper=debug,info".to_string()
    } else {
        config.level.clone()
    }
}

pub fn build_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    let directive = filter_directive(config, verbose);
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Call once at startup.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(config, verbose))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Logging already initialized")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_configured_level() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            file: None,
        };
        assert_eq!(filter_directive(&config, false), "warn");
        assert!(filter_directive(&config, true).contains("looper=debug"));
    }

    #[test]
    fn test_invalid_level_falls_back() {
        let config = LoggingConfig {
            level: "not a [valid directive".to_string(),
            file: None,
        };
        // Must not panic regardless of RUST_LOG
        let _ = build_filter(&config, false);
    }
}
