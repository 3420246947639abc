// Credential pool with round-robin selection

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::constants::{ENV_API_KEY, ENV_API_KEYS, KEY_FILE_NAME};
use crate::errors::{LooperError, Result};

/// Pool of API keys handed out in strict rotation.
///
/// The cursor lock covers only the read-and-advance of the index, never the
/// request that uses the key.
#[derive(Debug)]
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: Mutex<usize>,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Result<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(LooperError::MissingCredentials);
        }
        Ok(Self {
            keys,
            cursor: Mutex::new(0),
        })
    }

    /// Resolve keys from explicit values, the environment, then key files
    pub fn discover(explicit: &[String]) -> Result<Self> {
        Self::discover_from(explicit, |name| std::env::var(name).ok(), &default_key_files())
    }

    /// Resolution with injectable environment and key file candidates
    pub fn discover_from<E>(explicit: &[String], env: E, key_files: &[PathBuf]) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        if explicit.iter().any(|k| !k.trim().is_empty()) {
            return Self::new(explicit.to_vec());
        }

        if let Some(list) = env(ENV_API_KEYS).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using API keys from {}", ENV_API_KEYS);
            return Self::new(list.split(',').map(str::to_string).collect());
        }

        if let Some(key) = env(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using API key from {}", ENV_API_KEY);
            return Self::new(vec![key]);
        }

        for path in key_files {
            if !path.exists() {
                continue;
            }
            let keys = read_key_file(path)?;
            if !keys.is_empty() {
                tracing::debug!("Loaded {} API key(s) from {}", keys.len(), path.display());
                return Self::new(keys);
            }
        }

        Err(LooperError::MissingCredentials)
    }

    /// Claim the key at the cursor and advance it, returning (index, key)
    pub fn claim(&self) -> (usize, &str) {
        let index = {
            let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
            let index = *cursor;
            *cursor = (index + 1) % self.keys.len();
            index
        };
        (index, &self.keys[index])
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// `./.looper-keys`, then `~/.looper/keys`
pub fn default_key_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from(KEY_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        files.push(home.join(".looper").join("keys"));
    }
    files
}

/// One key per line; blank lines and `#` comments are skipped
fn read_key_file(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}
