// Proposal writer: stores generated code as reviewable files

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;

use super::ChangeApplier;
use crate::looper::PlanAction;

/// Writes each generated change to `<dir>/<timestamp>-<n>-<slug>.md`.
///
/// Nothing in the project tree is edited; the proposal files themselves are
/// the change that a later commit picks up.
pub struct ProposalWriter {
    dir: PathBuf,
}

impl ProposalWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ChangeApplier for ProposalWriter {
    async fn apply(&self, generated_code: &str, action: &PlanAction) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create proposals directory {}", self.dir.display()))?;

        let file_name = format!(
            "{}-{}-{}.md",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            action.index,
            slug(&action.description)
        );
        let path = self.dir.join(file_name);
        let body = format!("# {}\n\n{}\n", action.description, generated_code.trim_end());

        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write proposal {}", path.display()))?;

        tracing::info!("Wrote proposal {}", path.display());
        Ok(format!("proposal written to {}", path.display()))
    }
}

/// Lowercase ascii alphanumerics joined by dashes, at most 40 chars
fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
        if out.len() >= 40 {
            break;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "action".to_string()
    } else {
        trimmed.to_string()
    }
}
