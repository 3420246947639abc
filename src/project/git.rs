// Git CLI wrapper used as the loop's version-control collaborator

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::VersionControl;

const COMMIT_NAME: &str = "Looper Agent";
const COMMIT_EMAIL: &str = "looper@localhost";

pub struct GitRepository {
    path: PathBuf,
    /// Paths relative to the repository root that are never staged or
    /// counted as pending changes
    excluded: Vec<PathBuf>,
}

impl GitRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            excluded: Vec::new(),
        }
    }

    /// Leave `path` (absolute or relative to the repository root) out of
    /// status checks and commits. Paths outside the repository are skipped.
    pub fn excluding(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let relative = if path.is_absolute() || path.starts_with(&self.path) {
            path.strip_prefix(&self.path).ok().map(Path::to_path_buf)
        } else {
            Some(path.to_path_buf())
        };
        match relative {
            Some(rel) if !rel.as_os_str().is_empty() => self.excluded.push(rel),
            _ => tracing::debug!(
                "{} is outside {}, not excluded",
                path.display(),
                self.path.display()
            ),
        }
        self
    }

    /// `.` plus one `:(exclude)` pathspec per excluded path
    fn pathspecs(&self) -> Vec<String> {
        let mut specs = vec![".".to_string()];
        specs.extend(
            self.excluded
                .iter()
                .map(|p| format!(":(exclude){}", p.display())),
        );
        specs
    }

    pub fn is_repository(&self) -> bool {
        self.path.join(".git").exists()
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run git {}", args.first().unwrap_or(&"")))
    }
}

#[async_trait]
impl VersionControl for GitRepository {
    async fn has_pending_changes(&self) -> Result<bool> {
        let specs = self.pathspecs();
        let mut args = vec!["status", "--porcelain", "--untracked-files=all", "--"];
        args.extend(specs.iter().map(String::as_str));
        let status = self.git(&args).await?;
        if !status.status.success() {
            bail!("git status failed: {}", String::from_utf8_lossy(&status.stderr));
        }
        Ok(!status.stdout.is_empty())
    }

    async fn commit(&self, message: &str) -> Result<String> {
        let specs = self.pathspecs();
        let mut args = vec!["add", "-A", "--"];
        args.extend(specs.iter().map(String::as_str));
        let add = self.git(&args).await?;
        if !add.status.success() {
            bail!("git add failed: {}", String::from_utf8_lossy(&add.stderr));
        }

        let name = format!("user.name={}", COMMIT_NAME);
        let email = format!("user.email={}", COMMIT_EMAIL);
        let commit = self
            .git(&["-c", &name, "-c", &email, "commit", "-m", message])
            .await?;
        if !commit.status.success() {
            bail!("git commit failed: {}", String::from_utf8_lossy(&commit.stderr));
        }

        let log = self.git(&["log", "-1", "--format=%h"]).await?;
        let hash = String::from_utf8_lossy(&log.stdout).trim().to_string();
        tracing::info!("Committed {} ({})", message.lines().next().unwrap_or(""), hash);
        Ok(hash)
    }
}
