// Activity log, one JSONL file per loop at <dir>/<loop_id>.jsonl

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::phases::{NotCommittedReason, Phase, ReviewVerdict};
use super::status::LoopState;

/// An event logged by a loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    LoopStarted { max_iterations: u32 },
    IterationStart { iteration: u32 },
    /// A phase produced its output
    PhaseComplete { iteration: u32, phase: Phase, chars: usize },
    ActionApplied { iteration: u32, action: usize, summary: String },
    MetricUpdated { iteration: u32, name: String, value: f64 },
    Review { iteration: u32, verdict: ReviewVerdict, approved: bool },
    Commit { iteration: u32, hash: String, msg: String },
    NotCommitted { iteration: u32, reason: NotCommittedReason },
    IterationFailed { iteration: u32, phase: Phase, error: String },
    GoalSubmitted { name: String },
    LoopStopped { state: LoopState, iterations: u32 },
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a LoopEvent,
}

pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(dir: &Path, loop_id: Uuid) -> Self {
        Self {
            path: dir.join(format!("{}.jsonl", loop_id)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event
    pub fn log(&self, event: &LoopEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let entry = LogEntry {
            ts: Utc::now().to_rfc3339(),
            event,
        };
        let json = serde_json::to_string(&entry).context("Failed to serialize activity event")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open activity log: {}", self.path.display()))?;

        writeln!(file, "{}", json).context("Failed to write activity event")?;
        Ok(())
    }
}
