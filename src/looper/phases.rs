// Phases, review verdicts and iteration outcomes

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a loop currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Analyze,
    Plan,
    Execute,
    Review,
    Commit,
    Sleeping,
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Analyze => "analyze",
            Phase::Plan => "plan",
            Phase::Execute => "execute",
            Phase::Review => "review",
            Phase::Commit => "commit",
            Phase::Sleeping => "sleeping",
            Phase::Finished => "finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    Conditional,
    Rejected,
    Unknown,
}

static VERDICT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(APPROVED|CONDITIONAL|REJECTED)\b").expect("valid verdict regex")
});

impl ReviewVerdict {
    /// Last verdict token in the reply, case-insensitive
    pub fn parse(review: &str) -> Self {
        let upper = review.to_uppercase();
        match VERDICT_TOKEN.find_iter(&upper).last().map(|m| m.as_str()) {
            Some("APPROVED") => ReviewVerdict::Approved,
            Some("CONDITIONAL") => ReviewVerdict::Conditional,
            Some("REJECTED") => ReviewVerdict::Rejected,
            _ => ReviewVerdict::Unknown,
        }
    }
}

/// Commit gate: the reply must contain the literal `APPROVED` token.
///
/// Deliberately a plain containment check, so "NOT APPROVED" also passes.
pub fn review_approves(review: &str) -> bool {
    review.contains("APPROVED")
}

/// Deliberate no-commit paths; none of these is an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotCommittedReason {
    ReviewRejected,
    AutoApplyDisabled,
    NothingToCommit,
    CommitFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IterationOutcome {
    Committed { commit: String },
    NotCommitted { reason: NotCommittedReason },
    Failed { phase: Phase, error: String },
}

impl IterationOutcome {
    /// Label used for the iterations counter
    pub fn label(&self) -> &'static str {
        match self {
            IterationOutcome::Committed { .. } => "committed",
            IterationOutcome::NotCommitted { .. } => "not_committed",
            IterationOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, IterationOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: u32,
    pub outcome: IterationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ReviewVerdict>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}
