// Read-only loop status snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phases::{IterationOutcome, IterationReport, Phase};
use crate::goals::{Goal, GoalCollection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
    Completed,
    /// Only ever seen in the snapshot returned for an unknown id
    NotFound,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalStatus {
    pub name: String,
    pub category: String,
    pub progress: f64,
    pub completed: bool,
}

impl From<&Goal> for GoalStatus {
    fn from(goal: &Goal) -> Self {
        Self {
            name: goal.name.clone(),
            category: goal.category.to_string(),
            progress: goal.progress_percentage(),
            completed: goal.is_completed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStatus {
    pub loop_id: String,
    pub state: LoopState,
    pub running: bool,
    pub iteration: u32,
    pub max_iterations: u32,
    pub current_phase: Phase,
    pub goals: Vec<GoalStatus>,
    pub overall_progress: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_outcome: Option<IterationOutcome>,
    #[serde(default)]
    pub recent_reports: Vec<IterationReport>,
}

impl LoopStatus {
    pub fn idle(loop_id: impl Into<String>, max_iterations: u32, goals: &GoalCollection) -> Self {
        Self {
            loop_id: loop_id.into(),
            state: LoopState::Idle,
            running: false,
            iteration: 0,
            max_iterations,
            current_phase: Phase::Idle,
            goals: goals.all().into_iter().map(GoalStatus::from).collect(),
            overall_progress: goals.overall_progress(),
            started_at: None,
            last_activity: None,
            last_outcome: None,
            recent_reports: Vec::new(),
        }
    }

    /// Snapshot for an id the registry does not know
    pub fn not_found(loop_id: impl Into<String>) -> Self {
        Self {
            state: LoopState::NotFound,
            max_iterations: 0,
            ..Self::idle(loop_id, 0, &GoalCollection::new())
        }
    }

    pub fn is_found(&self) -> bool {
        self.state != LoopState::NotFound
    }
}
