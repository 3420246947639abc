// Goal collection
// Name-keyed goals plus the goals.toml document

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::goal::{Goal, GoalCategory};

/// Goals keyed by name. Re-adding a name replaces the goal and drops its history.
#[derive(Debug, Clone, Default)]
pub struct GoalCollection {
    goals: BTreeMap<String, Goal>,
}

impl GoalCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, goal: Goal) {
        self.goals.insert(goal.name.clone(), goal);
    }

    pub fn get(&self, name: &str) -> Option<&Goal> {
        self.goals.get(name)
    }

    /// Returns false for an unknown name.
    pub fn update(&mut self, name: &str, value: f64) -> bool {
        match self.goals.get_mut(name) {
            Some(goal) => {
                goal.update_progress(value);
                true
            }
            None => false,
        }
    }

    pub fn all(&self) -> Vec<&Goal> {
        self.goals.values().collect()
    }

    pub fn completed(&self) -> Vec<&Goal> {
        self.goals.values().filter(|g| g.is_completed()).collect()
    }

    pub fn pending(&self) -> Vec<&Goal> {
        self.goals.values().filter(|g| !g.is_completed()).collect()
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Mean progress over all goals, 0 when empty.
    pub fn overall_progress(&self) -> f64 {
        if self.goals.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.goals.values().map(Goal::progress_percentage).sum();
        sum / self.goals.len() as f64
    }

    /// Bullet list of every goal, as fed to the analyze call.
    pub fn describe(&self) -> String {
        self.goals
            .values()
            .map(Goal::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Load goals from a TOML document (`[[goals]]` tables).
    ///
    /// A missing file yields an empty collection.
    pub fn load(path: &Path) -> Result<Self> {
        let mut collection = Self::new();
        if !path.exists() {
            return Ok(collection);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read goals from {}", path.display()))?;
        let file: GoalsFile = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse goals file {}", path.display()))?;
        for entry in file.goals {
            collection.add(entry.into_goal());
        }
        Ok(collection)
    }

    /// Write goals back, including derived progress fields for readers.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create goals directory {}", parent.display())
                })?;
            }
        }
        let file = GoalsFile {
            goals: self.goals.values().map(GoalEntry::from_goal).collect(),
        };
        let contents = toml::to_string_pretty(&file).context("Failed to serialize goals")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write goals to {}", path.display()))?;
        tracing::info!("Saved {} goals to {}", self.goals.len(), path.display());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GoalsFile {
    #[serde(default)]
    goals: Vec<GoalEntry>,
}

/// On-disk shape of a goal. Derived fields are written for readers and ignored on load.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GoalEntry {
    name: String,
    description: String,
    category: GoalCategory,
    target_value: f64,
    #[serde(default)]
    current_value: f64,
    #[serde(default = "default_unit")]
    unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

fn default_unit() -> String {
    "value".to_string()
}

impl GoalEntry {
    fn from_goal(goal: &Goal) -> Self {
        Self {
            name: goal.name.clone(),
            description: goal.description.clone(),
            category: goal.category,
            target_value: goal.target_value,
            current_value: goal.current_value,
            unit: goal.unit.clone(),
            progress_percentage: Some(goal.progress_percentage()),
            is_completed: Some(goal.is_completed()),
            metadata: goal
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn into_goal(self) -> Goal {
        let mut goal = Goal::new(
            self.name,
            self.description,
            self.category,
            self.target_value,
            self.current_value,
            self.unit,
        );
        goal.metadata.extend(self.metadata);
        goal
    }
}
