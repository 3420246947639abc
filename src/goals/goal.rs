// Goal: a named optimization target with current/target values

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Category of an optimization goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCategory {
    Performance,
    Feature,
    BugFix,
    UserExperience,
    Accessibility,
    Seo,
    CodeQuality,
}

impl GoalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalCategory::Performance => "performance",
            GoalCategory::Feature => "feature",
            GoalCategory::BugFix => "bug_fix",
            GoalCategory::UserExperience => "user_experience",
            GoalCategory::Accessibility => "accessibility",
            GoalCategory::Seo => "seo",
            GoalCategory::CodeQuality => "code_quality",
        }
    }
}

impl fmt::Display for GoalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GoalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "performance" => Ok(Self::Performance),
            "feature" => Ok(Self::Feature),
            "bug_fix" => Ok(Self::BugFix),
            "user_experience" => Ok(Self::UserExperience),
            "accessibility" => Ok(Self::Accessibility),
            "seo" => Ok(Self::Seo),
            "code_quality" => Ok(Self::CodeQuality),
            _ => Err(format!("Unknown goal category: {s}")),
        }
    }
}

/// An optimization goal.
///
/// `history` holds every `current_value` that was overwritten by
/// [`Goal::update_progress`], oldest first. It is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub description: String,
    pub category: GoalCategory,
    pub target_value: f64,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(skip)]
    history: Vec<f64>,
}

fn default_unit() -> String {
    "value".to_string()
}

impl Goal {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: GoalCategory,
        target_value: f64,
        current_value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            target_value,
            current_value,
            unit: unit.into(),
            metadata: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record the previous value in history, then overwrite it.
    pub fn update_progress(&mut self, new_value: f64) {
        self.history.push(self.current_value);
        self.current_value = new_value;
    }

    /// Progress towards the target, capped at 100.
    ///
    /// A zero target counts as satisfied only when the current value is also
    /// zero. Values below zero are clamped to 0 so a regression never reports
    /// negative progress.
    pub fn progress_percentage(&self) -> f64 {
        if self.target_value == 0.0 {
            return if self.current_value == 0.0 { 100.0 } else { 0.0 };
        }
        let pct = self.current_value / self.target_value * 100.0;
        if pct.is_nan() {
            return 0.0;
        }
        pct.clamp(0.0, 100.0)
    }

    pub fn is_completed(&self) -> bool {
        self.current_value >= self.target_value
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// One-line description used in analysis prompts.
    pub fn describe(&self) -> String {
        format!(
            "- {}: {} ({}{} -> {}{}, progress {:.1}%)",
            self.name,
            self.description,
            self.current_value,
            self.unit,
            self.target_value,
            self.unit,
            self.progress_percentage()
        )
    }
}
