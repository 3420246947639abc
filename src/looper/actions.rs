// Plan interpretation
//
// Numbered items (`1.` or `2)`) become actions. Lines after an item belong to
// it until the next item. `[code]` anywhere in an item asks for generated
// code; a `metric: <name> = <value>` line attaches a metric update. Text with
// no numbered item at all is a single action.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)[.)]\s+(.+)$").expect("valid plan item regex"));

static METRIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*[-*]?\s*metric:\s*([A-Za-z0-9_.\-]+)\s*=\s*(-?\d+(?:\.\d+)?)")
        .expect("valid metric regex")
});

const CODE_MARKER: &str = "[code]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUpdate {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAction {
    /// Position in the plan, starting at 1
    pub index: usize,
    pub description: String,
    /// Continuation lines under the item
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    pub requires_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_update: Option<MetricUpdate>,
}

impl PlanAction {
    pub fn new(index: usize, description: impl Into<String>, requires_code: bool) -> Self {
        Self {
            index,
            description: description.into(),
            details: String::new(),
            requires_code,
            metric_update: None,
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metric_update = Some(MetricUpdate {
            name: name.into(),
            value,
        });
        self
    }

    /// Task text handed to code generation
    pub fn task(&self) -> String {
        if self.details.is_empty() {
            self.description.clone()
        } else {
            format!("{}\n{}", self.description, self.details)
        }
    }
}

pub fn parse_plan(plan: &str) -> Vec<PlanAction> {
    let mut actions: Vec<PlanAction> = Vec::new();

    for line in plan.lines() {
        if let Some(caps) = ITEM.captures(line) {
            let text = &caps[2];
            let requires_code = has_code_marker(text);
            let description = strip_code_marker(text);
            actions.push(PlanAction::new(actions.len() + 1, description, requires_code));
            continue;
        }

        let Some(current) = actions.last_mut() else {
            continue;
        };

        if let Some(caps) = METRIC.captures(line) {
            if let Ok(value) = caps[2].parse::<f64>() {
                current.metric_update = Some(MetricUpdate {
                    name: caps[1].to_string(),
                    value,
                });
                continue;
            }
        }

        if has_code_marker(line) {
            current.requires_code = true;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            if !current.details.is_empty() {
                current.details.push('\n');
            }
            current.details.push_str(trimmed);
        }
    }

    if actions.is_empty() {
        let description = plan.trim();
        if !description.is_empty() {
            actions.push(PlanAction::new(1, description, false));
        }
    }

    actions
}

fn has_code_marker(text: &str) -> bool {
    text.to_ascii_lowercase().contains(CODE_MARKER)
}

fn strip_code_marker(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    match lower.find(CODE_MARKER) {
        Some(pos) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..pos]);
            out.push_str(&text[pos + CODE_MARKER.len()..]);
            out.split_whitespace().collect::<Vec<_>>().join(" ")
        }
        None => text.trim().to_string(),
    }
}
