// Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use looper::client::{prompts, ChatBackend, ChatMessage};
use looper::errors::Result;
use looper::looper::{Collaborators, PlanAction};
use looper::project::{ChangeApplier, ContextProvider, VersionControl};

/// Answers each call shape with a fixed reply, keyed on the system prompt
pub struct ScriptedBackend {
    pub analysis: String,
    pub plan: String,
    pub code: String,
    pub review: String,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedBackend {
    pub fn new(plan: &str, review: &str) -> Arc<Self> {
        Arc::new(Self {
            analysis: "Issues: cold start is slow".to_string(),
            plan: plan.to_string(),
            code: "fn cached() {}".to_string(),
            review: review.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.calls().iter().filter(|c| **c == kind).count()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let kind = match messages.first().map(|m| m.content.as_str()) {
            Some(prompts::ANALYZE_SYSTEM_PROMPT) => "analyze",
            Some(prompts::PLAN_SYSTEM_PROMPT) => "plan",
            Some(prompts::GENERATE_SYSTEM_PROMPT) => "generate",
            Some(prompts::REVIEW_SYSTEM_PROMPT) => "review",
            _ => "chat",
        };
        self.calls.lock().unwrap().push(kind);
        Ok(match kind {
            "analyze" => self.analysis.clone(),
            "plan" => self.plan.clone(),
            "generate" => self.code.clone(),
            "review" => self.review.clone(),
            _ => format!(
                "echo: {}",
                messages.last().map(|m| m.content.as_str()).unwrap_or_default()
            ),
        })
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

pub struct StaticContext(pub &'static str);

impl ContextProvider for StaticContext {
    fn build_context(&self) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
pub struct MemoryApplier {
    pub applied: Mutex<Vec<(usize, String)>>,
}

#[async_trait]
impl ChangeApplier for MemoryApplier {
    async fn apply(&self, generated_code: &str, action: &PlanAction) -> anyhow::Result<String> {
        self.applied
            .lock()
            .unwrap()
            .push((action.index, generated_code.to_string()));
        Ok(format!("stored change for action {}", action.index))
    }
}

#[derive(Default)]
pub struct MemoryVcs {
    pub commits: Mutex<Vec<String>>,
}

#[async_trait]
impl VersionControl for MemoryVcs {
    async fn commit(&self, message: &str) -> anyhow::Result<String> {
        let mut commits = self.commits.lock().unwrap();
        commits.push(message.to_string());
        Ok(format!("{:07x}", commits.len()))
    }

    async fn has_pending_changes(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

pub struct Fakes {
    pub applier: Arc<MemoryApplier>,
    pub vcs: Arc<MemoryVcs>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            applier: Arc::new(MemoryApplier::default()),
            vcs: Arc::new(MemoryVcs::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            context: Arc::new(StaticContext("# demo project\nCargo.toml")),
            applier: self.applier.clone(),
            vcs: self.vcs.clone(),
        }
    }

    pub fn commit_count(&self) -> usize {
        self.vcs.commits.lock().unwrap().len()
    }
}
