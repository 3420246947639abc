// Chat-completion backend
//
// `ChatBackend::complete` is the one primitive; the five call shapes are
// provided methods that render a fixed system prompt and a user template.
// None of them retries.

pub mod credentials;
pub mod models;
pub mod prompts;
pub mod retry;
mod rotating;
pub mod types;

use async_trait::async_trait;

use crate::errors::Result;

pub use credentials::CredentialPool;
pub use rotating::RotatingClient;
pub use types::ChatMessage;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one conversation and return the completion text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model id used for completions
    fn model(&self) -> &str;

    /// Structured multi-section analysis of the project against its goals
    async fn analyze(
        &self,
        project_context: &str,
        goals: &str,
        current_state: Option<&str>,
    ) -> Result<String> {
        let messages = prompts::analyze_messages(project_context, goals, current_state);
        self.complete(&messages).await
    }

    /// Ordered action list addressing `issues`
    async fn plan(&self, issues: &[String], constraints: Option<&str>) -> Result<String> {
        let messages = prompts::plan_messages(issues, constraints);
        self.complete(&messages).await
    }

    async fn generate_code(
        &self,
        task: &str,
        context: &str,
        existing_code: Option<&str>,
    ) -> Result<String> {
        let messages = prompts::generate_messages(task, context, existing_code);
        self.complete(&messages).await
    }

    /// Review text ending in APPROVED, CONDITIONAL or REJECTED
    async fn review(&self, changes: &str, criteria: Option<&str>) -> Result<String> {
        let messages = prompts::review_messages(changes, criteria);
        self.complete(&messages).await
    }

    async fn chat(&self, message: &str, history: &[ChatMessage]) -> Result<String> {
        let messages = prompts::chat_messages(message, history);
        self.complete(&messages).await
    }
}
