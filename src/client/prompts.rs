// System prompts and user-message templates for each call shape

use super::types::ChatMessage;

pub const ANALYZE_SYSTEM_PROMPT: &str = "You are an expert software optimization agent.
Analyze the given project and identify specific, actionable improvements.

Focus areas:
- Runtime performance (latency, throughput, resource usage)
- Network and I/O efficiency
- User experience (loading times, responsiveness)
- Code quality (test coverage, security, documentation)

Provide your response in the following format:
1. Current State Analysis
2. Identified Issues
3. Optimization Opportunities (prioritized by impact)
4. Recommended Actions
5. Expected Outcomes";

pub const PLAN_SYSTEM_PROMPT: &str = "You are an expert optimization planner.
Create a detailed, step-by-step plan to address the given issues.

Your plan should:
1. Prioritize actions by impact and effort
2. Consider dependencies between actions
3. Include testing and validation steps
4. Minimize risk and allow for rollbacks

Format your response as a numbered list of actions. For each action give a
description, expected impact, estimated complexity, dependencies and risk level.
Mark an action that needs new or changed code with [code].
When an action changes a measurable value, add a line `metric: <name> = <value>`.";

pub const GENERATE_SYSTEM_PROMPT: &str = "You are an expert software developer.
Generate clean, well-documented code that follows best practices.

Your response should include:
1. Brief explanation of the approach
2. The code implementation
3. Any notes about testing or integration

Focus on maintainability, performance, security and error handling.";

pub const REVIEW_SYSTEM_PROMPT: &str = "You are an expert code reviewer.
Review the proposed changes and provide feedback.

Your review should cover:
1. Correctness and functionality
2. Code quality and style
3. Performance implications
4. Security considerations
5. Testing recommendations

End your review with one of:
- APPROVED: Changes are ready to apply
- CONDITIONAL: Changes need minor adjustments (specify)
- REJECTED: Changes need significant revision (explain)";

pub fn analyze_messages(
    project_context: &str,
    goals: &str,
    current_state: Option<&str>,
) -> Vec<ChatMessage> {
    let mut user = format!(
        "Project Context:\n{}\n\nOptimization Goals:\n{}",
        project_context, goals
    );
    if let Some(state) = current_state {
        user.push_str(&format!("\n\nCurrent State:\n{}", state));
    }
    vec![ChatMessage::system(ANALYZE_SYSTEM_PROMPT), ChatMessage::user(user)]
}

pub fn plan_messages(issues: &[String], constraints: Option<&str>) -> Vec<ChatMessage> {
    let list: Vec<String> = issues.iter().map(|i| format!("- {}", i)).collect();
    let mut user = format!("Issues to address:\n{}", list.join("\n"));
    if let Some(constraints) = constraints {
        user.push_str(&format!("\n\nConstraints:\n{}", constraints));
    }
    vec![ChatMessage::system(PLAN_SYSTEM_PROMPT), ChatMessage::user(user)]
}

pub fn generate_messages(task: &str, context: &str, existing_code: Option<&str>) -> Vec<ChatMessage> {
    let mut user = format!("Task: {}\n\nContext:\n{}", task, context);
    if let Some(code) = existing_code {
        user.push_str(&format!("\n\nExisting Code:\n```\n{}\n```", code));
    }
    vec![ChatMessage::system(GENERATE_SYSTEM_PROMPT), ChatMessage::user(user)]
}

pub fn review_messages(changes: &str, criteria: Option<&str>) -> Vec<ChatMessage> {
    let mut user = format!("Changes to review:\n{}", changes);
    if let Some(criteria) = criteria {
        user.push_str(&format!("\n\nReview Criteria:\n{}", criteria));
    }
    vec![ChatMessage::system(REVIEW_SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Prior turns followed by the new user message. No system prompt.
pub fn chat_messages(message: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = history.to_vec();
    messages.push(ChatMessage::user(message));
    messages
}
