// Optimization loop
//
// One loop drives one project through analyze -> plan -> execute -> review
// -> commit, then sleeps until the next iteration. Stop requests and
// commands are only observed between iterations; a phase that has started
// always runs to completion or to its timeout.

mod actions;
mod activity_log;
mod phases;
mod status;

pub use actions::{parse_plan, MetricUpdate, PlanAction};
pub use activity_log::{ActivityLog, LoopEvent};
pub use phases::{
    review_approves, IterationOutcome, IterationReport, NotCommittedReason, Phase, ReviewVerdict,
};
pub use status::{GoalStatus, LoopState, LoopStatus};

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::retry::with_retry;
use crate::client::ChatBackend;
use crate::config::LoopConfig;
use crate::errors::{LooperError, Result};
use crate::goals::{Goal, GoalCollection};
use crate::metrics::{MetricStore, MetricType, MetricsSnapshot};
use crate::monitoring;
use crate::project::{ChangeApplier, ContextProvider, VersionControl};

const COMMAND_BUFFER: usize = 32;

/// Requests applied by a running loop between iterations
pub enum LoopCommand {
    SubmitGoal(Goal),
    AnalyzeOnce {
        reply: oneshot::Sender<Result<String>>,
    },
}

/// External collaborators of a loop
#[derive(Clone)]
pub struct Collaborators {
    pub context: Arc<dyn ContextProvider>,
    pub applier: Arc<dyn ChangeApplier>,
    pub vcs: Arc<dyn VersionControl>,
}

/// Remote control for a loop that runs on another task.
///
/// Status and metrics are read from the latest published snapshot, so
/// reading never touches loop state.
#[derive(Clone)]
pub struct LoopHandle {
    loop_id: Uuid,
    cancel: CancellationToken,
    commands: mpsc::Sender<LoopCommand>,
    status: watch::Receiver<LoopStatus>,
    metrics: watch::Receiver<MetricsSnapshot>,
}

impl LoopHandle {
    pub fn loop_id(&self) -> Uuid {
        self.loop_id
    }

    /// Request a cooperative stop. The current iteration finishes first;
    /// a pending sleep is cut short.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> LoopStatus {
        self.status.borrow().clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn watch_status(&self) -> watch::Receiver<LoopStatus> {
        self.status.clone()
    }

    /// Queue a goal; it is added before the next iteration starts
    pub async fn submit_goal(&self, goal: Goal) -> Result<()> {
        self.commands
            .send(LoopCommand::SubmitGoal(goal))
            .await
            .map_err(|_| self.closed())
    }

    /// Run one analysis outside the iteration cycle and wait for the result
    pub async fn analyze_once(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(LoopCommand::AnalyzeOnce { reply })
            .await
            .map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Wait until the loop reaches a terminal state
    pub async fn finished(&self) -> LoopStatus {
        let mut rx = self.status.clone();
        let result = rx
            .wait_for(|s| s.state.is_terminal())
            .await
            .map(|s| s.clone());
        result.unwrap_or_else(|_| rx.borrow().clone())
    }

    fn closed(&self) -> LooperError {
        LooperError::LoopClosed(self.loop_id.to_string())
    }
}

pub struct OptimizationLoop {
    loop_id: Uuid,
    config: LoopConfig,
    backend: Arc<dyn ChatBackend>,
    collaborators: Collaborators,
    goals: GoalCollection,
    metrics: MetricStore,
    goals_file: Option<PathBuf>,
    activity: Option<ActivityLog>,

    iteration: u32,
    state: LoopState,
    phase: Phase,
    started_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
    reports: VecDeque<IterationReport>,

    cancel: CancellationToken,
    commands_tx: mpsc::Sender<LoopCommand>,
    commands: mpsc::Receiver<LoopCommand>,
    status_tx: watch::Sender<LoopStatus>,
    metrics_tx: watch::Sender<MetricsSnapshot>,
}

impl OptimizationLoop {
    pub fn new(
        config: LoopConfig,
        backend: Arc<dyn ChatBackend>,
        collaborators: Collaborators,
    ) -> Self {
        let loop_id = Uuid::new_v4();
        let goals = GoalCollection::new();
        let metrics = MetricStore::new();
        let (status_tx, _) = watch::channel(LoopStatus::idle(
            loop_id.to_string(),
            config.max_iterations,
            &goals,
        ));
        let (metrics_tx, _) = watch::channel(metrics.to_snapshot());
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);

        Self {
            loop_id,
            config,
            backend,
            collaborators,
            goals,
            metrics,
            goals_file: None,
            activity: None,
            iteration: 0,
            state: LoopState::Idle,
            phase: Phase::Idle,
            started_at: None,
            last_activity: None,
            reports: VecDeque::new(),
            cancel: CancellationToken::new(),
            commands_tx,
            commands,
            status_tx,
            metrics_tx,
        }
    }

    pub fn with_goals(mut self, goals: GoalCollection) -> Self {
        self.goals = goals;
        self.publish();
        self
    }

    /// Save goals to `path` when the loop ends
    pub fn with_goals_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.goals_file = Some(path.into());
        self
    }

    /// Append JSONL events to `<dir>/<loop_id>.jsonl`
    pub fn with_activity_log(mut self, dir: &Path) -> Self {
        self.activity = Some(ActivityLog::new(dir, self.loop_id));
        self
    }

    pub fn loop_id(&self) -> Uuid {
        self.loop_id
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            loop_id: self.loop_id,
            cancel: self.cancel.clone(),
            commands: self.commands_tx.clone(),
            status: self.status_tx.subscribe(),
            metrics: self.metrics_tx.subscribe(),
        }
    }

    pub fn stop(&self) {
        info!(loop_id = %self.loop_id, "Stopping optimization loop");
        self.cancel.cancel();
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn goals(&self) -> &GoalCollection {
        &self.goals
    }

    pub fn metrics(&self) -> &MetricStore {
        &self.metrics
    }

    pub fn reports(&self) -> impl Iterator<Item = &IterationReport> {
        self.reports.iter()
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            loop_id: self.loop_id.to_string(),
            state: self.state,
            running: self.is_running(),
            iteration: self.iteration,
            max_iterations: self.config.max_iterations,
            current_phase: self.phase,
            goals: self.goals.all().into_iter().map(GoalStatus::from).collect(),
            overall_progress: self.goals.overall_progress(),
            started_at: self.started_at,
            last_activity: self.last_activity,
            last_outcome: self.reports.back().map(|r| r.outcome.clone()),
            recent_reports: self.reports.iter().cloned().collect(),
        }
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.to_snapshot()
    }

    /// Add or replace a goal by name
    pub fn submit_goal(&mut self, goal: Goal) {
        info!(loop_id = %self.loop_id, "Goal submitted: {}", goal.name);
        self.record(LoopEvent::GoalSubmitted {
            name: goal.name.clone(),
        });
        self.goals.add(goal);
        self.publish();
    }

    /// One analysis call without advancing the iteration counter
    pub async fn analyze_once(&mut self) -> Result<String> {
        let result = self.request_analysis().await;
        self.last_activity = Some(Utc::now());
        self.publish();
        result
    }

    /// Run iterations until stopped or the iteration ceiling is reached.
    ///
    /// A finished loop is never resumed; calling `run` again returns its
    /// final status immediately.
    pub async fn run(&mut self) -> LoopStatus {
        if self.state.is_terminal() {
            warn!(loop_id = %self.loop_id, "Loop already finished, not restarting");
            return self.status();
        }

        self.state = LoopState::Running;
        self.started_at = Some(Utc::now());
        self.last_activity = self.started_at;
        info!(
            loop_id = %self.loop_id,
            "Starting optimization loop (max {} iterations, interval {:?})",
            self.config.max_iterations,
            self.config.interval()
        );
        self.record(LoopEvent::LoopStarted {
            max_iterations: self.config.max_iterations,
        });
        self.publish();

        while !self.cancel.is_cancelled() && self.iteration < self.config.max_iterations {
            self.drain_commands().await;
            self.iterate().await;

            if self.iteration >= self.config.max_iterations || self.cancel.is_cancelled() {
                break;
            }
            if !self.wait_for_next_iteration().await {
                break;
            }
        }

        self.finish();
        self.status()
    }

    /// Run one iteration. Failures are folded into the report, never returned.
    pub async fn iterate(&mut self) -> IterationReport {
        self.iteration += 1;
        let iteration = self.iteration;
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(loop_id = %self.loop_id, iteration, "=== Starting iteration {} ===", iteration);
        self.record(LoopEvent::IterationStart { iteration });

        let (outcome, verdict) = match self.run_phases().await {
            Ok(result) => result,
            Err(e) => {
                let phase = self.phase;
                error!(loop_id = %self.loop_id, iteration, %phase, "Iteration {} failed: {}", iteration, e);
                self.record(LoopEvent::IterationFailed {
                    iteration,
                    phase,
                    error: e.to_string(),
                });
                (
                    IterationOutcome::Failed {
                        phase,
                        error: e.to_string(),
                    },
                    None,
                )
            }
        };

        if let IterationOutcome::NotCommitted { reason } = &outcome {
            self.record(LoopEvent::NotCommitted {
                iteration,
                reason: *reason,
            });
        }
        monitoring::record_iteration(outcome.label());

        let report = IterationReport {
            iteration,
            outcome,
            verdict,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
        };
        self.reports.push_back(report.clone());
        while self.reports.len() > self.config.report_history.max(1) {
            self.reports.pop_front();
        }

        info!(
            loop_id = %self.loop_id,
            iteration,
            "=== Iteration {} complete: {} ===",
            iteration,
            report.outcome.label()
        );
        self.last_activity = Some(Utc::now());
        self.publish();
        report
    }

    async fn run_phases(&mut self) -> Result<(IterationOutcome, Option<ReviewVerdict>)> {
        let analysis = self.analyze_phase().await?;
        let plan = self.plan_phase(&analysis).await?;
        let changes = self.execute_phase(&plan).await?;
        let (approved, verdict) = self.review_phase(&changes).await?;

        if !approved {
            info!(loop_id = %self.loop_id, "Review did not approve, skipping commit");
            let outcome = IterationOutcome::NotCommitted {
                reason: NotCommittedReason::ReviewRejected,
            };
            return Ok((outcome, Some(verdict)));
        }

        Ok((self.commit_phase().await, Some(verdict)))
    }

    async fn analyze_phase(&mut self) -> Result<String> {
        self.enter(Phase::Analyze);
        let analysis = self.request_analysis().await?;
        self.phase_complete(analysis.len());
        Ok(analysis)
    }

    async fn request_analysis(&self) -> Result<String> {
        let context = self
            .collaborators
            .context
            .build_context()
            .map_err(|e| LooperError::phase(Phase::Analyze.as_str(), format!("{:#}", e)))?;
        let goals = self.goals.describe();
        let state = self.metrics.to_json();

        self.call(Phase::Analyze, || {
            self.backend.analyze(&context, &goals, Some(&state))
        })
        .await
    }

    /// The whole analysis is treated as a single issue
    async fn plan_phase(&mut self, analysis: &str) -> Result<String> {
        self.enter(Phase::Plan);
        let issues = vec![analysis.to_string()];
        let constraints = self.config.constraints.clone();

        let plan = self
            .call(Phase::Plan, || {
                self.backend.plan(&issues, constraints.as_deref())
            })
            .await?;
        self.phase_complete(plan.len());
        Ok(plan)
    }

    /// Apply each action in order; the first failure aborts the phase.
    /// Actions applied before the failure stay applied.
    async fn execute_phase(&mut self, plan: &str) -> Result<String> {
        self.enter(Phase::Execute);
        let actions = parse_plan(plan);
        info!(loop_id = %self.loop_id, "Executing {} action(s)", actions.len());

        let mut applied = Vec::new();
        for action in &actions {
            debug!("Executing action {}: {}", action.index, action.description);

            if action.requires_code {
                let task = action.task();
                let code = self
                    .call(Phase::Execute, || {
                        self.backend.generate_code(&task, plan, None)
                    })
                    .await?;
                let summary = self
                    .collaborators
                    .applier
                    .apply(&code, action)
                    .await
                    .map_err(|e| {
                        LooperError::phase(
                            Phase::Execute.as_str(),
                            format!("action {} failed: {:#}", action.index, e),
                        )
                    })?;
                self.record(LoopEvent::ActionApplied {
                    iteration: self.iteration,
                    action: action.index,
                    summary: summary.clone(),
                });
                applied.push(format!("{}. {} ({})", action.index, action.description, summary));
            }

            if let Some(update) = &action.metric_update {
                self.apply_metric_update(update);
                applied.push(format!(
                    "{}. metric {} set to {}",
                    action.index, update.name, update.value
                ));
            }
        }

        self.phase_complete(applied.len());
        Ok(describe_changes(&actions, &applied))
    }

    /// Update (or create) the metric and move a goal of the same name
    fn apply_metric_update(&mut self, update: &MetricUpdate) {
        if !self.metrics.update(&update.name, update.value) {
            let unit = self
                .goals
                .get(&update.name)
                .map(|g| g.unit.clone())
                .unwrap_or_else(|| "value".to_string());
            self.metrics
                .add(update.name.clone(), update.value, MetricType::Technical, unit, None);
        }
        if self.goals.update(&update.name, update.value) {
            if let Some(goal) = self.goals.get(&update.name) {
                info!(
                    loop_id = %self.loop_id,
                    "Goal {} progress: {:.1}%",
                    goal.name,
                    goal.progress_percentage()
                );
            }
        }
        self.record(LoopEvent::MetricUpdated {
            iteration: self.iteration,
            name: update.name.clone(),
            value: update.value,
        });
    }

    async fn review_phase(&mut self, changes: &str) -> Result<(bool, ReviewVerdict)> {
        self.enter(Phase::Review);
        let criteria = self.config.review_criteria.clone();

        let review = self
            .call(Phase::Review, || {
                self.backend.review(changes, criteria.as_deref())
            })
            .await?;

        let approved = review_approves(&review);
        let verdict = ReviewVerdict::parse(&review);
        info!(
            loop_id = %self.loop_id,
            "Review verdict: {:?} (commit approved: {})",
            verdict,
            approved
        );
        self.record(LoopEvent::Review {
            iteration: self.iteration,
            verdict,
            approved,
        });
        Ok((approved, verdict))
    }

    /// Never fails the iteration: every commit problem is a not-committed outcome
    async fn commit_phase(&mut self) -> IterationOutcome {
        self.enter(Phase::Commit);

        if !self.config.auto_apply {
            info!(loop_id = %self.loop_id, "Auto-apply disabled, skipping commit");
            return IterationOutcome::NotCommitted {
                reason: NotCommittedReason::AutoApplyDisabled,
            };
        }

        match self.collaborators.vcs.has_pending_changes().await {
            Ok(true) => {}
            Ok(false) => {
                info!(loop_id = %self.loop_id, "Working tree clean, nothing to commit");
                return IterationOutcome::NotCommitted {
                    reason: NotCommittedReason::NothingToCommit,
                };
            }
            Err(e) => {
                error!(loop_id = %self.loop_id, "Failed to inspect working tree: {:#}", e);
                return IterationOutcome::NotCommitted {
                    reason: NotCommittedReason::CommitFailed,
                };
            }
        }

        let message = format!("[Agent Looper {}] Iteration {}", self.loop_id, self.iteration);
        match self.collaborators.vcs.commit(&message).await {
            Ok(hash) => {
                info!(loop_id = %self.loop_id, "Commit successful: {} ({})", message, hash);
                self.record(LoopEvent::Commit {
                    iteration: self.iteration,
                    hash: hash.clone(),
                    msg: message,
                });
                IterationOutcome::Committed { commit: hash }
            }
            Err(e) => {
                error!(loop_id = %self.loop_id, "Commit failed: {:#}", e);
                IterationOutcome::NotCommitted {
                    reason: NotCommittedReason::CommitFailed,
                }
            }
        }
    }

    /// One backend call bounded by the phase timeout, retried per config
    async fn call<F, Fut>(&self, phase: Phase, f: F) -> Result<String>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let timeout = self.config.phase_timeout();
        let secs = self.config.phase_timeout_secs;
        let delay = Duration::from_millis(self.config.retry_delay_ms);

        with_retry(self.config.phase_retries, delay, || {
            let call = f();
            async move {
                match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(LooperError::Timeout {
                        phase: phase.to_string(),
                        secs,
                    }),
                }
            }
        })
        .await
    }

    /// Sleep for the configured interval, serving commands meanwhile.
    /// Returns false if a stop was requested.
    async fn wait_for_next_iteration(&mut self) -> bool {
        let interval = self.config.interval();
        self.enter(Phase::Sleeping);
        info!(loop_id = %self.loop_id, "Waiting {:?} before next iteration", interval);

        let sleep = tokio::time::sleep(interval);
        tokio::pin!(sleep);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                Some(command) = self.commands.recv() => self.handle_command(command).await,
            }
        }
    }

    async fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command).await;
        }
    }

    async fn handle_command(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::SubmitGoal(goal) => self.submit_goal(goal),
            LoopCommand::AnalyzeOnce { reply } => {
                let result = self.analyze_once().await;
                if reply.send(result).is_err() {
                    debug!("analyze_once caller went away");
                }
            }
        }
    }

    /// Refuse further commands. Goals already queued are kept so they reach
    /// the goals file; queued analyses are answered with `LoopClosed`.
    fn close_commands(&mut self) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                LoopCommand::SubmitGoal(goal) => self.submit_goal(goal),
                LoopCommand::AnalyzeOnce { reply } => {
                    let closed = LooperError::LoopClosed(self.loop_id.to_string());
                    if reply.send(Err(closed)).is_err() {
                        debug!("analyze_once caller went away");
                    }
                }
            }
        }
    }

    fn finish(&mut self) {
        self.state = if self.cancel.is_cancelled() {
            LoopState::Stopped
        } else {
            LoopState::Completed
        };
        self.phase = Phase::Finished;
        self.last_activity = Some(Utc::now());
        self.close_commands();

        if let Some(path) = &self.goals_file {
            if let Err(e) = self.goals.save(path) {
                warn!(loop_id = %self.loop_id, "Failed to save goals: {:#}", e);
            }
        }

        info!(
            loop_id = %self.loop_id,
            "Optimization loop {:?} after {} iteration(s)",
            self.state,
            self.iteration
        );
        self.record(LoopEvent::LoopStopped {
            state: self.state,
            iterations: self.iteration,
        });
        self.publish();
    }

    fn enter(&mut self, phase: Phase) {
        debug!(loop_id = %self.loop_id, iteration = self.iteration, "Entering {} phase", phase);
        self.phase = phase;
        self.last_activity = Some(Utc::now());
        self.publish();
    }

    fn phase_complete(&self, chars: usize) {
        self.record(LoopEvent::PhaseComplete {
            iteration: self.iteration,
            phase: self.phase,
            chars,
        });
    }

    fn record(&self, event: LoopEvent) {
        if let Some(log) = &self.activity {
            if let Err(e) = log.log(&event) {
                warn!("Failed to write activity log: {:#}", e);
            }
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
        self.metrics_tx.send_replace(self.metrics.to_snapshot());
    }
}

/// Text handed to the review call
fn describe_changes(actions: &[PlanAction], applied: &[String]) -> String {
    let mut text = String::from("Planned actions:\n");
    for action in actions {
        text.push_str(&format!("{}. {}\n", action.index, action.description));
    }
    if applied.is_empty() {
        text.push_str("\nApplied changes: none");
    } else {
        text.push_str("\nApplied changes:\n");
        text.push_str(
            &applied
                .iter()
                .map(|a| format!("- {}", a))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::prompts;
    use crate::client::ChatMessage;
    use crate::goals::GoalCategory;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies by call shape, recognised from the system prompt
    struct Scripted {
        plan: String,
        review: String,
        fail_analyze_times: Mutex<u32>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl Scripted {
        fn new(plan: &str, review: &str) -> Arc<Self> {
            Arc::new(Self {
                plan: plan.to_string(),
                review: review.to_string(),
                fail_analyze_times: Mutex::new(0),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing_analyze(times: u32) -> Arc<Self> {
            let backend = Self::new("1. noop", "APPROVED");
            *backend.fail_analyze_times.lock().unwrap() = times;
            backend
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            let kind = match messages[0].content.as_str() {
                prompts::ANALYZE_SYSTEM_PROMPT => "analyze",
                prompts::PLAN_SYSTEM_PROMPT => "plan",
                prompts::GENERATE_SYSTEM_PROMPT => "generate",
                prompts::REVIEW_SYSTEM_PROMPT => "review",
                _ => "chat",
            };
            self.calls.lock().unwrap().push(kind);
            match kind {
                "analyze" => {
                    let mut remaining = self.fail_analyze_times.lock().unwrap();
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(LooperError::Api {
                            status: 503,
                            body: "unavailable".to_string(),
                        });
                    }
                    Ok("Issues: slow startup".to_string())
                }
                "plan" => Ok(self.plan.clone()),
                "generate" => Ok("fn faster() {}".to_string()),
                "review" => Ok(self.review.clone()),
                _ => Ok("hi".to_string()),
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    /// Never answers within any reasonable timeout
    struct Stalled;

    #[async_trait]
    impl ChatBackend for Stalled {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }

        fn model(&self) -> &str {
            "stalled"
        }
    }

    struct StaticContext;

    impl ContextProvider for StaticContext {
        fn build_context(&self) -> anyhow::Result<String> {
            Ok("# demo".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingApplier {
        fail_at: Option<usize>,
        applied: Mutex<Vec<usize>>,
        stop_after_apply: Mutex<Option<CancellationToken>>,
    }

    #[async_trait]
    impl ChangeApplier for RecordingApplier {
        async fn apply(&self, _code: &str, action: &PlanAction) -> anyhow::Result<String> {
            if self.fail_at == Some(action.index) {
                anyhow::bail!("disk full");
            }
            self.applied.lock().unwrap().push(action.index);
            if let Some(token) = self.stop_after_apply.lock().unwrap().as_ref() {
                token.cancel();
            }
            Ok(format!("applied {}", action.index))
        }
    }

    #[derive(Default)]
    struct FakeVcs {
        clean: bool,
        fail_status: bool,
        fail_commit: bool,
        commits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VersionControl for FakeVcs {
        async fn commit(&self, message: &str) -> anyhow::Result<String> {
            if self.fail_commit {
                anyhow::bail!("git commit failed: hook rejected");
            }
            self.commits.lock().unwrap().push(message.to_string());
            Ok("abc1234".to_string())
        }

        async fn has_pending_changes(&self) -> anyhow::Result<bool> {
            if self.fail_status {
                anyhow::bail!("git status failed: not a git repository");
            }
            Ok(!self.clean)
        }
    }

    fn config(max_iterations: u32, auto_apply: bool) -> LoopConfig {
        LoopConfig {
            max_iterations,
            auto_apply,
            ..LoopConfig::default()
        }
    }

    fn collaborators(applier: Arc<RecordingApplier>, vcs: Arc<FakeVcs>) -> Collaborators {
        Collaborators {
            context: Arc::new(StaticContext),
            applier,
            vcs,
        }
    }

    fn build(
        config: LoopConfig,
        backend: Arc<dyn ChatBackend>,
    ) -> (OptimizationLoop, Arc<RecordingApplier>, Arc<FakeVcs>) {
        let applier = Arc::new(RecordingApplier::default());
        let vcs = Arc::new(FakeVcs::default());
        let looper =
            OptimizationLoop::new(config, backend, collaborators(applier.clone(), vcs.clone()));
        (looper, applier, vcs)
    }

    #[tokio::test]
    async fn test_rejected_review_single_iteration() {
        let backend = Scripted::new("1. Tidy imports", "Too risky.\nREJECTED");
        let (mut looper, _, vcs) = build(config(1, false), backend.clone());

        let status = looper.run().await;

        assert_eq!(looper.iteration(), 1);
        assert!(!status.running);
        assert_eq!(status.state, LoopState::Completed);
        assert!(vcs.commits.lock().unwrap().is_empty());
        assert_eq!(
            status.last_outcome,
            Some(IterationOutcome::NotCommitted {
                reason: NotCommittedReason::ReviewRejected
            })
        );
        assert_eq!(backend.calls(), vec!["analyze", "plan", "review"]);
    }

    #[tokio::test]
    async fn test_auto_apply_disabled_is_policy_outcome() {
        let backend = Scripted::new("1. [code] Add cache", "APPROVED");
        let (mut looper, applier, vcs) = build(config(1, false), backend);

        let report = looper.iterate().await;
        assert_eq!(
            report.outcome,
            IterationOutcome::NotCommitted {
                reason: NotCommittedReason::AutoApplyDisabled
            }
        );
        assert_eq!(report.verdict, Some(ReviewVerdict::Approved));
        assert_eq!(*applier.applied.lock().unwrap(), vec![1]);
        assert!(vcs.commits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approved_commit_message_names_loop_and_iteration() {
        let backend = Scripted::new("1. [code] Add cache", "Looks good. APPROVED");
        let (mut looper, _, vcs) = build(config(1, true), backend);

        let report = looper.iterate().await;
        assert_eq!(
            report.outcome,
            IterationOutcome::Committed {
                commit: "abc1234".to_string()
            }
        );
        let commits = vcs.commits.lock().unwrap();
        assert_eq!(
            commits.as_slice(),
            [format!("[Agent Looper {}] Iteration 1", looper.loop_id())]
        );
    }

    #[tokio::test]
    async fn test_clean_tree_is_nothing_to_commit() {
        let backend = Scripted::new("1. Document findings", "APPROVED");
        let applier = Arc::new(RecordingApplier::default());
        let vcs = Arc::new(FakeVcs {
            clean: true,
            ..FakeVcs::default()
        });
        let mut looper =
            OptimizationLoop::new(config(1, true), backend, collaborators(applier, vcs.clone()));

        let report = looper.iterate().await;
        assert_eq!(
            report.outcome,
            IterationOutcome::NotCommitted {
                reason: NotCommittedReason::NothingToCommit
            }
        );
        assert!(vcs.commits.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_failure_is_reported_and_loop_continues() {
        let backend = Scripted::new("1. [code] Add cache", "APPROVED");
        let applier = Arc::new(RecordingApplier::default());
        let vcs = Arc::new(FakeVcs {
            fail_commit: true,
            ..FakeVcs::default()
        });
        let mut looper = OptimizationLoop::new(
            config(2, true),
            backend,
            collaborators(applier.clone(), vcs.clone()),
        );

        let status = looper.run().await;
        assert_eq!(status.iteration, 2);
        assert_eq!(status.state, LoopState::Completed);
        assert!(looper.reports().all(|r| r.outcome
            == IterationOutcome::NotCommitted {
                reason: NotCommittedReason::CommitFailed
            }));
        assert_eq!(*applier.applied.lock().unwrap(), vec![1, 1]);
        assert!(vcs.commits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_failure_is_commit_failed() {
        let backend = Scripted::new("1. [code] Add cache", "APPROVED");
        let applier = Arc::new(RecordingApplier::default());
        let vcs = Arc::new(FakeVcs {
            fail_status: true,
            ..FakeVcs::default()
        });
        let mut looper =
            OptimizationLoop::new(config(1, true), backend, collaborators(applier, vcs.clone()));

        let report = looper.iterate().await;
        assert_eq!(
            report.outcome,
            IterationOutcome::NotCommitted {
                reason: NotCommittedReason::CommitFailed
            }
        );
        assert_eq!(report.verdict, Some(ReviewVerdict::Approved));
        assert!(vcs.commits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_failure_stops_at_failing_action() {
        let backend = Scripted::new("1. [code] first\n2. [code] second\n3. [code] third", "APPROVED");
        let applier = Arc::new(RecordingApplier {
            fail_at: Some(2),
            ..RecordingApplier::default()
        });
        let vcs = Arc::new(FakeVcs::default());
        let mut looper = OptimizationLoop::new(
            config(1, true),
            backend.clone(),
            collaborators(applier.clone(), vcs.clone()),
        );

        let report = looper.iterate().await;
        match &report.outcome {
            IterationOutcome::Failed { phase, error } => {
                assert_eq!(*phase, Phase::Execute);
                assert!(error.contains("disk full"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        // First action stays applied, third never attempted
        assert_eq!(*applier.applied.lock().unwrap(), vec![1]);
        assert!(!backend.calls().contains(&"review"));
        assert!(vcs.commits.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_iterations_do_not_end_the_run() {
        let backend = Scripted::failing_analyze(u32::MAX);
        let (mut looper, _, _) = build(config(2, false), backend.clone());

        let status = looper.run().await;
        assert_eq!(status.iteration, 2);
        assert_eq!(status.state, LoopState::Completed);
        assert_eq!(status.recent_reports.len(), 2);
        assert!(status.recent_reports.iter().all(|r| r.outcome.is_failure()));
        assert_eq!(backend.calls(), vec!["analyze", "analyze"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_retries_recover_transient_failure() {
        let backend = Scripted::failing_analyze(1);
        let mut cfg = config(1, false);
        cfg.phase_retries = 2;
        let (mut looper, _, _) = build(cfg, backend.clone());

        let report = looper.iterate().await;
        assert!(!report.outcome.is_failure());
        assert_eq!(&backend.calls()[..2], &["analyze", "analyze"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_timeout_fails_iteration() {
        let mut cfg = config(1, false);
        cfg.phase_timeout_secs = 5;
        let (mut looper, _, _) = build(cfg, Arc::new(Stalled));

        let report = looper.iterate().await;
        match report.outcome {
            IterationOutcome::Failed { phase, error } => {
                assert_eq!(phase, Phase::Analyze);
                assert!(error.contains("timed out"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_metric_update_moves_goal() {
        let backend = Scripted::new("1. Add tests\n   metric: coverage = 60", "REJECTED");
        let mut goals = GoalCollection::new();
        goals.add(Goal::new("coverage", "Test coverage", GoalCategory::CodeQuality, 80.0, 40.0, "%"));
        let (looper, _, _) = build(config(1, false), backend);
        let mut looper = looper.with_goals(goals);

        looper.iterate().await;

        let goal = looper.goals().get("coverage").unwrap();
        assert_eq!(goal.current_value, 60.0);
        assert_eq!(goal.history(), &[40.0]);
        let metric = looper.metrics().get("coverage").unwrap();
        assert_eq!(metric.value, 60.0);
        assert_eq!(metric.unit, "%");
        assert_eq!(looper.get_metrics().summary.total_metrics, 1);
    }

    #[tokio::test]
    async fn test_stop_is_observed_at_iteration_boundary() {
        let backend = Scripted::new("1. [code] change", "REJECTED");
        let (looper, applier, _) = build(config(5, false), backend.clone());
        *applier.stop_after_apply.lock().unwrap() = Some(looper.handle().cancel.clone());
        let mut looper = looper;

        let status = looper.run().await;
        // Stop arrived mid-iteration: that iteration still reached review
        assert_eq!(status.iteration, 1);
        assert_eq!(status.state, LoopState::Stopped);
        assert!(backend.calls().contains(&"review"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cuts_sleep_short() {
        let backend = Scripted::new("1. noop", "REJECTED");
        let (mut looper, _, _) = build(config(10, false), backend);
        let handle = looper.handle();
        let start = tokio::time::Instant::now();

        let task = tokio::spawn(async move { looper.run().await });
        let mut status = handle.watch_status();
        status
            .wait_for(|s| s.current_phase == Phase::Sleeping)
            .await
            .unwrap();
        handle.stop();

        let final_status = task.await.unwrap();
        assert_eq!(final_status.state, LoopState::Stopped);
        assert_eq!(final_status.iteration, 1);
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_served_while_sleeping() {
        let backend = Scripted::new("1. noop", "REJECTED");
        let (mut looper, _, _) = build(config(10, false), backend);
        let handle = looper.handle();
        let task = tokio::spawn(async move { looper.run().await });

        let mut status = handle.watch_status();
        status
            .wait_for(|s| s.current_phase == Phase::Sleeping)
            .await
            .unwrap();

        let analysis = handle.analyze_once().await.unwrap();
        assert_eq!(analysis, "Issues: slow startup");

        handle
            .submit_goal(Goal::new("fps", "Frame rate", GoalCategory::Performance, 90.0, 45.0, "fps"))
            .await
            .unwrap();
        status
            .wait_for(|s| s.goals.iter().any(|g| g.name == "fps"))
            .await
            .unwrap();

        handle.stop();
        let final_status = task.await.unwrap();
        assert_eq!(final_status.iteration, 1);
        assert!((final_status.overall_progress - 50.0).abs() < 1e-9);

        // Loop is gone: commands now report a closed loop
        assert!(matches!(
            handle.analyze_once().await,
            Err(LooperError::LoopClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_finished_loop_is_not_resumed() {
        let backend = Scripted::new("1. noop", "REJECTED");
        let (mut looper, _, _) = build(config(1, false), backend.clone());
        looper.run().await;
        let status = looper.run().await;
        assert_eq!(status.iteration, 1);
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_commands_refused_once_finished() {
        let backend = Scripted::new("1. noop", "REJECTED");
        let (mut looper, _, _) = build(config(1, false), backend.clone());
        let handle = looper.handle();
        looper.run().await;

        // The loop object is still alive, so only closing the queue refuses these
        let goal = Goal::new("latency", "p99", GoalCategory::Performance, 100.0, 300.0, "ms");
        assert!(matches!(
            handle.submit_goal(goal).await,
            Err(LooperError::LoopClosed(_))
        ));
        assert!(matches!(
            handle.analyze_once().await,
            Err(LooperError::LoopClosed(_))
        ));
        assert!(looper.goals().get("latency").is_none());
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_goals_queued_at_finish_are_kept() {
        let backend = Scripted::new("1. noop", "REJECTED");
        let (mut looper, _, _) = build(config(1, false), backend);
        let handle = looper.handle();
        let goal = Goal::new("latency", "p99", GoalCategory::Performance, 100.0, 300.0, "ms");
        handle
            .commands
            .try_send(LoopCommand::SubmitGoal(goal))
            .unwrap();

        looper.finish();
        assert!(looper.goals().get("latency").is_some());
        assert_eq!(looper.status().state, LoopState::Completed);
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let backend = Scripted::new("1. noop", "REJECTED");
        let (mut looper, _, _) = build(config(3, false), backend.clone());
        looper.stop();
        let status = looper.run().await;
        assert_eq!(status.iteration, 0);
        assert_eq!(status.state, LoopState::Stopped);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_activity_log_and_goal_save() {
        let tmp = tempfile::tempdir().unwrap();
        let goals_path = tmp.path().join("goals.toml");
        let mut goals = GoalCollection::new();
        goals.add(Goal::new("coverage", "Test coverage", GoalCategory::CodeQuality, 80.0, 40.0, "%"));

        let backend = Scripted::new("1. Add tests\n   metric: coverage = 70", "REJECTED");
        let (looper, _, _) = build(config(1, false), backend);
        let mut looper = looper
            .with_goals(goals)
            .with_goals_file(&goals_path)
            .with_activity_log(&tmp.path().join("events"));
        looper.run().await;

        let saved = GoalCollection::load(&goals_path).unwrap();
        assert_eq!(saved.get("coverage").unwrap().current_value, 70.0);

        let log_path = tmp.path().join("events").join(format!("{}.jsonl", looper.loop_id()));
        let events: Vec<String> = std::fs::read_to_string(log_path)
            .unwrap()
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["event"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(events.first().map(String::as_str), Some("loop_started"));
        assert!(events.contains(&"metric_updated".to_string()));
        assert!(events.contains(&"not_committed".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("loop_stopped"));
    }

    #[test]
    fn test_describe_changes() {
        let actions = vec![PlanAction::new(1, "Add cache", true)];
        let text = describe_changes(&actions, &["1. Add cache (written)".to_string()]);
        assert_eq!(text, "Planned actions:\n1. Add cache\n\nApplied changes:\n- 1. Add cache (written)");
        assert!(describe_changes(&actions, &[]).ends_with("Applied changes: none"));
    }
}
