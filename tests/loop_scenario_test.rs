// End-to-end loop scenarios driven through the public API with in-memory fakes

mod common;

use common::{Fakes, ScriptedBackend};
use looper::config::LoopConfig;
use looper::goals::{Goal, GoalCategory, GoalCollection};
use looper::looper::{IterationOutcome, LoopState, NotCommittedReason, OptimizationLoop, Phase};

const PLAN: &str = "1. Add a response cache [code]\n   Keep it bounded\n   metric: test_coverage = 64\n2. Document the cache in the README";

fn policy(max_iterations: u32, auto_apply: bool) -> LoopConfig {
    LoopConfig {
        max_iterations,
        auto_apply,
        iteration_interval_secs: 0,
        ..LoopConfig::default()
    }
}

fn coverage_goals() -> GoalCollection {
    let mut goals = GoalCollection::new();
    goals.add(Goal::new(
        "test_coverage",
        "Line coverage of the core crate",
        GoalCategory::CodeQuality,
        80.0,
        50.0,
        "percent",
    ));
    goals
}

#[tokio::test]
async fn test_approved_iteration_commits_and_moves_goal() {
    let backend = ScriptedBackend::new(PLAN, "Looks correct.\nAPPROVED");
    let fakes = Fakes::new();
    let mut looper = OptimizationLoop::new(policy(1, true), backend.clone(), fakes.collaborators())
        .with_goals(coverage_goals());

    let status = looper.run().await;

    assert_eq!(status.state, LoopState::Completed);
    assert_eq!(status.current_phase, Phase::Finished);
    assert_eq!(status.iteration, 1);
    assert!(matches!(
        status.last_outcome,
        Some(IterationOutcome::Committed { .. })
    ));

    // Only the [code] action reaches the applier
    let applied = fakes.applier.applied.lock().unwrap().clone();
    assert_eq!(applied, vec![(1, "fn cached() {}".to_string())]);
    assert_eq!(backend.count("generate"), 1);

    let commits = fakes.vcs.commits.lock().unwrap().clone();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].starts_with("[Agent Looper "));
    assert!(commits[0].ends_with("Iteration 1"));

    let goal = looper.goals().get("test_coverage").unwrap();
    assert_eq!(goal.current_value, 64.0);
    assert!((goal.progress_percentage() - 80.0).abs() < 1e-9);
    assert_eq!(goal.history(), &[50.0]);

    let metric = looper.metrics().get("test_coverage").unwrap();
    assert_eq!(metric.value, 64.0);
    assert_eq!(metric.unit, "percent");
}

#[tokio::test]
async fn test_phases_run_in_order() {
    let backend = ScriptedBackend::new(PLAN, "APPROVED");
    let fakes = Fakes::new();
    let mut looper = OptimizationLoop::new(policy(1, false), backend.clone(), fakes.collaborators());

    looper.run().await;

    assert_eq!(backend.calls(), vec!["analyze", "plan", "generate", "review"]);
}

#[tokio::test]
async fn test_rejected_review_never_commits() {
    let backend = ScriptedBackend::new(PLAN, "Unsafe change.\nREJECTED");
    let fakes = Fakes::new();
    let mut looper = OptimizationLoop::new(policy(2, true), backend, fakes.collaborators());

    let status = looper.run().await;

    assert_eq!(status.iteration, 2);
    assert_eq!(fakes.commit_count(), 0);
    assert_eq!(
        status.last_outcome,
        Some(IterationOutcome::NotCommitted {
            reason: NotCommittedReason::ReviewRejected
        })
    );
}

#[tokio::test]
async fn test_auto_apply_disabled_skips_commit() {
    let backend = ScriptedBackend::new(PLAN, "APPROVED");
    let fakes = Fakes::new();
    let mut looper = OptimizationLoop::new(policy(1, false), backend, fakes.collaborators());

    let status = looper.run().await;

    assert_eq!(fakes.commit_count(), 0);
    assert_eq!(
        status.last_outcome,
        Some(IterationOutcome::NotCommitted {
            reason: NotCommittedReason::AutoApplyDisabled
        })
    );
}

#[tokio::test]
async fn test_reports_capture_every_iteration() {
    let backend = ScriptedBackend::new("1. Tidy up", "APPROVED");
    let fakes = Fakes::new();
    let mut looper = OptimizationLoop::new(policy(3, true), backend, fakes.collaborators());

    looper.run().await;

    let iterations: Vec<u32> = looper.reports().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3]);
    assert_eq!(fakes.commit_count(), 3);
}

#[tokio::test]
async fn test_goals_file_and_activity_log_written_on_finish() {
    let dir = tempfile::tempdir().unwrap();
    let goals_path = dir.path().join("goals.toml");
    let events_dir = dir.path().join("events");

    let backend = ScriptedBackend::new(PLAN, "APPROVED");
    let fakes = Fakes::new();
    let mut looper = OptimizationLoop::new(policy(1, true), backend, fakes.collaborators())
        .with_goals(coverage_goals())
        .with_goals_file(&goals_path)
        .with_activity_log(&events_dir);
    let id = looper.loop_id();

    looper.run().await;

    let reloaded = GoalCollection::load(&goals_path).unwrap();
    assert_eq!(reloaded.get("test_coverage").unwrap().current_value, 64.0);

    let log = std::fs::read_to_string(events_dir.join(format!("{}.jsonl", id))).unwrap();
    let events: Vec<serde_json::Value> = log
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["event"], "loop_started");
    assert_eq!(events.last().unwrap()["event"], "loop_stopped");
    assert!(events.iter().any(|e| e["event"] == "commit"));
}

#[tokio::test]
async fn test_handle_stop_ends_sleeping_loop() {
    let backend = ScriptedBackend::new("1. Tidy up", "APPROVED");
    let fakes = Fakes::new();
    let config = LoopConfig {
        iteration_interval_secs: 3600,
        ..policy(10, false)
    };
    let mut looper = OptimizationLoop::new(config, backend, fakes.collaborators());
    let handle = looper.handle();

    let task = tokio::spawn(async move { looper.run().await });

    let mut rx = handle.watch_status();
    rx.wait_for(|s| s.current_phase == Phase::Sleeping)
        .await
        .unwrap();
    handle.stop();

    let observed = tokio::time::timeout(std::time::Duration::from_secs(5), handle.finished())
        .await
        .unwrap();
    let status = task.await.unwrap();
    assert_eq!(status.state, LoopState::Stopped);
    assert_eq!(status.iteration, 1);
    assert_eq!(observed.state, LoopState::Stopped);
    assert_eq!(observed.current_phase, Phase::Finished);
}
