// Project loops over a real git working tree

mod common;

use std::path::Path;
use std::process::Command;

use common::ScriptedBackend;
use looper::config::{LoopConfig, ProjectConfig};
use looper::looper::{IterationOutcome, NotCommittedReason};
use looper::registry::build_project_loop;

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Test", "-c", "user.email=test@localhost"])
        .args(args)
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Repository with one commit, or None when git is unavailable
fn committed_repo() -> Option<tempfile::TempDir> {
    let tmp = tempfile::tempdir().unwrap();
    git(tmp.path(), &["init"])?;
    std::fs::write(tmp.path().join("README.md"), "# demo\n").unwrap();
    git(tmp.path(), &["add", "-A"])?;
    git(tmp.path(), &["commit", "-m", "initial"])?;
    Some(tmp)
}

fn single_applied_iteration() -> LoopConfig {
    LoopConfig {
        max_iterations: 1,
        auto_apply: true,
        iteration_interval_secs: 0,
        ..LoopConfig::default()
    }
}

#[tokio::test]
async fn test_activity_log_alone_is_nothing_to_commit() {
    let Some(tmp) = committed_repo() else { return };
    let project = ProjectConfig {
        path: tmp.path().to_path_buf(),
        ..ProjectConfig::default()
    };
    let backend = ScriptedBackend::new("1. Document findings", "APPROVED");

    let mut looper = build_project_loop(&project, single_applied_iteration(), backend).unwrap();
    let id = looper.loop_id();
    let status = looper.run().await;

    assert_eq!(
        status.last_outcome,
        Some(IterationOutcome::NotCommitted {
            reason: NotCommittedReason::NothingToCommit
        })
    );
    assert!(project
        .event_log_path()
        .unwrap()
        .join(format!("{}.jsonl", id))
        .exists());
    let log = git(tmp.path(), &["log", "--format=%s"]).unwrap();
    assert_eq!(log.trim(), "initial");
}

#[tokio::test]
async fn test_iteration_commit_leaves_activity_log_out() {
    let Some(tmp) = committed_repo() else { return };
    let project = ProjectConfig {
        path: tmp.path().to_path_buf(),
        ..ProjectConfig::default()
    };
    let backend = ScriptedBackend::new("1. [code] Add a response cache", "APPROVED");

    let mut looper = build_project_loop(&project, single_applied_iteration(), backend).unwrap();
    let status = looper.run().await;

    assert!(matches!(
        status.last_outcome,
        Some(IterationOutcome::Committed { .. })
    ));
    let files = git(tmp.path(), &["show", "--name-only", "--format=", "HEAD"]).unwrap();
    assert!(files.lines().any(|f| f.starts_with(".looper/proposals/")));
    assert!(!files.contains(".looper/events"));
    // Events written after the commit stay untracked
    let tracked = git(tmp.path(), &["ls-files"]).unwrap();
    assert!(!tracked.contains(".jsonl"));
}
