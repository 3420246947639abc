// Loop registry: tracks running optimization loops by id
//
// Each loop runs on its own tokio task. The registry only holds a handle;
// loop state is read from the snapshots each loop publishes. A loop leaves
// the registry when it is stopped or when it finishes on its own.

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::ChatBackend;
use crate::config::{LoopConfig, LooperConfig, ProjectConfig};
use crate::errors::{LooperError, Result};
use crate::goals::{Goal, GoalCollection};
use crate::looper::{Collaborators, LoopHandle, LoopStatus, OptimizationLoop};
use crate::metrics::MetricsSnapshot;
use crate::project::{GitRepository, ProjectContextBuilder, ProposalWriter};

struct LoopEntry {
    handle: LoopHandle,
    project: PathBuf,
    created_at: Instant,
    task: JoinHandle<LoopStatus>,
}

/// Serializable summary of a registered loop (for GET /v1/loops).
#[derive(Debug, Clone, Serialize)]
pub struct LoopSummary {
    pub loop_id: Uuid,
    pub project: PathBuf,
    pub age_secs: u64,
    pub status: LoopStatus,
}

/// Thread-safe registry of running loops. Cheap to clone.
#[derive(Clone)]
pub struct LoopRegistry {
    loops: Arc<RwLock<HashMap<Uuid, LoopEntry>>>,
    backend: Arc<dyn ChatBackend>,
    project_defaults: ProjectConfig,
    loop_defaults: LoopConfig,
}

impl LoopRegistry {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &LooperConfig) -> Self {
        Self {
            loops: Arc::new(RwLock::new(HashMap::new())),
            backend,
            project_defaults: config.project.clone(),
            loop_defaults: config.looping.clone(),
        }
    }

    pub fn backend(&self) -> Arc<dyn ChatBackend> {
        Arc::clone(&self.backend)
    }

    /// Start a loop on `project_path` (default: configured project) with
    /// `loop_config` (default: configured loop policy). Returns immediately.
    pub async fn start(
        &self,
        project_path: Option<PathBuf>,
        loop_config: Option<LoopConfig>,
    ) -> Result<Uuid> {
        let mut project = self.project_defaults.clone();
        if let Some(path) = project_path {
            project.path = path;
        }
        let looping = loop_config.unwrap_or_else(|| self.loop_defaults.clone());
        self.start_project(&project, looping).await
    }

    /// Build a loop with the default filesystem collaborators and start it
    pub async fn start_project(&self, project: &ProjectConfig, looping: LoopConfig) -> Result<Uuid> {
        let looper = build_project_loop(project, looping, self.backend())?;
        Ok(self.start_loop(looper, project.path.clone()).await)
    }

    /// Register an already-built loop and spawn its run
    pub async fn start_loop(&self, mut looper: OptimizationLoop, project: PathBuf) -> Uuid {
        let id = looper.loop_id();
        let handle = looper.handle();

        // Hold the write lock across spawn + insert so the task's own
        // removal can never run before the insert.
        let mut loops = self.loops.write().await;
        let registry = Arc::clone(&self.loops);
        let task = tokio::spawn(async move {
            let status = looper.run().await;
            registry.write().await.remove(&id);
            status
        });
        loops.insert(
            id,
            LoopEntry {
                handle,
                project: project.clone(),
                created_at: Instant::now(),
                task,
            },
        );
        drop(loops);

        tracing::info!(loop_id = %id, "Started loop on {}", project.display());
        id
    }

    /// Signal a loop to stop and remove it. False if the id is unknown.
    pub async fn stop(&self, id: Uuid) -> bool {
        let entry = self.loops.write().await.remove(&id);
        match entry {
            Some(entry) => {
                entry.handle.stop();
                tracing::info!(loop_id = %id, "Stop requested");
                true
            }
            None => false,
        }
    }

    /// Stop every loop and wait up to `grace` for each to finish its
    /// current iteration. Returns how many loops were registered.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let entries: Vec<LoopEntry> = self.loops.write().await.drain().map(|(_, e)| e).collect();
        for entry in &entries {
            entry.handle.stop();
        }
        let count = entries.len();
        join_all(entries.into_iter().map(|entry| async move {
            let id = entry.handle.loop_id();
            let abort = entry.task.abort_handle();
            if tokio::time::timeout(grace, entry.task).await.is_err() {
                tracing::warn!(loop_id = %id, "Loop did not stop within {:?}, aborting", grace);
                abort.abort();
            }
        }))
        .await;
        count
    }

    /// Latest snapshot, or the not-found snapshot for an unknown id
    pub async fn status(&self, id: Uuid) -> LoopStatus {
        let loops = self.loops.read().await;
        loops
            .get(&id)
            .map(|e| e.handle.status())
            .unwrap_or_else(|| LoopStatus::not_found(id.to_string()))
    }

    /// All registered loops, oldest first
    pub async fn list(&self) -> Vec<LoopSummary> {
        let loops = self.loops.read().await;
        let mut result: Vec<LoopSummary> = loops
            .iter()
            .map(|(id, e)| LoopSummary {
                loop_id: *id,
                project: e.project.clone(),
                age_secs: e.created_at.elapsed().as_secs(),
                status: e.handle.status(),
            })
            .collect();
        result.sort_by(|a, b| b.age_secs.cmp(&a.age_secs));
        result
    }

    pub async fn get_metrics(&self, id: Uuid) -> Option<MetricsSnapshot> {
        self.handle(id).await.map(|h| h.metrics())
    }

    /// None if the id is unknown
    pub async fn analyze_once(&self, id: Uuid) -> Option<Result<String>> {
        let handle = self.handle(id).await?;
        Some(handle.analyze_once().await)
    }

    /// Queue a goal for the loop; None if the id is unknown
    pub async fn submit_goal(&self, id: Uuid, goal: Goal) -> Option<Result<()>> {
        let handle = self.handle(id).await?;
        Some(handle.submit_goal(goal).await)
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.loops.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.loops.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.loops.read().await.is_empty()
    }

    async fn handle(&self, id: Uuid) -> Option<LoopHandle> {
        self.loops.read().await.get(&id).map(|e| e.handle.clone())
    }
}

/// Loop over a project directory with the default collaborators: context
/// from the filesystem, proposals under the proposals directory, git commits.
pub fn build_project_loop(
    project: &ProjectConfig,
    looping: LoopConfig,
    backend: Arc<dyn ChatBackend>,
) -> Result<OptimizationLoop> {
    looping.validate()?;
    if !project.path.is_dir() {
        return Err(LooperError::Config(format!(
            "Project path {} is not a directory",
            project.path.display()
        )));
    }

    let goals_path = project.goals_path();
    let goals =
        GoalCollection::load(&goals_path).map_err(|e| LooperError::Config(format!("{:#}", e)))?;

    // The activity log is appended to every phase; it must not count as a
    // pending change or be swept into iteration commits.
    let event_log = project.event_log_path();
    let mut vcs = GitRepository::new(&project.path);
    if let Some(dir) = &event_log {
        vcs = vcs.excluding(dir);
    }

    let collaborators = Collaborators {
        context: Arc::new(ProjectContextBuilder::new(&project.path)),
        applier: Arc::new(ProposalWriter::new(project.proposals_path())),
        vcs: Arc::new(vcs),
    };

    let mut looper = OptimizationLoop::new(looping, backend, collaborators).with_goals(goals);
    if project.save_goals {
        looper = looper.with_goals_file(goals_path);
    }
    if let Some(dir) = event_log {
        looper = looper.with_activity_log(&dir);
    }
    Ok(looper)
}
