// External collaborators of the optimization loop
//
// The loop only sees these traits. Default implementations work on a plain
// project directory: a filesystem context builder, a proposal writer that
// drops generated code under the proposals directory, and a git CLI wrapper.

mod applier;
mod context;
mod git;

use anyhow::Result;
use async_trait::async_trait;

use crate::looper::PlanAction;

pub use applier::ProposalWriter;
pub use context::ProjectContextBuilder;
pub use git::GitRepository;

/// Supplies the textual project description sent to the analyze call
pub trait ContextProvider: Send + Sync {
    fn build_context(&self) -> Result<String>;
}

/// Applies generated code for one plan action
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    /// Returns a one-line summary of what was applied
    async fn apply(&self, generated_code: &str, action: &PlanAction) -> Result<String>;
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Commit the whole working tree, returning the short commit hash
    async fn commit(&self, message: &str) -> Result<String>;

    async fn has_pending_changes(&self) -> Result<bool>;
}
