// Goal model
// Optimization targets and the collection the loop tracks progress against

mod collection;
mod goal;

pub use collection::GoalCollection;
pub use goal::{Goal, GoalCategory};
