//! Domain model (ids, work items, send outcomes, retry decisions, events).

pub mod decision;
pub mod events;
pub mod ids;
pub mod item;
pub mod outcome;

pub use decision::{Decider, Decision, DefaultDecider};
pub use events::PipelineEvent;
pub use ids::{BatchId, WorkItemId};
pub use item::WorkItem;
pub use outcome::SendOutcome;
