//! Match pool engine: fetch → enrich → write → prune, plus its scheduler.

pub mod enricher;
pub mod fetcher;
pub mod janitor;
pub mod pipeline;
pub mod scheduler;
pub mod writer;

pub use pipeline::{MatchPoolRefresher, RefreshPlan};
