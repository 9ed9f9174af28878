//! # gs-optimizer
//!
//! Grid search orchestration for GridSweep.
//!
//! Enumerates a hyperparameter grid in a fixed mixed-radix order, schedules
//! every combination across a bounded pool of remote machines, and selects the
//! best completed trial for a given objective direction.

mod evaluator;
mod scheduler;
mod search;

pub use evaluator::{CampaignSummary, Evaluator};
pub use scheduler::{
    CampaignOutcome, GridScheduler, SchedulerEvent, TrialAssignment, TrialExecutor,
};
pub use search::GridSearch;
