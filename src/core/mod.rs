//! Core selection modules

pub mod tile_select;
pub mod ranking;
pub mod planner;

// Re-export main types
pub use tile_select::TileSelector;
pub use ranking::{CandidateRanker, Rejection};
pub use planner::{AcquisitionPlan, AcquisitionPlanner, PlanEntry, PlanOutcome};
