//! # Grant Planning
//!
//! Cross-schema privilege requirements derived from the dependency graph,
//! consumed once before execution and again on demand when a task fails
//! with a permission-denied diagnostic.

pub mod planner;
pub mod requirement;

pub use planner::GrantPlanner;
pub use requirement::{GrantRequirement, Privilege};
