//! State module for tracking harvest runs
//!
//! # Components
//!
//! - `RunState`: process-wide, atomically accessed "is a run active" cell
//! - `RunGuard`: proof of an active run; clears the cell when dropped

mod run_state;

// Re-export main types
pub use run_state::{RunConflict, RunGuard, RunState};
