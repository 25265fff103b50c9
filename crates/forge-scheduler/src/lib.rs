//! Pipeline scheduling and run coordination for Forge.

pub mod coordinator;
pub mod dag;
pub mod matrix;
pub mod sink;
pub mod triggers;

pub use coordinator::RunCoordinator;
pub use dag::StageDag;
pub use matrix::{ExpandedJob, MatrixExpander};
pub use sink::{RecordingSink, TracingSink};
pub use triggers::{TriggerDecision, TriggerEvaluator};
