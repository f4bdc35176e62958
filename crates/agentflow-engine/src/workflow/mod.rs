//! The workflow engine: state machine, run loop and results.

pub mod engine;
pub mod registration;
pub mod result;
pub mod state;

pub use engine::WorkflowEngine;
pub use registration::{PolicySource, Registration};
pub use result::WorkflowResult;
pub use state::WorkflowState;
