pub mod engine;
pub mod mapping;
pub mod scheduler;
pub mod stages;

pub use engine::{PipelineEngine, StepOutcome};
pub use scheduler::{Orchestrator, WorkflowScheduler};
