mod engine;

pub use engine::{RunOutcome, SummaryWorkflow};
