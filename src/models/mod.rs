pub mod state;

pub use state::{FetchedFile, NodeError, PartialSummary, TreeEntry, WorkflowState};
