//! Iterative GitHub repository summarization engine.
//!
//! A run discovers the repository's file tree, selects budgeted batches of
//! eligible files, asks a text model to summarize each batch, decides after
//! every batch whether more reading would help, and finally synthesizes a
//! single report. All outbound calls go through a retry + circuit-breaker
//! layer; every degradation short of a failed tree listing is recorded in the
//! run's error list instead of aborting the run.

pub mod config;
pub mod models;
pub mod services;

pub use config::{DeciderMode, SelectionStrategy, Settings};
pub use models::state::{
    FetchedFile, NodeError, PartialSummary, TreeEntry, WorkflowState,
};
pub use services::workflow::{RunOutcome, SummaryWorkflow};
