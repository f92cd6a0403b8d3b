//! The shared run state threaded through the workflow nodes.
//!
//! Ownership is single-writer per field: select writes the batch fields,
//! fetch writes the fetched files, summarize commits summaries through
//! [`WorkflowState::commit_batch`], decide writes the decision and counter,
//! synthesize writes the final result. Any node may append to `errors`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use repo_summary_core::{ApiError, ErrorClass};
use repo_summary_llm::{Decision, FinalResult};

/// One blob entry from the recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl TreeEntry {
    pub fn new(path: impl Into<String>, size: Option<u64>, sha: Option<String>) -> Self {
        Self {
            path: path.into(),
            size,
            sha,
        }
    }
}

/// A blob that decoded cleanly to UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedFile {
    pub path: String,
    pub content: String,
}

/// One committed batch summary. `paths` are disjoint across entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSummary {
    pub paths: Vec<String>,
    pub summary: String,
}

/// Structured entry in the run's error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    pub node: String,
    pub message: String,
    pub classification: ErrorClass,
}

impl NodeError {
    pub fn new(node: &str, err: &ApiError) -> Self {
        Self {
            node: node.to_string(),
            message: err.to_string(),
            classification: err.classification(),
        }
    }
}

/// Full state of one summarization run. Serializable so a checkpoint is just
/// this struct written out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub repo_url: String,
    pub correlation_id: String,

    /// All blob entries from the tree listing, set once after discovery.
    pub tree_entries: Vec<TreeEntry>,
    /// Paths passing the eligibility filter, computed once per run.
    pub eligible_paths: Vec<String>,

    /// Model-produced plan when the planned strategy is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_batches: Option<Vec<Vec<String>>>,
    /// Index of the plan batch the current iteration works on.
    pub current_batch_index: usize,

    /// Written by select each iteration; empty is a valid selection.
    pub current_batch_paths: Vec<String>,
    /// Written by fetch; not checkpointed, a resumed run re-fetches.
    #[serde(skip)]
    pub current_batch_files: Vec<FetchedFile>,

    /// Append-only; extended only through [`WorkflowState::commit_batch`].
    pub partial_summaries: Vec<PartialSummary>,
    /// Union of all committed batch paths; subset of `eligible_paths`.
    pub already_processed: HashSet<String>,

    pub iteration_count: u32,
    pub decision: Decision,
    pub errors: Vec<NodeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<FinalResult>,
}

impl WorkflowState {
    pub fn new(repo_url: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            correlation_id: correlation_id.into(),
            tree_entries: Vec::new(),
            eligible_paths: Vec::new(),
            planned_batches: None,
            current_batch_index: 0,
            current_batch_paths: Vec::new(),
            current_batch_files: Vec::new(),
            partial_summaries: Vec::new(),
            already_processed: HashSet::new(),
            iteration_count: 0,
            decision: Decision::Continue,
            errors: Vec::new(),
            final_result: None,
        }
    }

    /// The single commit point: append the summary and mark its paths
    /// processed together. A failed summarize call never reaches this.
    pub fn commit_batch(&mut self, paths: Vec<String>, summary: String) {
        self.already_processed.extend(paths.iter().cloned());
        self.partial_summaries.push(PartialSummary { paths, summary });
    }

    pub fn record_error(&mut self, node: &str, err: &ApiError) {
        self.errors.push(NodeError::new(node, err));
    }

    /// Fraction of eligible paths already processed; 0 when nothing is
    /// eligible.
    pub fn coverage(&self) -> f64 {
        if self.eligible_paths.is_empty() {
            0.0
        } else {
            self.already_processed.len() as f64 / self.eligible_paths.len() as f64
        }
    }
}
