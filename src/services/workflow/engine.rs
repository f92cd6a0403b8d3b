//! The bounded summarization loop.
//!
//! One run is a plain loop over node functions, each owning its slice of
//! [`WorkflowState`]:
//!
//! `SELECT -> FETCH -> SUMMARIZE -> DECIDE -> {SELECT | SYNTHESIZE}`
//!
//! Only a failed tree listing aborts a run; every other failure is recorded
//! as a [`NodeError`] and degrades that iteration. The loop halts at the
//! iteration ceiling no matter what the decide step says, and the
//! cancellation token is honored at every node boundary.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use repo_summary_core::{ApiError, ApiResult};
use repo_summary_llm::{Decision, FinalResult, ModelApi, SummaryFragment};

use crate::config::{DeciderMode, SelectionStrategy, Settings};
use crate::models::state::{NodeError, TreeEntry, WorkflowState};
use crate::services::audit::AuditLog;
use crate::services::checkpoint::{Checkpointer, WorkflowCheckpoint};
use crate::services::context::{build_batch_context, build_directory_outline};
use crate::services::dlq::DeadLetterSink;
use crate::services::github::RepositoryApi;
use crate::services::selection::{is_eligible, select_next_batch};

/// New-summary token overlap at or above this means reading more files is
/// unlikely to add information.
const OVERLAP_DONE_THRESHOLD: f64 = 0.7;

/// What a run hands back: the report plus everything that went wrong on the
/// way there.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub result: FinalResult,
    pub errors: Vec<NodeError>,
    pub correlation_id: String,
    pub iterations: u32,
}

pub struct SummaryWorkflow {
    settings: Settings,
    repo: Arc<dyn RepositoryApi>,
    model: Arc<dyn ModelApi>,
    audit: AuditLog,
    dlq: DeadLetterSink,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl SummaryWorkflow {
    pub fn new(settings: Settings, repo: Arc<dyn RepositoryApi>, model: Arc<dyn ModelApi>) -> Self {
        let audit = settings
            .audit_log_path
            .as_ref()
            .map(AuditLog::new)
            .unwrap_or_else(AuditLog::disabled);
        let dlq = settings
            .dlq_path
            .as_ref()
            .map(DeadLetterSink::new)
            .unwrap_or_else(DeadLetterSink::disabled);
        Self {
            settings,
            repo,
            model,
            audit,
            dlq,
            checkpointer: None,
        }
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Summarize one repository end to end.
    pub async fn run(&self, repo_url: &str, cancel: CancellationToken) -> ApiResult<RunOutcome> {
        let correlation_id = Uuid::new_v4().to_string();
        let mut state = WorkflowState::new(repo_url, correlation_id);
        tracing::info!(repo_url, correlation_id = %state.correlation_id, "run started");

        self.discover(&mut state).await?;
        if self.settings.selection_strategy == SelectionStrategy::Planned
            && !state.eligible_paths.is_empty()
        {
            self.plan(&mut state).await;
        }
        self.drive(state, cancel).await
    }

    /// Continue a previously checkpointed run. Returns `None` when no
    /// checkpoint exists for the correlation id.
    pub async fn resume(
        &self,
        correlation_id: &str,
        cancel: CancellationToken,
    ) -> ApiResult<Option<RunOutcome>> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(None);
        };
        let checkpoint = checkpointer
            .load_latest(correlation_id)
            .await
            .map_err(|e| ApiError::invalid_response(format!("checkpoint load failed: {e}")))?;
        match checkpoint {
            Some(checkpoint) => {
                tracing::info!(correlation_id, "resuming from checkpoint");
                Ok(Some(self.drive(checkpoint.state, cancel).await?))
            }
            None => Ok(None),
        }
    }

    /// Iterate the node loop over the given state, then synthesize.
    async fn drive(
        &self,
        mut state: WorkflowState,
        cancel: CancellationToken,
    ) -> ApiResult<RunOutcome> {
        let mut cancelled = false;
        while !state.decision.is_done() && state.iteration_count < self.settings.max_iterations {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.select(&mut state);
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.fetch(&mut state).await;
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.summarize(&mut state).await;
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.decide(&mut state).await;
            self.save_checkpoint(&state).await;
        }

        if cancelled {
            tracing::warn!(correlation_id = %state.correlation_id, "run cancelled");
            state.errors.push(NodeError {
                node: "engine".to_string(),
                message: "run cancelled".to_string(),
                classification: repo_summary_core::ErrorClass::Permanent,
            });
            state.final_result = Some(degraded_result(&state));
        } else {
            self.synthesize(&mut state).await;
        }

        let outcome = RunOutcome {
            result: state.final_result.take().unwrap_or_default(),
            errors: state.errors,
            correlation_id: state.correlation_id,
            iterations: state.iteration_count,
        };
        tracing::info!(
            correlation_id = %outcome.correlation_id,
            iterations = outcome.iterations,
            errors = outcome.errors.len(),
            "run finished"
        );
        Ok(outcome)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Tree discovery. The one failure that aborts the run: with no tree
    /// there is nothing to degrade to.
    async fn discover(&self, state: &mut WorkflowState) -> ApiResult<()> {
        let started = Instant::now();
        match self.repo.list_tree(&state.repo_url).await {
            Ok(entries) => {
                let mut eligible: Vec<String> = entries
                    .iter()
                    .map(|e| e.path.clone())
                    .filter(|p| is_eligible(p))
                    .collect();
                eligible.sort();
                self.audit.record_step(
                    &state.correlation_id,
                    "discover",
                    "success",
                    json!({"blobs": entries.len(), "eligible": eligible.len()}),
                    started.elapsed().as_millis(),
                );
                state.tree_entries = entries;
                state.eligible_paths = eligible;
                Ok(())
            }
            Err(err) => {
                self.audit.record_step(
                    &state.correlation_id,
                    "discover",
                    "failure",
                    json!({"error": err.to_string()}),
                    started.elapsed().as_millis(),
                );
                self.dlq.record(
                    &state.correlation_id,
                    "discover",
                    json!({"repo_url": state.repo_url}),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Ask the model for an up-front batch plan; failure or an empty plan
    /// degrades the run to budgeted selection.
    async fn plan(&self, state: &mut WorkflowState) {
        let started = Instant::now();
        let outline = build_directory_outline(&state.eligible_paths);
        match self
            .model
            .plan_batches(
                &outline,
                &state.eligible_paths,
                self.settings.max_planned_batches,
            )
            .await
        {
            Ok(batches) if !batches.is_empty() => {
                self.audit.record_step(
                    &state.correlation_id,
                    "plan",
                    "success",
                    json!({"batches": batches.len()}),
                    started.elapsed().as_millis(),
                );
                state.planned_batches = Some(batches);
            }
            Ok(_) => {
                tracing::info!("model returned an empty plan, using budgeted selection");
                self.audit.record_step(
                    &state.correlation_id,
                    "plan",
                    "empty",
                    json!({}),
                    started.elapsed().as_millis(),
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "planning failed, using budgeted selection");
                self.audit.record_step(
                    &state.correlation_id,
                    "plan",
                    "failure",
                    json!({"error": err.to_string()}),
                    started.elapsed().as_millis(),
                );
                self.dlq.record(
                    &state.correlation_id,
                    "plan",
                    json!({"eligible": state.eligible_paths.len()}),
                    &err,
                );
                state.record_error("plan", &err);
            }
        }
    }

    fn select(&self, state: &mut WorkflowState) {
        let started = Instant::now();
        let batch = match &state.planned_batches {
            Some(plan) => plan
                .get(state.current_batch_index)
                .map(|batch| {
                    batch
                        .iter()
                        .filter(|p| !state.already_processed.contains(*p) && is_eligible(p))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            None => select_next_batch(
                &state.tree_entries,
                &state.already_processed,
                self.settings.max_context_chars_per_batch,
                self.settings.max_files_per_batch,
                self.settings.max_chars_per_file,
            ),
        };
        tracing::debug!(batch_size = batch.len(), "batch selected");
        self.audit.record_step(
            &state.correlation_id,
            "select",
            "success",
            json!({"batch_size": batch.len()}),
            started.elapsed().as_millis(),
        );
        state.current_batch_paths = batch;
    }

    async fn fetch(&self, state: &mut WorkflowState) {
        state.current_batch_files.clear();
        if state.current_batch_paths.is_empty() {
            return;
        }
        let started = Instant::now();
        let wanted: HashSet<&str> = state.current_batch_paths.iter().map(String::as_str).collect();
        let entries: Vec<TreeEntry> = state
            .tree_entries
            .iter()
            .filter(|e| wanted.contains(e.path.as_str()) && is_eligible(&e.path))
            .cloned()
            .collect();
        match self.repo.fetch_blobs(&state.repo_url, &entries).await {
            Ok(files) => {
                self.audit.record_step(
                    &state.correlation_id,
                    "fetch",
                    "success",
                    json!({"requested": entries.len(), "decoded": files.len()}),
                    started.elapsed().as_millis(),
                );
                state.current_batch_files = files;
            }
            Err(err) => {
                tracing::warn!(error = %err, "batch fetch failed, continuing without it");
                self.audit.record_step(
                    &state.correlation_id,
                    "fetch",
                    "failure",
                    json!({"error": err.to_string()}),
                    started.elapsed().as_millis(),
                );
                self.dlq.record(
                    &state.correlation_id,
                    "fetch",
                    json!({"paths": state.current_batch_paths}),
                    &err,
                );
                state.record_error("fetch", &err);
            }
        }
    }

    async fn summarize(&self, state: &mut WorkflowState) {
        if state.current_batch_paths.is_empty() {
            return;
        }
        if state.current_batch_files.is_empty() {
            // Fetch failed or everything decoded as binary; the decide step
            // will see no progress.
            tracing::debug!("no file contents for this batch, skipping model call");
            return;
        }
        let started = Instant::now();
        let context = build_batch_context(
            &state.current_batch_files,
            self.settings.max_context_chars_per_batch,
        );
        let label = batch_label(&state.current_batch_paths);
        match self.model.summarize_batch(&label, &context).await {
            Ok(summary) => {
                self.audit.record_step(
                    &state.correlation_id,
                    "summarize",
                    "success",
                    json!({"batch": label, "summary_chars": summary.chars().count()}),
                    started.elapsed().as_millis(),
                );
                state.commit_batch(state.current_batch_paths.clone(), summary);
            }
            Err(err) => {
                tracing::warn!(error = %err, "batch summarization failed");
                self.audit.record_step(
                    &state.correlation_id,
                    "summarize",
                    "failure",
                    json!({"batch": label, "error": err.to_string()}),
                    started.elapsed().as_millis(),
                );
                self.dlq.record(
                    &state.correlation_id,
                    "summarize",
                    json!({"paths": state.current_batch_paths}),
                    &err,
                );
                state.record_error("summarize", &err);
            }
        }
    }

    async fn decide(&self, state: &mut WorkflowState) {
        let started = Instant::now();
        let latest = state
            .partial_summaries
            .last()
            .filter(|p| !state.current_batch_paths.is_empty() && p.paths == state.current_batch_paths)
            .map(|p| p.summary.clone());

        let decision = if let Some(reason) = forced_done_reason(state, &self.settings, latest.is_some())
        {
            tracing::info!(reason, "forced done");
            Decision::Done
        } else if let Some(latest) = &latest {
            let previous: Vec<String> = state.partial_summaries
                [..state.partial_summaries.len() - 1]
                .iter()
                .map(|p| p.summary.clone())
                .collect();
            match self.settings.decider_mode {
                DeciderMode::Heuristic => heuristic_decision(latest, &previous),
                DeciderMode::Model => match self.model.decide(&previous, latest).await {
                    Ok(decision) => decision,
                    Err(err) => {
                        tracing::warn!(error = %err, "model decider failed, using heuristic");
                        state.record_error("decide", &err);
                        heuristic_decision(latest, &previous)
                    }
                },
            }
        } else {
            // No forced reason and no new summary cannot happen; forced
            // conditions cover the no-progress case.
            Decision::Done
        };

        state.decision = decision;
        state.iteration_count += 1;
        if !state.decision.is_done() && state.planned_batches.is_some() {
            state.current_batch_index += 1;
        }
        self.audit.record_step(
            &state.correlation_id,
            "decide",
            "success",
            json!({
                "decision": state.decision,
                "iteration": state.iteration_count,
                "coverage": state.coverage(),
            }),
            started.elapsed().as_millis(),
        );
    }

    async fn synthesize(&self, state: &mut WorkflowState) {
        let started = Instant::now();
        if state.partial_summaries.is_empty() {
            state.final_result = Some(FinalResult::default());
            self.audit.record_step(
                &state.correlation_id,
                "synthesize",
                "empty",
                json!({}),
                started.elapsed().as_millis(),
            );
            return;
        }
        let fragments: Vec<SummaryFragment> = state
            .partial_summaries
            .iter()
            .map(|p| SummaryFragment {
                label: batch_label(&p.paths),
                summary: p.summary.clone(),
            })
            .collect();
        match self.model.synthesize(&fragments).await {
            Ok(result) => {
                self.audit.record_step(
                    &state.correlation_id,
                    "synthesize",
                    "success",
                    json!({"summary_chars": result.summary.chars().count()}),
                    started.elapsed().as_millis(),
                );
                state.final_result = Some(result);
            }
            Err(err) => {
                tracing::warn!(error = %err, "synthesis failed, concatenating partial summaries");
                self.audit.record_step(
                    &state.correlation_id,
                    "synthesize",
                    "failure",
                    json!({"error": err.to_string()}),
                    started.elapsed().as_millis(),
                );
                self.dlq.record(
                    &state.correlation_id,
                    "synthesize",
                    json!({"fragments": fragments.len()}),
                    &err,
                );
                state.record_error("synthesize", &err);
                state.final_result = Some(degraded_result(state));
            }
        }
    }

    async fn save_checkpoint(&self, state: &WorkflowState) {
        if let Some(checkpointer) = &self.checkpointer {
            if let Err(err) = checkpointer.save(WorkflowCheckpoint::new(state)).await {
                tracing::warn!(%err, "checkpoint save failed, continuing");
            }
        }
    }
}

// ============================================================================
// Decision helpers
// ============================================================================

/// The OR-combined stop conditions that end the loop regardless of what the
/// content judgment would say.
fn forced_done_reason(
    state: &WorkflowState,
    settings: &Settings,
    committed_this_iteration: bool,
) -> Option<&'static str> {
    if state.iteration_count + 1 >= settings.max_iterations {
        return Some("iteration ceiling reached");
    }
    if state.eligible_paths.is_empty() {
        return Some("no eligible files");
    }
    if state.already_processed.len() >= state.eligible_paths.len() {
        return Some("all eligible files processed");
    }
    if state.coverage() >= settings.coverage_threshold {
        return Some("coverage threshold reached");
    }
    if state.partial_summaries.len() >= settings.max_partial_summaries {
        return Some("partial summary cap reached");
    }
    if let Some(plan) = &state.planned_batches {
        if state.current_batch_index + 1 >= plan.len() {
            return Some("plan exhausted");
        }
    }
    if !committed_this_iteration {
        // Selection came up empty, the fetch failed, or summarization
        // failed; iterating again would repeat the same batch.
        return Some("no new partial summary this iteration");
    }
    None
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_string)
        .collect()
}

/// Fraction of the new summary's tokens already present in the prior
/// summaries. An empty new summary counts as fully redundant.
fn lexical_overlap(latest: &str, previous: &[String]) -> f64 {
    let new_tokens = tokenize(latest);
    if new_tokens.is_empty() {
        return 1.0;
    }
    let prior_tokens: HashSet<String> = previous.iter().flat_map(|s| tokenize(s)).collect();
    let shared = new_tokens.intersection(&prior_tokens).count();
    shared as f64 / new_tokens.len() as f64
}

fn heuristic_decision(latest: &str, previous: &[String]) -> Decision {
    if previous.is_empty() {
        return Decision::Continue;
    }
    if lexical_overlap(latest, previous) >= OVERLAP_DONE_THRESHOLD {
        Decision::Done
    } else {
        Decision::Continue
    }
}

fn batch_label(paths: &[String]) -> String {
    const LABEL_PATHS: usize = 3;
    if paths.len() <= LABEL_PATHS {
        paths.join(", ")
    } else {
        format!("{}, ...", paths[..LABEL_PATHS].join(", "))
    }
}

fn degraded_result(state: &WorkflowState) -> FinalResult {
    FinalResult {
        summary: state
            .partial_summaries
            .iter()
            .map(|p| p.summary.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
        technologies: Vec::new(),
        structure: String::new(),
    }
}
