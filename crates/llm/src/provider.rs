//! The seam between the workflow engine and any concrete model backend.

use async_trait::async_trait;
use repo_summary_core::ApiResult;

use crate::types::{Decision, FinalResult};

/// A labeled partial summary handed to synthesis.
#[derive(Debug, Clone)]
pub struct SummaryFragment {
    /// Human-readable label, usually the first paths of the batch.
    pub label: String,
    pub summary: String,
}

/// The four call shapes the engine needs from a model backend.
///
/// Implementations are expected to be resilient (retry + breaker) and to
/// parse leniently; the engine treats any `Err` as a degradation point, not
/// a run abort.
#[async_trait]
pub trait ModelApi: Send + Sync {
    /// Group the eligible paths into ordered batches. Returned batches only
    /// contain paths from `paths`; at most `max_batches` are returned. An
    /// empty plan is a valid answer.
    async fn plan_batches(
        &self,
        structure_outline: &str,
        paths: &[String],
        max_batches: usize,
    ) -> ApiResult<Vec<Vec<String>>>;

    /// Summarize one batch of files given its rendered context.
    async fn summarize_batch(&self, batch_label: &str, context: &str) -> ApiResult<String>;

    /// Judge whether the latest summary adds enough new information to keep
    /// iterating.
    async fn decide(&self, previous: &[String], latest: &str) -> ApiResult<Decision>;

    /// Combine all partial summaries into the final report.
    async fn synthesize(&self, fragments: &[SummaryFragment]) -> ApiResult<FinalResult>;
}
