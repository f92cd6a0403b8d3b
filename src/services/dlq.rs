//! Dead-letter sink for requests that failed after all retries.
//!
//! Append-only JSONL, one entry per exhausted request, so failed work can be
//! inspected or replayed later. Like the audit log it never raises.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{json, Value};

use repo_summary_core::ApiError;

#[derive(Debug, Clone)]
pub struct DeadLetterSink {
    path: Option<PathBuf>,
}

impl DeadLetterSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Record a request that failed after its full retry budget.
    pub fn record(&self, correlation_id: &str, node: &str, request: Value, error: &ApiError) {
        let Some(path) = &self.path else {
            return;
        };
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "correlation_id": correlation_id,
            "node": node,
            "request": request,
            "error": {
                "message": error.to_string(),
                "classification": error.classification(),
            },
        });
        if let Err(err) = append_line(path, &entry) {
            tracing::warn!(%err, node, "dead-letter write failed, continuing");
        }
    }
}

fn append_line(path: &Path, entry: &Value) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{entry}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_failed_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.jsonl");
        let sink = DeadLetterSink::new(&path);

        sink.record(
            "run-1",
            "summarize",
            json!({"batch": ["src/lib.rs"]}),
            &ApiError::server_error(503, "overloaded"),
        );

        let contents = std::fs::read_to_string(&path).unwrap();
        let entry: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(entry["node"], "summarize");
        assert_eq!(entry["error"]["classification"], "transient");
        assert!(entry["error"]["message"]
            .as_str()
            .unwrap()
            .contains("overloaded"));
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        DeadLetterSink::disabled().record("run-2", "fetch", json!({}), &ApiError::timeout("slow"));
    }
}
