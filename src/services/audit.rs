//! Append-only JSONL audit trail.
//!
//! One entry per node execution, stamped with an RFC 3339 UTC timestamp and
//! a SHA-256 hash over the entry body so tampering is detectable. Audit
//! writes are best effort: a failure is logged and swallowed, it never
//! affects the run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A no-op log for runs without an audit path configured.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Record one node execution. Never fails.
    pub fn record_step(
        &self,
        correlation_id: &str,
        node: &str,
        result: &str,
        metadata: Value,
        duration_ms: u128,
    ) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(err) = append_entry(path, correlation_id, node, result, metadata, duration_ms) {
            tracing::warn!(%err, node, "audit write failed, continuing");
        }
    }
}

fn append_entry(
    path: &Path,
    correlation_id: &str,
    node: &str,
    result: &str,
    metadata: Value,
    duration_ms: u128,
) -> std::io::Result<()> {
    let mut entry = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "event_type": "workflow_step",
        "correlation_id": correlation_id,
        "node": node,
        "result": result,
        "duration_ms": duration_ms as u64,
        "metadata": metadata,
    });
    entry["entry_hash"] = json!(entry_hash(&entry));

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{entry}")?;
    Ok(())
}

/// Hash over the canonical serialization of the entry body (without the
/// hash field itself; serde_json orders object keys, so the form is stable).
pub fn entry_hash(entry: &Value) -> String {
    format!("{:x}", Sha256::digest(entry.to_string().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_append_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(&path);

        log.record_step("run-1", "select", "success", json!({"batch_size": 3}), 12);
        log.record_step("run-1", "fetch", "failure", json!({"error": "rate limited"}), 105);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        for line in lines {
            let mut entry: Value = serde_json::from_str(line).unwrap();
            let recorded = entry["entry_hash"].as_str().unwrap().to_string();
            entry.as_object_mut().unwrap().remove("entry_hash");
            assert_eq!(entry_hash(&entry), recorded);
            assert_eq!(entry["correlation_id"], "run-1");
        }
    }

    #[test]
    fn test_disabled_log_is_silent() {
        let log = AuditLog::disabled();
        log.record_step("run-2", "select", "success", json!({}), 1);
    }

    #[test]
    fn test_unwritable_path_is_swallowed() {
        let log = AuditLog::new("/nonexistent-root-dir/audit.jsonl");
        log.record_step("run-3", "select", "success", json!({}), 1);
    }
}
