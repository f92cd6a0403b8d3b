//! Lenient parsing of model responses.
//!
//! Models are told to answer in JSON but routinely wrap the payload in a
//! Markdown code fence or ignore the contract entirely. Every parser here
//! degrades instead of failing: strict JSON, then the content of a fenced
//! block, then the raw text.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::types::{Decision, FinalResult};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```[a-zA-Z0-9_-]*\s*\n?([\s\S]*?)```").expect("static code-fence pattern")
});

/// Return the content of the first fenced code block, or the trimmed input
/// when there is none.
pub fn strip_code_fence(text: &str) -> String {
    if let Some(caps) = CODE_FENCE.captures(text) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str().trim().to_string();
        }
    }
    text.trim().to_string()
}

fn parse_json_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

fn string_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a synthesized final report. Falls back to treating the whole
/// response as the summary prose when no JSON object can be recovered.
pub fn parse_structured_summary(content: &str) -> FinalResult {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return FinalResult::default();
    }
    let stripped = strip_code_fence(trimmed);
    let Some(obj) = parse_json_object(&stripped) else {
        return FinalResult {
            summary: trimmed.to_string(),
            ..FinalResult::default()
        };
    };

    let summary = string_field(&obj, "summary")
        .or_else(|| string_field(&obj, "description"))
        .unwrap_or_else(|| trimmed.to_string());
    let technologies = obj
        .get("technologies")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let structure = string_field(&obj, "structure").unwrap_or_default();

    FinalResult {
        summary,
        technologies,
        structure,
    }
}

/// Parse a single-batch summary: `{"summary": "..."}`, a fenced variant of
/// it, or the raw response text.
pub fn parse_batch_summary(content: &str) -> String {
    let trimmed = content.trim();
    let stripped = strip_code_fence(trimmed);
    if let Some(obj) = parse_json_object(&stripped) {
        if let Some(summary) = string_field(&obj, "summary") {
            return summary;
        }
    }
    trimmed.to_string()
}

/// Parse a batch plan `{"batches": [[path, ...], ...]}`.
///
/// Paths not present in `allowed` are dropped silently, duplicates within a
/// batch are collapsed, empty batches are discarded, and the plan is
/// truncated to `max_batches`. Any unparseable response yields an empty plan.
pub fn parse_plan_batches(
    content: &str,
    allowed: &HashSet<String>,
    max_batches: usize,
) -> Vec<Vec<String>> {
    let stripped = strip_code_fence(content.trim());
    let Some(obj) = parse_json_object(&stripped) else {
        return Vec::new();
    };
    let Some(raw_batches) = obj.get("batches").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut plan = Vec::new();
    for raw_batch in raw_batches {
        if plan.len() >= max_batches {
            break;
        }
        let Some(entries) = raw_batch.as_array() else {
            continue;
        };
        let mut batch = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries.iter().filter_map(Value::as_str) {
            if allowed.contains(entry) && seen.insert(entry) {
                batch.push(entry.to_string());
            }
        }
        if !batch.is_empty() {
            plan.push(batch);
        }
    }
    plan
}

/// Parse a one-word continue/done answer. Any response containing "done"
/// (case-insensitive) means done; everything else means continue.
pub fn parse_decision(content: &str) -> Decision {
    if content.to_lowercase().contains("done") {
        Decision::Done
    } else {
        Decision::Continue
    }
}
