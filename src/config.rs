//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use repo_summary_core::RetryPolicy;

/// How the decide step judges whether to keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeciderMode {
    /// Ask the model for a one-word continue/done answer.
    Model,
    /// Local lexical-overlap heuristic, no model call.
    Heuristic,
}

impl FromStr for DeciderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "model" | "llm" => Ok(DeciderMode::Model),
            "heuristic" => Ok(DeciderMode::Heuristic),
            other => Err(format!("unknown decider mode '{other}'")),
        }
    }
}

/// How the select step picks the next batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Greedy priority walk under the char budget and file cap.
    Budgeted,
    /// Up-front model plan, advanced batch by batch; falls back to budgeted
    /// selection when planning fails.
    Planned,
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "budgeted" | "budget" => Ok(SelectionStrategy::Budgeted),
            "planned" | "plan" => Ok(SelectionStrategy::Planned),
            other => Err(format!("unknown selection strategy '{other}'")),
        }
    }
}

/// Runtime settings, read from the environment with defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_timeout_secs: u64,

    pub github_token: Option<String>,
    pub github_timeout_secs: u64,

    pub retry_max_attempts: u32,
    pub retry_min_wait_secs: u64,
    pub retry_max_wait_secs: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,

    /// Char budget for one batch's rendered context.
    pub max_context_chars_per_batch: usize,
    /// Hard cap on files per batch.
    pub max_files_per_batch: usize,
    /// Per-file effective-size cap during selection; 0 means uncapped.
    pub max_chars_per_file: usize,
    /// Fraction of eligible files that forces a done decision.
    pub coverage_threshold: f64,
    /// Safety ceiling on the select/fetch/summarize/decide loop.
    pub max_iterations: u32,
    /// Cap on accumulated partial summaries.
    pub max_partial_summaries: usize,
    /// Cap on the number of model-planned batches.
    pub max_planned_batches: usize,
    /// Concurrent blob requests inside one fetch.
    pub fetch_concurrency: usize,

    pub decider_mode: DeciderMode,
    pub selection_strategy: SelectionStrategy,

    pub audit_log_path: Option<PathBuf>,
    pub dlq_path: Option<PathBuf>,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_max_tokens: 4096,
            llm_timeout_secs: 120,

            github_token: None,
            github_timeout_secs: 30,

            retry_max_attempts: 3,
            retry_min_wait_secs: 1,
            retry_max_wait_secs: 60,
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 60,

            max_context_chars_per_batch: 50_000,
            max_files_per_batch: 50,
            max_chars_per_file: 25_000,
            coverage_threshold: 0.8,
            max_iterations: 20,
            max_partial_summaries: 15,
            max_planned_batches: 20,
            fetch_concurrency: 25,

            decider_mode: DeciderMode::Heuristic,
            selection_strategy: SelectionStrategy::Budgeted,

            audit_log_path: None,
            dlq_path: None,
            checkpoint_dir: None,
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Settings {
            llm_api_key: env_string("LLM_API_KEY").unwrap_or(defaults.llm_api_key),
            llm_base_url: env_string("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: env_string("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", defaults.llm_max_tokens),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", defaults.llm_timeout_secs),

            github_token: env_string("GITHUB_TOKEN"),
            github_timeout_secs: env_parse("GITHUB_TIMEOUT_SECS", defaults.github_timeout_secs),

            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_min_wait_secs: env_parse("RETRY_MIN_WAIT_SECS", defaults.retry_min_wait_secs),
            retry_max_wait_secs: env_parse("RETRY_MAX_WAIT_SECS", defaults.retry_max_wait_secs),
            breaker_failure_threshold: env_parse(
                "BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_cooldown_secs: env_parse(
                "BREAKER_COOLDOWN_SECS",
                defaults.breaker_cooldown_secs,
            ),

            max_context_chars_per_batch: env_parse(
                "MAX_CONTEXT_CHARS_PER_BATCH",
                defaults.max_context_chars_per_batch,
            ),
            max_files_per_batch: env_parse("MAX_FILES_PER_BATCH", defaults.max_files_per_batch),
            max_chars_per_file: env_parse("MAX_CHARS_PER_FILE", defaults.max_chars_per_file),
            coverage_threshold: env_parse("COVERAGE_THRESHOLD", defaults.coverage_threshold),
            max_iterations: env_parse("MAX_ITERATIONS", defaults.max_iterations),
            max_partial_summaries: env_parse(
                "MAX_PARTIAL_SUMMARIES",
                defaults.max_partial_summaries,
            ),
            max_planned_batches: env_parse("MAX_PLANNED_BATCHES", defaults.max_planned_batches),
            fetch_concurrency: env_parse("FETCH_CONCURRENCY", defaults.fetch_concurrency),

            decider_mode: env_parse("DECIDER_MODE", defaults.decider_mode),
            selection_strategy: env_parse("SELECTION_STRATEGY", defaults.selection_strategy),

            audit_log_path: env_string("AUDIT_LOG_PATH").map(PathBuf::from),
            dlq_path: env_string("DLQ_PATH").map(PathBuf::from),
            checkpoint_dir: env_string("CHECKPOINT_DIR").map(PathBuf::from),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_secs(self.retry_min_wait_secs),
            Duration::from_secs(self.retry_max_wait_secs),
        )
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    pub fn github_timeout(&self) -> Duration {
        Duration::from_secs(self.github_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match env_string(name) {
        Some(raw) => raw.parse().unwrap_or(default),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("model".parse::<DeciderMode>().unwrap(), DeciderMode::Model);
        assert_eq!("LLM".parse::<DeciderMode>().unwrap(), DeciderMode::Model);
        assert_eq!(
            "heuristic".parse::<DeciderMode>().unwrap(),
            DeciderMode::Heuristic
        );
        assert!("magic".parse::<DeciderMode>().is_err());

        assert_eq!(
            "planned".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::Planned
        );
        assert_eq!(
            "budgeted".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::Budgeted
        );
    }

    #[test]
    fn test_defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.retry_max_attempts, 3);
        assert_eq!(s.breaker_failure_threshold, 5);
        assert_eq!(s.max_context_chars_per_batch, 50_000);
        assert!(s.coverage_threshold > 0.0 && s.coverage_threshold <= 1.0);
    }
}
