//! Priority ranking and the budgeted greedy batch selector.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::state::TreeEntry;
use crate::services::selection::filter::is_eligible;

static DOC_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(readme|read_me|license|licence|contributing|changelog|notice)(\..*)?$")
        .expect("static doc-file pattern")
});

/// Config and manifest filenames that describe the project as a whole.
static CONFIG_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "package.json",
        "pyproject.toml",
        "setup.py",
        "setup.cfg",
        "requirements.txt",
        "cargo.toml",
        "go.mod",
        "pom.xml",
        "build.gradle",
        "build.gradle.kts",
        "gemfile",
        "makefile",
        "justfile",
        "dockerfile",
        "docker-compose.yml",
        "docker-compose.yaml",
        "tsconfig.json",
        "composer.json",
        "mix.exs",
        "cmakelists.txt",
        ".env.example",
    ]
    .into_iter()
    .collect()
});

/// Rank a path for selection order; lower reads first.
///
/// 0 = README/LICENSE-class docs at any depth, 1 = config/manifest names at
/// the root, 2 = those names anywhere else, 3 = anything at depth <= 1,
/// then deeper paths with increasing rank, capped.
pub fn file_priority(path: &str) -> u32 {
    let segments: Vec<&str> = path.split('/').collect();
    let filename = segments.last().map(|s| s.to_lowercase()).unwrap_or_default();
    let depth = segments.len().saturating_sub(1) as u32;

    if DOC_FILE.is_match(&filename) {
        return 0;
    }
    if CONFIG_NAMES.contains(filename.as_str()) {
        return if depth == 0 { 1 } else { 2 };
    }
    if depth <= 1 {
        return 3;
    }
    4 + (depth - 2).min(4)
}

/// Pick the next batch: rank the unprocessed eligible entries, then walk in
/// order accumulating `min(size, per_file_cap)` until the char budget or the
/// file cap would be exceeded. A single over-budget file is still admitted
/// into an otherwise empty batch so progress is always possible. Unknown
/// sizes count as zero; `per_file_cap == 0` means uncapped.
pub fn select_next_batch(
    entries: &[TreeEntry],
    already_processed: &HashSet<String>,
    char_budget: usize,
    file_cap: usize,
    per_file_cap: usize,
) -> Vec<String> {
    let mut candidates: Vec<&TreeEntry> = entries
        .iter()
        .filter(|e| !already_processed.contains(&e.path) && is_eligible(&e.path))
        .collect();
    candidates.sort_by(|a, b| {
        file_priority(&a.path)
            .cmp(&file_priority(&b.path))
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut chosen = Vec::new();
    let mut total = 0usize;
    for entry in candidates {
        if chosen.len() >= file_cap {
            break;
        }
        let mut effective = entry.size.unwrap_or(0) as usize;
        if per_file_cap > 0 {
            effective = effective.min(per_file_cap);
        }
        if !chosen.is_empty() && total + effective > char_budget {
            break;
        }
        chosen.push(entry.path.clone());
        total += effective;
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64) -> TreeEntry {
        TreeEntry::new(path, Some(size), Some("sha".into()))
    }

    fn processed(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_priority_ranks() {
        assert_eq!(file_priority("README.md"), 0);
        assert_eq!(file_priority("docs/LICENSE"), 0);
        assert_eq!(file_priority("CHANGELOG"), 0);
        assert_eq!(file_priority("Cargo.toml"), 1);
        assert_eq!(file_priority("backend/package.json"), 2);
        assert_eq!(file_priority("main.py"), 3);
        assert_eq!(file_priority("src/lib.rs"), 3);
        assert_eq!(file_priority("src/services/api.rs"), 4);
        assert_eq!(file_priority("a/b/c/d/e/f.rs"), 7);
        // Depth contribution is capped.
        assert_eq!(file_priority("a/b/c/d/e/f/g/h/i/j.rs"), 8);
    }

    #[test]
    fn test_docs_and_config_first_ties_lexical() {
        let entries = vec![
            entry("src/b.rs", 10),
            entry("src/a.rs", 10),
            entry("Cargo.toml", 10),
            entry("README.md", 10),
        ];
        let batch = select_next_batch(&entries, &HashSet::new(), 1_000, 10, 0);
        assert_eq!(batch, vec!["README.md", "Cargo.toml", "src/a.rs", "src/b.rs"]);
    }

    #[test]
    fn test_budget_stops_batch() {
        let entries = vec![
            entry("README.md", 400),
            entry("src/a.py", 400),
            entry("src/b.py", 400),
        ];
        let batch = select_next_batch(&entries, &HashSet::new(), 1_000, 10, 0);
        assert_eq!(batch, vec!["README.md", "src/a.py"]);
    }

    #[test]
    fn test_oversized_file_admitted_into_empty_batch() {
        let entries = vec![entry("GIANT.md", 10_000), entry("src/a.rs", 100)];
        let batch = select_next_batch(&entries, &HashSet::new(), 1_000, 10, 0);
        assert_eq!(batch, vec!["GIANT.md"]);
    }

    #[test]
    fn test_per_file_cap_shrinks_effective_size() {
        // Capped at 300 each, three 10k files fit a 1000-char budget.
        let entries = vec![
            entry("src/a.rs", 10_000),
            entry("src/b.rs", 10_000),
            entry("src/c.rs", 10_000),
        ];
        let batch = select_next_batch(&entries, &HashSet::new(), 1_000, 10, 300);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_file_cap() {
        let entries: Vec<TreeEntry> =
            (0..10).map(|i| entry(&format!("src/f{i}.rs"), 1)).collect();
        let batch = select_next_batch(&entries, &HashSet::new(), 1_000, 4, 0);
        assert_eq!(batch.len(), 4);
        assert!(select_next_batch(&entries, &HashSet::new(), 1_000, 0, 0).is_empty());
    }

    #[test]
    fn test_skips_processed_and_ineligible() {
        let entries = vec![
            entry("README.md", 10),
            entry("node_modules/x.js", 10),
            entry("src/a.rs", 10),
        ];
        let batch = select_next_batch(&entries, &processed(&["README.md"]), 1_000, 10, 0);
        assert_eq!(batch, vec!["src/a.rs"]);
    }

    #[test]
    fn test_repeated_folding_exhausts_eligible_set() {
        let entries = vec![
            entry("README.md", 600),
            entry("src/a.py", 600),
            entry("src/b.py", 600),
        ];
        let mut already = HashSet::new();
        let mut batches = Vec::new();
        loop {
            let batch = select_next_batch(&entries, &already, 1_000, 2, 0);
            if batch.is_empty() {
                break;
            }
            already.extend(batch.iter().cloned());
            batches.push(batch);
        }
        assert_eq!(batches.len(), 3);
        assert_eq!(already.len(), 3);
        // One more call keeps returning empty.
        assert!(select_next_batch(&entries, &already, 1_000, 2, 0).is_empty());
    }

    #[test]
    fn test_unknown_size_counts_zero() {
        let entries = vec![
            TreeEntry::new("README.md", None, None),
            entry("src/a.py", 990),
        ];
        let batch = select_next_batch(&entries, &HashSet::new(), 1_000, 10, 0);
        assert_eq!(batch, vec!["README.md", "src/a.py"]);
    }
}
