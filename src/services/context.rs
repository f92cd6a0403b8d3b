//! Rendering a batch of fetched files into a bounded model context.

use crate::models::state::FetchedFile;
use crate::services::selection::file_priority;

const TREE_OUTLINE_MAX_ENTRIES: usize = 200;
const TRUNCATION_MARKER: &str = "\n[... truncated for context limit ...]";

/// Indented outline of the given paths, capped at a fixed entry count.
pub fn build_directory_outline(paths: &[String]) -> String {
    let mut sorted: Vec<&String> = paths.iter().collect();
    sorted.sort();

    let mut lines = Vec::new();
    for path in sorted.iter().take(TREE_OUTLINE_MAX_ENTRIES) {
        let depth = path.matches('/').count();
        let name = path.rsplit('/').next().unwrap_or(path);
        lines.push(format!("{}{}", "  ".repeat(depth), name));
    }
    if sorted.len() > TREE_OUTLINE_MAX_ENTRIES {
        lines.push(format!(
            "... and {} more files",
            sorted.len() - TREE_OUTLINE_MAX_ENTRIES
        ));
    }
    lines.join("\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}{TRUNCATION_MARKER}")
}

/// Render one batch of files under the char budget.
///
/// Files appear in priority order, each truncated to a third of the budget
/// so a single file cannot crowd out the rest; whole files dropped at the
/// budget edge are named in an omission note.
pub fn build_batch_context(files: &[FetchedFile], max_chars: usize) -> String {
    if files.is_empty() {
        return "Repository has no included text files (all skipped or empty).".to_string();
    }

    let mut ordered: Vec<&FetchedFile> = files.iter().collect();
    ordered.sort_by(|a, b| {
        file_priority(&a.path)
            .cmp(&file_priority(&b.path))
            .then_with(|| a.path.cmp(&b.path))
    });

    let paths: Vec<String> = ordered.iter().map(|f| f.path.clone()).collect();
    let per_file_cap = (max_chars / 3).max(1);

    let mut sections = vec![format!(
        "## Repository structure\n\n```\n{}\n```",
        build_directory_outline(&paths)
    )];
    sections.push("## Key files".to_string());

    let mut used: usize = sections.iter().map(|s| s.chars().count()).sum();
    let mut omitted = Vec::new();
    let mut included_any = false;
    for file in &ordered {
        let body = truncate_chars(&file.content, per_file_cap);
        let section = format!("### {}\n\n```\n{}\n```", file.path, body);
        let section_len = section.chars().count();
        if used + section_len > max_chars {
            if included_any {
                omitted.push(file.path.clone());
                continue;
            }
            // The batch must contribute at least one file body; clip the
            // first one to whatever budget remains.
            let remaining = max_chars.saturating_sub(used).max(200);
            let clipped = truncate_chars(&file.content, remaining);
            sections.push(format!("### {}\n\n```\n{}\n```", file.path, clipped));
            included_any = true;
            used = max_chars;
            continue;
        }
        sections.push(section);
        used += section_len;
        included_any = true;
    }

    if !omitted.is_empty() {
        sections.push(format!(
            "Note: {} file(s) omitted to stay within the context limit: {}",
            omitted.len(),
            omitted.join(", ")
        ));
    }
    sections.join("\n\n")
}
