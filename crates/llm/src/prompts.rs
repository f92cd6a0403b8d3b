//! Prompt builders for the four call shapes.
//!
//! The text here only matters insofar as it pins the JSON contract each
//! parser in [`crate::parse`] expects.

use crate::provider::SummaryFragment;
use crate::types::Message;

pub fn plan_messages(structure_outline: &str, paths: &[String], max_batches: usize) -> Vec<Message> {
    let system = "You are a software analyst planning how to read a repository. \
                  Group related files so each group can be summarized together. \
                  Respond with JSON only: {\"batches\": [[\"path\", ...], ...]}.";
    let user = format!(
        "Repository structure:\n\n{structure_outline}\n\n\
         Files available for reading:\n{}\n\n\
         Group these files into at most {max_batches} ordered batches, most \
         informative first. Use only the listed paths, verbatim. Respond with \
         JSON only.",
        paths.join("\n")
    );
    vec![Message::system(system), Message::user(user)]
}

pub fn summarize_messages(batch_label: &str, context: &str) -> Vec<Message> {
    let system = "You are a software analyst. Summarize what the given files \
                  do: purpose, key components, and how they fit together. \
                  Respond with JSON only: {\"summary\": \"...\"}.";
    let user = format!("Files in this batch: {batch_label}\n\n{context}");
    vec![Message::system(system), Message::user(user)]
}

pub fn decide_messages(previous: &[String], latest: &str) -> Vec<Message> {
    let system = "You judge whether reading more of a repository would add \
                  meaningful information. Answer with exactly one word: \
                  continue or done.";
    let user = format!(
        "Summaries so far:\n\n{}\n\nLatest summary:\n\n{latest}\n\n\
         Would reading more files add meaningful new information? Answer \
         continue or done.",
        previous.join("\n\n---\n\n")
    );
    vec![Message::system(system), Message::user(user)]
}

pub fn synthesize_messages(fragments: &[SummaryFragment]) -> Vec<Message> {
    let system = "You are a software analyst writing the final report on a \
                  repository from partial summaries. Respond with JSON only: \
                  {\"summary\": \"...\", \"technologies\": [\"...\"], \
                  \"structure\": \"...\"}.";
    let sections: Vec<String> = fragments
        .iter()
        .map(|f| format!("### {}\n{}", f.label, f.summary))
        .collect();
    let user = format!(
        "Partial summaries, one per batch of files:\n\n{}\n\n\
         Produce the final report. Respond with JSON only.",
        sections.join("\n\n")
    );
    vec![Message::system(system), Message::user(user)]
}
