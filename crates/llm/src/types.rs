//! Chat message types and the structured results the engine consumes.

use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Outcome of the decide step: keep iterating or move to synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Continue,
    Done,
}

impl Decision {
    pub fn is_done(self) -> bool {
        self == Decision::Done
    }
}

/// Final synthesized report for a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    /// Prose description of what the repository does.
    #[serde(default)]
    pub summary: String,
    /// Languages, frameworks, and notable libraries.
    #[serde(default)]
    pub technologies: Vec<String>,
    /// Short description of how the code is organized.
    #[serde(default)]
    pub structure: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_serde() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);
    }

    #[test]
    fn test_final_result_defaults_missing_fields() {
        let result: FinalResult = serde_json::from_str(r#"{"summary":"a tool"}"#).unwrap();
        assert_eq!(result.summary, "a tool");
        assert!(result.technologies.is_empty());
        assert!(result.structure.is_empty());
    }
}
