//! Model transport for the repository summarization engine.
//!
//! The engine only ever talks to [`provider::ModelApi`]; the concrete
//! [`client::HttpModelClient`] speaks to any OpenAI-compatible
//! chat-completions endpoint and funnels every call through the retry and
//! circuit-breaker layer from `repo-summary-core`. Model output is treated as
//! untrusted text: [`parse`] degrades from strict JSON to fenced blocks to
//! raw text instead of failing the run.

pub mod client;
pub mod parse;
pub mod prompts;
pub mod provider;
pub mod types;

pub use client::{HttpModelClient, ModelClientConfig};
pub use provider::{ModelApi, SummaryFragment};
pub use types::{Decision, FinalResult, Message, MessageRole};
