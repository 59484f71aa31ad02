//! Chat-completion client for LLM fallback classification.
//!
//! The wire contract is OpenAI-compatible: `{model, messages, temperature,
//! max_tokens}` with bearer auth. Responses are accepted in OpenAI-,
//! Anthropic-, or generic `message.content` shape, and fenced ```json
//! payloads are unwrapped before the caller sees them. Errors never
//! propagate past typed variants with stable reason codes; the matcher
//! layer converts them into sentinel results.

pub mod client;
pub mod config;
pub mod error;

pub use client::{extract_content, strip_code_fences, ChatClient, ConnectionStatus};
pub use config::{LlmConfig, MAX_TIMEOUT_SECS};
pub use error::LlmError;
