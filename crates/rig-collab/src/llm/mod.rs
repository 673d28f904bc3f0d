//! Reasoning backend abstraction
//!
//! ```text
//! ReactAgent ──uses──▶ LLMProvider (trait) ◀──implements── RigAgentAdapter
//!                                                                │
//!                                               Rig Anthropic / Rig OpenAI
//! ```

mod config;
mod provider;

pub use config::{LLMConfig, TokenUsage};
pub use provider::{LLMProvider, LLMResponse};
