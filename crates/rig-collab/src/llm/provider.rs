//! LLM Provider trait definition
//!
//! Implementations bridge to specific providers (Anthropic, OpenAI, ...)
//! via Rig's CompletionModel trait; see [`crate::compat::RigAgentAdapter`].

use async_trait::async_trait;

use super::config::{LLMConfig, TokenUsage};
use crate::error::AgentError;
use crate::state::Message;
use crate::tools::ToolDefinition;

/// LLM completion response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    /// The assistant's response message
    pub message: Message,
    /// Token usage statistics (if available from provider)
    pub usage: Option<TokenUsage>,
}

impl LLMResponse {
    pub fn new(message: Message) -> Self {
        Self { message, usage: None }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Core LLM Provider trait
///
/// One call is one model turn: the provider answers the conversation so far,
/// optionally requesting tool calls. Executing those calls is the caller's job.
///
/// Failures are [`AgentError::Llm`]; the agent loop never retries them.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, AgentError>;

    /// Provider name for logging
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;
}
