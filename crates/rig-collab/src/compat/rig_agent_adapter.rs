//! Adapter for using Rig Agents as [`LLMProvider`]
//!
//! Rig agents normally run their own tool loop. Here only Rig's completion API
//! is used: the tool definitions are forwarded so the model can request calls,
//! and [`crate::agent::ReactAgent`] executes them.
//!
//! Conversation mapping:
//! - system messages become the preamble (appended to the agent's own)
//! - user messages, including handed-off agent replies, become user turns
//! - assistant messages carry their text and tool calls
//! - tool messages become tool results
//! - the last message is sent as the prompt, the rest as history

use async_trait::async_trait;
use std::sync::Arc;

use rig::agent::Agent;
use rig::completion::{
    Completion, CompletionModel, Message as RigMessage, ToolDefinition as RigToolDefinition,
};
use rig::message::{AssistantContent, ToolCall as RigToolCall};
use rig::OneOrMany;

use crate::error::AgentError;
use crate::llm::{LLMConfig, LLMProvider, LLMResponse, TokenUsage};
use crate::state::{Message, Role, ToolCall};
use crate::tools::ToolDefinition;

/// Wraps a Rig `Agent<M>` as an [`LLMProvider`].
pub struct RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    agent: Arc<Agent<M>>,
    provider_name: String,
    model_name: String,
}

impl<M> RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    pub fn new(agent: Agent<M>) -> Self {
        Self::with_names(agent, "rig", "rig-agent")
    }

    /// Create adapter with custom provider/model names for logging.
    pub fn with_names(
        agent: Agent<M>,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            provider_name: provider_name.into(),
            model_name: model_name.into(),
        }
    }
}

#[async_trait]
impl<M> LLMProvider for RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, AgentError> {
        let conversation = build_rig_conversation(messages);
        let mut builder = self
            .agent
            .completion(conversation.prompt, conversation.history)
            .await
            .map_err(|e| AgentError::Llm(format!("{} completion error: {}", self.provider_name, e)))?;

        if let Some(system_preamble) = conversation.preamble {
            let preamble = match self.agent.preamble.as_deref() {
                Some(agent_preamble) => format!("{}\n\n{}", agent_preamble, system_preamble),
                None => system_preamble,
            };
            builder = builder.preamble(preamble);
        }

        if let Some(cfg) = config {
            if let Some(temperature) = cfg.temperature {
                builder = builder.temperature(temperature);
            }
            if let Some(max_tokens) = cfg.max_tokens {
                builder = builder.max_tokens(max_tokens);
            }
        }

        let rig_tools = to_rig_tool_definitions(tools);
        if !rig_tools.is_empty() {
            builder = builder.tools(rig_tools);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::Llm(format!("{} completion error: {}", self.provider_name, e)))?;

        let message = message_from_rig_choice(&response.choice);
        let usage = TokenUsage::from_rig_usage(&response.usage);

        let mut llm_response = LLMResponse::new(message);
        if !usage.is_zero() {
            llm_response = llm_response.with_usage(usage);
        }

        Ok(llm_response)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.model_name
    }
}

struct RigConversation {
    prompt: RigMessage,
    history: Vec<RigMessage>,
    preamble: Option<String>,
}

fn build_rig_conversation(messages: &[Message]) -> RigConversation {
    let mut system_parts = Vec::new();
    let mut rig_messages = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                let text = message.text();
                if !text.trim().is_empty() {
                    system_parts.push(text);
                }
            }
            Role::User => rig_messages.push(RigMessage::user(message.text())),
            Role::Assistant => rig_messages.push(convert_assistant_message(message)),
            Role::Tool => rig_messages.push(convert_tool_message(message)),
        }
    }

    let prompt = rig_messages.pop().unwrap_or_else(|| RigMessage::user(""));

    let preamble = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    RigConversation {
        prompt,
        history: rig_messages,
        preamble,
    }
}

fn convert_assistant_message(message: &Message) -> RigMessage {
    let mut contents = Vec::new();

    let text = message.text();
    if !text.is_empty() {
        contents.push(AssistantContent::text(text));
    }

    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            contents.push(AssistantContent::tool_call(
                call.id.clone(),
                call.name.clone(),
                call.arguments.clone(),
            ));
        }
    }

    let content = OneOrMany::many(contents).unwrap_or_else(|_| OneOrMany::one(AssistantContent::text("")));

    RigMessage::Assistant { id: None, content }
}

fn convert_tool_message(message: &Message) -> RigMessage {
    let tool_id = message
        .tool_call_id
        .clone()
        .unwrap_or_else(|| "tool".to_string());
    RigMessage::tool_result(tool_id, message.text())
}

fn to_rig_tool_definitions(tools: &[ToolDefinition]) -> Vec<RigToolDefinition> {
    tools
        .iter()
        .map(|tool| RigToolDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        })
        .collect()
}

fn message_from_rig_choice(choice: &OneOrMany<AssistantContent>) -> Message {
    let mut content_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for item in choice.iter() {
        match item {
            AssistantContent::Text(text) => content_parts.push(text.text.clone()),
            AssistantContent::ToolCall(tool_call) => tool_calls.push(convert_rig_tool_call(tool_call)),
            AssistantContent::Reasoning(_) => {}
            AssistantContent::Image(_) => {}
        }
    }

    let content = content_parts.join("");

    if tool_calls.is_empty() {
        Message::assistant(content)
    } else {
        Message::assistant_with_tool_calls(content, tool_calls)
    }
}

fn convert_rig_tool_call(tool_call: &RigToolCall) -> ToolCall {
    ToolCall {
        id: tool_call.id.clone(),
        name: tool_call.function.name.clone(),
        arguments: tool_call.function.arguments.clone(),
    }
}

impl<M> std::fmt::Debug for RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigAgentAdapter")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .finish()
    }
}
