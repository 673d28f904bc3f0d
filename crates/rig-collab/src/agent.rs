//! Agent invocation
//!
//! [`ReactAgent`] is the reasoning loop: call the model, run the tools it asks
//! for, feed the results back, repeat until it answers without tool calls.
//! [`AgentNode`] puts one of those loops into the graph under a fixed role.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::AgentError;
use crate::graph::{Node, NodeOutput};
use crate::llm::{LLMConfig, LLMProvider, TokenUsage};
use crate::prompts::{make_system_prompt, CHART_GENERATOR_SUFFIX, RESEARCHER_SUFFIX};
use crate::state::{ConversationState, Message, ToolCall};
use crate::tools::{ChartArtifact, DynTool, ToolRegistry, ToolResult, ToolRuntime};

/// Default bound on model calls within one agent turn
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// The two collaborating roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Researcher,
    ChartGenerator,
}

impl AgentRole {
    /// Node id and author tag
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Researcher => "researcher",
            AgentRole::ChartGenerator => "chart_generator",
        }
    }

    pub fn system_prompt(&self) -> String {
        match self {
            AgentRole::Researcher => make_system_prompt(RESEARCHER_SUFFIX),
            AgentRole::ChartGenerator => make_system_prompt(CHART_GENERATOR_SUFFIX),
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one agent turn
#[derive(Debug, Clone, Default)]
pub struct AgentRun {
    /// Messages produced during the turn, in order (no system prompt, no input)
    pub messages: Vec<Message>,
    pub artifacts: Vec<ChartArtifact>,
    pub usage: TokenUsage,
}

/// Tool-calling reasoning loop bound to a prompt and a toolset
///
/// # Example
///
/// ```rust,ignore
/// let agent = ReactAgent::new("researcher", llm)
///     .with_system_prompt(AgentRole::Researcher.system_prompt())
///     .with_tools(vec![Arc::new(TavilySearchTool::from_env()?)]);
/// let run = agent.run(state.messages()).await?;
/// ```
pub struct ReactAgent {
    name: String,
    llm: Arc<dyn LLMProvider>,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    config: Option<LLMConfig>,
    max_iterations: usize,
}

impl ReactAgent {
    pub fn new(name: impl Into<String>, llm: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            llm,
            tools: ToolRegistry::new(),
            system_prompt: None,
            config: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Set the maximum number of model calls per turn (at least one)
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_config(mut self, config: LLMConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_tools(mut self, tools: Vec<DynTool>) -> Self {
        self.tools.register_all(tools);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn over `history`.
    ///
    /// Tool failures are fed back to the model as text. Model failures and an
    /// exhausted iteration budget end the turn with an error.
    pub async fn run(&self, history: &[Message]) -> Result<AgentRun, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(ref system_prompt) = self.system_prompt {
            messages.push(Message::system(system_prompt.as_str()));
        }
        messages.extend(history.iter().cloned());

        let tool_definitions = self.tools.definitions();
        let mut run = AgentRun::default();

        for iteration in 0..self.max_iterations {
            debug!(agent = %self.name, iteration, "Agent iteration");

            let response = self
                .llm
                .complete(&messages, &tool_definitions, self.config.as_ref())
                .await
                .map_err(|e| {
                    error!(agent = %self.name, provider = self.llm.name(), error = %e, "LLM call failed");
                    e
                })?;

            if let Some(usage) = response.usage {
                run.usage += usage;
            }

            let reply = response.message;
            messages.push(reply.clone());
            run.messages.push(reply.clone());

            let Some(tool_calls) = reply.tool_calls.filter(|calls| !calls.is_empty()) else {
                debug!(agent = %self.name, iteration, "No tool calls, finishing");
                return Ok(run);
            };

            for call in &tool_calls {
                let result = self.execute_tool_call(call).await;
                run.artifacts.extend(result.artifacts);

                let tool_message = Message::tool(result.message, &call.id);
                messages.push(tool_message.clone());
                run.messages.push(tool_message);
            }
        }

        error!(agent = %self.name, limit = self.max_iterations, "Agent iteration budget exhausted");
        Err(AgentError::MaxIterations {
            agent: self.name.clone(),
            limit: self.max_iterations,
        })
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            info!(agent = %self.name, tool = %call.name, "Model requested an unknown tool");
            return ToolResult::new(format!("Unknown tool: {}", call.name));
        };

        let runtime = ToolRuntime::new(self.name.as_str()).with_tool_call_id(call.id.as_str());
        match tool.execute(call.arguments.clone(), &runtime).await {
            Ok(result) => result,
            Err(e) => {
                info!(agent = %self.name, tool = %call.name, error = %e, "Tool call failed");
                ToolResult::new(format!("Tool error: {}", e))
            }
        }
    }
}

impl std::fmt::Debug for ReactAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactAgent")
            .field("name", &self.name)
            .field("provider", &self.llm.name())
            .field("tools", &self.tools)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

/// Graph node running a [`ReactAgent`] under a role
///
/// The trailing message of each turn is handed off: relabeled as the role's
/// user turn (see [`Message::handoff`]).
#[derive(Debug)]
pub struct AgentNode {
    role: AgentRole,
    agent: ReactAgent,
}

impl AgentNode {
    pub fn new(role: AgentRole, agent: ReactAgent) -> Self {
        Self { role, agent }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }
}

#[async_trait]
impl Node for AgentNode {
    async fn run(&self, state: &ConversationState) -> Result<NodeOutput, AgentError> {
        let mut run = self.agent.run(state.messages()).await?;

        if let Some(last) = run.messages.pop() {
            run.messages.push(last.handoff(self.role.as_str()));
        }

        Ok(NodeOutput {
            messages: run.messages,
            artifacts: run.artifacts,
            usage: (!run.usage.is_zero()).then_some(run.usage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::llm::LLMResponse;
    use crate::state::Role;
    use crate::tools::{Tool, ToolDefinition};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted replies and records what it was sent.
    struct MockLLM {
        responses: Vec<Message>,
        call_count: AtomicUsize,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl MockLLM {
        fn new(responses: Vec<Message>) -> Self {
            Self {
                responses,
                call_count: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for MockLLM {
        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolDefinition],
            _config: Option<&LLMConfig>,
        ) -> Result<LLMResponse, AgentError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            let message = self
                .responses
                .get(count)
                .cloned()
                .unwrap_or_else(|| Message::assistant("Default response"));
            Ok(LLMResponse::new(message).with_usage(TokenUsage::new(10, 5)))
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }
    }

    struct FailingLLM;

    #[async_trait]
    impl LLMProvider for FailingLLM {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _config: Option<&LLMConfig>,
        ) -> Result<LLMResponse, AgentError> {
            Err(AgentError::Llm("401 invalid x-api-key".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }

        fn default_model(&self) -> &str {
            "none"
        }
    }

    struct SearchTool;

    #[async_trait]
    impl Tool for SearchTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "tavily_search".to_string(),
                description: "Search".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }
        }

        async fn execute(
            &self,
            args: serde_json::Value,
            runtime: &ToolRuntime,
        ) -> Result<ToolResult, ToolError> {
            if args.get("query").is_none() {
                return Err(ToolError::InvalidArguments("missing field `query`".to_string()));
            }
            Ok(ToolResult::new(format!(
                "results for {} via {}",
                args["query"],
                runtime.agent()
            )))
        }
    }

    fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_run_without_tools() {
        let llm = Arc::new(MockLLM::new(vec![Message::assistant("Hello!")]));
        let agent = ReactAgent::new("researcher", llm.clone()).with_system_prompt("be brief");

        let run = agent.run(&[Message::user("Hi")]).await.unwrap();

        assert_eq!(run.messages.len(), 1);
        assert_eq!(run.messages[0].text(), "Hello!");
        assert_eq!(run.usage, TokenUsage::new(10, 5));

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[0][0].role, Role::System);
        assert_eq!(seen[0][1].text(), "Hi");
    }

    #[tokio::test]
    async fn test_run_executes_tool_calls() {
        let llm = Arc::new(MockLLM::new(vec![
            Message::assistant_with_tool_calls("", vec![call("call_1", "tavily_search", serde_json::json!({"query": "uk gdp"}))]),
            Message::assistant("GDP data found."),
        ]));
        let agent = ReactAgent::new("researcher", llm.clone()).with_tools(vec![Arc::new(SearchTool)]);

        let run = agent.run(&[Message::user("Find UK GDP")]).await.unwrap();

        // assistant (tool call), tool result, assistant (final)
        assert_eq!(run.messages.len(), 3);
        assert_eq!(run.messages[1].role, Role::Tool);
        assert_eq!(run.messages[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(run.messages[1].text(), "results for \"uk gdp\" via researcher");
        assert_eq!(run.usage.total_tokens, 30);

        // The second model call sees the tool result.
        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[1].last().map(|m| m.role), Some(Role::Tool));
    }

    #[tokio::test]
    async fn test_tool_errors_become_text() {
        let llm = Arc::new(MockLLM::new(vec![
            Message::assistant_with_tool_calls(
                "",
                vec![
                    call("call_1", "tavily_search", serde_json::json!({})),
                    call("call_2", "python_repl", serde_json::json!({"code": "1"})),
                ],
            ),
            Message::assistant("I could not search."),
        ]));
        let agent = ReactAgent::new("researcher", llm).with_tools(vec![Arc::new(SearchTool)]);

        let run = agent.run(&[Message::user("Find UK GDP")]).await.unwrap();

        assert_eq!(run.messages[1].text(), "Tool error: Invalid arguments: missing field `query`");
        assert_eq!(run.messages[2].text(), "Unknown tool: python_repl");
        assert_eq!(run.messages.last().unwrap().text(), "I could not search.");
    }

    #[tokio::test]
    async fn test_max_iterations_is_an_error() {
        let responses: Vec<Message> = (0..10)
            .map(|i| {
                Message::assistant_with_tool_calls(
                    "",
                    vec![call(&format!("call_{}", i), "tavily_search", serde_json::json!({"query": "x"}))],
                )
            })
            .collect();
        let llm = Arc::new(MockLLM::new(responses));
        let agent = ReactAgent::new("researcher", llm.clone())
            .with_tools(vec![Arc::new(SearchTool)])
            .with_max_iterations(3);

        let err = agent.run(&[Message::user("loop")]).await.unwrap_err();

        assert!(matches!(err, AgentError::MaxIterations { limit: 3, .. }));
        assert_eq!(llm.call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let agent = ReactAgent::new("researcher", Arc::new(FailingLLM));
        let err = agent.run(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_agent_node_relabels_only_trailing_message() {
        let llm = Arc::new(MockLLM::new(vec![
            Message::assistant_with_tool_calls("", vec![call("call_1", "tavily_search", serde_json::json!({"query": "gdp"}))]),
            Message::assistant("UK GDP: 2019 2.85T ... 2023 3.34T"),
        ]));
        let agent = ReactAgent::new("researcher", llm).with_tools(vec![Arc::new(SearchTool)]);
        let node = AgentNode::new(AgentRole::Researcher, agent);
        let state = ConversationState::from_user_input("Get the UK's GDP over the past 5 years");

        let output = node.run(&state).await.unwrap();

        assert_eq!(output.messages.len(), 3);
        assert_eq!(output.messages[0].role, Role::Assistant);
        assert!(output.messages[0].name.is_none());
        assert_eq!(output.messages[1].role, Role::Tool);
        let last = output.messages.last().unwrap();
        assert_eq!(last.author(), "researcher");
        assert_eq!(last.role, Role::User);
        assert_eq!(output.usage, Some(TokenUsage::new(20, 10)));
    }

    #[test]
    fn test_role_names() {
        assert_eq!(AgentRole::Researcher.as_str(), "researcher");
        assert_eq!(AgentRole::ChartGenerator.to_string(), "chart_generator");
        assert!(AgentRole::ChartGenerator.system_prompt().contains("You can only generate charts."));
    }
}
