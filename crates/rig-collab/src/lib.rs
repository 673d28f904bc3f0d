//! rig-collab: a researcher and a chart generator taking turns
//!
//! Two tool-using agents share one conversation. The researcher searches the
//! web, the chart generator runs Python to plot what was found, and they
//! alternate until one of them prefixes its reply with `FINAL ANSWER`.
//!
//! - [`state`]: append-only conversation state
//! - [`router`]: continue/terminate decision and the structured [`Completion`] flag
//! - [`agent`]: the tool-calling loop and the graph node wrapping it
//! - [`graph`]: `StateGraph` builder and compiled graph
//! - [`executor`]: lazy step stream, recursion limit, session-scoped executor
//! - [`workflow`]: the two-agent wiring
//! - [`tools`]: Tavily search and the Python REPL
//! - [`compat`]: `RigAgentAdapter`, any Rig agent as an [`LLMProvider`]
//!
//! # Example
//!
//! ```rust,ignore
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig_collab::{CollaborationBuilder, GraphExecutor, RigAgentAdapter, Session};
//!
//! let client = rig::providers::anthropic::Client::from_env();
//! let agent = client.agent("claude-3-5-sonnet-latest").max_tokens(4096).build();
//! let llm = Arc::new(RigAgentAdapter::new(agent));
//!
//! let graph = CollaborationBuilder::new(llm)
//!     .with_research_tool(Arc::new(TavilySearchTool::from_env()?))
//!     .with_chart_tool(Arc::new(PythonReplTool::new()))
//!     .build()?;
//! let executor = GraphExecutor::new(graph, Session::new());
//! let mut steps = executor.execute_single("Get the UK's GDP over the past 5 years, then chart it. Finish.");
//! while let Some(step) = steps.next_step().await {
//!     let step = step?;
//!     println!("{} -> {:?}", step.node, step.completion);
//! }
//! ```

pub mod agent;
pub mod compat;
pub mod error;
pub mod executor;
pub mod graph;
pub mod llm;
pub mod prompts;
pub mod router;
pub mod state;
pub mod tools;
pub mod workflow;

pub use agent::{AgentNode, AgentRole, AgentRun, ReactAgent};
pub use compat::RigAgentAdapter;
pub use error::{AgentError, GraphBuildError, GraphError, RouteError, ToolError};
pub use executor::{
    GraphExecutor, RunConfig, RunOutcome, Session, StepRecord, StepStream, DEFAULT_RECURSION_LIMIT,
};
pub use graph::{CompiledGraph, DynNode, Node, NodeOutput, StateGraph, END, START};
pub use llm::{LLMConfig, LLMProvider, LLMResponse, TokenUsage};
pub use router::{route, Completion, RouteDecision, FINAL_ANSWER_MARKER};
pub use state::{Content, ContentBlock, ConversationState, Message, Role, ToolCall};
pub use tools::{
    ChartArtifact, DynTool, PythonReplTool, Tool, ToolDefinition, ToolRegistry, ToolResult,
    ToolRuntime, TavilySearchTool, TavilyError,
};
pub use workflow::{collaboration_graph, CollaborationBuilder, CHART_GENERATOR, RESEARCHER};
