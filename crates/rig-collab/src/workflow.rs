//! Researcher / chart generator collaboration
//!
//! ```text
//! START ─▶ researcher ──continue──▶ chart_generator
//!              ▲  │                      │  │
//!              │  └─terminate─▶ END ◀─terminate
//!              └────────continue─────────┘
//! ```

use std::sync::Arc;

use crate::agent::{AgentNode, AgentRole, ReactAgent, DEFAULT_MAX_ITERATIONS};
use crate::error::GraphBuildError;
use crate::graph::{CompiledGraph, DynNode, StateGraph, END};
use crate::llm::{LLMConfig, LLMProvider};
use crate::router::{route, RouteDecision};
use crate::tools::DynTool;

pub const RESEARCHER: &str = "researcher";
pub const CHART_GENERATOR: &str = "chart_generator";

/// Wire two nodes into the alternating collaboration graph.
pub fn collaboration_graph(researcher: DynNode, chart_generator: DynNode) -> Result<CompiledGraph, GraphBuildError> {
    StateGraph::new()
        .node(RESEARCHER, researcher)
        .node(CHART_GENERATOR, chart_generator)
        .entry(RESEARCHER)
        .conditional_edges(RESEARCHER, route, vec![
            (RouteDecision::Continue, CHART_GENERATOR),
            (RouteDecision::Terminate, END),
        ])
        .conditional_edges(CHART_GENERATOR, route, vec![
            (RouteDecision::Continue, RESEARCHER),
            (RouteDecision::Terminate, END),
        ])
        .compile()
}

/// Builds the collaboration graph from an LLM and the two toolsets
///
/// ```rust,ignore
/// let graph = CollaborationBuilder::new(llm)
///     .with_research_tool(Arc::new(TavilySearchTool::from_env()?))
///     .with_chart_tool(Arc::new(PythonReplTool::new()))
///     .with_config(LLMConfig::new("claude-3-5-sonnet-latest").with_max_tokens(4096))
///     .build()?;
/// ```
pub struct CollaborationBuilder {
    llm: Arc<dyn LLMProvider>,
    research_tools: Vec<DynTool>,
    chart_tools: Vec<DynTool>,
    config: Option<LLMConfig>,
    max_iterations: usize,
}

impl CollaborationBuilder {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self {
            llm,
            research_tools: Vec::new(),
            chart_tools: Vec::new(),
            config: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_research_tool(mut self, tool: DynTool) -> Self {
        self.research_tools.push(tool);
        self
    }

    pub fn with_chart_tool(mut self, tool: DynTool) -> Self {
        self.chart_tools.push(tool);
        self
    }

    pub fn with_config(mut self, config: LLMConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Model calls allowed per agent turn
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    fn agent(&self, role: AgentRole, tools: Vec<DynTool>) -> AgentNode {
        let mut agent = ReactAgent::new(role.as_str(), self.llm.clone())
            .with_system_prompt(role.system_prompt())
            .with_tools(tools)
            .with_max_iterations(self.max_iterations);
        if let Some(config) = &self.config {
            agent = agent.with_config(config.clone());
        }
        AgentNode::new(role, agent)
    }

    pub fn build(self) -> Result<CompiledGraph, GraphBuildError> {
        let researcher = self.agent(AgentRole::Researcher, self.research_tools.clone());
        let chart_generator = self.agent(AgentRole::ChartGenerator, self.chart_tools.clone());
        collaboration_graph(Arc::new(researcher), Arc::new(chart_generator))
    }
}
